//! Shared native fixtures for integration tests

#![allow(dead_code)]

use crossbridge_core::{
    BridgeError, DynException, DynResult, DynValue, FromNative, Instance, NativeFunction,
    NativeInterface, NativeRef, NativeType, NativeValue, Param,
};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

/// Native function `name(Class& obj, extra...)` that calls `obj.method(extra...)`
pub fn caller(name: &str, class: &str, method: &str, extra: Vec<NativeType>, ret: NativeType) -> NativeFunction {
    let mut params = vec![NativeType::reference(class)];
    params.extend(extra);
    let method = method.to_string();
    NativeFunction::new(name, params, ret, move |args| {
        let this = NativeRef::from_native(&args[0])?;
        this.call_virtual(&method, &args[1..])
    })
}

/// Same as [`caller`], but through a const reference
pub fn const_caller(name: &str, class: &str, method: &str, ret: NativeType) -> NativeFunction {
    let method = method.to_string();
    NativeFunction::new(name, vec![NativeType::reference(class)], ret, move |args| {
        let this = NativeRef::from_native(&args[0])?;
        this.as_const().call_virtual(&method, &[])
    })
}

fn int_arg(args: &[NativeValue], i: usize) -> Result<i64, BridgeError> {
    i64::from_native(&args[i])
}

/// `Base1`: m_int = 42, overloaded `sum_all`
pub fn base1() -> Arc<NativeInterface> {
    NativeInterface::builder("Base1")
        .field("m_int", NativeType::Int, 42)
        .constructor(vec![], |_, _| Ok(()))
        .constructor(vec![Param::new("i", NativeType::Int)], |init, args| {
            init.set("m_int", args[0].clone())
        })
        .virtual_method("get_value", vec![], NativeType::Int, |this, _| this.field("m_int"))
        .virtual_method("sum_value", vec![NativeType::Int], NativeType::Int, |this, args| {
            Ok(NativeValue::Int(this.field_as::<i64>("m_int")? + int_arg(args, 0)?))
        })
        .virtual_method("sum_all", vec![NativeType::Int], NativeType::Int, |this, args| {
            Ok(NativeValue::Int(this.field_as::<i64>("m_int")? + int_arg(args, 0)?))
        })
        .virtual_method(
            "sum_all",
            vec![NativeType::Int, NativeType::Int],
            NativeType::Int,
            |this, args| {
                Ok(NativeValue::Int(
                    this.field_as::<i64>("m_int")? + int_arg(args, 0)? + int_arg(args, 1)?,
                ))
            },
        )
        .virtual_method("pass_value", vec![NativeType::object("Base1")], NativeType::Int, |_, args| {
            let other = NativeRef::from_native(&args[0])?;
            other.field("m_int")
        })
        .virtual_destructor()
        .build()
        .unwrap()
}

/// `IBase2`: pure `get_value`
pub fn ibase2() -> Arc<NativeInterface> {
    NativeInterface::builder("IBase2")
        .pure_virtual("get_value", vec![], NativeType::Int)
        .virtual_destructor()
        .build()
        .unwrap()
}

/// `CBase2 : IBase2`, returns 42
pub fn cbase2(ibase2: &Arc<NativeInterface>) -> Arc<NativeInterface> {
    NativeInterface::builder("CBase2")
        .parent(ibase2)
        .virtual_method("get_value", vec![], NativeType::Int, |_, _| Ok(42.into()))
        .build()
        .unwrap()
}

/// `IBase3 : IBase2`, abstract with an int constructor
pub fn ibase3(ibase2: &Arc<NativeInterface>) -> Arc<NativeInterface> {
    NativeInterface::builder("IBase3")
        .parent(ibase2)
        .field("m_int", NativeType::Int, 0)
        .constructor(vec![Param::new("intval", NativeType::Int)], |init, args| {
            init.set("m_int", args[0].clone())
        })
        .build()
        .unwrap()
}

/// `IBase4`: pure const `get_value`
pub fn ibase4() -> Arc<NativeInterface> {
    NativeInterface::builder("IBase4")
        .pure_const_virtual("get_value", vec![], NativeType::Int)
        .virtual_destructor()
        .build()
        .unwrap()
}

/// `CBase4 : IBase4`, returns 27
pub fn cbase4(ibase4: &Arc<NativeInterface>) -> Arc<NativeInterface> {
    NativeInterface::builder("CBase4")
        .parent(ibase4)
        .const_virtual_method("get_value", vec![], NativeType::Int, |_, _| Ok(27.into()))
        .build()
        .unwrap()
}

/// `CountableBase`: live instance counter, virtual `call`
pub fn countable_base(count: Arc<AtomicIsize>) -> Arc<NativeInterface> {
    let up = count.clone();
    NativeInterface::builder("CountableBase")
        .virtual_method("call", vec![], NativeType::Int, |_, _| Ok((-1).into()))
        .on_construct(move || {
            up.fetch_add(1, Ordering::SeqCst);
        })
        .on_destroy(move || {
            count.fetch_sub(1, Ordering::SeqCst);
        })
        .virtual_destructor()
        .build()
        .unwrap()
}

/// Pure `name() -> int` interface with a defaulted int member
pub fn multi_base(class: &str, method: &str, member: &str, default: i64) -> Arc<NativeInterface> {
    let name = member.to_string();
    NativeInterface::builder(class)
        .field(member, NativeType::Int, 0)
        .constructor(vec![Param::with_default("i", NativeType::Int, default)], move |init, args| {
            init.set(&name, args[0].clone())
        })
        .pure_virtual(method, vec![], NativeType::Int)
        .virtual_destructor()
        .build()
        .unwrap()
}

/// Integer attribute of a dynamic instance
pub fn int_attr(this: &Instance, name: &str) -> DynResult<i64> {
    this.get_attr(name)?
        .as_int()
        .ok_or_else(|| DynException::type_error(format!("'{}' is not an int", name)))
}

/// First argument as an integer
pub fn int_param(args: &[DynValue]) -> DynResult<i64> {
    args.first()
        .and_then(DynValue::as_int)
        .ok_or_else(|| DynException::type_error("expected an int argument"))
}
