//! Integration tests for dynamic subclasses of native interfaces
//!
//! Tests cover:
//! - Overriding virtual methods and calling them from native code
//! - Base construction paths (direct, cooperative, composed)
//! - Abstract bases, const slots, overloads (exact types before widening)
//! - Exception propagation and return type checking
//! - Protected members, object returns, deep hierarchies

mod common;

use common::*;
use crossbridge_core::{
    ArgGroup, BridgeError, ClassDecl, CopyPolicy, DynException, DynResult, DynValue, Instance,
    Interpreter, NativeFunction, NativeInterface, NativeRef, NativeType, NativeValue, OwnershipFlag,
    OwnershipManager, Param,
};
use std::sync::Arc;

#[test]
fn test_override_function() {
    let interp = Interpreter::new();
    let base1 = base1();
    let call_get_value = caller("call_get_value", "Base1", "get_value", vec![], NativeType::Int);

    let plain = base1.instantiate(&interp, &[]).unwrap();
    assert_eq!(plain.call_method("get_value", &[]).unwrap(), DynValue::Int(42));

    let derived = interp
        .declare_class(
            ClassDecl::new("Derived")
                .extends(&base1)
                .method("get_value", |_, _| Ok(DynValue::Int(13))),
        )
        .unwrap();
    let d = derived.instantiate(&[]).unwrap();
    assert_eq!(d.call_method("get_value", &[]).unwrap(), DynValue::Int(13));
    assert!(d.to_string().contains("Derived"));
    assert!(format!("{:?}", d).contains("Derived"));

    assert_eq!(interp.call_native(&call_get_value, &[plain.into()]).unwrap(), DynValue::Int(42));
    assert_eq!(interp.call_native(&call_get_value, &[d.into()]).unwrap(), DynValue::Int(13));
}

#[test]
fn test_constructor_paths() {
    let interp = Interpreter::new();
    let base1 = base1();
    let call_get_value = caller("call_get_value", "Base1", "get_value", vec![], NativeType::Int);

    assert_eq!(
        base1.instantiate(&interp, &[27.into()]).unwrap().call_method("get_value", &[]).unwrap(),
        DynValue::Int(27)
    );

    let get_value = |this: &Instance, _: &[DynValue]| -> DynResult<DynValue> {
        Ok(DynValue::Int(int_attr(this, "m_pyint")? + int_attr(this, "m_int")?))
    };

    let b = base1.clone();
    let derived1 = interp
        .declare_class(
            ClassDecl::new("Derived1")
                .extends(&base1)
                .init(move |this, args| {
                    this.init_base(&b, &[])?;
                    this.set_attr("m_pyint", args[0].clone())
                })
                .method("get_value", get_value),
        )
        .unwrap();
    let d = derived1.instantiate(&[2.into()]).unwrap();
    assert_eq!(d.get_attr("m_int").unwrap(), DynValue::Int(42));
    assert_eq!(d.get_attr("m_pyint").unwrap(), DynValue::Int(2));
    assert_eq!(d.call_method("get_value", &[]).unwrap(), DynValue::Int(44));
    assert_eq!(interp.call_native(&call_get_value, &[d.into()]).unwrap(), DynValue::Int(44));

    let b = base1.clone();
    let derived2 = interp
        .declare_class(
            ClassDecl::new("Derived2")
                .extends(&base1)
                .init(move |this, args| {
                    this.init_base(&b, &args[1..])?;
                    this.set_attr("m_pyint", args[0].clone())
                })
                .method("get_value", get_value),
        )
        .unwrap();
    let d = derived2.instantiate(&[2.into(), 27.into()]).unwrap();
    assert_eq!(d.get_attr("m_int").unwrap(), DynValue::Int(27));
    assert_eq!(d.call_method("get_value", &[]).unwrap(), DynValue::Int(29));
    assert_eq!(interp.call_native(&call_get_value, &[d.into()]).unwrap(), DynValue::Int(29));
}

#[test]
fn test_override_abstract_base() {
    let interp = Interpreter::new();
    let ibase2 = ibase2();
    let cbase2 = cbase2(&ibase2);
    let call_get_value = caller("call_get_value", "IBase2", "get_value", vec![], NativeType::Int);

    let c1 = interp
        .declare_class(
            ClassDecl::new("C1PyBase2")
                .extends(&ibase2)
                .init(|this, _| this.super_init(&[]))
                .method("get_value", |_, _| Ok(DynValue::Int(99))),
        )
        .unwrap();

    let direct = ibase2.clone();
    let c2 = interp
        .declare_class(
            ClassDecl::new("C2PyBase2")
                .extends(&ibase2)
                .init(move |this, _| this.init_base(&direct, &[]))
                .method("get_value", |_, _| Ok(DynValue::Int(91))),
        )
        .unwrap();

    let c3 = interp
        .declare_class(
            ClassDecl::new("C3PyBase2")
                .extends(&cbase2)
                .init(|this, _| this.super_init(&[])),
        )
        .unwrap();

    let c4 = interp
        .declare_class(
            ClassDecl::new("C4PyBase2")
                .extends(&cbase2)
                .init(|this, _| this.super_init(&[]))
                .method("get_value", |_, _| Ok(DynValue::Int(13))),
        )
        .unwrap();

    let err = c2.instantiate(&[]).unwrap_err();
    assert!(err.is("TypeError"));
    assert!(err.message.contains("super"));
    assert!(err.message.contains("abstract"));

    let (c1, c3, c4) = (
        c1.instantiate(&[]).unwrap(),
        c3.instantiate(&[]).unwrap(),
        c4.instantiate(&[]).unwrap(),
    );
    assert_eq!(interp.call_native(&call_get_value, &[c1.into()]).unwrap(), DynValue::Int(99));
    assert_eq!(interp.call_native(&call_get_value, &[c3.into()]).unwrap(), DynValue::Int(42));
    assert_eq!(interp.call_native(&call_get_value, &[c4.into()]).unwrap(), DynValue::Int(13));

    let ibase3 = ibase3(&ibase2);
    let c5 = interp
        .declare_class(
            ClassDecl::new("C5PyBase3")
                .extends(&ibase3)
                .init(|this, args| this.super_init(args))
                .method("get_value", |_, _| Ok(DynValue::Int(77))),
        )
        .unwrap();
    let c5 = c5.instantiate(&[88.into()]).unwrap();
    assert_eq!(c5.get_attr("m_int").unwrap(), DynValue::Int(88));
    assert_eq!(interp.call_native(&call_get_value, &[c5.into()]).unwrap(), DynValue::Int(77));
}

#[test]
fn test_missing_override_is_abstract() {
    let interp = Interpreter::new();
    let class = interp
        .declare_class(ClassDecl::new("Incomplete").extends(&ibase2()))
        .unwrap();
    let err = class.instantiate(&[]).unwrap_err();
    assert!(err.is("TypeError"));
    assert!(err.message.contains("abstract class 'Incomplete'"));
    assert!(err.message.contains("get_value"));
}

#[test]
fn test_arguments_and_by_value_objects() {
    let interp = Interpreter::new();
    let base1 = base1();
    let call_sum_value = caller("call_sum_value", "Base1", "sum_value", vec![NativeType::Int], NativeType::Int);

    assert_eq!(
        base1.instantiate(&interp, &[27.into()]).unwrap().call_method("sum_value", &[(-7).into()]).unwrap(),
        DynValue::Int(20)
    );

    let derived = interp
        .declare_class(
            ClassDecl::new("Derived1")
                .extends(&base1)
                .method_with_arity("sum_value", 1, |_, args| Ok(DynValue::Int(int_param(args)? + 13))),
        )
        .unwrap();
    let d = derived.instantiate(&[]).unwrap();
    assert_eq!(d.get_attr("m_int").unwrap(), DynValue::Int(42));
    assert_eq!(d.call_method("sum_value", &[(-7).into()]).unwrap(), DynValue::Int(6));
    assert_eq!(
        interp.call_native(&call_sum_value, &[d.clone().into(), (-7).into()]).unwrap(),
        DynValue::Int(6)
    );
    assert!(d.call_method("sum_value", &[]).unwrap_err().is("TypeError"));

    let pass_value = interp
        .declare_class(
            ClassDecl::new("Derived2")
                .extends(&base1)
                .method("pass_value", |_, args| {
                    let other = args[0]
                        .as_object()
                        .ok_or_else(|| DynException::type_error("expected Base1"))?;
                    Ok(DynValue::Int(int_attr(other, "m_int")? * 2))
                }),
        )
        .unwrap();
    let d2 = pass_value.instantiate(&[]).unwrap();
    let arg = base1.instantiate(&interp, &[5.into()]).unwrap();
    let result = d2
        .native_ref()
        .call_virtual("pass_value", &[NativeValue::Object(arg.native_ref())])
        .unwrap();
    assert_eq!(result, NativeValue::Int(10));
}

#[test]
fn test_override_overloads() {
    let interp = Interpreter::new();
    let base1 = base1();
    let call_sum_all1 = caller("call_sum_all", "Base1", "sum_all", vec![NativeType::Int], NativeType::Int);
    let call_sum_all2 = caller(
        "call_sum_all",
        "Base1",
        "sum_all",
        vec![NativeType::Int, NativeType::Int],
        NativeType::Int,
    );

    let plain = base1.instantiate(&interp, &[27.into()]).unwrap();
    assert_eq!(plain.call_method("sum_all", &[(-7).into()]).unwrap(), DynValue::Int(20));
    assert_eq!(
        plain.call_method("sum_all", &[(-3).into(), (-4).into()]).unwrap(),
        DynValue::Int(20)
    );

    let derived = interp
        .declare_class(ClassDecl::new("Derived").extends(&base1).method("sum_all", |_, args| {
            let total: i64 = args.iter().filter_map(DynValue::as_int).sum();
            Ok(DynValue::Int(total + 13))
        }))
        .unwrap();
    let d = derived.instantiate(&[]).unwrap();
    assert_eq!(d.call_method("sum_all", &[(-7).into()]).unwrap(), DynValue::Int(6));
    assert_eq!(
        interp.call_native(&call_sum_all1, &[d.clone().into(), (-7).into()]).unwrap(),
        DynValue::Int(6)
    );
    assert_eq!(d.call_method("sum_all", &[(-7).into(), (-5).into()]).unwrap(), DynValue::Int(1));
    assert_eq!(
        interp
            .call_native(&call_sum_all2, &[d.into(), (-7).into(), (-5).into()])
            .unwrap(),
        DynValue::Int(1)
    );
}

#[test]
fn test_const_methods_keep_qualifier() {
    let interp = Interpreter::new();
    let ibase4 = ibase4();
    let cbase4 = cbase4(&ibase4);
    let call_get_value = const_caller("call_get_value", "IBase4", "get_value", NativeType::Int);

    let c1 = interp
        .declare_class(
            ClassDecl::new("C1PyBase4")
                .extends(&ibase4)
                .init(|this, _| this.super_init(&[]))
                .method("get_value", |_, _| Ok(DynValue::Int(17))),
        )
        .unwrap();
    let c2 = interp
        .declare_class(
            ClassDecl::new("C2PyBase4")
                .extends(&cbase4)
                .init(|this, _| this.super_init(&[])),
        )
        .unwrap();

    let (c1, c2) = (c1.instantiate(&[]).unwrap(), c2.instantiate(&[]).unwrap());
    assert!(c1.dyn_class().unwrap().shadow().vtable().slots()[0].key.is_const);
    assert_eq!(interp.call_native(&call_get_value, &[c1.into()]).unwrap(), DynValue::Int(17));
    assert_eq!(interp.call_native(&call_get_value, &[c2.into()]).unwrap(), DynValue::Int(27));
}

#[test]
fn test_error_propagates_through_native_frames() {
    let interp = Interpreter::new();
    let base1 = base1();
    let call_sum_value = caller("call_sum_value", "Base1", "sum_value", vec![NativeType::Int], NativeType::Int);
    let errmsg = "I do not like the given value";

    let derived = interp
        .declare_class(
            ClassDecl::new("Derived")
                .extends(&base1)
                .method("sum_value", move |_, _| Err(DynException::value_error(errmsg))),
        )
        .unwrap();
    let d = derived.instantiate(&[]).unwrap();
    let err = interp
        .call_native(&call_sum_value, &[d.into(), (-7).into()])
        .unwrap_err();
    assert!(err.is("ValueError"));
    assert!(err.message.contains(errmsg));
    assert_eq!(interp.counters().propagated(), 1);
}

#[test]
fn test_missing_return_is_type_error() {
    let interp = Interpreter::new();
    let base1 = base1();
    let call_get_value = caller("call_get_value", "Base1", "get_value", vec![], NativeType::Int);

    let derived = interp
        .declare_class(ClassDecl::new("Derived").extends(&base1).method("get_value", |this, _| {
            let _ = int_attr(this, "m_int")? * 2;
            Ok(DynValue::None)
        }))
        .unwrap();
    let d = derived.instantiate(&[4.into()]).unwrap();
    assert_eq!(d.get_attr("m_int").unwrap(), DynValue::Int(4));
    let err = interp.call_native(&call_get_value, &[d.into()]).unwrap_err();
    assert!(err.is("TypeError"));
}

#[test]
fn test_virtual_dtor_warning() {
    let interp = Interpreter::new();
    let my_class1 = NativeInterface::builder("MyClass1").build().unwrap();
    let my_class2 = NativeInterface::builder("MyClass2").virtual_destructor().build().unwrap();
    let my_class3 = NativeInterface::builder("MyClass3").parent(&my_class2).build().unwrap();

    let derived1 = interp
        .declare_class(ClassDecl::new("MyPyDerived1").extends(&my_class1))
        .unwrap();
    let warnings = interp.diagnostics();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].to_string().starts_with("RuntimeWarning"));
    assert!(warnings[0].message.contains("has no virtual destructor"));

    let d = derived1.instantiate(&[]).unwrap();
    assert!(OwnershipManager::release_dynamic(d));

    let derived2 = interp
        .declare_class(ClassDecl::new("MyPyDerived2").extends(&my_class2))
        .unwrap();
    drop(derived2.instantiate(&[]).unwrap());
    interp
        .declare_class(ClassDecl::new("MyPyDerived3").extends(&my_class3))
        .unwrap();
    assert_eq!(interp.diagnostics().len(), 1);
}

#[test]
fn test_protected_access() {
    let interp = Interpreter::new();
    let my_base = NativeInterface::builder("MyBase")
        .protected_field("my_data", NativeType::Int, 101)
        .method("get_data", vec![], NativeType::Int, |this, _| this.field("my_data"))
        .virtual_method("get_data_v", vec![], NativeType::Int, |this, _| this.field("my_data"))
        .virtual_destructor()
        .build()
        .unwrap();

    assert!(!my_base.has_visible_field("my_data", false));
    assert!(!my_base.instantiate(&interp, &[]).unwrap().has_attr("my_data"));

    let simple = interp
        .declare_class(ClassDecl::new("MyPyDerived").extends(&my_base))
        .unwrap();
    assert!(simple.has_attr("my_data"));
    assert_eq!(simple.instantiate(&[]).unwrap().get_attr("my_data").unwrap(), DynValue::Int(101));

    let with_init = interp
        .declare_class(ClassDecl::new("MyPyDerived").extends(&my_base).init(|this, _| {
            this.super_init(&[])?;
            if this.get_attr("my_data")? != DynValue::Int(101) {
                return Err(DynException::runtime_error("protected member not initialized"));
            }
            this.set_attr("py_data", 13)?;
            this.set_attr("my_data", 42)
        }))
        .unwrap();
    let m = with_init.instantiate(&[]).unwrap();
    assert_eq!(m.get_attr("py_data").unwrap(), DynValue::Int(13));
    assert_eq!(m.get_attr("my_data").unwrap(), DynValue::Int(42));
    assert_eq!(m.call_method("get_data", &[]).unwrap(), DynValue::Int(42));
    assert_eq!(m.call_method("get_data_v", &[]).unwrap(), DynValue::Int(42));
}

fn object_returns_base() -> (Arc<NativeInterface>, Arc<NativeInterface>) {
    let base = NativeInterface::builder("Base")
        .virtual_method("foo", vec![], NativeType::pointer("Base"), |_, _| Ok(NativeValue::Null))
        .virtual_method("whoami", vec![], NativeType::Str, |_, _| Ok("Base".into()))
        .virtual_destructor()
        .build()
        .unwrap();
    let cpp_derived = NativeInterface::builder("CppDerived")
        .parent(&base)
        .virtual_method("foo", vec![], NativeType::pointer("CppDerived"), |_, _| Ok(NativeValue::Null))
        .virtual_method("whoami", vec![], NativeType::Str, |_, _| Ok("CppDerived".into()))
        .build()
        .unwrap();
    (base, cpp_derived)
}

#[test]
fn test_object_returns_follow_ownership() {
    let interp = Interpreter::new();
    let (base, cpp_derived) = object_returns_base();
    assert_eq!(cpp_derived.vtable().slots()[0].ret, NativeType::pointer("Base"));
    let call_foo = caller("call_foo", "Base", "foo", vec![], NativeType::pointer("Base"));

    let made = cpp_derived.clone();
    let owned_by_dynamic = interp
        .declare_class(ClassDecl::new("PyDerived1").extends(&base).method("foo", move |this, _| {
            Ok(made.instantiate(this.interp(), &[])?.into())
        }))
        .unwrap();
    let obj = owned_by_dynamic.instantiate(&[]).unwrap();
    assert!(interp.call_native(&call_foo, &[obj.into()]).unwrap().is_none());

    let made = cpp_derived.clone();
    let released = interp
        .declare_class(ClassDecl::new("PyDerived2").extends(&base).method("foo", move |this, _| {
            let x = made.instantiate(this.interp(), &[])?;
            x.set_dynamic_owns(false);
            Ok(x.into())
        }))
        .unwrap();
    let obj = released.instantiate(&[]).unwrap();
    let returned = interp.call_native(&call_foo, &[obj.into()]).unwrap();
    let returned = returned.as_object().unwrap();
    assert_eq!(returned.call_method("whoami", &[]).unwrap(), DynValue::from("CppDerived"));

    let self_made = interp
        .declare_class(
            ClassDecl::new("PyDerived3")
                .extends(&base)
                .method("foo", |this, _| Ok(this.dyn_class().unwrap().instantiate(&[])?.into()))
                .method("whoami", |_, _| Ok("PyDerived3".into())),
        )
        .unwrap();
    let obj = self_made.instantiate(&[]).unwrap();
    assert!(interp.call_native(&call_foo, &[obj.into()]).unwrap().is_none());

    let handed_over = interp
        .declare_class(
            ClassDecl::new("PyDerived4")
                .extends(&base)
                .method("foo", |this, _| {
                    let d = this.dyn_class().unwrap().instantiate(&[])?;
                    d.set_dynamic_owns(false);
                    d.set_attr("alpha", 2)?;
                    Ok(d.into())
                })
                .method("whoami", |_, _| Ok("PyDerived4".into())),
        )
        .unwrap();
    let obj = handed_over.instantiate(&[]).unwrap();
    let new_obj = interp.call_native(&call_foo, &[obj.into()]).unwrap();
    let new_obj = new_obj.as_object().unwrap();
    assert_eq!(new_obj.call_method("whoami", &[]).unwrap(), DynValue::from("PyDerived4"));
    assert_eq!(new_obj.get_attr("alpha").unwrap(), DynValue::Int(2));
}

#[test]
fn test_cctor_access_controlled() {
    let interp = Interpreter::new();
    let common_base = NativeInterface::builder("CommonBase")
        .pure_virtual("whoami", vec![], NativeType::Str)
        .virtual_destructor()
        .build()
        .unwrap();
    let callit = caller("callit", "CommonBase", "whoami", vec![], NativeType::Str);

    for (name, policy) in [("Base1", CopyPolicy::Private), ("Base2", CopyPolicy::Protected)] {
        let base = NativeInterface::builder(name)
            .parent(&common_base)
            .virtual_method("whoami", vec![], NativeType::Str, move |_, _| Ok(name.into()))
            .copy_policy(policy)
            .build()
            .unwrap();
        let class = interp
            .declare_class(
                ClassDecl::new("PyDerived")
                    .extends(&base)
                    .method("whoami", |_, _| Ok("PyDerived".into())),
            )
            .unwrap();
        let obj = class.instantiate(&[]).unwrap();
        assert_eq!(interp.call_native(&callit, &[obj.clone().into()]).unwrap(), DynValue::from("PyDerived"));
        assert!(OwnershipManager::copy(&obj).is_ok());
        assert!(OwnershipManager::copy(&base.instantiate(&interp, &[]).unwrap()).is_err());
    }
}

#[test]
fn test_deep_hierarchy() {
    let interp = Interpreter::new();
    let base = NativeInterface::builder("Base")
        .pure_virtual("whoami", vec![], NativeType::Str)
        .virtual_destructor()
        .build()
        .unwrap();
    let callit = caller("callit", "Base", "whoami", vec![], NativeType::Str);
    let check = |obj: Instance, expected: &str| {
        assert_eq!(obj.call_method("whoami", &[]).unwrap(), DynValue::from(expected));
        assert_eq!(interp.call_native(&callit, &[obj.into()]).unwrap(), DynValue::from(expected));
    };

    let d1 = interp
        .declare_class(
            ClassDecl::new("PyDerived1")
                .extends(&base)
                .method("whoami", |_, _| Ok("PyDerived1".into())),
        )
        .unwrap();
    check(d1.instantiate(&[]).unwrap(), "PyDerived1");

    let d2 = interp
        .declare_class(ClassDecl::new("PyDerived2").extends_class(&d1))
        .unwrap();
    check(d2.instantiate(&[]).unwrap(), "PyDerived1");

    let d3 = interp
        .declare_class(
            ClassDecl::new("PyDerived3")
                .extends_class(&d1)
                .method("whoami", |_, _| Ok("PyDerived3".into())),
        )
        .unwrap();
    check(d3.instantiate(&[]).unwrap(), "PyDerived3");

    let d4 = interp
        .declare_class(
            ClassDecl::new("PyDerived4")
                .extends_class(&d2)
                .method("whoami", |_, _| Ok("PyDerived4".into())),
        )
        .unwrap();
    check(d4.instantiate(&[]).unwrap(), "PyDerived4");
}

#[test]
fn test_abstract_hierarchy() {
    let interp = Interpreter::new();
    let base = NativeInterface::builder("Base")
        .pure_virtual("whoami", vec![], NativeType::Str)
        .pure_virtual("message", vec![], NativeType::Str)
        .virtual_destructor()
        .build()
        .unwrap();
    let whois = caller("whois", "Base", "whoami", vec![], NativeType::Str);
    let saywot = caller("saywot", "Base", "message", vec![], NativeType::Str);

    let d1 = interp
        .declare_class(
            ClassDecl::new("PyDerived1")
                .extends(&base)
                .init(|this, _| {
                    this.super_init(&[])?;
                    this.set_attr("_name", "PyDerived1")
                })
                .method("whoami", |this, _| this.get_attr("_name")),
        )
        .unwrap();
    assert!(d1.is_abstract());

    let parent = d1.clone();
    let d2 = interp
        .declare_class(
            ClassDecl::new("PyDerived2")
                .extends_class(&d1)
                .init(move |this, _| {
                    parent.init_instance(this, &[])?;
                    this.set_attr("_message", "Hello, World!")
                })
                .method("message", |this, _| this.get_attr("_message")),
        )
        .unwrap();

    let obj = d2.instantiate(&[]).unwrap();
    assert_eq!(obj.call_method("whoami", &[]).unwrap(), DynValue::from("PyDerived1"));
    assert_eq!(interp.call_native(&whois, &[obj.clone().into()]).unwrap(), DynValue::from("PyDerived1"));
    assert_eq!(obj.call_method("message", &[]).unwrap(), DynValue::from("Hello, World!"));
    assert_eq!(interp.call_native(&saywot, &[obj.into()]).unwrap(), DynValue::from("Hello, World!"));
}

#[test]
fn test_native_side_multiple_inheritance() {
    let interp = Interpreter::new();
    let result = NativeInterface::builder("Result")
        .field("result", NativeType::Int, 1337)
        .constructor(vec![], |_, _| Ok(()))
        .constructor(vec![Param::new("r", NativeType::Int)], |init, args| {
            init.set("result", args[0].clone())
        })
        .build()
        .unwrap();
    let base1 = NativeInterface::builder("Base1")
        .pure_virtual("abstract1", vec![], NativeType::object("Result"))
        .virtual_destructor()
        .build()
        .unwrap();
    let base2 = NativeInterface::builder("Base2")
        .pure_virtual("abstract2", vec![], NativeType::object("Result"))
        .virtual_destructor()
        .build()
        .unwrap();
    let made = result.clone();
    let base = NativeInterface::builder("Base")
        .parent(&base1)
        .parent(&base2)
        .virtual_method("abstract2", vec![], NativeType::object("Result"), move |this, _| {
            let interp = this.to_dynamic().interp().clone();
            Ok(made.construct(&interp, &[999.into()])?.into())
        })
        .build()
        .unwrap();
    assert!(base.is_abstract());

    let made = result.clone();
    let derived = interp
        .declare_class(ClassDecl::new("Derived").extends(&base).method("abstract1", move |this, _| {
            Ok(made.instantiate(this.interp(), &[1.into()])?.into())
        }))
        .unwrap();
    let obj = derived.instantiate(&[]).unwrap();
    let native = obj.native_ref();

    let r1 = native.call_virtual("abstract1", &[]).unwrap();
    assert_eq!(r1.as_object().unwrap().field("result").unwrap(), NativeValue::Int(1));
    let r2 = native.call_virtual("abstract2", &[]).unwrap();
    assert_eq!(r2.as_object().unwrap().field("result").unwrap(), NativeValue::Int(999));
}

fn xyz() -> [Arc<NativeInterface>; 3] {
    [
        multi_base("MyClass1", "x", "m_1", 13),
        multi_base("MyClass2", "y", "m_2", 42),
        multi_base("MyClass3", "z", "m_3", 67),
    ]
}

fn verify(obj: &Instance, expected: &[i64]) {
    for (member, value) in ["m_1", "m_2", "m_3"].iter().zip(expected) {
        assert_eq!(obj.get_attr(member).unwrap(), DynValue::Int(*value), "{}", member);
    }
}

#[test]
fn test_basic_multiple_inheritance() {
    let interp = Interpreter::new();
    let [c1, c2, c3] = xyz();
    let callx = caller("callx", "MyClass1", "x", vec![], NativeType::Int);
    let cally = caller("cally", "MyClass2", "y", vec![], NativeType::Int);
    let callz = caller("callz", "MyClass3", "z", vec![], NativeType::Int);

    let two = interp
        .declare_class(
            ClassDecl::new("MyPyDerived")
                .extends_multi(&[c1.clone(), c2.clone()])
                .method("x", |_, _| Ok(DynValue::Int(16)))
                .method("y", |_, _| Ok(DynValue::Int(32))),
        )
        .unwrap();
    assert_eq!(two.base_names().len(), 2);
    let a = two.instantiate(&[]).unwrap();
    assert_eq!(a.call_method("x", &[]).unwrap(), interp.call_native(&callx, &[a.clone().into()]).unwrap());
    assert_eq!(a.call_method("y", &[]).unwrap(), interp.call_native(&cally, &[a.clone().into()]).unwrap());
    verify(&a, &[13, 42]);

    let three = interp
        .declare_class(
            ClassDecl::new("MyPyDerived2")
                .extends_multi(&[c1, c2, c3])
                .method("x", |_, _| Ok(DynValue::Int(16)))
                .method("y", |_, _| Ok(DynValue::Int(32)))
                .method("z", |_, _| Ok(DynValue::Int(64))),
        )
        .unwrap();
    assert_eq!(three.base_names().len(), 3);
    let a = three.instantiate(&[]).unwrap();
    assert_eq!(interp.call_native(&callz, &[a.clone().into()]).unwrap(), DynValue::Int(64));
    verify(&a, &[13, 42, 67]);
}

#[test]
fn test_multiple_inheritance_with_constructors() {
    let interp = Interpreter::new();
    let [c1, c2, c3] = xyz();
    let callx = caller("callx", "MyClass1", "x", vec![], NativeType::Int);

    let class = interp
        .declare_class(
            ClassDecl::new("MyPyDerived2")
                .extends_multi(&[c1, c2, c3])
                .init(|this, args| {
                    let groups: Vec<DynValue> = args.iter().map(|v| DynValue::Tuple(vec![v.clone()])).collect();
                    this.super_init(&groups)
                })
                .method("x", |_, _| Ok(DynValue::Int(16)))
                .method("y", |_, _| Ok(DynValue::Int(32)))
                .method("z", |_, _| Ok(DynValue::Int(64))),
        )
        .unwrap();
    let a = class.instantiate(&[27.into(), 88.into(), (-11).into()]).unwrap();
    assert_eq!(interp.call_native(&callx, &[a.clone().into()]).unwrap(), DynValue::Int(16));
    verify(&a, &[27, 88, -11]);

    let err = class.instantiate(&[27.into(), 88.into(), (-11).into(), 5.into()]).unwrap_err();
    assert!(err.is("TypeError"));
}

#[test]
fn test_multiple_inheritance_with_defaults() {
    let interp = Interpreter::new();
    let [c1, c2, c3] = xyz();

    // init(val1, val2, val3, n_args): None means "not given"
    let class = interp
        .declare_class(
            ClassDecl::new("MyPyDerived")
                .extends_multi(&[c1, c2, c3])
                .init(|this, args| {
                    let group = |v: &DynValue| match v {
                        DynValue::None => DynValue::Tuple(vec![]),
                        other => DynValue::Tuple(vec![other.clone()]),
                    };
                    let groups: Vec<DynValue> = args[..3].iter().map(group).collect();
                    let n = args[3].as_int().unwrap_or(3) as usize;
                    this.super_init(&groups[..n])
                })
                .method("x", |_, _| Ok(DynValue::Int(16)))
                .method("y", |_, _| Ok(DynValue::Int(32)))
                .method("z", |_, _| Ok(DynValue::Int(64))),
        )
        .unwrap();
    let make = |v1: DynValue, v2: DynValue, v3: DynValue, n: i64| {
        class.instantiate(&[v1, v2, v3, n.into()]).unwrap()
    };
    let none = || DynValue::None;

    verify(&make(27.into(), 88.into(), (-11).into(), 3), &[27, 88, -11]);
    verify(&make(none(), 27.into(), none(), 3), &[13, 27, 67]);
    verify(&make(none(), none(), none(), 0), &[13, 42, 67]);
    verify(&make(27.into(), none(), none(), 1), &[27, 42, 67]);
    verify(&make(27.into(), 55.into(), none(), 2), &[27, 55, 67]);
}

#[test]
fn test_keyword_argument_groups() {
    let interp = Interpreter::new();
    let [c1, c2, c3] = xyz();
    let class = interp
        .declare_class(
            ClassDecl::new("MyPyDerived")
                .extends_multi(&[c1, c2, c3])
                .init(|this, _| {
                    this.super_init_grouped(vec![ArgGroup::new(), ArgGroup::new().keyword("i", 27)])
                })
                .method("x", |_, _| Ok(DynValue::Int(16)))
                .method("y", |_, _| Ok(DynValue::Int(32)))
                .method("z", |_, _| Ok(DynValue::Int(64))),
        )
        .unwrap();
    verify(&class.instantiate(&[]).unwrap(), &[13, 27, 67]);
}

#[test]
fn test_const_byvalue_return_is_fresh() {
    let interp = Interpreter::new();
    let konst = NativeInterface::builder("Const")
        .field("m_value", NativeType::Str, "")
        .constructor(vec![], |_, _| Ok(()))
        .constructor(vec![Param::new("s", NativeType::Str)], |init, args| {
            init.set("m_value", args[0].clone())
        })
        .build()
        .unwrap();
    let abstract_ = NativeInterface::builder("Abstract")
        .pure_virtual("return_const", vec![], NativeType::object("Const"))
        .virtual_destructor()
        .build()
        .unwrap();
    let callit = return_const_caller();

    let made = konst.clone();
    let class = interp
        .declare_class(
            ClassDecl::new("ReturnConstByValue")
                .extends(&abstract_)
                .method("return_const", move |this, _| {
                    Ok(made.instantiate(this.interp(), &["abcdef".into()])?.into())
                }),
        )
        .unwrap();
    let a = class.instantiate(&[]).unwrap();

    let direct = a.call_method("return_const", &[]).unwrap();
    assert_eq!(direct.as_object().unwrap().get_attr("m_value").unwrap(), DynValue::from("abcdef"));

    let first = interp.call_native(&callit, &[a.clone().into()]).unwrap();
    let second = interp.call_native(&callit, &[a.into()]).unwrap();
    let (first, second) = (first.as_object().unwrap(), second.as_object().unwrap());
    assert_eq!(first.get_attr("m_value").unwrap(), DynValue::from("abcdef"));
    assert!(!first.ptr_eq(second));
    assert_eq!(first.ownership(), OwnershipFlag::Native);
}

fn return_const_caller() -> NativeFunction {
    NativeFunction::new(
        "callit",
        vec![NativeType::pointer("Abstract")],
        NativeType::object("Const"),
        |args| {
            let this = args[0]
                .as_object()
                .ok_or_else(|| BridgeError::native("std::invalid_argument", "null"))?;
            this.call_virtual("return_const", &[])
        },
    )
}

#[test]
fn test_non_copyable_bases() {
    let interp = Interpreter::new();
    let copyable = NativeInterface::builder("Copyable").virtual_destructor().build().unwrap();
    let movable = NativeInterface::builder("Movable")
        .copy_policy(CopyPolicy::MoveOnly)
        .virtual_destructor()
        .build()
        .unwrap();
    let some_class = NativeInterface::builder("SomeClass").virtual_destructor().build().unwrap();

    interp
        .declare_class(ClassDecl::new("DerivedCopyable").extends(&copyable))
        .unwrap();
    let derived_movable = interp
        .declare_class(ClassDecl::new("DerivedMovable").extends(&movable))
        .unwrap();
    interp
        .declare_class(ClassDecl::new("DerivedMulti").extends_multi(&[movable.clone(), copyable.clone()]))
        .unwrap();

    let with_default = interp
        .declare_class(
            ClassDecl::new("DerivedMulti")
                .extends_multi(&[movable, copyable, some_class])
                .init(|this, _| this.super_init(&[])),
        )
        .unwrap();
    let d = with_default.instantiate(&[]).unwrap();
    assert!(d.is_initialized());

    let m = derived_movable.instantiate(&[]).unwrap();
    assert!(OwnershipManager::copy(&m).is_ok());
}

#[test]
fn test_overlapping_bases_rejected() {
    let interp = Interpreter::new();
    let ibase2 = ibase2();
    let cbase2 = cbase2(&ibase2);
    let err = interp
        .declare_class(ClassDecl::new("Diamond").extends_multi(&[ibase2, cbase2]))
        .unwrap_err();
    assert!(err.message.contains("unsupported composition"));
}

#[test]
fn test_base_qualified_call_skips_override() {
    let interp = Interpreter::new();
    let base1 = base1();
    let derived = interp
        .declare_class(
            ClassDecl::new("Derived")
                .extends(&base1)
                .method("get_value", |_, _| Ok(DynValue::Int(13))),
        )
        .unwrap();
    let d = derived.instantiate(&[5.into()]).unwrap();

    assert_eq!(d.call_method("get_value", &[]).unwrap(), DynValue::Int(13));
    assert_eq!(d.call_base(&base1, "get_value", &[]).unwrap(), DynValue::Int(5));
    assert_eq!(
        d.native_ref().call_base(&base1, "get_value", &[]).unwrap(),
        NativeValue::Int(5)
    );
    assert_eq!(d.native_ref().call_virtual("get_value", &[]).unwrap(), NativeValue::Int(13));
}

fn tag(s: &'static str) -> impl Fn(&NativeRef, &[NativeValue]) -> Result<NativeValue, BridgeError> + Send + Sync {
    move |_, _| Ok(NativeValue::Str(s.into()))
}

fn widening_first() -> Arc<NativeInterface> {
    NativeInterface::builder("WideningFirst")
        .method("f", vec![NativeType::Double], NativeType::Str, tag("double"))
        .method("f", vec![NativeType::Int], NativeType::Str, tag("int"))
        .virtual_method("g", vec![NativeType::Double], NativeType::Str, tag("double"))
        .virtual_method("g", vec![NativeType::Int], NativeType::Str, tag("int"))
        .virtual_destructor()
        .build()
        .unwrap()
}

#[test]
fn test_overload_prefers_exact_type() {
    let interp = Interpreter::new();
    let base = widening_first();
    let int = || DynValue::Str("int".into());
    let double = || DynValue::Str("double".into());

    let plain = base.instantiate(&interp, &[]).unwrap();
    assert_eq!(plain.call_method("f", &[DynValue::Int(1)]).unwrap(), int());
    assert_eq!(plain.call_method("f", &[DynValue::Float(1.0)]).unwrap(), double());
    assert_eq!(plain.call_method("g", &[DynValue::Int(1)]).unwrap(), int());

    let native = plain.native_ref();
    assert_eq!(native.call_method("f", &[NativeValue::Int(1)]).unwrap(), NativeValue::Str("int".into()));
    assert_eq!(native.call_virtual("g", &[NativeValue::Int(1)]).unwrap(), NativeValue::Str("int".into()));
    assert_eq!(
        native.call_virtual("g", &[NativeValue::Double(1.0)]).unwrap(),
        NativeValue::Str("double".into())
    );

    let derived = interp
        .declare_class(ClassDecl::new("PyWideningFirst").extends(&base))
        .unwrap()
        .instantiate(&[])
        .unwrap();
    assert_eq!(derived.call_method("f", &[DynValue::Int(1)]).unwrap(), int());
    assert_eq!(derived.call_method("g", &[DynValue::Int(1)]).unwrap(), int());
}
