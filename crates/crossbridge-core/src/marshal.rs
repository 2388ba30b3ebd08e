//! Value marshaling across the bridge
//!
//! Every value crossing between dynamic and native code passes through one
//! of these functions. Primitive values are converted, object values are
//! either shared (references, pointers) or copied into fresh native storage
//! (by-value parameters and returns).

use crate::bridge::OwnershipManager;
use crate::value::{DynValue, NativeValue};
use crossbridge_sdk::{BridgeError, BridgeResult, NativeType};

/// Convert a native value into its dynamic counterpart.
///
/// Void and null both become `None`; objects become a dynamic handle to the
/// same bridged instance.
pub fn to_dynamic(value: NativeValue) -> DynValue {
    match value {
        NativeValue::Void | NativeValue::Null => DynValue::None,
        NativeValue::Bool(b) => DynValue::Bool(b),
        NativeValue::Int(i) => DynValue::Int(i),
        NativeValue::Double(d) => DynValue::Float(d),
        NativeValue::Str(s) => DynValue::Str(s),
        NativeValue::Object(obj) => DynValue::Object(obj.to_dynamic()),
    }
}

/// Convert a dynamic argument to the declared native parameter type.
///
/// By-value object parameters receive a copy made through the copy
/// constructor; references and pointers share the instance.
pub fn to_native(value: &DynValue, ty: &NativeType, context: &str) -> BridgeResult<NativeValue> {
    let converted = match (ty, value) {
        (NativeType::Void, _) => Some(NativeValue::Void),
        (NativeType::Bool, DynValue::Bool(b)) => Some(NativeValue::Bool(*b)),
        (NativeType::Int, DynValue::Int(i)) => Some(NativeValue::Int(*i)),
        (NativeType::Int, DynValue::Bool(b)) => Some(NativeValue::Int(*b as i64)),
        (NativeType::Double, DynValue::Float(f)) => Some(NativeValue::Double(*f)),
        (NativeType::Double, DynValue::Int(i)) => Some(NativeValue::Double(*i as f64)),
        (NativeType::Str, DynValue::Str(s)) => Some(NativeValue::Str(s.clone())),
        (NativeType::Ptr(_), DynValue::None) => Some(NativeValue::Null),
        (NativeType::Object(class), DynValue::Object(obj)) if obj.is_a(class) => {
            let copy = OwnershipManager::copy(obj)?;
            Some(NativeValue::Object(copy.native_ref()))
        }
        (NativeType::Ref(class) | NativeType::Ptr(class), DynValue::Object(obj))
            if obj.is_a(class) =>
        {
            Some(NativeValue::Object(obj.native_ref()))
        }
        _ => None,
    };
    converted.ok_or_else(|| BridgeError::type_mismatch(context, ty, value.type_name()))
}

/// Convert an override's return value to the slot's declared return type.
///
/// - `void` slots discard the value unless `strict_void` is set
/// - pointer returns hand the instance over only when its ownership flag
///   allows native code to hold it; otherwise the caller sees null
/// - by-value object returns are materialized into new native storage
pub fn return_to_native(
    value: DynValue,
    ty: &NativeType,
    context: &str,
    strict_void: bool,
) -> BridgeResult<NativeValue> {
    match (ty, &value) {
        (NativeType::Void, DynValue::None) => Ok(NativeValue::Void),
        (NativeType::Void, _) if !strict_void => Ok(NativeValue::Void),
        (NativeType::Void, _) => Err(BridgeError::type_mismatch(context, ty, value.type_name())),
        (NativeType::Ptr(class), DynValue::Object(obj)) if obj.is_a(class) => {
            let flag = obj.ownership();
            if flag.native_may_hold() {
                tracing::trace!(instance = %obj, %flag, "object handed to native caller");
                Ok(NativeValue::Object(obj.native_ref()))
            } else {
                tracing::debug!(
                    instance = %obj,
                    "{} returned a dynamic-owned object; native caller receives null",
                    context
                );
                Ok(NativeValue::Null)
            }
        }
        (NativeType::Object(class), DynValue::Object(obj)) if obj.is_a(class) => {
            let fresh = OwnershipManager::materialize(obj)?;
            Ok(NativeValue::Object(fresh.native_ref()))
        }
        _ => to_native(&value, ty, context),
    }
}

/// How strictly an argument list must fit an overload.
///
/// Overload resolution tries [`Fit::Exact`] over every candidate before
/// [`Fit::Widening`], so `f(int)` wins over an earlier `f(double)` for an
/// integer argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Every argument already has the parameter's type
    Exact,
    /// Implicit conversions (int to double, bool to int) allowed
    Widening,
}

impl Fit {
    /// Resolution order
    pub const ORDER: [Fit; 2] = [Fit::Exact, Fit::Widening];
}

/// Check if passing `value` as `ty` needs an implicit conversion
pub fn widens(value: &DynValue, ty: &NativeType) -> bool {
    matches!(
        (ty, value),
        (NativeType::Double, DynValue::Int(_)) | (NativeType::Int, DynValue::Bool(_))
    )
}

fn widens_native(value: &NativeValue, ty: &NativeType) -> bool {
    matches!((ty, value), (NativeType::Double, NativeValue::Int(_)))
}

/// Marshal a whole argument list against a parameter list.
///
/// Returns `None` if the arity or any argument does not fit, so overload
/// resolution can move on to the next candidate. Under [`Fit::Exact`] the
/// check runs before any by-value object is copied.
pub fn args_to_native(
    args: &[DynValue],
    params: &[NativeType],
    context: &str,
    fit: Fit,
) -> Option<Vec<NativeValue>> {
    if args.len() != params.len() {
        return None;
    }
    if fit == Fit::Exact && args.iter().zip(params).any(|(arg, ty)| widens(arg, ty)) {
        return None;
    }
    args.iter()
        .zip(params)
        .map(|(arg, ty)| to_native(arg, ty, context).ok())
        .collect()
}

/// Coerce an already-native argument list against a parameter list.
pub fn coerce_args(args: &[NativeValue], params: &[NativeType], fit: Fit) -> Option<Vec<NativeValue>> {
    if args.len() != params.len() {
        return None;
    }
    if fit == Fit::Exact && args.iter().zip(params).any(|(arg, ty)| widens_native(arg, ty)) {
        return None;
    }
    args.iter().zip(params).map(|(arg, ty)| arg.coerce(ty)).collect()
}
