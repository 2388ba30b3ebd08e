//! Value representations on both sides of the bridge
//!
//! [`NativeValue`] is what native bodies receive and return; [`DynValue`]
//! is what dynamic code sees. Object values on either side are counted
//! handles to the same bridged instance: a [`NativeRef`] on the native side,
//! an [`Instance`] on the dynamic side.

use crate::instance::{Instance, NativeRef};
use crossbridge_sdk::{BridgeError, BridgeResult, NativeType};
use std::fmt;

// ============================================================================
// NativeValue
// ============================================================================

/// Value as seen by native code.
#[derive(Clone, Debug, Default)]
pub enum NativeValue {
    /// Result of a void call
    #[default]
    Void,
    /// Null object pointer
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Double(f64),
    /// String
    Str(String),
    /// Object handle (reference, pointer or materialized by-value copy)
    Object(NativeRef),
}

impl NativeValue {
    /// Type name used in diagnostics
    pub fn type_name(&self) -> String {
        match self {
            NativeValue::Void => "void".to_string(),
            NativeValue::Null => "nullptr".to_string(),
            NativeValue::Bool(_) => "bool".to_string(),
            NativeValue::Int(_) => "int".to_string(),
            NativeValue::Double(_) => "double".to_string(),
            NativeValue::Str(_) => "string".to_string(),
            NativeValue::Object(obj) => obj.class_name().to_string(),
        }
    }

    /// Check if this is a null pointer
    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            NativeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as double (integers widen)
    pub fn as_double(&self) -> Option<f64> {
        match self {
            NativeValue::Double(d) => Some(*d),
            NativeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as object handle
    pub fn as_object(&self) -> Option<&NativeRef> {
        match self {
            NativeValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Convert to the declared native type, widening int to double.
    ///
    /// Object values must be instances of the named class; a null is only
    /// accepted for pointer types. Returns `None` if the value does not fit.
    pub fn coerce(&self, ty: &NativeType) -> Option<NativeValue> {
        match (ty, self) {
            (NativeType::Void, _) => Some(NativeValue::Void),
            (NativeType::Bool, NativeValue::Bool(_))
            | (NativeType::Int, NativeValue::Int(_))
            | (NativeType::Double, NativeValue::Double(_))
            | (NativeType::Str, NativeValue::Str(_)) => Some(self.clone()),
            (NativeType::Double, NativeValue::Int(i)) => Some(NativeValue::Double(*i as f64)),
            (NativeType::Ptr(_), NativeValue::Null) => Some(NativeValue::Null),
            (
                NativeType::Object(class) | NativeType::Ref(class) | NativeType::Ptr(class),
                NativeValue::Object(obj),
            ) if obj.is_a(class) => Some(self.clone()),
            _ => None,
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Void, NativeValue::Void) | (NativeValue::Null, NativeValue::Null) => true,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::Int(a), NativeValue::Int(b)) => a == b,
            (NativeValue::Double(a), NativeValue::Double(b)) => a == b,
            (NativeValue::Str(a), NativeValue::Str(b)) => a == b,
            (NativeValue::Object(a), NativeValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<i32> for NativeValue {
    fn from(i: i32) -> Self {
        NativeValue::Int(i as i64)
    }
}

impl From<i64> for NativeValue {
    fn from(i: i64) -> Self {
        NativeValue::Int(i)
    }
}

impl From<f64> for NativeValue {
    fn from(d: f64) -> Self {
        NativeValue::Double(d)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::Str(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::Str(s)
    }
}

impl From<NativeRef> for NativeValue {
    fn from(obj: NativeRef) -> Self {
        NativeValue::Object(obj)
    }
}

/// Convert from NativeValue to a Rust type.
///
/// Implement this trait to read a native argument or data member as a
/// plain Rust value.
pub trait FromNative: Sized {
    /// Convert, returning a type mismatch if the value doesn't fit
    fn from_native(value: &NativeValue) -> BridgeResult<Self>;
}

impl FromNative for i64 {
    fn from_native(value: &NativeValue) -> BridgeResult<Self> {
        value
            .as_int()
            .ok_or_else(|| BridgeError::type_mismatch("native conversion", "int", value.type_name()))
    }
}

impl FromNative for f64 {
    fn from_native(value: &NativeValue) -> BridgeResult<Self> {
        value
            .as_double()
            .ok_or_else(|| BridgeError::type_mismatch("native conversion", "double", value.type_name()))
    }
}

impl FromNative for bool {
    fn from_native(value: &NativeValue) -> BridgeResult<Self> {
        value
            .as_bool()
            .ok_or_else(|| BridgeError::type_mismatch("native conversion", "bool", value.type_name()))
    }
}

impl FromNative for String {
    fn from_native(value: &NativeValue) -> BridgeResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::type_mismatch("native conversion", "string", value.type_name()))
    }
}

impl FromNative for NativeRef {
    fn from_native(value: &NativeValue) -> BridgeResult<Self> {
        value
            .as_object()
            .cloned()
            .ok_or_else(|| BridgeError::type_mismatch("native conversion", "object", value.type_name()))
    }
}

// ============================================================================
// DynValue
// ============================================================================

/// Value as seen by dynamic code.
#[derive(Clone, Debug, Default)]
pub enum DynValue {
    /// Absence of a value
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(String),
    /// Immutable sequence (also used to spell constructor argument groups)
    Tuple(Vec<DynValue>),
    /// Bridged instance
    Object(Instance),
}

impl DynValue {
    /// Type name as the dynamic language reports it
    pub fn type_name(&self) -> String {
        match self {
            DynValue::None => "NoneType".to_string(),
            DynValue::Bool(_) => "bool".to_string(),
            DynValue::Int(_) => "int".to_string(),
            DynValue::Float(_) => "float".to_string(),
            DynValue::Str(_) => "str".to_string(),
            DynValue::Tuple(_) => "tuple".to_string(),
            DynValue::Object(obj) => obj.class_name().to_string(),
        }
    }

    /// Check if this is None
    pub fn is_none(&self) -> bool {
        matches!(self, DynValue::None)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer (bools count as integers)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DynValue::Int(i) => Some(*i),
            DynValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Get as float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DynValue::Float(f) => Some(*f),
            DynValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as tuple items
    pub fn as_tuple(&self) -> Option<&[DynValue]> {
        match self {
            DynValue::Tuple(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Get as instance
    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            DynValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Truthiness
    pub fn truthy(&self) -> bool {
        match self {
            DynValue::None => false,
            DynValue::Bool(b) => *b,
            DynValue::Int(i) => *i != 0,
            DynValue::Float(f) => *f != 0.0,
            DynValue::Str(s) => !s.is_empty(),
            DynValue::Tuple(items) => !items.is_empty(),
            DynValue::Object(_) => true,
        }
    }
}

impl PartialEq for DynValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynValue::None, DynValue::None) => true,
            (DynValue::Bool(a), DynValue::Bool(b)) => a == b,
            (DynValue::Int(a), DynValue::Int(b)) => a == b,
            (DynValue::Float(a), DynValue::Float(b)) => a == b,
            (DynValue::Int(a), DynValue::Float(b)) | (DynValue::Float(b), DynValue::Int(a)) => {
                (*a as f64) == *b
            }
            (DynValue::Str(a), DynValue::Str(b)) => a == b,
            (DynValue::Tuple(a), DynValue::Tuple(b)) => a == b,
            (DynValue::Object(a), DynValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynValue::None => write!(f, "None"),
            DynValue::Bool(true) => write!(f, "True"),
            DynValue::Bool(false) => write!(f, "False"),
            DynValue::Int(i) => write!(f, "{}", i),
            DynValue::Float(x) => write!(f, "{}", x),
            DynValue::Str(s) => write!(f, "'{}'", s),
            DynValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            DynValue::Object(obj) => write!(f, "{}", obj),
        }
    }
}

impl From<bool> for DynValue {
    fn from(b: bool) -> Self {
        DynValue::Bool(b)
    }
}

impl From<i32> for DynValue {
    fn from(i: i32) -> Self {
        DynValue::Int(i as i64)
    }
}

impl From<i64> for DynValue {
    fn from(i: i64) -> Self {
        DynValue::Int(i)
    }
}

impl From<f64> for DynValue {
    fn from(f: f64) -> Self {
        DynValue::Float(f)
    }
}

impl From<&str> for DynValue {
    fn from(s: &str) -> Self {
        DynValue::Str(s.to_string())
    }
}

impl From<String> for DynValue {
    fn from(s: String) -> Self {
        DynValue::Str(s)
    }
}

impl From<Instance> for DynValue {
    fn from(obj: Instance) -> Self {
        DynValue::Object(obj)
    }
}

impl<T: Into<DynValue>> From<Vec<T>> for DynValue {
    fn from(items: Vec<T>) -> Self {
        DynValue::Tuple(items.into_iter().map(Into::into).collect())
    }
}
