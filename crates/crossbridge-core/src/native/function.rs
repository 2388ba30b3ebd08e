//! Free native functions callable from dynamic code

use crate::bridge::GateFlag;
use crate::marshal;
use crate::value::NativeValue;
use crossbridge_sdk::{BridgeError, BridgeResult, NativeType};
use std::fmt;
use std::sync::Arc;

/// Native function body
pub type NativeBody = Arc<dyn Fn(&[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync>;

/// A free native function with a declared signature and lock-release flag.
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    params: Vec<NativeType>,
    ret: NativeType,
    body: NativeBody,
    gate: Arc<GateFlag>,
}

impl NativeFunction {
    /// Declare a native function. Calls keep the execution lock by default.
    pub fn new<F>(name: impl Into<String>, params: Vec<NativeType>, ret: NativeType, body: F) -> Self
    where
        F: Fn(&[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            ret,
            body: Arc::new(body),
            gate: Arc::new(GateFlag::new(false)),
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter types
    pub fn params(&self) -> &[NativeType] {
        &self.params
    }

    /// Declared return type
    pub fn ret(&self) -> &NativeType {
        &self.ret
    }

    /// Release the execution lock while this function runs
    pub fn set_release_lock(&self, release: bool) {
        self.gate.set(release);
    }

    /// Check if calls release the execution lock
    pub fn releases_lock(&self) -> bool {
        self.gate.releases()
    }

    /// Lock-release flag
    pub fn gate(&self) -> &GateFlag {
        &self.gate
    }

    /// Call from native code: coerces arguments, then runs the body.
    pub fn invoke(&self, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let coerced = marshal::coerce_args(args, &self.params, marshal::Fit::Widening).ok_or_else(|| {
            let got: Vec<String> = args.iter().map(|a| a.type_name()).collect();
            let expected: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            BridgeError::type_mismatch(
                format!("call to '{}'", self.name),
                format!("({})", expected.join(", ")),
                format!("({})", got.join(", ")),
            )
        })?;
        (self.body)(&coerced)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("releases_lock", &self.releases_lock())
            .finish()
    }
}
