//! Exception bridging
//!
//! Dynamic code fails with a [`DynException`]; native code fails with a
//! [`BridgeError`]. A dynamic exception raised inside an override travels
//! through native frames as `BridgeError::Propagated` and is re-raised at
//! the dynamic caller with its type and message unchanged. Errors that
//! originate in the bridge itself surface as `TypeError` (or
//! `AttributeError` for missing attributes).

use crossbridge_sdk::{BridgeError, PendingException};

/// Result type for dynamic-side calls
pub type DynResult<T> = Result<T, DynException>;

/// A dynamic-language exception
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DynException {
    /// Exception type name
    pub kind: String,
    /// Exception message
    pub message: String,
}

impl DynException {
    /// Exception of an arbitrary type
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// `ValueError`
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    /// `RuntimeError`
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }

    /// `AttributeError`
    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new("AttributeError", message)
    }

    /// Check the exception type
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Translation between dynamic exceptions and native errors.
pub struct ExceptionBridge;

impl ExceptionBridge {
    /// Encode a dynamic exception raised inside an override for its native caller
    pub fn capture(exc: DynException) -> BridgeError {
        tracing::debug!(kind = %exc.kind, "dynamic exception captured at native boundary");
        BridgeError::Propagated(PendingException::new(exc.kind, exc.message))
    }

    /// Decode a native error at the dynamic call site
    pub fn raise(err: BridgeError) -> DynException {
        match err {
            BridgeError::Propagated(pending) => DynException::new(pending.type_name, pending.message),
            BridgeError::Native { kind, message } => DynException::new(kind, message),
            other => DynException::new(other.kind_name().to_string(), other.to_string()),
        }
    }

    /// Render an error the way a native `what()` reports it
    pub fn describe(err: &BridgeError) -> String {
        err.what()
    }
}

impl From<BridgeError> for DynException {
    fn from(err: BridgeError) -> Self {
        ExceptionBridge::raise(err)
    }
}

impl From<DynException> for BridgeError {
    fn from(exc: DynException) -> Self {
        ExceptionBridge::capture(exc)
    }
}
