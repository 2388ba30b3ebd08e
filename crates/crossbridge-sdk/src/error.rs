//! Error types for the crossbridge ABI

use std::fmt;

/// Result type for native-side bridge calls
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A dynamic-language exception in flight through native frames.
///
/// Carries the original exception type name and message unchanged so the
/// dynamic caller can re-raise it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingException {
    /// Exception type name (e.g. "ValueError")
    pub type_name: String,
    /// Exception message
    pub message: String,
}

impl PendingException {
    /// Create a pending exception
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Render as `"<Type>: <message>"`
    pub fn what(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PendingException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

/// Native-side bridge errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Pure virtual left without override at instantiation
    #[error("cannot instantiate abstract class '{class}': pure virtual method '{method}' has no override")]
    AbstractInstantiation {
        /// Class being instantiated
        class: String,
        /// First missing pure virtual
        method: String,
    },

    /// Pure virtual invoked without override (static dispatch or plain instance)
    #[error("abstract method '{class}::{method}' called without an override")]
    AbstractMethod {
        /// Declaring class
        class: String,
        /// Method signature
        method: String,
    },

    /// Marshaled value does not satisfy the declared native type
    #[error("type mismatch in {context}: expected {expected}, got {got}")]
    TypeMismatch {
        /// Where the conversion happened
        context: String,
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Dynamic exception raised inside an override
    #[error("{0}")]
    Propagated(PendingException),

    /// Construction path not accessible (direct init, private ctor)
    #[error("{0}")]
    ConstructionAccess(String),

    /// Override or redeclaration that does not fit the declared signature
    #[error("incompatible signature for '{method}': {reason}")]
    IncompatibleSignature {
        /// Method name
        method: String,
        /// Why it was rejected
        reason: String,
    },

    /// No method with a matching overload
    #[error("'{class}' has no method '{method}' matching the given arguments")]
    NoSuchMethod {
        /// Class searched
        class: String,
        /// Method name
        method: String,
    },

    /// No data member or attribute with that name
    #[error("'{class}' object has no attribute '{name}'")]
    NoSuchAttribute {
        /// Class searched
        class: String,
        /// Attribute name
        name: String,
    },

    /// Copy or move constructor is not available
    #[error("{operation} of '{class}' is not accessible")]
    CopyUnavailable {
        /// Class whose policy forbids it
        class: String,
        /// "copy" or "move"
        operation: &'static str,
    },

    /// Non-const method called through a const reference
    #[error("cannot call non-const method '{method}' through a const reference to '{class}'")]
    ConstViolation {
        /// Class
        class: String,
        /// Method name
        method: String,
    },

    /// Composition request that cannot be honoured (overlapping bases, bad grouping)
    #[error("unsupported composition: {0}")]
    UnsupportedComposition(String),

    /// Exception thrown by native code
    #[error("{kind}: {message}")]
    Native {
        /// Native exception type name
        kind: String,
        /// Message
        message: String,
    },
}

impl BridgeError {
    /// Shorthand for a `TypeMismatch`
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl fmt::Display,
        got: impl fmt::Display,
    ) -> Self {
        BridgeError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Shorthand for a natively thrown exception
    pub fn native(kind: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Native {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Render the error the way a native `what()` would: `"<Type>: <message>"`.
    pub fn what(&self) -> String {
        match self {
            BridgeError::Propagated(pending) => pending.what(),
            BridgeError::Native { .. } => self.to_string(),
            other => format!("{}: {}", other.kind_name(), other),
        }
    }

    /// Short category name used when rendering
    pub fn kind_name(&self) -> &str {
        match self {
            BridgeError::Propagated(pending) => &pending.type_name,
            BridgeError::Native { kind, .. } => kind,
            BridgeError::NoSuchAttribute { .. } => "AttributeError",
            _ => "TypeError",
        }
    }

    /// Check if this error carries a user exception from an override
    pub fn is_propagated(&self) -> bool {
        matches!(self, BridgeError::Propagated(_))
    }
}

impl From<PendingException> for BridgeError {
    fn from(pending: PendingException) -> Self {
        BridgeError::Propagated(pending)
    }
}

/// Non-fatal diagnostic attached to a subclass declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifetimeWarning {
    /// Dynamic subclass that triggered the warning
    pub class: String,
    /// Offending native base
    pub base: String,
    /// Human-readable message
    pub message: String,
}

impl LifetimeWarning {
    /// Warning for a base that lacks a virtual destructor
    pub fn missing_virtual_dtor(class: impl Into<String>, base: impl Into<String>) -> Self {
        let class = class.into();
        let base = base.into();
        let message = format!(
            "class '{}' derives from '{}' which has no virtual destructor",
            class, base
        );
        Self { class, base, message }
    }
}

impl fmt::Display for LifetimeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeWarning: {}", self.message)
    }
}
