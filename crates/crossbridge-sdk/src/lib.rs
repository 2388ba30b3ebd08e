//! crossbridge SDK - declaration vocabulary for bridged native interfaces
//!
//! This crate provides the minimal types native code needs to describe the
//! interfaces a dynamic host language may subclass, and the error type
//! native bodies return, without depending on the bridge runtime.
//!
//! # Example
//!
//! ```ignore
//! use crossbridge_sdk::{NativeType, SlotKey};
//!
//! let key = SlotKey::new_const("get_value", vec![]);
//! assert_eq!(key.to_string(), "get_value() const");
//! let ret = NativeType::pointer("Base");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod types;

pub use error::{BridgeError, BridgeResult, LifetimeWarning, PendingException};
pub use types::{Access, CopyPolicy, NativeType, OwnershipFlag, SlotKey};
