//! crossbridge core runtime
//!
//! Lets classes defined in an embedded dynamic object model subclass native
//! interfaces, override their virtual methods, and be called back from
//! native code as if the overrides were native virtual methods.
//!
//! # Architecture
//!
//! - [`NativeInterface`]: a declared native class (virtual slots,
//!   constructors, fields, destructor and copy traits)
//! - [`ClassBridge`]: builds a [`ShadowType`] for every dynamic subclass
//! - [`DispatchStub`]: routes a native virtual call to the dynamic override
//!   or the native default
//! - [`OwnershipManager`]: copy, move and hand-over of bridged instances
//! - [`ExceptionBridge`]: maps dynamic exceptions to native errors and back
//! - [`Composition`]: several unrelated native bases merged into one shadow
//! - [`ConcurrencyGate`]: native calls that run with the execution lock
//!   released
//!
//! # Example
//!
//! ```ignore
//! use crossbridge_core::{ClassDecl, DynValue, Interpreter, NativeInterface, NativeType};
//!
//! let interp = Interpreter::new();
//! let base = NativeInterface::builder("Base1")
//!     .virtual_method("get_value", vec![], NativeType::Int, |_this, _args| Ok(42.into()))
//!     .virtual_destructor()
//!     .build()?;
//!
//! let derived = interp.declare_class(
//!     ClassDecl::new("Derived")
//!         .extends(&base)
//!         .method("get_value", |_this, _args| Ok(DynValue::Int(13))),
//! )?;
//!
//! let obj = derived.instantiate(&[])?;
//! let value = obj.native_ref().call_virtual("get_value", &[])?;
//! assert_eq!(value.as_int(), Some(13));
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod containers;
pub mod instance;
pub mod interp;
pub mod lock;
pub mod marshal;
pub mod native;
pub mod registry;
pub mod value;

pub use bridge::{
    ClassBridge, ClassDecl, Composition, ConcurrencyGate, DispatchStub, DynClass, DynException,
    DynMethod, DynResult, DynThread, ExceptionBridge, GateFlag, OwnershipManager, ShadowType,
    SlotOverrideTable, StopSignal,
};
pub use containers::{NativeVec, SharedPtr};
pub use instance::{ConstRef, Instance, InstanceId, NativeRef};
pub use interp::{Interpreter, InterpreterCounters, InterpreterId, InterpreterOptions};
pub use lock::{ExecutionGuard, ExecutionLock, Suspension};
pub use native::{
    ArgGroup, Constructor, FieldDecl, FieldInit, InterfaceId, Layout, MethodDecl,
    NativeFunction, NativeInterface, NativeInterfaceBuilder, Param, Slot, VTable,
};
pub use registry::ShadowRegistry;
pub use value::{DynValue, FromNative, NativeValue};

pub use crossbridge_sdk::{
    Access, BridgeError, BridgeResult, CopyPolicy, LifetimeWarning, NativeType, OwnershipFlag,
    PendingException, SlotKey,
};
