//! Native interface model
//!
//! Describes the native side of the bridge: declared classes with their
//! virtual tables, constructors and data members, the storage layout of a
//! (possibly composed) instance, and free native functions.

mod function;
mod interface;
mod layout;

pub use function::{NativeBody, NativeFunction};
pub use interface::{
    ArgGroup, Constructor, CtorBody, FieldDecl, FieldInit, InterfaceId, LifecycleHook,
    MethodDecl, NativeImpl, NativeInterface, NativeInterfaceBuilder, Param, Slot, VTable,
};
pub use layout::Layout;
