//! The bridge proper
//!
//! - `class_bridge`: dynamic subclass declaration and shadow types
//! - `dispatch`: per-slot dispatch stubs and the lazy override table
//! - `ownership`: adopt/release/copy/move of bridged instances
//! - `exception`: dynamic exceptions and their native encoding
//! - `compose`: several native bases merged into one shadow
//! - `gate`: lock-released native calls and host threads

mod class_bridge;
mod compose;
mod dispatch;
mod exception;
mod gate;
mod ownership;

pub use class_bridge::{BaseSpec, ClassBridge, ClassDecl, DynClass, DynFn, DynInit, DynMethod, ShadowType};
pub use compose::Composition;
pub use dispatch::{DispatchStub, SlotOverrideTable};
pub use exception::{DynException, DynResult, ExceptionBridge};
pub use gate::{ConcurrencyGate, DynThread, GateFlag, StopSignal};
pub use ownership::OwnershipManager;
