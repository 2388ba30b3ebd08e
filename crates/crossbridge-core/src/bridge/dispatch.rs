//! Dispatch stubs
//!
//! Every virtual slot of a shadow type gets a [`DispatchStub`]. A native
//! virtual call on a dynamic instance lands in the stub, which either runs
//! the dynamic override (under the execution lock, with arguments and
//! result marshaled) or falls back to the native default.

use crate::bridge::{DynClass, DynMethod, ExceptionBridge};
use crate::instance::NativeRef;
use crate::marshal;
use crate::native::Slot;
use crate::value::{DynValue, NativeValue};
use crossbridge_sdk::{BridgeResult, SlotKey};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Per-shadow cache of override lookups, one entry per slot.
///
/// An entry is resolved on the first call through its slot and never
/// changes afterwards.
#[derive(Debug)]
pub struct SlotOverrideTable {
    entries: Vec<OnceCell<Option<DynMethod>>>,
}

impl SlotOverrideTable {
    /// Table with `slots` unresolved entries
    pub fn new(slots: usize) -> Self {
        Self {
            entries: (0..slots).map(|_| OnceCell::new()).collect(),
        }
    }

    /// Override for a slot, resolving it against the class on first use
    pub fn lookup(&self, index: usize, slot: &Slot, class: &DynClass) -> Option<&DynMethod> {
        self.entries
            .get(index)?
            .get_or_init(|| {
                let found = class
                    .find_method(&slot.key.name)
                    .filter(|m| m.accepts(slot.key.arity()))
                    .cloned();
                tracing::trace!(
                    class = class.name(),
                    slot = %slot.key,
                    overridden = found.is_some(),
                    "override table entry resolved"
                );
                found
            })
            .as_ref()
    }

    /// Number of entries resolved so far
    pub fn resolved(&self) -> usize {
        self.entries.iter().filter(|e| e.get().is_some()).count()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Native-callable entry point for one virtual slot.
#[derive(Clone, Debug)]
pub struct DispatchStub {
    index: usize,
    slot: Slot,
}

impl DispatchStub {
    pub(crate) fn new(index: usize, slot: Slot) -> Self {
        Self { index, slot }
    }

    /// Slot index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Slot signature
    pub fn key(&self) -> &SlotKey {
        &self.slot.key
    }

    /// Run the call: override if present, else the native default, else an
    /// abstract-method error.
    pub fn invoke(&self, class: &Arc<DynClass>, this: &NativeRef, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let Some(method) = class.shadow().overrides().lookup(self.index, &self.slot, class) else {
            return self.slot.call_default(this, args);
        };

        let interp = class.interp();
        let _guard = interp.enter();
        interp.counters().record_dispatch();
        tracing::trace!(class = class.name(), slot = %self.slot.key, "dispatching to override");

        let instance = this.to_dynamic();
        let dyn_args: Vec<DynValue> = args.iter().cloned().map(marshal::to_dynamic).collect();
        match (method.body)(&instance, &dyn_args) {
            Ok(value) => marshal::return_to_native(
                value,
                &self.slot.ret,
                &format!("return value of '{}::{}'", class.name(), self.slot.key.name),
                interp.options().strict_void_returns,
            ),
            Err(exc) => {
                interp.counters().record_propagated();
                Err(ExceptionBridge::capture(exc))
            }
        }
    }
}
