//! Native containers of bridged instances
//!
//! [`NativeVec`] stores instances by value, the way a native vector of a
//! base class does: insertion copies (or moves) the element into fresh
//! native storage owned by the container. [`SharedPtr`] is shared native
//! ownership of one instance; the pair stays alive while any clone exists.

use crate::bridge::{DynClass, DynResult, ExceptionBridge, OwnershipManager};
use crate::instance::{Instance, NativeRef};
use crate::interp::Interpreter;
use crate::native::NativeInterface;
use crate::value::{DynValue, NativeValue};
use crossbridge_sdk::{BridgeError, BridgeResult, OwnershipFlag};
use parking_lot::RwLock;
use std::sync::Arc;

/// By-value vector of instances of one native class.
#[derive(Debug)]
pub struct NativeVec {
    element: String,
    items: RwLock<Vec<NativeRef>>,
}

impl NativeVec {
    /// Empty vector of `element`
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            items: RwLock::new(Vec::new()),
        }
    }

    /// Element class name
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Append a copy of `value` (`push_back` / `emplace_back`)
    pub fn push(&self, value: &Instance) -> BridgeResult<()> {
        self.check(value)?;
        let copy = OwnershipManager::copy(value)?;
        self.items.write().push(copy.native_ref());
        Ok(())
    }

    /// Append by moving out of `value`
    pub fn push_moved(&self, value: &Instance) -> BridgeResult<()> {
        self.check(value)?;
        let moved = OwnershipManager::move_from(value)?;
        self.items.write().push(moved.native_ref());
        Ok(())
    }

    /// Dynamic handle to the element at `index`
    pub fn get(&self, index: usize) -> Option<Instance> {
        self.items.read().get(index).map(NativeRef::to_dynamic)
    }

    /// Native handle to the element at `index`
    pub fn native(&self, index: usize) -> Option<NativeRef> {
        self.items.read().get(index).cloned()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check if the vector is empty
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Remove and return the element at `index`
    pub fn remove(&self, index: usize) -> Option<Instance> {
        let mut items = self.items.write();
        if index >= items.len() {
            return None;
        }
        let removed = items.remove(index);
        drop(items);
        Some(removed.to_dynamic())
    }

    /// Destroy every element
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.items.write());
        drop(old);
    }

    fn check(&self, value: &Instance) -> BridgeResult<()> {
        if value.is_a(&self.element) {
            Ok(())
        } else {
            Err(BridgeError::type_mismatch(
                format!("element of vector<{}>", self.element),
                &self.element,
                value.class_name(),
            ))
        }
    }
}

/// Shared native ownership of one bridged instance.
#[derive(Clone)]
pub struct SharedPtr {
    inner: Arc<NativeRef>,
}

impl SharedPtr {
    /// Construct a dynamic subclass instance directly into shared ownership
    pub fn make_shared(class: &Arc<DynClass>, args: &[DynValue]) -> DynResult<Self> {
        let instance = class.instantiate(args)?;
        Ok(Self::adopt(&instance))
    }

    /// Construct a plain native instance directly into shared ownership
    pub fn make_shared_native(
        iface: &Arc<NativeInterface>,
        interp: &Interpreter,
        args: &[DynValue],
    ) -> DynResult<Self> {
        let instance = iface.instantiate(interp, args)?;
        Ok(Self::adopt(&instance))
    }

    /// Copy-construct an existing instance into shared ownership
    pub fn from_copy(instance: &Instance) -> DynResult<Self> {
        let copy = OwnershipManager::copy(instance).map_err(ExceptionBridge::raise)?;
        Ok(Self::adopt(&copy))
    }

    fn adopt(instance: &Instance) -> Self {
        Self {
            inner: Arc::new(OwnershipManager::adopt(instance, OwnershipFlag::Shared)),
        }
    }

    /// Dynamic handle to the shared instance
    pub fn get(&self) -> Instance {
        self.inner.to_dynamic()
    }

    /// Native handle to the shared instance
    pub fn native(&self) -> NativeRef {
        (*self.inner).clone()
    }

    /// Virtual call through the pointer (`ptr->method()`)
    pub fn call_virtual(&self, name: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        self.inner.call_virtual(name, args)
    }

    /// Number of `SharedPtr` clones sharing the instance
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for SharedPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPtr")
            .field("target", &*self.inner)
            .field("use_count", &self.use_count())
            .finish()
    }
}
