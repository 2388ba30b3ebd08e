//! Ownership of bridged instances
//!
//! The ownership flag on a pair decides whether native code may keep an
//! instance returned to it through a pointer. Copies and moves produce a
//! new pair: storage and dynamic attributes travel together, and the new
//! pair is owned by native code.
//!
//! Copy and move respect each native segment's [`CopyPolicy`] for plain
//! native instances. Dynamic subclasses always copy through the shadow's
//! own copy path, whatever the bases declare.
//!
//! [`CopyPolicy`]: crossbridge_sdk::CopyPolicy

use crate::instance::{Instance, NativeRef, Pair};
use crate::native::Layout;
use crossbridge_sdk::{BridgeError, BridgeResult, CopyPolicy, OwnershipFlag};
use std::sync::Arc;

/// Adopt/release/copy/move for bridged instances.
pub struct OwnershipManager;

impl OwnershipManager {
    /// Hand an instance to `owner` and return a native handle to it
    pub fn adopt(instance: &Instance, owner: OwnershipFlag) -> NativeRef {
        instance.set_ownership(owner);
        instance.native_ref()
    }

    /// Drop a native handle. Returns `true` if that released the pair.
    pub fn release(handle: NativeRef) -> bool {
        let pair = handle.pair().clone();
        drop(handle);
        pair.is_released()
    }

    /// Drop a dynamic handle. Returns `true` if that released the pair.
    pub fn release_dynamic(instance: Instance) -> bool {
        let pair = instance.pair().clone();
        drop(instance);
        pair.is_released()
    }

    /// Copy-construct a new instance from `instance`.
    ///
    /// Native storage and dynamic attributes are both duplicated; later
    /// changes to either side of the original do not reach the copy.
    pub fn copy(instance: &Instance) -> BridgeResult<Instance> {
        if instance.dyn_class().is_none() {
            Self::check_policy(instance.layout(), "copy", |p| p.can_copy(false))?;
        }
        let src = instance.pair();
        let (storage, attrs) = {
            let storage = src.storage().read();
            let attrs = src.attrs().read();
            (storage.clone(), attrs.clone())
        };
        let copy = Self::rebuild(src, storage, attrs);
        tracing::trace!(from = %instance.id(), to = %copy.id(), class = instance.class_name(), "instance copied");
        Ok(copy)
    }

    /// Move-construct a new instance out of `instance`.
    ///
    /// Both halves move together. The source keeps default storage and no
    /// attributes, and reports [`Instance::is_moved`].
    pub fn move_from(instance: &Instance) -> BridgeResult<Instance> {
        if instance.dyn_class().is_none() {
            Self::check_policy(instance.layout(), "move", |p| p.can_move(false))?;
        }
        let src = instance.pair();
        let (storage, attrs) = {
            let mut storage = src.storage().write();
            let mut attrs = src.attrs().write();
            (
                std::mem::replace(&mut *storage, src.layout().default_storage()),
                std::mem::take(&mut *attrs),
            )
        };
        src.mark_moved();
        let moved = Self::rebuild(src, storage, attrs);
        tracing::trace!(from = %instance.id(), to = %moved.id(), class = instance.class_name(), "instance moved");
        Ok(moved)
    }

    /// Produce fresh native storage for a by-value return: copy if the
    /// class can be copied, move otherwise.
    pub fn materialize(instance: &Instance) -> BridgeResult<Instance> {
        if instance.dyn_class().is_some() || Self::allows(instance.layout(), |p| p.can_copy(false)) {
            return Self::copy(instance);
        }
        if Self::allows(instance.layout(), |p| p.can_move(false)) {
            return Self::move_from(instance);
        }
        Self::check_policy(instance.layout(), "copy", |p| p.can_copy(false))?;
        Self::copy(instance)
    }

    fn allows(layout: &Layout, check: impl Fn(CopyPolicy) -> bool) -> bool {
        layout.segments().iter().all(|seg| check(seg.copy_policy()))
    }

    fn check_policy(layout: &Layout, operation: &'static str, check: impl Fn(CopyPolicy) -> bool) -> BridgeResult<()> {
        match layout.segments().iter().find(|seg| !check(seg.copy_policy())) {
            Some(seg) => Err(BridgeError::CopyUnavailable {
                class: seg.name().to_string(),
                operation,
            }),
            None => Ok(()),
        }
    }

    fn rebuild(
        src: &Arc<Pair>,
        storage: Vec<Vec<crate::value::NativeValue>>,
        attrs: rustc_hash::FxHashMap<String, crate::value::DynValue>,
    ) -> Instance {
        let pair = Pair::new(src.interp(), src.class().clone(), src.layout().clone(), OwnershipFlag::Native);
        *pair.storage().write() = storage;
        *pair.attrs().write() = attrs;

        let constructed = src.constructed();
        for (index, done) in constructed.iter().enumerate() {
            if !done {
                continue;
            }
            let Some(range) = pair.layout().base_range(index) else {
                continue;
            };
            for seg in range {
                for hook in pair.layout().segments()[seg].construct_hooks() {
                    hook();
                }
            }
        }
        pair.set_constructed(constructed);
        Instance::from_pair(pair)
    }
}
