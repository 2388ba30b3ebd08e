//! Global registry of shadow types
//!
//! Records, per native interface, the shadow types declared from it or
//! from any of its descendants. Lookups only feed
//! [`NativeInterface::shadows`](crate::NativeInterface::shadows); dispatch
//! goes through each instance's own vtable.

use crate::bridge::ShadowType;
use crate::native::InterfaceId;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

static SHADOWS: Lazy<DashMap<InterfaceId, Vec<Arc<ShadowType>>>> = Lazy::new(DashMap::new);

/// Process-wide shadow type registry
pub struct ShadowRegistry;

impl ShadowRegistry {
    /// Register a shadow under each native class it derives from, directly
    /// or through an ancestor
    pub fn register(shadow: &Arc<ShadowType>) {
        for iface in shadow.composition().layout().segments() {
            SHADOWS.entry(iface.id()).or_default().push(shadow.clone());
        }
        tracing::trace!(shadow = shadow.name(), "shadow type registered");
    }

    /// Shadows deriving from an interface, in declaration order
    pub fn shadows_of(id: InterfaceId) -> Vec<Arc<ShadowType>> {
        SHADOWS.get(&id).map(|entry| entry.clone()).unwrap_or_default()
    }

    /// Number of interfaces with at least one shadow
    pub fn count() -> usize {
        SHADOWS.len()
    }
}
