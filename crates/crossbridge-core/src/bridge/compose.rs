//! Multiple-inheritance composition
//!
//! A [`Composition`] is the ordered list of native bases a shadow type
//! derives from, with the merged virtual table and the segment layout that
//! keeps each base's members apart. A single base is the one-element case.

use crate::native::{Layout, NativeInterface, VTable};
use crossbridge_sdk::{BridgeError, BridgeResult};
use std::sync::Arc;

/// Ordered native bases of a shadow type.
#[derive(Debug)]
pub struct Composition {
    bases: Vec<Arc<NativeInterface>>,
    vtable: VTable,
    layout: Arc<Layout>,
}

impl Composition {
    /// Composition with one base
    pub fn single(base: &Arc<NativeInterface>) -> Self {
        Self {
            bases: vec![base.clone()],
            vtable: base.vtable().clone(),
            layout: Arc::new(Layout::of(std::slice::from_ref(base))),
        }
    }

    /// Merge several unrelated bases.
    ///
    /// Bases that share an ancestor (diamonds, or the same base twice) are
    /// rejected.
    pub fn compose(bases: &[Arc<NativeInterface>]) -> BridgeResult<Self> {
        match bases {
            [] => {
                return Err(BridgeError::UnsupportedComposition(
                    "at least one native base is required".to_string(),
                ))
            }
            [only] => return Ok(Self::single(only)),
            _ => {}
        }

        for (i, a) in bases.iter().enumerate() {
            let a_ids = a.lineage();
            for b in &bases[i + 1..] {
                if b.lineage().iter().any(|id| a_ids.contains(id)) {
                    return Err(BridgeError::UnsupportedComposition(format!(
                        "bases '{}' and '{}' overlap",
                        a.name(),
                        b.name()
                    )));
                }
            }
        }

        let mut vtable = VTable::new();
        for base in bases {
            vtable.merge(base.vtable())?;
        }
        tracing::debug!(
            bases = bases.len(),
            slots = vtable.len(),
            "composed native bases"
        );
        Ok(Self {
            bases: bases.to_vec(),
            vtable,
            layout: Arc::new(Layout::of(bases)),
        })
    }

    /// Bases in declaration order
    pub fn bases(&self) -> &[Arc<NativeInterface>] {
        &self.bases
    }

    /// Union of all bases' virtual slots
    pub fn vtable(&self) -> &VTable {
        &self.vtable
    }

    /// Storage layout
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Check if a base with this name is part of the composition
    pub fn contains(&self, name: &str) -> bool {
        self.bases.iter().any(|b| b.is_a(name))
    }
}
