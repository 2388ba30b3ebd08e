//! Instance storage layout
//!
//! Storage of a bridged instance is a list of segments, one per native
//! class in its hierarchy. Every top-level base owns a contiguous range of
//! segments (its parents first, itself last), so identically-named members
//! of different bases never collide.

use crate::native::{ArgGroup, FieldDecl, MethodDecl, NativeInterface};
use crate::value::NativeValue;
use crossbridge_sdk::BridgeResult;
use std::ops::Range;
use std::sync::Arc;

/// Segment layout of an instance with one or more native bases.
#[derive(Debug)]
pub struct Layout {
    segments: Vec<Arc<NativeInterface>>,
    bases: Vec<(Arc<NativeInterface>, Range<usize>)>,
}

impl Layout {
    /// Lay out the given bases one after another
    pub fn of(bases: &[Arc<NativeInterface>]) -> Self {
        let mut segments = Vec::new();
        let mut ranges = Vec::with_capacity(bases.len());
        for base in bases {
            let start = segments.len();
            base.flatten_into(&mut segments);
            ranges.push((base.clone(), start..segments.len()));
        }
        Self {
            segments,
            bases: ranges,
        }
    }

    /// All segments in storage order
    pub fn segments(&self) -> &[Arc<NativeInterface>] {
        &self.segments
    }

    /// Top-level bases in declaration order
    pub fn bases(&self) -> impl Iterator<Item = &Arc<NativeInterface>> {
        self.bases.iter().map(|(b, _)| b)
    }

    /// Number of top-level bases
    pub fn base_count(&self) -> usize {
        self.bases.len()
    }

    /// Position of a top-level base
    pub fn base_index(&self, iface: &NativeInterface) -> Option<usize> {
        self.bases.iter().position(|(b, _)| b.id() == iface.id())
    }

    /// Segment range of a top-level base
    pub fn base_range(&self, index: usize) -> Option<Range<usize>> {
        self.bases.get(index).map(|(_, r)| r.clone())
    }

    /// Fresh storage holding every member's default value
    pub fn default_storage(&self) -> Vec<Vec<NativeValue>> {
        self.segments.iter().map(|s| s.default_segment()).collect()
    }

    /// Locate a data member by name, ignoring access.
    ///
    /// Bases are searched in order; within a base the most-derived class
    /// wins. Returns `(segment, index)`.
    pub fn find_field(&self, name: &str) -> Option<(usize, usize)> {
        self.find_field_where(name, |_| true)
    }

    /// Locate a data member visible from dynamic code
    pub fn find_visible_field(&self, name: &str, from_derived: bool) -> Option<(usize, usize)> {
        self.find_field_where(name, |decl| decl.access.visible(from_derived))
    }

    fn find_field_where(&self, name: &str, visible: impl Fn(&FieldDecl) -> bool) -> Option<(usize, usize)> {
        for (_, range) in &self.bases {
            for seg in range.clone().rev() {
                let found = self.segments[seg]
                    .fields()
                    .iter()
                    .position(|f| f.name == name && visible(f));
                if let Some(index) = found {
                    return Some((seg, index));
                }
            }
        }
        None
    }

    /// Locate a data member declared by a specific class
    pub fn find_field_in(&self, class: &str, name: &str) -> Option<(usize, usize)> {
        self.segments.iter().enumerate().find_map(|(seg, iface)| {
            if iface.name() != class {
                return None;
            }
            iface
                .fields()
                .iter()
                .position(|f| f.name == name)
                .map(|index| (seg, index))
        })
    }

    /// Declaration of the member at `(segment, index)`
    pub fn field_decl(&self, seg: usize, index: usize) -> Option<&FieldDecl> {
        self.segments.get(seg)?.fields().get(index)
    }

    /// Non-virtual method overloads by name, searching bases in order
    pub fn find_method(&self, name: &str) -> Option<&[MethodDecl]> {
        self.bases.iter().find_map(|(b, _)| b.find_method(name))
    }

    /// Check if any segment is the named class
    pub fn is_a(&self, name: &str) -> bool {
        self.segments.iter().any(|s| s.name() == name)
    }

    /// Run construction for one top-level base
    pub(crate) fn construct_base(
        &self,
        index: usize,
        storage: &mut [Vec<NativeValue>],
        group: &ArgGroup,
        from_derived: bool,
    ) -> BridgeResult<()> {
        let Some((base, range)) = self.bases.get(index) else {
            return Err(crossbridge_sdk::BridgeError::UnsupportedComposition(format!(
                "no base at position {}",
                index
            )));
        };
        base.construct_into(&mut storage[range.clone()], group, from_derived)
    }
}
