//! Semispace copying collector
//!
//! Stop-the-world, breadth-first (Cheney) copy of everything reachable
//! from the caller's roots into to-space, after which the two spaces swap.

use crate::allocator::{Slot, Space};
use crate::heap::Heap;
use crate::value::{ObjRef, Value};
use std::time::{Duration, Instant};

/// Supplies the root set for a collection.
///
/// The visitor receives `&mut Value` so the collector can rewrite each root
/// in place with the object's new location.
pub trait RootProvider {
    /// Call `visitor` on every root
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value));
}

impl RootProvider for () {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(&mut Value)) {}
}

impl RootProvider for Value {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        visitor(self);
    }
}

impl RootProvider for [Value] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for root in self.iter_mut() {
            visitor(root);
        }
    }
}

impl<const N: usize> RootProvider for [Value; N] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        self.as_mut_slice().visit_roots(visitor);
    }
}

impl RootProvider for Vec<Value> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        self.as_mut_slice().visit_roots(visitor);
    }
}

impl<T: RootProvider + ?Sized> RootProvider for &mut T {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        (**self).visit_roots(visitor);
    }
}

impl<A: RootProvider + ?Sized, B: RootProvider + ?Sized> RootProvider for (&mut A, &mut B) {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        self.0.visit_roots(visitor);
        self.1.visit_roots(visitor);
    }
}

/// GC statistics
#[derive(Debug, Default, Clone)]
pub struct GcStats {
    /// Number of collections
    pub collections: u64,
    /// Total time spent in GC
    pub total_pause: Duration,
    /// Pause of the last collection
    pub last_pause: Duration,
    /// Objects copied in last collection
    pub last_copied_objects: usize,
    /// Bytes copied in last collection
    pub last_copied_bytes: usize,
    /// Bytes reclaimed in last collection
    pub last_reclaimed: usize,
}

/// Move `old` into to-space unless it already moved.
///
/// A forwarded slot yields its recorded target, so shared and cyclic
/// references all resolve to the single copy. Otherwise the object is moved
/// to the to-space frontier, stamped with `heap` and `epoch`, and its
/// from-space slot replaced by a forwarding marker in one write.
///
/// Returns `None` if `old` names no from-space slot.
pub(crate) fn forward(
    from: &mut Space,
    to: &mut Space,
    heap: u32,
    epoch: u32,
    old: ObjRef,
) -> Option<ObjRef> {
    let slot = from.slot_mut(old.index())?;
    if let Slot::Forwarded(target) = slot {
        return Some(*target);
    }

    let target = ObjRef::new(heap, to.len(), epoch);
    if let Slot::Live(object) = std::mem::replace(slot, Slot::Forwarded(target)) {
        to.push(object);
    }
    Some(target)
}

/// Relocate a value; nil stays nil
pub(crate) fn relocate(
    from: &mut Space,
    to: &mut Space,
    heap: u32,
    epoch: u32,
    value: Value,
) -> Value {
    match value {
        Value::Obj(old) => forward(from, to, heap, epoch, old).map_or(value, Value::Obj),
        Value::Nil => Value::Nil,
    }
}

impl Heap {
    /// Run a full collection.
    ///
    /// Every root is rewritten in place to its object's new location.
    /// References not reachable through `roots` are stale afterwards.
    /// Roots that were already stale, or that another heap issued, are
    /// left untouched.
    pub fn collect_garbage(&mut self, roots: &mut dyn RootProvider) {
        let start = Instant::now();
        let before_bytes = self.from.used();

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "vox::gc",
            collection = self.stats.collections + 1,
            heap_bytes = before_bytes,
            objects = self.from.len(),
            "GC cycle starting"
        );

        let heap = self.id;
        let current = self.epoch;
        let next = current.wrapping_add(1);
        self.to.reset();

        // Phase 1: Roots
        let (from, to) = (&mut self.from, &mut self.to);
        roots.visit_roots(&mut |root| {
            if let Value::Obj(r) = *root
                && r.heap() == heap
                && r.epoch() == current
                && let Some(target) = forward(from, to, heap, next, r)
            {
                *root = Value::Obj(target);
            }
        });

        // Phase 2: Scan to-space until the cursor meets the frontier
        let mut fields = Vec::new();
        let mut cursor = 0;
        while cursor < self.to.len() {
            fields.clear();
            if let Some(object) = self.to.object_mut(cursor) {
                object.trace_mut(&mut |field| fields.push(*field));
            }
            for field in fields.iter_mut() {
                *field = relocate(&mut self.from, &mut self.to, heap, next, *field);
            }
            if let Some(object) = self.to.object_mut(cursor) {
                let mut updated = fields.iter().copied();
                object.trace_mut(&mut |field| {
                    if let Some(value) = updated.next() {
                        *field = value;
                    }
                });
            }
            cursor += 1;
        }

        // Phase 3: Flip; the old from-space is empty and becomes the next to-space
        std::mem::swap(&mut self.from, &mut self.to);
        self.to.reset();
        self.epoch = next;

        let elapsed = start.elapsed();
        let copied_bytes = self.from.used();
        self.stats.collections += 1;
        self.stats.total_pause += elapsed;
        self.stats.last_pause = elapsed;
        self.stats.last_copied_objects = self.from.len();
        self.stats.last_copied_bytes = copied_bytes;
        self.stats.last_reclaimed = before_bytes - copied_bytes;

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "vox::gc",
            collection = self.stats.collections,
            copied_objects = self.stats.last_copied_objects,
            copied_bytes,
            reclaimed_bytes = self.stats.last_reclaimed,
            pause_us = elapsed.as_micros() as u64,
            "GC cycle complete"
        );
    }
}
