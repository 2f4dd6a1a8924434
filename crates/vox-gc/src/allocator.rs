//! Semispace bump allocator
//!
//! A [`Space`] is an arena of slots with a byte budget. Allocation appends
//! a slot and bumps the byte frontier; nothing is ever freed individually.
//! The whole space is emptied at once when it stops being from-space.

use crate::object::{FORWARD_SIZE, ObjTag, Object};
use crate::value::ObjRef;

/// One arena slot
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    /// Object data
    Live(Object),
    /// Object has been copied to to-space at this reference
    Forwarded(ObjRef),
}

impl Slot {
    pub(crate) fn tag(&self) -> ObjTag {
        match self {
            Slot::Live(object) => object.tag(),
            Slot::Forwarded(_) => ObjTag::Forward,
        }
    }

    pub(crate) fn byte_size(&self) -> usize {
        match self {
            Slot::Live(object) => object.byte_size(),
            Slot::Forwarded(_) => FORWARD_SIZE,
        }
    }
}

/// Bump-allocated semispace
#[derive(Debug)]
pub(crate) struct Space {
    /// Slots in allocation order
    slots: Vec<Slot>,
    /// Allocation frontier in bytes
    used: usize,
    /// Byte budget
    capacity: usize,
}

impl Space {
    /// Create an empty space with a byte budget
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            used: 0,
            capacity,
        }
    }

    /// Bytes allocated so far
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available
    pub(crate) fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Number of slots (also the scan frontier during a collection)
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Append an object and return its slot index.
    ///
    /// The caller checks [`Space::remaining`] first; the budget is only
    /// asserted here.
    pub(crate) fn push(&mut self, object: Object) -> usize {
        let size = object.byte_size();
        debug_assert!(size <= self.remaining(), "semispace overflow");
        self.used += size;
        self.slots.push(Slot::Live(object));
        self.slots.len() - 1
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    /// Live object at `index`, if the slot exists and has not moved
    pub(crate) fn object(&self, index: usize) -> Option<&Object> {
        match self.slots.get(index)? {
            Slot::Live(object) => Some(object),
            Slot::Forwarded(_) => None,
        }
    }

    pub(crate) fn object_mut(&mut self, index: usize) -> Option<&mut Object> {
        match self.slots.get_mut(index)? {
            Slot::Live(object) => Some(object),
            Slot::Forwarded(_) => None,
        }
    }

    /// Iterate slots in allocation order
    pub(crate) fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Drop every slot; keeps the arena's storage for reuse
    pub(crate) fn reset(&mut self) {
        self.slots.clear();
        self.used = 0;
    }
}
