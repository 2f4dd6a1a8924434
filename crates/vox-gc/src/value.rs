//! References into the heap

/// Handle to a heap object.
///
/// A reference is an index into the current from-space, stamped with the
/// heap that issued it and the collection epoch it was issued in. Every
/// collection moves objects and bumps the epoch, so a reference held across
/// a safepoint is detected as stale instead of resolving to whatever now
/// lives at its old index. References from another heap are rejected the
/// same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    heap: u32,
    index: usize,
    epoch: u32,
}

impl ObjRef {
    pub(crate) const fn new(heap: u32, index: usize, epoch: u32) -> Self {
        Self { heap, index, epoch }
    }

    /// Id of the heap that issued this reference
    pub fn heap(self) -> u32 {
        self.heap
    }

    /// Slot index in from-space
    pub fn index(self) -> usize {
        self.index
    }

    /// Collection epoch this reference belongs to
    pub fn epoch(self) -> u32 {
        self.epoch
    }
}

/// A runtime value: nil or a reference to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    /// Absent value; default content of array and table slots
    #[default]
    Nil,
    /// Heap object
    Obj(ObjRef),
}

impl Value {
    /// True for nil
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The referenced object, if any
    pub fn as_obj(self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(r),
            Value::Nil => None,
        }
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}
