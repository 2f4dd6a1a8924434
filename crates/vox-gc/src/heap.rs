//! GC Heap management

use std::sync::atomic::{AtomicU32, Ordering};

use crate::allocator::{Slot, Space};
use crate::collector::{GcStats, RootProvider};
use crate::error::{HeapError, Result};
use crate::object::{
    self, ArrayObj, EntriesObj, FunctionObj, NUMBER_SIZE, ObjTag, Object, TABLE_SIZE, TableObj,
};
use crate::value::{ObjRef, Value};

/// Source of per-heap ids stamped into references
static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(0);

/// Heap configuration
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Size of each semispace in bytes (default: 1MB)
    pub space_size: usize,
    /// Largest single object in bytes (default: 256KB, capped at `space_size`)
    pub max_object_size: usize,
    /// Table entries occupancy that triggers a rehash (default: 0.75)
    pub table_load_factor: f64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            space_size: 1024 * 1024,     // 1MB
            max_object_size: 256 * 1024, // 256KB
            table_load_factor: 0.75,
        }
    }
}

/// Object heap with a two-space copying collector.
///
/// All objects live in from-space. When an allocation does not fit, the
/// heap collects synchronously using the caller's roots, then retries once.
/// Every allocating method is therefore a safepoint: references not passed
/// in as roots are stale afterwards.
pub struct Heap {
    /// Stamped into every reference this heap issues
    pub(crate) id: u32,
    pub(crate) config: HeapConfig,
    pub(crate) from: Space,
    pub(crate) to: Space,
    /// Collections so far (wrapping); stamped into every reference
    pub(crate) epoch: u32,
    next_identity: u32,
    pub(crate) stats: GcStats,
}

impl Heap {
    /// Create new heap with default config
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create new heap with custom config
    pub fn with_config(mut config: HeapConfig) -> Self {
        config.max_object_size = config.max_object_size.min(config.space_size);
        config.table_load_factor = config.table_load_factor.clamp(0.25, 0.95);
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            from: Space::new(config.space_size),
            to: Space::new(config.space_size),
            config,
            epoch: 0,
            next_identity: 0,
            stats: GcStats::default(),
        }
    }

    /// Get config
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Bytes allocated in from-space
    pub fn used_bytes(&self) -> usize {
        self.from.used()
    }

    /// Semispace capacity in bytes
    pub fn capacity(&self) -> usize {
        self.from.capacity()
    }

    /// Number of objects in from-space, live or not yet collected
    pub fn object_count(&self) -> usize {
        self.from.len()
    }

    /// Id stamped into this heap's references
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current collection epoch
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Get statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    // ---------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------

    /// Reject sizes above the configured maximum
    fn check_size(&self, requested: usize) -> Result<usize> {
        if requested > self.config.max_object_size {
            return Err(HeapError::InvalidSize {
                requested,
                max: self.config.max_object_size,
            });
        }
        Ok(requested)
    }

    /// Make room for `size` bytes, collecting once if necessary
    fn reserve(&mut self, size: usize, roots: &mut dyn RootProvider) -> Result<()> {
        if self.from.remaining() >= size {
            return Ok(());
        }

        self.collect_garbage(roots);

        let available = self.from.remaining();
        if available >= size {
            Ok(())
        } else {
            #[cfg(feature = "gc_logging")]
            tracing::warn!(
                target: "vox::gc",
                requested = size,
                available,
                live_bytes = self.from.used(),
                "Heap exhausted after collection"
            );
            Err(HeapError::OutOfMemory {
                requested: size,
                available,
            })
        }
    }

    /// Reserve room while keeping `pinned` alive and up to date
    fn reserve_pinned(
        &mut self,
        size: usize,
        roots: &mut dyn RootProvider,
        pinned: &mut [Value],
    ) -> Result<()> {
        self.reserve(size, &mut (&mut *roots, pinned))
    }

    fn install(&mut self, object: Object) -> ObjRef {
        let index = self.from.push(object);
        ObjRef::new(self.id, index, self.epoch)
    }

    fn next_identity(&mut self) -> u32 {
        let identity = self.next_identity;
        self.next_identity = self.next_identity.wrapping_add(1);
        identity
    }

    /// Allocate a number
    pub fn new_number(&mut self, value: f64, roots: &mut dyn RootProvider) -> Result<ObjRef> {
        self.reserve(NUMBER_SIZE, roots)?;
        Ok(self.install(Object::Number(value)))
    }

    /// Allocate a string holding a copy of `bytes`
    pub fn new_string(&mut self, bytes: &[u8], roots: &mut dyn RootProvider) -> Result<ObjRef> {
        let size = self.check_size(object::string_size(bytes.len()))?;
        self.reserve(size, roots)?;
        Ok(self.install(Object::String(bytes.into())))
    }

    /// Allocate an array of `size` nil slots
    pub fn new_array(&mut self, size: usize, roots: &mut dyn RootProvider) -> Result<ObjRef> {
        let bytes = self.check_size(object::array_size(size))?;
        self.reserve(bytes, roots)?;
        let identity = self.next_identity();
        Ok(self.install(Object::Array(ArrayObj {
            identity,
            len: size,
            elements: vec![Value::Nil; size].into_boxed_slice(),
        })))
    }

    /// Allocate a function with a copy of `code` and a constants array.
    ///
    /// `constants` must be nil or an array; it is kept alive across any
    /// collection this allocation triggers.
    pub fn new_function(
        &mut self,
        code: &[u8],
        constants: Value,
        roots: &mut dyn RootProvider,
    ) -> Result<ObjRef> {
        let size = self.check_size(object::function_size(code.len()))?;
        if let Value::Obj(r) = constants {
            self.array(r)?;
        }

        let mut pinned = [constants];
        self.reserve_pinned(size, roots, &mut pinned)?;

        let identity = self.next_identity();
        Ok(self.install(Object::Function(FunctionObj {
            identity,
            constants: pinned[0],
            code: code.into(),
        })))
    }

    /// Allocate an empty table
    pub fn new_table(&mut self, roots: &mut dyn RootProvider) -> Result<ObjRef> {
        self.reserve(TABLE_SIZE, roots)?;
        let identity = self.next_identity();
        Ok(self.install(Object::Table(TableObj {
            identity,
            count: 0,
            entries: Value::Nil,
        })))
    }

    /// Allocate an entries buffer of `capacity` empty buckets
    pub(crate) fn new_entries(
        &mut self,
        capacity: usize,
        roots: &mut dyn RootProvider,
        pinned: &mut [Value],
    ) -> Result<ObjRef> {
        let size = self.check_size(object::entries_size(capacity))?;
        self.reserve_pinned(size, roots, pinned)?;
        Ok(self.install(Object::TableEntries(EntriesObj {
            used: 0,
            buckets: vec![object::Bucket::Empty; capacity].into_boxed_slice(),
        })))
    }

    /// Ensure `array` holds at least `size` slots.
    ///
    /// Returns `array` itself when its capacity already suffices (the length
    /// grows in place). Otherwise copies the elements in order into a new
    /// array, pads with nil and returns it; the old reference must not be
    /// used afterwards.
    pub fn ensure_array_size(
        &mut self,
        array: ObjRef,
        size: usize,
        roots: &mut dyn RootProvider,
    ) -> Result<ObjRef> {
        let current = self.array(array)?;
        let capacity = current.elements.len();
        if size <= capacity {
            let current = self.array_mut(array)?;
            current.len = current.len.max(size);
            return Ok(array);
        }

        self.check_size(object::array_size(size))?;
        let doubled = capacity.saturating_mul(2);
        let new_capacity = if doubled > size
            && object::array_size(doubled) <= self.config.max_object_size
        {
            doubled
        } else {
            size
        };
        let mut pinned = [Value::Obj(array)];
        let new_capacity =
            match self.reserve_pinned(object::array_size(new_capacity), roots, &mut pinned) {
                Ok(()) => new_capacity,
                // Live data leaves room for the exact size, just not the doubled one
                Err(HeapError::OutOfMemory { .. })
                    if self.from.remaining() >= object::array_size(size) =>
                {
                    size
                }
                Err(err) => return Err(err),
            };
        let array = match pinned[0] {
            Value::Obj(r) => r,
            Value::Nil => return Err(HeapError::StaleReference),
        };

        let old = self.array(array)?;
        let mut elements = Vec::with_capacity(new_capacity);
        elements.extend_from_slice(&old.elements);
        elements.resize(new_capacity, Value::Nil);

        let identity = self.next_identity();
        Ok(self.install(Object::Array(ArrayObj {
            identity,
            len: size,
            elements: elements.into_boxed_slice(),
        })))
    }

    // ---------------------------------------------------------------
    // Access
    // ---------------------------------------------------------------

    /// Check that `r` was issued by this heap in the current epoch
    fn check_ref(&self, r: ObjRef) -> Result<()> {
        if r.heap() != self.id {
            return Err(HeapError::ForeignReference);
        }
        if r.epoch() != self.epoch {
            return Err(HeapError::StaleReference);
        }
        Ok(())
    }

    pub(crate) fn object(&self, r: ObjRef) -> Result<&Object> {
        self.check_ref(r)?;
        self.from.object(r.index()).ok_or(HeapError::StaleReference)
    }

    pub(crate) fn object_mut(&mut self, r: ObjRef) -> Result<&mut Object> {
        self.check_ref(r)?;
        self.from
            .object_mut(r.index())
            .ok_or(HeapError::StaleReference)
    }

    /// Check that a value may be stored in the heap
    pub(crate) fn check_value(&self, value: Value) -> Result<()> {
        match value {
            Value::Nil => Ok(()),
            Value::Obj(r) => self.object(r).map(|_| ()),
        }
    }

    /// Header tag of a live object
    pub fn tag(&self, r: ObjRef) -> Result<ObjTag> {
        self.object(r).map(Object::tag)
    }

    /// Total bytes of a live object, header included
    pub fn size_of(&self, r: ObjRef) -> Result<usize> {
        self.object(r).map(Object::byte_size)
    }

    /// Value of a number object
    pub fn number_value(&self, r: ObjRef) -> Result<f64> {
        match self.object(r)? {
            Object::Number(n) => Ok(*n),
            other => Err(wrong_kind(ObjTag::Number, other)),
        }
    }

    /// Bytes of a string object
    pub fn string_bytes(&self, r: ObjRef) -> Result<&[u8]> {
        match self.object(r)? {
            Object::String(bytes) => Ok(&bytes[..]),
            other => Err(wrong_kind(ObjTag::String, other)),
        }
    }

    pub(crate) fn array(&self, r: ObjRef) -> Result<&ArrayObj> {
        match self.object(r)? {
            Object::Array(array) => Ok(array),
            other => Err(wrong_kind(ObjTag::Array, other)),
        }
    }

    fn array_mut(&mut self, r: ObjRef) -> Result<&mut ArrayObj> {
        match self.object_mut(r)? {
            Object::Array(array) => Ok(array),
            other => Err(wrong_kind(ObjTag::Array, other)),
        }
    }

    /// Number of slots in use
    pub fn array_len(&self, r: ObjRef) -> Result<usize> {
        self.array(r).map(|array| array.len)
    }

    /// Number of slots allocated
    pub fn array_capacity(&self, r: ObjRef) -> Result<usize> {
        self.array(r).map(|array| array.elements.len())
    }

    /// Read an array slot
    pub fn array_get(&self, r: ObjRef, index: usize) -> Result<Value> {
        let array = self.array(r)?;
        if index >= array.len {
            return Err(HeapError::IndexOutOfBounds {
                index,
                len: array.len,
            });
        }
        Ok(array.elements[index])
    }

    /// Write an array slot
    pub fn array_set(&mut self, r: ObjRef, index: usize, value: Value) -> Result<()> {
        self.check_value(value)?;
        let array = self.array_mut(r)?;
        if index >= array.len {
            return Err(HeapError::IndexOutOfBounds {
                index,
                len: array.len,
            });
        }
        array.elements[index] = value;
        Ok(())
    }

    fn function(&self, r: ObjRef) -> Result<&FunctionObj> {
        match self.object(r)? {
            Object::Function(function) => Ok(function),
            other => Err(wrong_kind(ObjTag::Function, other)),
        }
    }

    /// Bytecode of a function
    pub fn function_code(&self, r: ObjRef) -> Result<&[u8]> {
        self.function(r).map(|function| &*function.code)
    }

    /// Constants array of a function
    pub fn function_constants(&self, r: ObjRef) -> Result<Value> {
        self.function(r).map(|function| function.constants)
    }

    // ---------------------------------------------------------------
    // Heap walk
    // ---------------------------------------------------------------

    /// Walk from-space in allocation order.
    ///
    /// Yields each slot's reference, tag and byte size, read from the slot
    /// itself.
    pub fn objects(&self) -> impl Iterator<Item = (ObjRef, ObjTag, usize)> + '_ {
        let (id, epoch) = (self.id, self.epoch);
        self.from.slots().enumerate().map(move |(index, slot)| {
            (ObjRef::new(id, index, epoch), slot.tag(), slot.byte_size())
        })
    }

    /// Check heap consistency.
    ///
    /// No forwarding markers, every reference field points at a live slot
    /// of the current epoch with the right kind, and the byte frontier
    /// equals the sum of object sizes.
    pub fn verify(&self) -> Result<()> {
        let mut total = 0;
        for (index, slot) in self.from.slots().enumerate() {
            let object = match slot {
                Slot::Live(object) => object,
                Slot::Forwarded(_) => {
                    return Err(HeapError::Corrupted {
                        index,
                        reason: "forwarding marker outside a collection",
                    });
                }
            };
            total += object.byte_size();

            let mut dangling = false;
            object.trace(&mut |field| {
                if let Value::Obj(r) = field {
                    dangling |= self.object(r).is_err();
                }
            });
            if dangling {
                return Err(HeapError::Corrupted {
                    index,
                    reason: "reference field does not point at a live object",
                });
            }

            let shape_ok = match object {
                Object::Function(function) => match function.constants {
                    Value::Obj(r) => self.array(r).is_ok(),
                    Value::Nil => true,
                },
                Object::Table(table) => match table.entries {
                    Value::Obj(r) => {
                        matches!(self.object(r), Ok(Object::TableEntries(_)))
                    }
                    Value::Nil => table.count == 0,
                },
                Object::Array(array) => array.len <= array.elements.len(),
                _ => true,
            };
            if !shape_ok {
                return Err(HeapError::Corrupted {
                    index,
                    reason: "object fields have the wrong shape",
                });
            }
        }

        if total != self.from.used() {
            return Err(HeapError::Corrupted {
                index: self.from.len(),
                reason: "allocation frontier does not match object sizes",
            });
        }
        Ok(())
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_kind(expected: ObjTag, found: &Object) -> HeapError {
    HeapError::WrongKind {
        expected,
        found: found.tag(),
    }
}
