//! Heap errors

use crate::object::ObjTag;
use thiserror::Error;

/// Errors that can occur during heap operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HeapError {
    /// Requested object is larger than the configured maximum
    #[error("Invalid size: {requested} bytes requested, maximum object size is {max}")]
    InvalidSize {
        /// Bytes the object would occupy
        requested: usize,
        /// Configured maximum object size
        max: usize,
    },

    /// Live data does not fit in a semispace even after a collection
    #[error("Out of memory: {requested} bytes requested, {available} available after collection")]
    OutOfMemory {
        /// Bytes the object would occupy
        requested: usize,
        /// Bytes left in from-space after collecting
        available: usize,
    },

    /// Reference issued before the most recent collection
    #[error("Stale reference used after a collection")]
    StaleReference,

    /// Reference issued by a different heap
    #[error("Reference belongs to another heap")]
    ForeignReference,

    /// Accessor applied to an object of another kind
    #[error("Wrong object kind: expected {expected:?}, found {found:?}")]
    WrongKind {
        /// Kind the operation works on
        expected: ObjTag,
        /// Kind actually found
        found: ObjTag,
    },

    /// Array slot index past the array length
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested slot
        index: usize,
        /// Array length
        len: usize,
    },

    /// Nil used as a table key
    #[error("Nil cannot be used as a table key")]
    NilKey,

    /// Object kind that cannot be hashed as a table key
    #[error("Unhashable table key of kind {0:?}")]
    UnhashableKey(ObjTag),

    /// Heap verification found an inconsistency
    #[error("Heap corrupted at slot {index}: {reason}")]
    Corrupted {
        /// From-space slot index
        index: usize,
        /// What check failed
        reason: &'static str,
    },
}

/// Result type for heap operations
pub type Result<T> = std::result::Result<T, HeapError>;
