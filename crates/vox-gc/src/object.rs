//! Heap object layout
//!
//! Every object is a variant of the closed [`Object`] enum. Sizes follow the
//! word layout of a classic tagged heap (an 8-byte header followed by the
//! payload) so that space accounting matches what the objects would occupy
//! in raw memory, and each variant reports its own size from its fields.

use crate::value::Value;

/// Machine word size used for layout accounting
pub const WORD_SIZE: usize = 8;

/// Size of the object header
pub const HEADER_SIZE: usize = WORD_SIZE;

/// Size of one key/value pair in a table entries buffer
pub const ENTRY_SIZE: usize = 2 * WORD_SIZE;

/// Size of a forwarding marker (header + target)
pub const FORWARD_SIZE: usize = HEADER_SIZE + WORD_SIZE;

/// Size of a number object
pub const NUMBER_SIZE: usize = HEADER_SIZE + WORD_SIZE;

/// Size of a table object (header + count + entries)
pub const TABLE_SIZE: usize = HEADER_SIZE + 2 * WORD_SIZE;

/// Object type tag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjTag {
    /// Array of values
    Array = 0,
    /// Moved object; only seen while a collection is running
    Forward = 1,
    /// Bytecode plus constants
    Function = 2,
    /// Boxed f64
    Number = 3,
    /// Byte string
    String = 4,
    /// Hash table handle
    Table = 5,
    /// Open-addressed table storage
    TableEntries = 6,
}

/// Round up to a whole number of words, saturating on overflow
const fn align(size: usize) -> usize {
    size.saturating_add(WORD_SIZE - 1) & !(WORD_SIZE - 1)
}

/// Bytes occupied by an array of `capacity` slots
pub const fn array_size(capacity: usize) -> usize {
    (HEADER_SIZE + WORD_SIZE).saturating_add(capacity.saturating_mul(WORD_SIZE))
}

/// Bytes occupied by a string of `len` bytes
pub const fn string_size(len: usize) -> usize {
    align((HEADER_SIZE + WORD_SIZE).saturating_add(len))
}

/// Bytes occupied by a function with `code_len` bytes of bytecode
pub const fn function_size(code_len: usize) -> usize {
    align((HEADER_SIZE + 2 * WORD_SIZE).saturating_add(code_len))
}

/// Bytes occupied by an entries buffer of `capacity` buckets
pub const fn entries_size(capacity: usize) -> usize {
    (HEADER_SIZE + WORD_SIZE).saturating_add(capacity.saturating_mul(ENTRY_SIZE))
}

/// Array payload
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArrayObj {
    /// Stable hash identity, survives relocation
    pub(crate) identity: u32,
    /// Number of slots in use
    pub(crate) len: usize,
    /// Slot storage; its length is the capacity
    pub(crate) elements: Box<[Value]>,
}

/// Function payload
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionObj {
    pub(crate) identity: u32,
    /// Constant pool (an array or nil)
    pub(crate) constants: Value,
    pub(crate) code: Box<[u8]>,
}

/// Table handle
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableObj {
    pub(crate) identity: u32,
    /// Live entries
    pub(crate) count: usize,
    /// Current entries buffer, nil until the first insert
    pub(crate) entries: Value,
}

/// One bucket of an entries buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Bucket {
    Empty,
    /// Deleted entry; keeps probe chains intact
    Tombstone,
    Occupied { hash: u64, key: Value, value: Value },
}

/// Open-addressed table storage
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntriesObj {
    /// Occupied plus tombstone buckets
    pub(crate) used: usize,
    pub(crate) buckets: Box<[Bucket]>,
}

/// A live heap object
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Object {
    Array(ArrayObj),
    Function(FunctionObj),
    Number(f64),
    String(Box<[u8]>),
    Table(TableObj),
    TableEntries(EntriesObj),
}

impl Object {
    /// Header tag of this object
    pub(crate) fn tag(&self) -> ObjTag {
        match self {
            Object::Array(_) => ObjTag::Array,
            Object::Function(_) => ObjTag::Function,
            Object::Number(_) => ObjTag::Number,
            Object::String(_) => ObjTag::String,
            Object::Table(_) => ObjTag::Table,
            Object::TableEntries(_) => ObjTag::TableEntries,
        }
    }

    /// Total bytes occupied, header included
    pub(crate) fn byte_size(&self) -> usize {
        match self {
            Object::Array(array) => array_size(array.elements.len()),
            Object::Function(function) => function_size(function.code.len()),
            Object::Number(_) => NUMBER_SIZE,
            Object::String(bytes) => string_size(bytes.len()),
            Object::Table(_) => TABLE_SIZE,
            Object::TableEntries(entries) => entries_size(entries.buckets.len()),
        }
    }

    /// Visit every reference field in a fixed order
    pub(crate) fn trace_mut(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        match self {
            Object::Array(array) => array.elements.iter_mut().for_each(|slot| visitor(slot)),
            Object::Function(function) => visitor(&mut function.constants),
            Object::Table(table) => visitor(&mut table.entries),
            Object::TableEntries(entries) => {
                for bucket in entries.buckets.iter_mut() {
                    if let Bucket::Occupied { key, value, .. } = bucket {
                        visitor(key);
                        visitor(value);
                    }
                }
            }
            Object::Number(_) | Object::String(_) => {}
        }
    }

    /// Visit every reference field without mutating
    pub(crate) fn trace(&self, visitor: &mut dyn FnMut(Value)) {
        match self {
            Object::Array(array) => array.elements.iter().for_each(|slot| visitor(*slot)),
            Object::Function(function) => visitor(function.constants),
            Object::Table(table) => visitor(table.entries),
            Object::TableEntries(entries) => {
                for bucket in entries.buckets.iter() {
                    if let Bucket::Occupied { key, value, .. } = bucket {
                        visitor(*key);
                        visitor(*value);
                    }
                }
            }
            Object::Number(_) | Object::String(_) => {}
        }
    }
}
