//! Hash tables
//!
//! A table is a stable handle holding its live count and a reference to an
//! entries buffer. The buffer is open-addressed with linear probing and
//! tombstones; when occupancy passes the load factor a larger buffer is
//! allocated, the live entries are rehashed into it and the handle is
//! pointed at the new buffer. The handle's identity never changes.
//!
//! Key equality: numbers compare by value, strings by content, every other
//! kind by identity. Hashes are cached in the buckets and identity hashes
//! are stored in the objects, so a collection never forces a rehash.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::collector::RootProvider;
use crate::error::{HeapError, Result};
use crate::heap::Heap;
use crate::object::{Bucket, EntriesObj, ObjTag, Object, TableObj};
use crate::value::{ObjRef, Value};

/// Bucket count of a table's first entries buffer
pub const INITIAL_TABLE_CAPACITY: usize = 8;

impl Heap {
    fn table(&self, r: ObjRef) -> Result<&TableObj> {
        match self.object(r)? {
            Object::Table(table) => Ok(table),
            other => Err(HeapError::WrongKind {
                expected: ObjTag::Table,
                found: other.tag(),
            }),
        }
    }

    fn table_mut(&mut self, r: ObjRef) -> Result<&mut TableObj> {
        match self.object_mut(r)? {
            Object::Table(table) => Ok(table),
            other => Err(HeapError::WrongKind {
                expected: ObjTag::Table,
                found: other.tag(),
            }),
        }
    }

    fn entries_at(&self, r: ObjRef) -> Result<&EntriesObj> {
        match self.object(r)? {
            Object::TableEntries(entries) => Ok(entries),
            other => Err(HeapError::WrongKind {
                expected: ObjTag::TableEntries,
                found: other.tag(),
            }),
        }
    }

    fn entries(&self, table: &TableObj) -> Result<Option<&EntriesObj>> {
        match table.entries {
            Value::Nil => Ok(None),
            Value::Obj(r) => self.entries_at(r).map(Some),
        }
    }

    fn entries_mut(&mut self, r: ObjRef) -> Result<&mut EntriesObj> {
        match self.object_mut(r)? {
            Object::TableEntries(entries) => Ok(entries),
            other => Err(HeapError::WrongKind {
                expected: ObjTag::TableEntries,
                found: other.tag(),
            }),
        }
    }

    /// Hash a key; stable across collections
    fn hash_key(&self, key: Value) -> Result<u64> {
        let r = key.as_obj().ok_or(HeapError::NilKey)?;
        let object = self.object(r)?;
        let mut hasher = FxHasher::default();
        object.tag().hash(&mut hasher);
        match object {
            Object::Number(n) => {
                // -0.0 and 0.0 are the same key
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(&mut hasher);
            }
            Object::String(bytes) => bytes.hash(&mut hasher),
            Object::Array(array) => array.identity.hash(&mut hasher),
            Object::Function(function) => function.identity.hash(&mut hasher),
            Object::Table(table) => table.identity.hash(&mut hasher),
            Object::TableEntries(_) => {
                return Err(HeapError::UnhashableKey(ObjTag::TableEntries));
            }
        }
        Ok(hasher.finish())
    }

    /// Key equality used by table lookups
    fn keys_equal(&self, a: Value, b: Value) -> bool {
        let (Value::Obj(ra), Value::Obj(rb)) = (a, b) else {
            return false;
        };
        match (self.object(ra), self.object(rb)) {
            (Ok(Object::Number(x)), Ok(Object::Number(y))) => x == y,
            (Ok(Object::String(x)), Ok(Object::String(y))) => x == y,
            _ => ra == rb,
        }
    }

    /// Probe for `key`.
    ///
    /// Returns the bucket holding it, or else the bucket an insert should
    /// use (the first tombstone passed, else the empty bucket that ended
    /// the probe), together with whether the key was found.
    fn find_bucket(&self, buckets: &[Bucket], hash: u64, key: Value) -> Option<(usize, bool)> {
        let capacity = buckets.len();
        if capacity == 0 {
            return None;
        }

        let mut tombstone = None;
        let mut index = (hash % capacity as u64) as usize;
        for _ in 0..capacity {
            match buckets[index] {
                Bucket::Empty => return Some((tombstone.unwrap_or(index), false)),
                Bucket::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Bucket::Occupied {
                    hash: bucket_hash,
                    key: bucket_key,
                    ..
                } => {
                    if bucket_hash == hash && self.keys_equal(bucket_key, key) {
                        return Some((index, true));
                    }
                }
            }
            index = (index + 1) % capacity;
        }
        tombstone.map(|index| (index, false))
    }

    /// Number of live entries
    pub fn table_len(&self, table: ObjRef) -> Result<usize> {
        self.table(table).map(|table| table.count)
    }

    /// Look up `key`
    pub fn table_get(&self, table: ObjRef, key: Value) -> Result<Option<Value>> {
        let hash = self.hash_key(key)?;
        let table = self.table(table)?;
        let Some(entries) = self.entries(table)? else {
            return Ok(None);
        };

        match self.find_bucket(&entries.buckets, hash, key) {
            Some((index, true)) => match entries.buckets[index] {
                Bucket::Occupied { value, .. } => Ok(Some(value)),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// All live `(key, value)` pairs in bucket order
    pub fn table_entries(&self, table: ObjRef) -> Result<Vec<(Value, Value)>> {
        let table = self.table(table)?;
        let Some(entries) = self.entries(table)? else {
            return Ok(Vec::new());
        };
        Ok(entries
            .buckets
            .iter()
            .filter_map(|bucket| match bucket {
                Bucket::Occupied { key, value, .. } => Some((*key, *value)),
                _ => None,
            })
            .collect())
    }

    /// Insert or update `key`. Returns true if the key was new.
    ///
    /// Updating an existing key never allocates. Inserting a new key may
    /// allocate a larger entries buffer, which is a safepoint: `table`,
    /// `key` and `value` are kept alive, but the caller must re-read any
    /// reference it needs afterwards from its roots.
    pub fn table_set(
        &mut self,
        table: ObjRef,
        key: Value,
        value: Value,
        roots: &mut dyn RootProvider,
    ) -> Result<bool> {
        let hash = self.hash_key(key)?;
        self.check_value(value)?;

        if let Some(entries_ref) = self.table(table)?.entries.as_obj() {
            let entries = self.entries_at(entries_ref)?;
            if let Some((index, true)) = self.find_bucket(&entries.buckets, hash, key) {
                let entries = self.entries_mut(entries_ref)?;
                if let Bucket::Occupied { value: slot, .. } = &mut entries.buckets[index] {
                    *slot = value;
                }
                return Ok(false);
            }
        }

        let (table, key, value) = if self.needs_growth(table)? {
            self.grow_entries(table, key, value, roots)?
        } else {
            (table, key, value)
        };

        let entries_ref = match self.table(table)?.entries {
            Value::Obj(r) => r,
            Value::Nil => return Err(HeapError::StaleReference),
        };
        let entries = self.entries_at(entries_ref)?;
        let (index, found) = self
            .find_bucket(&entries.buckets, hash, key)
            .ok_or(HeapError::Corrupted {
                index: entries_ref.index(),
                reason: "entries buffer has no free bucket",
            })?;

        let entries = self.entries_mut(entries_ref)?;
        if found {
            return Err(HeapError::Corrupted {
                index: entries_ref.index(),
                reason: "key appeared while the table grew",
            });
        }

        if matches!(entries.buckets[index], Bucket::Empty) {
            entries.used += 1;
        }
        entries.buckets[index] = Bucket::Occupied { hash, key, value };
        self.table_mut(table)?.count += 1;
        Ok(true)
    }

    /// Remove `key`, leaving a tombstone. Returns true if it was present.
    pub fn table_remove(&mut self, table: ObjRef, key: Value) -> Result<bool> {
        let hash = self.hash_key(key)?;
        let entries_ref = match self.table(table)?.entries {
            Value::Obj(r) => r,
            Value::Nil => return Ok(false),
        };

        let entries = self.entries_at(entries_ref)?;
        let Some((index, true)) = self.find_bucket(&entries.buckets, hash, key) else {
            return Ok(false);
        };

        self.entries_mut(entries_ref)?.buckets[index] = Bucket::Tombstone;
        self.table_mut(table)?.count -= 1;
        Ok(true)
    }

    /// Whether one more entry would exceed the load factor
    fn needs_growth(&self, table: ObjRef) -> Result<bool> {
        let table = self.table(table)?;
        Ok(match self.entries(table)? {
            None => true,
            Some(entries) => {
                let limit = entries.buckets.len() as f64 * self.config.table_load_factor;
                (entries.used + 1) as f64 > limit
            }
        })
    }

    /// Replace the entries buffer with one sized for the live count plus one.
    ///
    /// Returns `table`, `key` and `value` as they are after any collection
    /// the allocation triggered.
    fn grow_entries(
        &mut self,
        table: ObjRef,
        key: Value,
        value: Value,
        roots: &mut dyn RootProvider,
    ) -> Result<(ObjRef, Value, Value)> {
        let live = self.table(table)?.count;
        let mut capacity = INITIAL_TABLE_CAPACITY;
        while (live + 1) as f64 > capacity as f64 * self.config.table_load_factor {
            capacity = capacity.saturating_mul(2);
        }

        let mut pinned = [Value::Obj(table), key, value];
        let fresh = self.new_entries(capacity, roots, &mut pinned)?;
        let [table, key, value] = pinned;
        let table = table.as_obj().ok_or(HeapError::StaleReference)?;

        let old: Vec<Bucket> = match self.entries(self.table(table)?)? {
            Some(entries) => entries.buckets.to_vec(),
            None => Vec::new(),
        };

        let entries = self.entries_mut(fresh)?;
        let capacity = entries.buckets.len();
        for bucket in old {
            if let Bucket::Occupied { hash, .. } = bucket {
                let mut index = (hash % capacity as u64) as usize;
                while !matches!(entries.buckets[index], Bucket::Empty) {
                    index = (index + 1) % capacity;
                }
                entries.buckets[index] = bucket;
                entries.used += 1;
            }
        }

        self.table_mut(table)?.entries = Value::Obj(fresh);

        #[cfg(feature = "gc_logging")]
        tracing::trace!(
            target: "vox::gc",
            live,
            capacity,
            "Table entries rehashed"
        );

        Ok((table, key, value))
    }
}
