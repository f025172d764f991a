//! Open-addressing hash table with linear probing and tombstones.
//!
//! Shared by every keyed structure in the engine — the string intern pool,
//! globals, instance fields, class method tables — exactly as spec.md §3
//! describes. Grows at a 0.75 load factor; deletions leave a tombstone
//! (`key: None, value: Bool(true)`) so later probes don't stop early.

use crate::object::{ErasedGcRef, GcRef, ObjString};
use crate::value::Value;

const MAX_LOAD: f64 = 0.75;

#[derive(Clone, Copy)]
struct Entry {
    key: Option<GcRef<ObjString>>,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Entry { key: None, value: Value::Nil }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && matches!(self.value, Value::Bool(true))
    }
}

pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Table { count: 0, entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_entry_index(entries: &[Entry], capacity: usize, key: GcRef<ObjString>) -> usize {
        let mut index = (key.hash as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                Some(k) if k == key => return index,
                None if entry.is_tombstone() => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                None => return tombstone.unwrap_or(index),
                Some(_) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() { 8 } else { self.entries.len() * 2 };
        let mut new_entries = vec![Entry::empty(); new_capacity];
        self.count = 0;
        for entry in &self.entries {
            if let Some(key) = entry.key {
                let index = Self::find_entry_index(&new_entries, new_capacity, key);
                new_entries[index] = *entry;
                self.count += 1;
            }
        }
        self.entries = new_entries;
    }

    /// Inserts or overwrites `key`. Returns `true` if this created a new entry.
    pub fn set(&mut self, key: GcRef<ObjString>, value: Value) -> bool {
        if self.entries.is_empty() || (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            self.grow();
        }
        let capacity = self.capacity();
        let index = Self::find_entry_index(&self.entries, capacity, key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        if is_new && !entry.is_tombstone() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    pub fn get(&self, key: GcRef<ObjString>) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::find_entry_index(&self.entries, self.capacity(), key);
        self.entries[index].key.map(|_| self.entries[index].value)
    }

    pub fn delete(&mut self, key: GcRef<ObjString>) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = Self::find_entry_index(&self.entries, self.capacity(), key);
        if self.entries[index].key.is_none() {
            return false;
        }
        self.entries[index] = Entry { key: None, value: Value::Bool(true) };
        true
    }

    /// Copies every entry of `self` into `dst`, used when a subclass inherits
    /// its superclass's methods (spec.md §3 Class / single inheritance).
    pub fn add_all(&self, dst: &mut Table) {
        for entry in &self.entries {
            if let Some(key) = entry.key {
                dst.set(key, entry.value);
            }
        }
    }

    /// Looks up an interned string by content rather than identity — the
    /// one place callers don't already hold a `GcRef<ObjString>`, since
    /// interning is how that handle gets created in the first place.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<GcRef<ObjString>> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if !entry.is_tombstone() => return None,
                Some(key) if key.hash == hash && key.as_str() == chars => return Some(key),
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }

    /// Removes every entry whose key is not marked, called after tracing but
    /// before sweep so the intern pool doesn't keep dead strings reachable
    /// (spec.md §4.5 item 4, "Weak references").
    pub fn remove_white(&mut self) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !key.is_marked() {
                    *entry = Entry { key: None, value: Value::Bool(true) };
                    self.count -= 1;
                }
            }
        }
    }

    /// Marks every key and value this table holds, for the class-method-table
    /// and instance-field-table cases where the table itself is reachable
    /// from a traced object rather than being a GC root directly.
    pub fn trace(&self, gray: &mut Vec<ErasedGcRef>) {
        for entry in &self.entries {
            if let Some(key) = entry.key {
                gray.push(key.as_erased());
                if let Value::Obj(obj) = entry.value {
                    gray.push(obj);
                }
            }
        }
    }
}

/// FNV-1a, 32-bit, matching spec.md §3's hashing requirement.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
