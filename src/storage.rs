//! Pluggable key-value contract storage
//!
//! Contract state is addressed by `(instance, field, map key)`. Contracts
//! never hold state in Rust structs; their handles only carry immutable
//! deployment parameters and read/write everything else through a
//! [`KeyValueStore`].
//!
//! Implementations:
//! - [`MemoryStore`]: `BTreeMap`-backed, the default
//! - [`Journal`]: copy-on-write overlay over any other store, used as the
//!   per-call transaction boundary

use std::collections::BTreeMap;

use crate::address::Address;

/// Key inside a contract field
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    /// Scalar field
    None,
    /// Field keyed by principal
    Addr(Address),
    /// Field keyed by numeric id (chain id, product id, ...)
    Id(u128),
    /// Field keyed by an ordered principal pair (owner, spender)
    Pair(Address, Address),
}

/// Fully qualified storage slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    /// Contract instance owning the slot
    pub instance: Address,
    /// Field name within the contract
    pub field: &'static str,
    /// Map key within the field
    pub key: MapKey,
}

impl StorageKey {
    pub const fn new(instance: Address, field: &'static str, key: MapKey) -> Self {
        Self { instance, field, key }
    }
}

/// Stored value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value {
    Uint(u128),
    Flag(bool),
    Addr(Address),
}

/// Trait for pluggable contract storage
///
/// Reads of absent slots return `None`; typed accessors on
/// [`Env`](crate::runtime::Env) map that to the zero value of the type.
pub trait KeyValueStore {
    /// Read a slot
    fn load(&self, key: &StorageKey) -> Option<Value>;

    /// Write a slot
    fn store(&mut self, key: StorageKey, value: Value);

    /// Clear a slot
    fn erase(&mut self, key: &StorageKey);
}

/// In-memory store (default)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<StorageKey, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all slots in key order
    pub fn iter(&self) -> impl Iterator<Item = (&StorageKey, &Value)> {
        self.entries.iter()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &StorageKey) -> Option<Value> {
        self.entries.get(key).copied()
    }

    fn store(&mut self, key: StorageKey, value: Value) {
        self.entries.insert(key, value);
    }

    fn erase(&mut self, key: &StorageKey) {
        self.entries.remove(key);
    }
}

/// Copy-on-write overlay over another store.
///
/// Writes and erasures stay pending until [`Journal::commit`]. Dropping the
/// journal discards them, leaving the base untouched.
pub struct Journal<'a, S: KeyValueStore + ?Sized> {
    base: &'a mut S,
    /// `None` marks an erased slot
    pending: BTreeMap<StorageKey, Option<Value>>,
}

impl<'a, S: KeyValueStore + ?Sized> Journal<'a, S> {
    pub fn new(base: &'a mut S) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    /// Number of slots touched since the journal was opened
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply every pending write to the base store
    pub fn commit(self) {
        for (key, value) in self.pending {
            match value {
                Some(value) => self.base.store(key, value),
                None => self.base.erase(&key),
            }
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Journal<'_, S> {
    fn load(&self, key: &StorageKey) -> Option<Value> {
        match self.pending.get(key) {
            Some(pending) => *pending,
            None => self.base.load(key),
        }
    }

    fn store(&mut self, key: StorageKey, value: Value) {
        self.pending.insert(key, Some(value));
    }

    fn erase(&mut self, key: &StorageKey) {
        self.pending.insert(*key, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(field: &'static str) -> StorageKey {
        StorageKey::new(Address::from_low_u64(1), field, MapKey::None)
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());

        store.store(key("a"), Value::Uint(7));
        assert_eq!(store.load(&key("a")), Some(Value::Uint(7)));
        assert_eq!(store.load(&key("b")), None);

        store.erase(&key("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_journal_commit() {
        let mut store = MemoryStore::new();
        store.store(key("keep"), Value::Flag(true));
        store.store(key("drop"), Value::Uint(1));

        let mut journal = Journal::new(&mut store);
        journal.store(key("new"), Value::Uint(9));
        journal.erase(&key("drop"));

        // Reads see pending writes
        assert_eq!(journal.load(&key("new")), Some(Value::Uint(9)));
        assert_eq!(journal.load(&key("drop")), None);
        assert_eq!(journal.load(&key("keep")), Some(Value::Flag(true)));
        assert_eq!(journal.pending_len(), 2);

        journal.commit();
        assert_eq!(store.load(&key("new")), Some(Value::Uint(9)));
        assert_eq!(store.load(&key("drop")), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_journal_drop_discards() {
        let mut store = MemoryStore::new();
        store.store(key("a"), Value::Uint(1));
        let before = store.clone();

        {
            let mut journal = Journal::new(&mut store);
            journal.store(key("a"), Value::Uint(2));
            journal.erase(&key("a"));
            journal.store(key("b"), Value::Uint(3));
        }

        assert_eq!(store, before);
    }

    #[test]
    fn test_nested_journal() {
        let mut store = MemoryStore::new();
        let mut outer = Journal::new(&mut store);
        outer.store(key("a"), Value::Uint(1));
        {
            let mut inner = Journal::new(&mut outer);
            inner.store(key("a"), Value::Uint(2));
            inner.commit();
        }
        assert_eq!(outer.load(&key("a")), Some(Value::Uint(2)));
        outer.commit();
        assert_eq!(store.load(&key("a")), Some(Value::Uint(2)));
    }
}
