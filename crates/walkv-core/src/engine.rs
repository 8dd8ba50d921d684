// ABOUTME: Defines the StorageEngine trait and MemoryEngine, the in-memory key/value map.
// ABOUTME: Engines do no I/O; the orchestrator in walkv-store makes them durable.

use crate::{Key, Mapping, Value};

/// An in-memory associative map from keys to JSON values.
///
/// Implementations are plain data structures: synchronous, infallible, and
/// not internally synchronized. Mutating calls take `&mut self`, so exclusive
/// access is checked by the borrow checker rather than by a lock.
pub trait StorageEngine {
    /// Insert or overwrite the value for `key`.
    fn set(&mut self, key: Key, value: Value);

    fn get(&self, key: &str) -> Option<&Value>;

    /// Remove `key`. Returns true iff it was present.
    fn delete(&mut self, key: &str) -> bool;

    /// Return an owned copy of the full key space. Mutating the copy never
    /// affects the engine.
    fn export(&self) -> Mapping;

    /// Replace the entire content of the engine with `data`. The mapping is
    /// taken by value, so the caller keeps no handle into engine state.
    fn import(&mut self, data: Mapping);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// The default storage engine: a `BTreeMap` held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    data: Mapping,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn set(&mut self, key: Key, value: Value) {
        self.data.insert(key, value);
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    fn delete(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    fn export(&self) -> Mapping {
        self.data.clone()
    }

    fn import(&mut self, data: Mapping) {
        self.data = data;
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}
