// ABOUTME: Collection, a namespace over a Database implemented by prefixing keys with "<name>:".
// ABOUTME: Enumeration scans the whole key space, so its cost grows with the full store size.

use std::fmt;

use walkv_core::{Mapping, StorageEngine, Value};

use crate::database::Database;
use crate::error::DbError;
use crate::snapshot::SnapshotStore;
use crate::wal::WriteAheadLog;

/// A logical group of keys sharing the prefix `"<name>:"`.
///
/// All collections share the database's single key space; writes go
/// through the database and therefore through its log and snapshot policy.
pub struct Collection<'db, S, P, W> {
    db: &'db mut Database<S, P, W>,
    name: String,
    prefix: String,
}

impl<'db, S, P, W> Collection<'db, S, P, W>
where
    S: StorageEngine,
    P: SnapshotStore,
    W: WriteAheadLog,
{
    pub fn new(db: &'db mut Database<S, P, W>, name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = format!("{}:", name);
        Self { db, name, prefix }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), DbError> {
        let full_key = self.full_key(key);
        self.db.set(full_key, value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.db.get(&self.full_key(key))
    }

    pub fn delete(&mut self, key: &str) -> Result<bool, DbError> {
        let full_key = self.full_key(key);
        self.db.delete(&full_key)
    }

    /// Every entry in this collection, keyed without the prefix.
    pub fn get_all(&self) -> Mapping {
        self.db
            .export()
            .into_iter()
            .filter_map(|(full_key, value)| {
                full_key
                    .strip_prefix(&self.prefix)
                    .map(|key| (key.to_string(), value))
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.get_all().len()
    }

    /// True if the key is present, even when its stored value is `null`.
    pub fn exists(&self, key: &str) -> bool {
        self.db.contains_key(&self.full_key(key))
    }
}

impl<S, P, W> fmt::Display for Collection<'_, S, P, W>
where
    S: StorageEngine,
    P: SnapshotStore,
    W: WriteAheadLog,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collection(name='{}', items={})", self.name, self.count())
    }
}
