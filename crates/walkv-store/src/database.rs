// ABOUTME: The Database orchestrator binding storage engine, snapshot store, and write-ahead log.
// ABOUTME: Runs recovery at startup, logs every mutation before applying it, and snapshots on a threshold.

use std::sync::Arc;

use walkv_core::{Key, Mapping, MemoryEngine, OpKind, Operation, StorageEngine, Value};

use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::error::DbError;
use crate::observer::{DbEvent, DbObserver, SnapshotReason, TracingObserver};
use crate::snapshot::{JsonSnapshotStore, SnapshotStore};
use crate::wal::{JsonlWal, WriteAheadLog};

/// Lifecycle of a Database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Closed,
}

/// The default file-backed stack.
pub type FileDatabase = Database<MemoryEngine, JsonSnapshotStore, JsonlWal>;

/// A durable key-value store.
///
/// Every mutation is appended to the write-ahead log before it touches the
/// storage engine. After `snapshot_threshold` mutations the full state is
/// written to the snapshot store and the log is truncated, so on disk the
/// logical state is always the snapshot plus the operations in the log.
///
/// Mutating calls take `&mut self`; a handle has exactly one writer. Two
/// handles must never share the same log or snapshot file.
pub struct Database<S, P, W> {
    storage: S,
    snapshots: P,
    wal: W,
    threshold: usize,
    operation_count: usize,
    state: DbState,
    observer: Arc<dyn DbObserver>,
}

impl FileDatabase {
    /// Open the file-backed store described by `config`, creating its
    /// directories and files as needed, and recover its state.
    pub fn open(config: &StoreConfig) -> Result<Self, DbError> {
        let snapshots = JsonSnapshotStore::new(&config.snapshot_path)?;
        let wal = JsonlWal::open(&config.wal_path)?;
        Database::new(MemoryEngine::new(), snapshots, wal, config.snapshot_threshold)
    }
}

impl<S, P, W> Database<S, P, W>
where
    S: StorageEngine,
    P: SnapshotStore,
    W: WriteAheadLog,
{
    /// Build a database from its components and recover state, reporting
    /// events through `tracing`.
    pub fn new(storage: S, snapshots: P, wal: W, threshold: usize) -> Result<Self, DbError> {
        Self::with_observer(storage, snapshots, wal, threshold, Arc::new(TracingObserver))
    }

    /// Like `new`, with an explicit observer.
    ///
    /// Recovery loads the snapshot (if any), then replays the log in order.
    /// When anything was replayed the result is snapshotted and the log
    /// compacted before the handle is returned, so a successful open always
    /// leaves the log empty.
    pub fn with_observer(
        storage: S,
        snapshots: P,
        wal: W,
        threshold: usize,
        observer: Arc<dyn DbObserver>,
    ) -> Result<Self, DbError> {
        let mut db = Self {
            storage,
            snapshots,
            wal,
            threshold,
            operation_count: 0,
            state: DbState::Uninitialized,
            observer,
        };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&mut self) -> Result<(), DbError> {
        self.state = DbState::Initializing;

        match self.snapshots.load()? {
            Some(data) => {
                self.observer
                    .observe(&DbEvent::SnapshotLoaded { entries: data.len() });
                self.storage.import(data);
            }
            None => self.observer.observe(&DbEvent::SnapshotMissing),
        }

        let operations = self.wal.replay()?;
        if operations.is_empty() {
            self.observer.observe(&DbEvent::WalEmpty);
        } else {
            self.observer.observe(&DbEvent::WalReplayed {
                operations: operations.len(),
            });
            for op in operations {
                self.apply(op);
            }
            self.checkpoint(SnapshotReason::Recovery)?;
        }

        self.state = DbState::Ready;
        self.observer.observe(&DbEvent::Ready {
            entries: self.storage.len(),
        });
        Ok(())
    }

    /// Store `value` under `key`.
    ///
    /// The operation is durable once this returns `Ok`. If the append
    /// succeeds but a threshold snapshot then fails, the error is returned
    /// even though the write is already logged and visible; retrying the
    /// call logs it a second time.
    pub fn set(&mut self, key: impl Into<Key>, value: Value) -> Result<(), DbError> {
        self.ensure_ready()?;
        let op = Operation::set(key, value);
        self.wal.append(&op)?;
        self.apply(op);
        self.record_mutation()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let value = self.storage.get(key);
        self.observer.observe(&DbEvent::Read {
            key,
            found: value.is_some(),
        });
        value
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }

    /// Remove `key`, returning whether it existed. Deleting an absent key
    /// is still logged and counts toward the snapshot threshold.
    pub fn delete(&mut self, key: &str) -> Result<bool, DbError> {
        self.ensure_ready()?;
        let op = Operation::delete(key);
        self.wal.append(&op)?;
        let existed = self.apply(op);
        self.record_mutation()?;
        Ok(existed)
    }

    /// Snapshot the current state and compact the log now, regardless of
    /// the mutation counter.
    pub fn snapshot_now(&mut self) -> Result<(), DbError> {
        self.ensure_ready()?;
        self.checkpoint(SnapshotReason::Manual)
    }

    /// Write a final snapshot, compact the log, and close the handle.
    ///
    /// If the final snapshot fails the handle stays `Ready` and the log
    /// still holds every operation since the last good snapshot.
    pub fn shutdown(&mut self) -> Result<(), DbError> {
        self.ensure_ready()?;
        self.state = DbState::ShuttingDown;
        self.observer.observe(&DbEvent::ShuttingDown);

        if let Err(e) = self.checkpoint(SnapshotReason::Shutdown) {
            self.state = DbState::Ready;
            return Err(e);
        }

        self.state = DbState::Closed;
        self.observer.observe(&DbEvent::Closed);
        Ok(())
    }

    /// A key-prefixed view over this database.
    pub fn collection(&mut self, name: impl Into<String>) -> Collection<'_, S, P, W> {
        Collection::new(self, name)
    }

    /// An owned copy of every live key and value.
    pub fn export(&self) -> Mapping {
        self.storage.export()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Mutations applied since the last snapshot.
    pub fn operation_count(&self) -> usize {
        self.operation_count
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn state(&self) -> DbState {
        self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn snapshots(&self) -> &P {
        &self.snapshots
    }

    pub fn wal(&self) -> &W {
        &self.wal
    }

    fn ensure_ready(&self) -> Result<(), DbError> {
        match self.state {
            DbState::Ready => Ok(()),
            _ => Err(DbError::Closed),
        }
    }

    /// Apply one operation to the storage engine. Returns whether the
    /// operation's key was present beforehand. Unknown kinds are skipped.
    fn apply(&mut self, op: Operation) -> bool {
        match op {
            Operation::Set { key, value } => {
                let existed = self.storage.contains_key(&key);
                self.observer.observe(&DbEvent::Mutation {
                    kind: OpKind::Set,
                    key: &key,
                    existed,
                });
                self.storage.set(key, value);
                existed
            }
            Operation::Delete { key } => {
                let existed = self.storage.delete(&key);
                self.observer.observe(&DbEvent::Mutation {
                    kind: OpKind::Delete,
                    key: &key,
                    existed,
                });
                existed
            }
            Operation::Unknown { kind, key } => {
                self.observer.observe(&DbEvent::UnknownOperation {
                    kind: &kind,
                    key: key.as_deref(),
                });
                false
            }
        }
    }

    fn record_mutation(&mut self) -> Result<(), DbError> {
        self.operation_count += 1;
        if self.operation_count >= self.threshold {
            self.checkpoint(SnapshotReason::Threshold)?;
        }
        Ok(())
    }

    /// Persist the full state, then truncate the log. The counter resets
    /// only after both steps succeed.
    fn checkpoint(&mut self, reason: SnapshotReason) -> Result<(), DbError> {
        let data = self.storage.export();
        self.snapshots.dump(&data)?;
        self.wal.compact()?;
        self.operation_count = 0;
        self.observer.observe(&DbEvent::SnapshotWritten {
            reason,
            entries: data.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::snapshot::SnapshotError;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn open(dir: &TempDir, threshold: usize) -> FileDatabase {
        FileDatabase::open(&StoreConfig::new(dir.path()).with_threshold(threshold)).unwrap()
    }

    fn snapshot_on_disk(dir: &TempDir) -> Mapping {
        let contents = fs::read_to_string(dir.path().join("snapshot.json")).unwrap();
        serde_json::from_str(&contents).unwrap()
    }

    fn wal_on_disk(dir: &TempDir) -> Vec<Operation> {
        JsonlWal::open(&dir.path().join("wal.log"))
            .unwrap()
            .replay()
            .unwrap()
    }

    /// Records every event as its Debug rendering.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl DbObserver for Recorder {
        fn observe(&self, event: &DbEvent<'_>) {
            self.events.lock().unwrap().push(format!("{:?}", event));
        }
    }

    /// Refuses to snapshot any state holding the marker string, standing in
    /// for a value graph the encoder cannot represent.
    struct CycleRejectingSnapshots {
        inner: JsonSnapshotStore,
        dumps: usize,
    }

    const CYCLE_MARKER: &str = "<cycle>";

    fn unencodable() -> serde_json::Error {
        let mut bad = BTreeMap::new();
        bad.insert((1, 2), 0);
        serde_json::to_string(&bad).unwrap_err()
    }

    impl SnapshotStore for CycleRejectingSnapshots {
        fn dump(&mut self, data: &Mapping) -> Result<(), SnapshotError> {
            self.dumps += 1;
            if data.values().any(|v| v == CYCLE_MARKER) {
                return Err(SnapshotError::Serialize(unencodable()));
            }
            self.inner.dump(data)
        }

        fn load(&self) -> Result<Option<Mapping>, SnapshotError> {
            self.inner.load()
        }
    }

    #[test]
    fn set_get_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 100);

        assert!(db.get("missing").is_none());
        db.set("key1", json!("value1")).unwrap();
        assert_eq!(db.get("key1"), Some(&json!("value1")));

        db.set("key1", json!("value2")).unwrap();
        assert_eq!(db.get("key1"), Some(&json!("value2")));
        assert_eq!(db.len(), 1);
        assert_eq!(db.state(), DbState::Ready);
    }

    #[test]
    fn get_does_not_log_or_count() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 100);
        db.set("a", json!(1)).unwrap();

        for _ in 0..5 {
            db.get("a");
            db.get("b");
        }

        assert_eq!(db.operation_count(), 1);
        assert_eq!(db.wal().len().unwrap(), 1);
    }

    #[test]
    fn mutations_are_logged_in_order() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 100);

        db.set("key1", json!("value1")).unwrap();
        db.set("key2", json!("value2")).unwrap();
        assert!(db.delete("key1").unwrap());

        assert_eq!(
            wal_on_disk(&dir),
            vec![
                Operation::set("key1", json!("value1")),
                Operation::set("key2", json!("value2")),
                Operation::delete("key1"),
            ]
        );
    }

    #[test]
    fn delete_of_absent_key_is_logged_and_counted() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 100);

        assert!(!db.delete("nobody").unwrap());

        assert_eq!(db.operation_count(), 1);
        assert_eq!(wal_on_disk(&dir), vec![Operation::delete("nobody")]);
    }

    #[test]
    fn threshold_snapshot_scenario() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 3);

        db.set("a", json!(1)).unwrap();
        db.set("b", json!(2)).unwrap();
        db.set("c", json!(3)).unwrap();

        let expected: Mapping =
            serde_json::from_value(json!({"a": 1, "b": 2, "c": 3})).unwrap();
        assert_eq!(snapshot_on_disk(&dir), expected);
        assert!(wal_on_disk(&dir).is_empty());
        assert_eq!(db.operation_count(), 0);
    }

    #[test]
    fn threshold_boundary() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 4);

        db.set("a", json!(1)).unwrap();
        db.delete("a").unwrap();
        db.set("b", json!(2)).unwrap();
        assert_eq!(db.operation_count(), 3);
        assert_eq!(db.wal().len().unwrap(), 3);
        assert!(!dir.path().join("snapshot.json").exists());

        db.delete("zzz").unwrap();
        assert_eq!(db.operation_count(), 0);
        assert_eq!(db.wal().len().unwrap(), 0);
        assert_eq!(db.snapshots().load().unwrap(), Some(db.export()));
    }

    #[test]
    fn thresholds_zero_and_one_snapshot_every_mutation() {
        for threshold in [0, 1] {
            let dir = TempDir::new().unwrap();
            let mut db = open(&dir, threshold);

            db.set("a", json!(1)).unwrap();
            assert_eq!(db.operation_count(), 0, "threshold {}", threshold);
            assert!(wal_on_disk(&dir).is_empty());
            assert_eq!(snapshot_on_disk(&dir).get("a"), Some(&json!(1)));

            db.delete("a").unwrap();
            assert_eq!(db.operation_count(), 0);
            assert!(snapshot_on_disk(&dir).is_empty());
        }
    }

    #[test]
    fn crash_recovery_replays_wal_tail() {
        let dir = TempDir::new().unwrap();
        {
            let mut db = open(&dir, 100);
            db.set("a", json!(1)).unwrap();
            db.set("b", json!({"nested": [1, 2]})).unwrap();
            db.set("a", json!(10)).unwrap();
            db.delete("b").unwrap();
            db.set("c", json!(null)).unwrap();
            // dropped without shutdown
        }
        assert_eq!(wal_on_disk(&dir).len(), 5);

        let db = open(&dir, 100);
        assert_eq!(db.get("a"), Some(&json!(10)));
        assert!(db.get("b").is_none());
        assert_eq!(db.get("c"), Some(&json!(null)));
        assert_eq!(db.operation_count(), 0);

        assert!(db.wal().replay().unwrap().is_empty());
        assert_eq!(snapshot_on_disk(&dir), db.export());
    }

    #[test]
    fn recovery_applies_wal_on_top_of_snapshot() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("snapshot.json"), r#"{"x": 1}"#).unwrap();
        fs::write(
            dir.path().join("wal.log"),
            "{\"kind\":\"set\",\"key\":\"y\",\"value\":2}\n{\"kind\":\"delete\",\"key\":\"x\"}\n",
        )
        .unwrap();

        let db = open(&dir, 100);

        let expected: Mapping = serde_json::from_value(json!({"y": 2})).unwrap();
        assert_eq!(db.export(), expected);
        assert!(wal_on_disk(&dir).is_empty());
        assert_eq!(snapshot_on_disk(&dir), expected);
    }

    #[test]
    fn recovery_without_wal_entries_leaves_snapshot_alone() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("snapshot.json"), "{\"x\":1}").unwrap();
        let recorder = Arc::new(Recorder::default());

        let config = StoreConfig::new(dir.path());
        let db = Database::with_observer(
            MemoryEngine::new(),
            JsonSnapshotStore::new(&config.snapshot_path).unwrap(),
            JsonlWal::open(&config.wal_path).unwrap(),
            100,
            recorder.clone(),
        )
        .unwrap();

        assert_eq!(db.get("x"), Some(&json!(1)));
        assert!(db.wal().replay().unwrap().is_empty());
        // Untouched: still the compact form written above
        assert_eq!(
            fs::read_to_string(dir.path().join("snapshot.json")).unwrap(),
            "{\"x\":1}"
        );

        let events = recorder.events();
        assert_eq!(events[0], "SnapshotLoaded { entries: 1 }");
        assert_eq!(events[1], "WalEmpty");
        assert_eq!(events[2], "Ready { entries: 1 }");
    }

    #[test]
    fn unknown_wal_kinds_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wal.log"),
            concat!(
                "{\"kind\":\"set\",\"key\":\"a\",\"value\":1}\n",
                "{\"kind\":\"increment\",\"key\":\"a\",\"value\":5}\n",
                "{\"kind\":\"expire\",\"key\":\"b\"}\n",
                "{\"kind\":\"set\",\"key\":\"b\",\"value\":2}\n",
            ),
        )
        .unwrap();
        let recorder = Arc::new(Recorder::default());

        let config = StoreConfig::new(dir.path());
        let db = Database::with_observer(
            MemoryEngine::new(),
            JsonSnapshotStore::new(&config.snapshot_path).unwrap(),
            JsonlWal::open(&config.wal_path).unwrap(),
            100,
            recorder.clone(),
        )
        .unwrap();

        assert_eq!(db.get("a"), Some(&json!(1)));
        assert_eq!(db.get("b"), Some(&json!(2)));
        assert_eq!(db.len(), 2);
        assert!(wal_on_disk(&dir).is_empty());

        let events = recorder.events();
        assert!(events.contains(&"WalReplayed { operations: 4 }".to_string()));
        assert!(
            events.contains(&r#"UnknownOperation { kind: "increment", key: Some("a") }"#.to_string())
        );
        assert!(events.contains(&r#"UnknownOperation { kind: "expire", key: Some("b") }"#.to_string()));
        assert!(events.contains(
            &"SnapshotWritten { reason: Recovery, entries: 2 }".to_string()
        ));
    }

    #[test]
    fn unknown_kinds_without_key_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wal.log"),
            concat!(
                "{\"kind\":\"set\",\"key\":\"a\",\"value\":1}\n",
                "{\"kind\":\"clear\"}\n",
                "{\"kind\":\"checkpoint\",\"key\":7}\n",
                "{\"kind\":\"set\",\"key\":\"b\",\"value\":2}\n",
            ),
        )
        .unwrap();

        let db = open(&dir, 100);
        assert_eq!(db.get("a"), Some(&json!(1)));
        assert_eq!(db.get("b"), Some(&json!(2)));
        assert_eq!(db.len(), 2);
        assert!(wal_on_disk(&dir).is_empty());
    }

    #[test]
    fn floats_survive_restart_bit_for_bit() {
        let floats = [
            1.0715660391465826e-75,
            -1.81996730402717e-179,
            -1.603964615428183e143,
            0.1,
            f64::MAX,
            f64::MIN_POSITIVE,
        ];
        let dir = TempDir::new().unwrap();
        {
            let mut db = open(&dir, 100);
            for (i, f) in floats.iter().enumerate() {
                db.set(format!("f{}", i), json!(f)).unwrap();
            }
            db.shutdown().unwrap();
        }

        // Through the snapshot
        let db = open(&dir, 100);
        for (i, f) in floats.iter().enumerate() {
            assert_eq!(db.get(&format!("f{}", i)), Some(&json!(f)), "{:e}", f);
        }
        drop(db);

        // Through the WAL, after a crash
        let dir = TempDir::new().unwrap();
        {
            let mut db = open(&dir, 100);
            for (i, f) in floats.iter().enumerate() {
                db.set(format!("f{}", i), json!(f)).unwrap();
            }
        }
        let db = open(&dir, 100);
        for (i, f) in floats.iter().enumerate() {
            let stored = db.get(&format!("f{}", i)).and_then(|v| v.as_f64());
            assert_eq!(stored.map(f64::to_bits), Some(f.to_bits()), "{:e}", f);
        }
    }

    #[test]
    fn corrupt_wal_fails_startup() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wal.log"),
            "{\"kind\":\"set\",\"key\":\"a\",\"value\":1}\n{\"kind\":\"set\",\"ke",
        )
        .unwrap();

        let result = FileDatabase::open(&StoreConfig::new(dir.path()));
        let err = result.err().expect("startup should fail");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(matches!(err, DbError::Wal(_)));

        // Nothing was repaired or compacted
        let contents = fs::read_to_string(dir.path().join("wal.log")).unwrap();
        assert!(contents.ends_with("\"ke"));
        assert!(!dir.path().join("snapshot.json").exists());
    }

    #[test]
    fn corrupt_snapshot_fails_startup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("snapshot.json"), "{\"a\": 1,").unwrap();

        let err = FileDatabase::open(&StoreConfig::new(dir.path()))
            .err()
            .expect("startup should fail");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(matches!(err, DbError::Snapshot(_)));
    }

    #[test]
    fn shutdown_snapshots_and_closes() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 100);
        db.set("key1", json!("value1")).unwrap();
        db.set("key2", json!([1, 2, 3])).unwrap();
        assert_eq!(db.operation_count(), 2);

        db.shutdown().unwrap();

        assert_eq!(db.state(), DbState::Closed);
        assert_eq!(db.operation_count(), 0);
        assert!(wal_on_disk(&dir).is_empty());
        assert_eq!(snapshot_on_disk(&dir), db.export());

        // Reads still see the in-memory state; writes are refused
        assert_eq!(db.get("key1"), Some(&json!("value1")));
        assert_eq!(db.set("key3", json!(3)).unwrap_err().kind(), ErrorKind::Closed);
        assert!(matches!(db.delete("key1"), Err(DbError::Closed)));
        assert!(matches!(db.shutdown(), Err(DbError::Closed)));
        assert!(matches!(db.snapshot_now(), Err(DbError::Closed)));
        assert!(wal_on_disk(&dir).is_empty());
    }

    #[test]
    fn persistence_across_clean_restart() {
        let dir = TempDir::new().unwrap();
        {
            let mut db = open(&dir, 100);
            db.set("empty_string", json!("")).unwrap();
            db.set("zero", json!(0)).unwrap();
            db.set("negative", json!(-42)).unwrap();
            db.set("float_zero", json!(0.0)).unwrap();
            db.set("empty_list", json!([])).unwrap();
            db.set("empty_dict", json!({})).unwrap();
            db.set("false", json!(false)).unwrap();
            db.set("null", json!(null)).unwrap();
            db.set("unicode", json!("ключ 🔑")).unwrap();
            db.shutdown().unwrap();
        }

        let db = open(&dir, 100);
        assert_eq!(db.get("empty_string"), Some(&json!("")));
        assert_eq!(db.get("zero"), Some(&json!(0)));
        assert_eq!(db.get("negative"), Some(&json!(-42)));
        assert_eq!(db.get("float_zero"), Some(&json!(0.0)));
        assert_eq!(db.get("empty_list"), Some(&json!([])));
        assert_eq!(db.get("empty_dict"), Some(&json!({})));
        assert_eq!(db.get("false"), Some(&json!(false)));
        assert_eq!(db.get("null"), Some(&json!(null)));
        assert_eq!(db.get("unicode"), Some(&json!("ключ 🔑")));
        assert_eq!(db.len(), 9);
    }

    #[test]
    fn snapshot_now_resets_counter() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir, 100);
        db.set("a", json!(1)).unwrap();
        db.set("b", json!(2)).unwrap();

        db.snapshot_now().unwrap();

        assert_eq!(db.operation_count(), 0);
        assert!(wal_on_disk(&dir).is_empty());
        assert_eq!(snapshot_on_disk(&dir), db.export());
        assert_eq!(db.state(), DbState::Ready);
    }

    #[test]
    fn unencodable_value_fails_only_when_threshold_snapshots() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let snapshots = CycleRejectingSnapshots {
            inner: JsonSnapshotStore::new(&config.snapshot_path).unwrap(),
            dumps: 0,
        };
        let mut db = Database::new(
            MemoryEngine::new(),
            snapshots,
            JsonlWal::open(&config.wal_path).unwrap(),
            2,
        )
        .unwrap();

        // Below the threshold no snapshot is attempted, so nothing fails
        db.set("loop", json!(CYCLE_MARKER)).unwrap();
        assert_eq!(db.snapshots().dumps, 0);

        // The second mutation reaches the threshold and the snapshot fails
        let err = db.set("other", json!(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert_eq!(db.snapshots().dumps, 1);

        // The failed call's mutation was already logged and applied
        assert_eq!(db.get("other"), Some(&json!(1)));
        assert_eq!(db.wal().len().unwrap(), 2);
        assert_eq!(db.operation_count(), 2);
        assert!(!config.snapshot_path.exists());

        // A blind retry logs the same mutation again
        assert!(db.set("other", json!(1)).is_err());
        assert_eq!(db.wal().len().unwrap(), 3);

        // Once the offending value is gone the next snapshot succeeds
        db.delete("loop").unwrap();
        assert_eq!(db.operation_count(), 0);
        assert!(db.wal().replay().unwrap().is_empty());
    }

    #[test]
    fn failed_shutdown_keeps_handle_ready() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let snapshots = CycleRejectingSnapshots {
            inner: JsonSnapshotStore::new(&config.snapshot_path).unwrap(),
            dumps: 0,
        };
        let mut db = Database::new(
            MemoryEngine::new(),
            snapshots,
            JsonlWal::open(&config.wal_path).unwrap(),
            100,
        )
        .unwrap();
        db.set("loop", json!(CYCLE_MARKER)).unwrap();

        assert_eq!(db.shutdown().unwrap_err().kind(), ErrorKind::Serialization);
        assert_eq!(db.state(), DbState::Ready);
        assert_eq!(db.wal().len().unwrap(), 1);

        db.delete("loop").unwrap();
        db.shutdown().unwrap();
        assert_eq!(db.state(), DbState::Closed);
    }

    #[test]
    fn startup_events_on_fresh_directory() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let config = StoreConfig::new(dir.path()).with_threshold(1);

        let mut db = Database::with_observer(
            MemoryEngine::new(),
            JsonSnapshotStore::new(&config.snapshot_path).unwrap(),
            JsonlWal::open(&config.wal_path).unwrap(),
            config.snapshot_threshold,
            recorder.clone(),
        )
        .unwrap();
        db.set("k", json!(true)).unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                "SnapshotMissing".to_string(),
                "WalEmpty".to_string(),
                "Ready { entries: 0 }".to_string(),
                r#"Mutation { kind: Set, key: "k", existed: false }"#.to_string(),
                "SnapshotWritten { reason: Threshold, entries: 1 }".to_string(),
            ]
        );
        assert!(wal_on_disk(&dir).is_empty());
    }
}
