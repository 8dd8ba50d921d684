// ABOUTME: Entry point for the walkv library, re-exporting the data model and persistence layer.
// ABOUTME: Embed by opening a FileDatabase, or assemble a Database from custom components.

pub use walkv_core::{Key, Mapping, MemoryEngine, OpKind, Operation, StorageEngine, Value};
pub use walkv_store::{
    Collection, ConfigError, DEFAULT_SNAPSHOT_THRESHOLD, Database, DbError, DbEvent, DbObserver,
    DbState, ErrorKind, FileDatabase, JsonSnapshotStore, JsonlWal, NoopObserver,
    SNAPSHOT_FILE_NAME, SnapshotError, SnapshotReason, SnapshotStore, StoreConfig,
    TracingObserver, WAL_FILE_NAME, WalError, WriteAheadLog,
};
