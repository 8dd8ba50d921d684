// ABOUTME: Persistence layer for walkv, making the in-memory engine durable across restarts.
// ABOUTME: Provides the JSONL write-ahead log, JSON snapshots, config, and the recovering Database.

pub mod collection;
pub mod config;
pub mod database;
pub mod error;
pub mod observer;
pub mod snapshot;
pub mod wal;

pub use collection::Collection;
pub use config::{
    ConfigError, DEFAULT_SNAPSHOT_THRESHOLD, SNAPSHOT_FILE_NAME, StoreConfig, WAL_FILE_NAME,
};
pub use database::{Database, DbState, FileDatabase};
pub use error::{DbError, ErrorKind};
pub use observer::{DbEvent, DbObserver, NoopObserver, SnapshotReason, TracingObserver};
pub use snapshot::{JsonSnapshotStore, SnapshotError, SnapshotStore};
pub use wal::{JsonlWal, WalError, WriteAheadLog};
