// ABOUTME: Error type returned by Database operations and the coarse error taxonomy.
// ABOUTME: Wraps WAL and snapshot errors; ErrorKind lets callers branch on io/decode/serialization.

use std::fmt;

use thiserror::Error;

use crate::snapshot::SnapshotError;
use crate::wal::WalError;

/// Broad classes of failure, independent of which component raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A filesystem read, write, append, or truncate failed.
    Io,
    /// Persisted content (a log line or the snapshot file) is malformed.
    Decode,
    /// State could not be encoded for persistence.
    Serialization,
    /// The database has been shut down.
    Closed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::Decode => "decode",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("database is closed")]
    Closed,
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Wal(e) => e.kind(),
            DbError::Snapshot(e) => e.kind(),
            DbError::Closed => ErrorKind::Closed,
        }
    }
}
