// ABOUTME: Observer hook through which the Database reports lifecycle and mutation events.
// ABOUTME: TracingObserver forwards events to `tracing`; NoopObserver drops them.

use std::fmt;

use walkv_core::OpKind;

/// Why a snapshot was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReason {
    /// The WAL had entries at startup and was folded into a fresh snapshot.
    Recovery,
    /// The mutation counter reached the configured threshold.
    Threshold,
    /// An explicit `snapshot_now` call.
    Manual,
    /// The final snapshot taken by `shutdown`.
    Shutdown,
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotReason::Recovery => "recovery",
            SnapshotReason::Threshold => "threshold",
            SnapshotReason::Manual => "manual",
            SnapshotReason::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Something that happened inside a Database.
#[derive(Debug, Clone, PartialEq)]
pub enum DbEvent<'a> {
    SnapshotLoaded { entries: usize },
    SnapshotMissing,
    WalReplayed { operations: usize },
    WalEmpty,
    /// A replayed record had a kind this version does not handle and was skipped.
    UnknownOperation { kind: &'a str, key: Option<&'a str> },
    Mutation { kind: OpKind, key: &'a str, existed: bool },
    Read { key: &'a str, found: bool },
    SnapshotWritten { reason: SnapshotReason, entries: usize },
    Ready { entries: usize },
    ShuttingDown,
    Closed,
}

/// Receives events from a Database. Implementations must not panic.
pub trait DbObserver: Send + Sync {
    fn observe(&self, event: &DbEvent<'_>);
}

/// Forwards every event to the `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DbObserver for TracingObserver {
    fn observe(&self, event: &DbEvent<'_>) {
        match event {
            DbEvent::SnapshotLoaded { entries } => {
                tracing::info!("loaded snapshot with {} entries", entries);
            }
            DbEvent::SnapshotMissing => {
                tracing::info!("no snapshot found, starting from empty state");
            }
            DbEvent::WalReplayed { operations } => {
                tracing::info!("replaying {} operations from WAL", operations);
            }
            DbEvent::WalEmpty => tracing::info!("WAL is empty"),
            DbEvent::UnknownOperation { kind, key } => {
                tracing::warn!("skipping WAL record with unknown kind {:?} for key {:?}", kind, key);
            }
            DbEvent::Mutation { kind, key, existed } => {
                tracing::debug!("{} {:?} (existed: {})", kind, key, existed);
            }
            DbEvent::Read { key, found } => {
                tracing::trace!("get {:?} (found: {})", key, found);
            }
            DbEvent::SnapshotWritten { reason, entries } => {
                tracing::info!("wrote {} snapshot with {} entries, WAL compacted", reason, entries);
            }
            DbEvent::Ready { entries } => {
                tracing::info!("database ready with {} entries", entries);
            }
            DbEvent::ShuttingDown => tracing::info!("database shutting down"),
            DbEvent::Closed => tracing::info!("database closed"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DbObserver for NoopObserver {
    fn observe(&self, _event: &DbEvent<'_>) {}
}
