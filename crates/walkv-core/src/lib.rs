// ABOUTME: Core library for walkv, containing the key/value data model and the storage engine.
// ABOUTME: This crate has no I/O; durability lives in walkv-store.

pub mod engine;
pub mod operation;

use std::collections::BTreeMap;

pub use engine::{MemoryEngine, StorageEngine};
pub use operation::{OpKind, Operation};

/// Any JSON-compatible value. `serde_json::Value` is a tree, so cyclic
/// values cannot be constructed.
pub use serde_json::Value;

/// Keys live in a single flat namespace.
pub type Key = String;

/// A full key space, as exported from a storage engine or stored in a snapshot.
/// Ordered so that snapshots serialize deterministically.
pub type Mapping = BTreeMap<Key, Value>;
