// ABOUTME: Defines Operation, the unit of intent recorded in the write-ahead log.
// ABOUTME: Encodes as a flat JSON object `{kind, key, value?}`; unknown kinds decode without error.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Key, Value};

/// The mutating operation kinds the store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Set,
    Delete,
}

impl OpKind {
    /// The wire name written into the `kind` field of a log record.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Set => "set",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intended mutation of the key space.
///
/// Records written by a newer version with a kind this version does not
/// recognise decode as `Unknown` rather than failing, so that an old binary
/// can still start against a newer log. The orchestrator skips them. An
/// unknown record need not carry a key at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OperationRecord", into = "OperationRecord")]
pub enum Operation {
    Set { key: Key, value: Value },
    Delete { key: Key },
    Unknown { kind: String, key: Option<Key> },
}

impl Operation {
    pub fn set(key: impl Into<Key>, value: Value) -> Self {
        Operation::Set {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<Key>) -> Self {
        Operation::Delete { key: key.into() }
    }

    /// The key this operation targets. Always present for `Set` and `Delete`.
    pub fn key(&self) -> Option<&str> {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key } => Some(key),
            Operation::Unknown { key, .. } => key.as_deref(),
        }
    }

    /// The recognised kind, or `None` for a record from an unknown kind.
    pub fn kind(&self) -> Option<OpKind> {
        match self {
            Operation::Set { .. } => Some(OpKind::Set),
            Operation::Delete { .. } => Some(OpKind::Delete),
            Operation::Unknown { .. } => None,
        }
    }

    /// The raw `kind` string as it appears on disk.
    pub fn kind_name(&self) -> &str {
        match self {
            Operation::Set { .. } => OpKind::Set.as_str(),
            Operation::Delete { .. } => OpKind::Delete.as_str(),
            Operation::Unknown { kind, .. } => kind,
        }
    }
}

/// Flat on-disk shape of an operation.
///
/// `key` is loose here so that records of unknown kinds decode whatever
/// they carry; `set` and `delete` insist on a string key in `try_from`.
#[derive(Serialize, Deserialize)]
struct OperationRecord {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    value: Option<Value>,
}

/// Distinguishes `"value": null` (Some(Null)) from an absent field (None).
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<OperationRecord> for Operation {
    type Error = String;

    fn try_from(record: OperationRecord) -> Result<Self, Self::Error> {
        let known = match record.kind.as_str() {
            "set" => Some(OpKind::Set),
            "delete" => Some(OpKind::Delete),
            _ => None,
        };

        let key = match record.key {
            Some(Value::String(key)) => Some(key),
            Some(other) if known.is_some() => {
                return Err(format!("{} record has a non-string key {}", record.kind, other));
            }
            _ => None,
        };

        match (known, key) {
            (Some(OpKind::Set), Some(key)) => match record.value {
                Some(value) => Ok(Operation::Set { key, value }),
                None => Err(format!("set record for key {:?} has no value", key)),
            },
            (Some(OpKind::Delete), Some(key)) => Ok(Operation::Delete { key }),
            (Some(kind), None) => Err(format!("{} record has no key", kind)),
            (None, key) => Ok(Operation::Unknown {
                kind: record.kind,
                key,
            }),
        }
    }
}

impl From<Operation> for OperationRecord {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Set { key, value } => OperationRecord {
                kind: OpKind::Set.as_str().to_string(),
                key: Some(Value::String(key)),
                value: Some(value),
            },
            Operation::Delete { key } => OperationRecord {
                kind: OpKind::Delete.as_str().to_string(),
                key: Some(Value::String(key)),
                value: None,
            },
            Operation::Unknown { kind, key } => OperationRecord {
                kind,
                key: key.map(Value::String),
                value: None,
            },
        }
    }
}
