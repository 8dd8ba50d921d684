// ABOUTME: Whole-state snapshot save and load for the key space.
// ABOUTME: Writes one indented JSON object in place and loads it back, absent file meaning no snapshot.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkv_core::Mapping;

use crate::error::ErrorKind;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("snapshot is not valid UTF-8")]
    InvalidUtf8,

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnapshotError::Io(_) => ErrorKind::Io,
            SnapshotError::Decode(_) | SnapshotError::InvalidUtf8 => ErrorKind::Decode,
            SnapshotError::Serialize(_) => ErrorKind::Serialization,
        }
    }
}

/// Point-in-time persistence of an entire key space.
pub trait SnapshotStore {
    /// Replace the stored snapshot with `data`.
    fn dump(&mut self, data: &Mapping) -> Result<(), SnapshotError>;

    /// Load the stored snapshot, or `None` if none has been written yet.
    fn load(&self) -> Result<Option<Mapping>, SnapshotError>;
}

/// A snapshot store backed by a single pretty-printed JSON file.
///
/// The file is truncated and rewritten in place on every dump, so a crash
/// mid-write can leave it corrupt; the next load then fails with a decode
/// error instead of silently starting empty.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    /// Create a store writing to `path`.
    /// Creates the parent directory if it does not exist.
    pub fn new(path: &Path) -> Result<Self, SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn dump(&mut self, data: &Mapping) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(data).map_err(SnapshotError::Serialize)?;

        let mut file = File::create(&self.path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        Ok(())
    }

    fn load(&self) -> Result<Option<Mapping>, SnapshotError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(SnapshotError::InvalidUtf8);
            }
            Err(e) => return Err(e.into()),
        };

        let data: Mapping = serde_json::from_str(&contents).map_err(SnapshotError::Decode)?;
        Ok(Some(data))
    }
}
