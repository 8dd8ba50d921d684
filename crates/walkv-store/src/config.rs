// ABOUTME: Configuration for the file-backed walkv store.
// ABOUTME: Resolves data locations and the snapshot threshold from defaults or environment variables.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Mutations between automatic snapshots when nothing else is configured.
pub const DEFAULT_SNAPSHOT_THRESHOLD: usize = 100;

/// File names used inside a data directory laid out by [`StoreConfig::new`].
pub const WAL_FILE_NAME: &str = "wal.log";
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.json";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("WALKV_SNAPSHOT_THRESHOLD is not a non-negative integer: {0}")]
    InvalidThreshold(String),
}

/// Where a store keeps its files and how often it snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub snapshot_threshold: usize,
}

impl StoreConfig {
    /// Lay out `wal.log` and `snapshot.json` inside `data_dir` with the
    /// default threshold.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            wal_path: data_dir.join(WAL_FILE_NAME),
            snapshot_path: data_dir.join(SNAPSHOT_FILE_NAME),
            data_dir,
            snapshot_threshold: DEFAULT_SNAPSHOT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.snapshot_threshold = threshold;
        self
    }

    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - WALKV_HOME: data directory (default: ~/.walkv)
    /// - WALKV_WAL_PATH: write-ahead log file (default: $WALKV_HOME/wal.log)
    /// - WALKV_SNAPSHOT_PATH: snapshot file (default: $WALKV_HOME/snapshot.json)
    /// - WALKV_SNAPSHOT_THRESHOLD: mutations between snapshots (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = std::env::var("WALKV_HOME")
            .ok()
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".walkv")
            });

        let mut config = Self::new(data_dir);

        if let Some(path) = env_path("WALKV_WAL_PATH") {
            config.wal_path = path;
        }
        if let Some(path) = env_path("WALKV_SNAPSHOT_PATH") {
            config.snapshot_path = path;
        }

        if let Ok(raw) = std::env::var("WALKV_SNAPSHOT_THRESHOLD") {
            config.snapshot_threshold = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidThreshold(raw))?;
        }

        Ok(config)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}
