// ABOUTME: Append-only JSONL write-ahead log recording intended mutations before they apply.
// ABOUTME: Provides durable append, in-order replay that surfaces corrupt lines, and compaction.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkv_core::Operation;

use crate::error::ErrorKind;

/// Errors that can occur during write-ahead log operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("record on line {line} is not valid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("failed to encode operation: {0}")]
    Encode(#[source] serde_json::Error),
}

impl WalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalError::Io(_) => ErrorKind::Io,
            WalError::Decode { .. } | WalError::InvalidUtf8 { .. } => ErrorKind::Decode,
            WalError::Encode(_) => ErrorKind::Serialization,
        }
    }
}

/// A durable, ordered record of operations since the last snapshot.
pub trait WriteAheadLog {
    /// Durably record `op`. Returns only once the record has reached disk.
    fn append(&mut self, op: &Operation) -> Result<(), WalError>;

    /// Read back every recorded operation in the order it was appended.
    fn replay(&self) -> Result<Vec<Operation>, WalError>;

    /// Discard all records. Calling it on an empty log is a no-op.
    fn compact(&mut self) -> Result<(), WalError>;
}

/// A write-ahead log backed by a single JSONL file.
/// Each line is one JSON-serialized Operation followed by a newline.
pub struct JsonlWal {
    path: PathBuf,
    file: File,
}

impl JsonlWal {
    /// Open (or create) a log file at the given path.
    /// Creates parent directories if they do not exist.
    /// The file is opened in append mode.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path to the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of non-blank records currently in the file. Does not decode them.
    pub fn len(&self) -> Result<usize, WalError> {
        let mut count = 0;
        for line in self.lines()? {
            if !line?.1.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, WalError> {
        Ok(self.len()? == 0)
    }

    /// Iterate over `(line_number, text)` pairs, 1-based. A missing file
    /// reads as empty.
    fn lines(&self) -> Result<impl Iterator<Item = Result<(usize, String), WalError>>, WalError> {
        let file = match File::open(&self.path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let lines = file
            .map(|f| BufReader::new(f).lines())
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(index, line)| {
                let number = index + 1;
                match line {
                    Ok(text) => Ok((number, text)),
                    Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                        Err(WalError::InvalidUtf8 { line: number })
                    }
                    Err(e) => Err(WalError::Io(e)),
                }
            });

        Ok(lines)
    }
}

/// A log file that can be cut back to an earlier length.
trait Truncate {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write one complete record. If the write fails partway, the file is cut
/// back to its previous length so stray bytes cannot merge with the next
/// record.
fn write_record<F: Write + Truncate>(file: &mut F, line: &[u8]) -> io::Result<()> {
    let before = file.current_len()?;
    if let Err(e) = file.write_all(line) {
        if let Err(rollback) = file.truncate(before) {
            tracing::error!("failed to roll back partial WAL record: {}", rollback);
        }
        return Err(e);
    }
    Ok(())
}

impl WriteAheadLog for JsonlWal {
    /// Serializes as one JSON line, writes it with a trailing newline in a
    /// single call, and fsyncs to disk.
    fn append(&mut self, op: &Operation) -> Result<(), WalError> {
        let mut line = serde_json::to_vec(op).map_err(WalError::Encode)?;
        line.push(b'\n');
        write_record(&mut self.file, &line)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Empty lines are skipped. Any other line that fails to decode aborts
    /// the replay; a torn tail is reported, never dropped.
    fn replay(&self) -> Result<Vec<Operation>, WalError> {
        let mut operations = Vec::new();

        for line in self.lines()? {
            let (number, text) = line?;
            if text.trim().is_empty() {
                continue;
            }
            let op: Operation = serde_json::from_str(&text)
                .map_err(|source| WalError::Decode {
                    line: number,
                    source,
                })?;
            operations.push(op);
        }

        Ok(operations)
    }

    fn compact(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }
}
