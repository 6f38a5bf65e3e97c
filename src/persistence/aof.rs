//! Append-Only File
//!
//! Every accepted mutating command is appended to the log in its RESP
//! encoding, before it is applied to the store. Replaying the file through
//! the command dispatcher rebuilds the dataset after a restart.
//!
//! Records are framed by the RESP codec itself, so values may contain any
//! bytes, including CR and LF.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use crate::storage::StorageEngine;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("AOF I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record in the middle of the file could not be decoded
    #[error("corrupted AOF record at byte {offset}: {source}")]
    Corrupted { offset: usize, source: ParseError },
}

/// A sink for mutating commands.
///
/// The dispatcher calls [`log_command`](Persistence::log_command) once per
/// accepted write, before applying it. An `Err` means the command must not
/// be applied.
///
/// A failed append is not fatal to the process. The client gets an error
/// reply, the store stays exactly as the log describes it, and reads keep
/// working, so a full or briefly unavailable disk degrades the server to
/// read-only instead of dropping every connection.
pub trait Persistence: Send + Sync {
    fn log_command(&self, command: &RespValue) -> Result<(), PersistenceError>;
}

/// Discards everything. Used for replay and when the log is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl Persistence for NoPersistence {
    fn log_command(&self, _command: &RespValue) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// When appended data is forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsyncPolicy {
    /// `fsync` after every record
    Always,
    /// Leave flushing to the operating system
    #[default]
    No,
}

impl FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(FsyncPolicy::Always),
            "no" => Ok(FsyncPolicy::No),
            other => Err(format!(
                "invalid fsync policy '{}', expected 'always' or 'no'",
                other
            )),
        }
    }
}

impl fmt::Display for FsyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsyncPolicy::Always => write!(f, "always"),
            FsyncPolicy::No => write!(f, "no"),
        }
    }
}

/// The append-only log file.
#[derive(Debug)]
pub struct AppendOnlyFile {
    path: PathBuf,
    file: Mutex<File>,
    policy: FsyncPolicy,
}

impl AppendOnlyFile {
    /// Opens the log for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(path = %path.display(), fsync = %policy, "Append-only file opened");

        Ok(Self {
            path,
            file: Mutex::new(file),
            policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for AppendOnlyFile {
    fn log_command(&self, command: &RespValue) -> Result<(), PersistenceError> {
        let mut record = Vec::with_capacity(64);
        command.serialize_into(&mut record);

        // One write per record keeps concurrent appends from interleaving
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&record)?;
        if self.policy == FsyncPolicy::Always {
            file.sync_data()?;
        }

        Ok(())
    }
}

/// Replays the log at `path` into `storage` and returns the number of
/// records the dispatcher accepted.
///
/// A missing file is an empty log. A truncated final record, as left by a
/// crash mid-append, is cut off the file so that later appends start on a
/// record boundary. Undecodable bytes anywhere else abort the replay with
/// [`PersistenceError::Corrupted`]. Records the dispatcher rejects are
/// counted separately and skipped.
pub fn replay(path: impl AsRef<Path>, storage: &Arc<StorageEngine>) -> Result<usize, PersistenceError> {
    let path = path.as_ref();
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No append-only file found, starting empty");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    // Replayed writes must not be appended again
    let handler = CommandHandler::new(Arc::clone(storage), Arc::new(NoPersistence));
    let mut parser = RespParser::new();
    let mut offset = 0;
    let mut applied = 0;
    let mut rejected = 0;

    while offset < data.len() {
        match parser.parse(&data[offset..]) {
            Ok(Some((command, consumed))) => {
                if let RespValue::Error(e) = handler.execute(command) {
                    debug!(offset = offset, error = %e, "Replayed record was rejected");
                    rejected += 1;
                } else {
                    applied += 1;
                }
                offset += consumed;
            }
            Ok(None) => {
                warn!(
                    offset = offset,
                    trailing_bytes = data.len() - offset,
                    "Append-only file ends with an incomplete record, truncating it"
                );
                OpenOptions::new()
                    .write(true)
                    .open(path)?
                    .set_len(offset as u64)?;
                break;
            }
            Err(source) => return Err(PersistenceError::Corrupted { offset, source }),
        }
    }

    info!(
        path = %path.display(),
        applied = applied,
        rejected = rejected,
        "Append-only file replayed"
    );
    Ok(applied)
}
