//! # parley-store
//!
//! Durable message log for the Parley chat server.
//!
//! The store keeps the full message history in memory and mirrors it to a
//! JSON snapshot on disk. The snapshot is loaded once at startup and
//! rewritten wholesale on each flush; within the process, reads always see
//! every appended message regardless of flush outcome.
//!
//! Appends are synchronous so the engine can order them inside its
//! serialized section; flushing is async I/O performed afterwards, outside
//! any engine lock.

use parley_protocol::ChatMessage;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error reading or writing the snapshot.
    #[error("Message log I/O error at {path}: {source}")]
    Io {
        /// Snapshot path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot exists but is not a valid message log.
    ///
    /// This is fatal at startup: starting with an empty log would silently
    /// mask data loss.
    #[error("Corrupt message log at {path}: {source}")]
    Corrupt {
        /// Snapshot path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory log could not be encoded for writing.
    #[error("Failed to encode message log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The durable message log.
///
/// Single source of truth for message history. The in-memory log is the
/// authoritative read path; the on-disk snapshot is best-effort after
/// startup (flush failures are reported to the caller, not hidden, but
/// never remove already-appended messages).
#[derive(Debug)]
pub struct MessageStore {
    /// Snapshot path.
    path: PathBuf,
    /// Full message history, append order.
    log: RwLock<Vec<ChatMessage>>,
    /// Serializes snapshot rewrites so concurrent flushes cannot interleave.
    flush_lock: Mutex<()>,
}

impl MessageStore {
    /// Load the store from a snapshot file.
    ///
    /// A missing file starts an empty log; an unparsable file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the snapshot exists but cannot be
    /// parsed, or [`StoreError::Io`] on any other read failure.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let log = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let messages: Vec<ChatMessage> =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                info!(path = %path.display(), messages = messages.len(), "Loaded message log");
                messages
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No message log found, starting empty");
                Vec::new()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        Ok(Self {
            path,
            log: RwLock::new(log),
            flush_lock: Mutex::new(()),
        })
    }

    /// Append a message to the in-memory log.
    ///
    /// Synchronous by design: the engine calls this inside its serialized
    /// section so append order equals broadcast order. The durable snapshot
    /// is updated by a subsequent [`flush`](Self::flush).
    pub fn append(&self, message: ChatMessage) {
        let mut log = self.log.write().expect("message log lock poisoned");
        log.push(message);
        debug!(messages = log.len(), "Appended message");
    }

    /// Rewrite the durable snapshot from the current in-memory log.
    ///
    /// Writes to a temporary file and renames it over the snapshot, so a
    /// crash mid-write leaves the previous snapshot intact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the snapshot cannot be written. The
    /// in-memory log is unaffected either way.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;

        let bytes = {
            let log = self.log.read().expect("message log lock poisoned");
            serde_json::to_vec_pretty(&*log)?
        };

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Flushed message log");
        Ok(())
    }

    /// Get all messages for a room, in insertion order.
    #[must_use]
    pub fn history_of(&self, room: &str) -> Vec<ChatMessage> {
        let log = self.log.read().expect("message log lock poisoned");
        log.iter().filter(|m| m.room == room).cloned().collect()
    }

    /// Total number of messages across all rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().expect("message log lock poisoned").len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The snapshot path this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
