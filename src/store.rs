//! Append-only JSONL dataset log
//!
//! Every finalized session becomes exactly one line. Existing lines are never
//! rewritten, so the file can be synced to a dataset repository while the
//! server keeps appending.

use crate::state_machine::SessionRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// File operations the sink relies on
#[async_trait]
pub trait LogFile: Send {
    async fn len(&mut self) -> std::io::Result<u64>;

    /// Write all of `bytes` and make them durable
    async fn write_durably(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    async fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

#[async_trait]
impl LogFile for File {
    async fn len(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn write_durably(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes).await?;
        self.flush().await?;
        self.sync_data().await
    }

    async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len).await?;
        self.sync_data().await
    }
}

/// Serialized writer for the dataset file
pub struct JsonlSink<F = File> {
    path: PathBuf,
    file: Mutex<F>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it and its parent directories
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;

        tracing::info!(path = %path.display(), "Dataset log opened");
        Ok(Self::with_file(path, file))
    }
}

impl<F: LogFile> JsonlSink<F> {
    fn with_file(path: PathBuf, file: F) -> Self {
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    /// Write `record` as one line and flush it to disk before returning.
    ///
    /// A failed append leaves the file exactly as it was, so a retry neither
    /// duplicates the record nor glues onto a torn line.
    pub async fn append(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        // One writer at a time keeps lines from interleaving
        let mut file = self.file.lock().await;
        let committed_len = file.len().await.map_err(io_err)?;

        if let Err(source) = file.write_durably(line.as_bytes()).await {
            if let Err(e) = file.truncate(committed_len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to discard partially written record"
                );
            }
            return Err(io_err(source));
        }
        Ok(())
    }
}
