//! Append-only record of rejected profile URLs, one per line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::RejectionLogError;

#[async_trait]
pub trait RejectionLog: Send + Sync {
    async fn append(&self, url: &str) -> Result<(), RejectionLogError>;
}

/// Rejection log backed by a text file that persists across runs.
pub struct FileRejectionLog {
    path: PathBuf,
}

impl FileRejectionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_error(&self, source: std::io::Error) -> RejectionLogError {
        RejectionLogError::Append {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl RejectionLog for FileRejectionLog {
    async fn append(&self, url: &str) -> Result<(), RejectionLogError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.append_error(e))?;

        let line = format!("{url}\n");
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.append_error(e))?;
        file.flush().await.map_err(|e| self.append_error(e))?;

        debug!(url, path = %self.path.display(), "Recorded rejected profile");
        Ok(())
    }
}
