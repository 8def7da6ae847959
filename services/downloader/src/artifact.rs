//! In-progress artifact files with rename-on-finish semantics.
//!
//! An artifact lives under `<stamp>.grb.partial` while slices are appended
//! and is renamed to `<stamp>.grb` only once the slice loop has finished.
//! A process killed mid-run therefore leaves only the `.partial` name behind,
//! which the retention pass removes.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Extension of a finished artifact.
pub const FINAL_EXTENSION: &str = "grb";

/// Suffix marking an artifact that is still being written.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Whether a file name carries the in-progress marker.
pub fn is_partial(name: &str) -> bool {
    name.ends_with(PARTIAL_SUFFIX)
}

/// Final file name for an artifact started at `started_at`.
pub fn final_name(started_at: DateTime<Utc>) -> String {
    format!("{}.{}", started_at.format("%Y%m%d%H%M%S"), FINAL_EXTENSION)
}

/// Append-only handle on an in-progress artifact.
#[derive(Debug)]
pub struct ArtifactWriter {
    file: File,
    partial_path: PathBuf,
    final_path: PathBuf,
    len: u64,
}

impl ArtifactWriter {
    /// Create a fresh in-progress artifact in `dir`.
    ///
    /// Fails if either the in-progress or the final name is already taken.
    pub async fn create(dir: &Path, started_at: DateTime<Utc>) -> io::Result<Self> {
        let final_path = dir.join(final_name(started_at));
        let partial_path = dir.join(format!("{}{}", final_name(started_at), PARTIAL_SUFFIX));

        if fs::try_exists(&final_path).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("artifact already exists: {}", final_path.display()),
            ));
        }

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&partial_path)
            .await?;

        debug!(path = %partial_path.display(), "Created in-progress artifact");

        Ok(Self {
            file,
            partial_path,
            final_path,
            len: 0,
        })
    }

    /// Append bytes to the end of the artifact.
    pub async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop everything written after `len`.
    pub async fn truncate(&mut self, len: u64) -> io::Result<()> {
        if len >= self.len {
            return Ok(());
        }
        self.file.flush().await?;
        self.file.set_len(len).await?;
        debug!(from = self.len, to = len, "Truncated artifact");
        self.len = len;
        Ok(())
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush, sync and rename to the final name.
    pub async fn finalize(mut self) -> io::Result<PathBuf> {
        if self.is_empty() {
            warn!(path = %self.partial_path.display(), "Finalizing artifact with no slices");
        }
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        fs::rename(&self.partial_path, &self.final_path).await?;

        info!(
            path = %self.final_path.display(),
            bytes = self.len,
            "Artifact finalized"
        );

        Ok(self.final_path)
    }
}
