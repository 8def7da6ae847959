//! Age-based cleanup of the output directory.
//!
//! Every regular file in the directory is considered. In-progress artifacts
//! are always removed since they can only be left over from an interrupted
//! run. Other files older than the retention age are removed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::artifact;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// What one cleaning pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub removed_partial: Vec<PathBuf>,
    pub removed_expired: Vec<PathBuf>,
    pub retained: usize,
    /// Entries that could not be inspected or deleted, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

impl RetentionReport {
    pub fn removed(&self) -> usize {
        self.removed_partial.len() + self.removed_expired.len()
    }
}

/// Deletes one file.
type RemoveFn = fn(PathBuf) -> BoxFuture<'static, io::Result<()>>;

fn remove_file(path: PathBuf) -> BoxFuture<'static, io::Result<()>> {
    Box::pin(async move { fs::remove_file(path).await })
}

pub struct RetentionManager {
    dir: PathBuf,
    max_age: Duration,
    remove: RemoveFn,
}

impl RetentionManager {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::from_secs(retention_days as u64 * SECS_PER_DAY),
            remove: remove_file,
        }
    }

    #[cfg(test)]
    fn with_remover(mut self, remove: RemoveFn) -> Self {
        self.remove = remove;
        self
    }

    pub async fn clean(&self) -> Result<RetentionReport> {
        self.clean_at(SystemTime::now()).await
    }

    /// Run a pass as if the current time were `now`.
    ///
    /// Failing to open the directory is an error. Per-entry failures are
    /// collected in the report and do not stop the scan; a failure while
    /// iterating ends the scan with what was gathered so far.
    pub async fn clean_at(&self, now: SystemTime) -> Result<RetentionReport> {
        info!(path = %self.dir.display(), "Cleaning output directory");

        let cutoff = now.checked_sub(self.max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = RetentionReport::default();

        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", self.dir.display()))?;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %self.dir.display(), error = %e, "Failed to list directory entry");
                    report.failures.push((self.dir.clone(), e.to_string()));
                    break;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat entry");
                    report.failures.push((path, e.to_string()));
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            if artifact::is_partial(&name) {
                if self.remove(&path, "Removed abandoned partial artifact", &mut report).await {
                    report.removed_partial.push(path);
                }
                continue;
            }

            let expired = match metadata.modified() {
                Ok(modified) => modified < cutoff,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read modification time");
                    report.failures.push((path, e.to_string()));
                    continue;
                }
            };

            if expired {
                if self.remove(&path, "Removed expired artifact", &mut report).await {
                    report.removed_expired.push(path);
                }
            } else {
                debug!(file = %name, "Retained");
                report.retained += 1;
            }
        }

        info!(
            removed_partial = report.removed_partial.len(),
            removed_expired = report.removed_expired.len(),
            retained = report.retained,
            failures = report.failures.len(),
            "Cleaning pass complete"
        );

        Ok(report)
    }

    /// Delete one file, recording a failure instead of propagating it.
    async fn remove(&self, path: &Path, message: &str, report: &mut RetentionReport) -> bool {
        match (self.remove)(path.to_path_buf()).await {
            Ok(()) => {
                info!(path = %path.display(), "{}", message);
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove file");
                report.failures.push((path.to_path_buf(), e.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{list_names, write_aged_file, DAY_SECS};

    fn days(n: u64) -> Duration {
        Duration::from_secs(n * DAY_SECS)
    }

    #[tokio::test]
    async fn test_seven_day_policy() {
        let dir = test_utils::output_dir();
        write_aged_file(dir.path(), "old.grb", b"x", days(8));
        write_aged_file(dir.path(), "recent.grb", b"x", days(6));
        write_aged_file(dir.path(), "fresh.grb.partial", b"x", Duration::ZERO);

        let report = RetentionManager::new(dir.path(), 7).clean().await.unwrap();

        assert_eq!(list_names(dir.path()), vec!["recent.grb"]);
        assert_eq!(report.removed_expired, vec![dir.path().join("old.grb")]);
        assert_eq!(
            report.removed_partial,
            vec![dir.path().join("fresh.grb.partial")]
        );
        assert_eq!(report.retained, 1);
        assert_eq!(report.removed(), 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_non_artifact_files_follow_age_rule() {
        let dir = test_utils::output_dir();
        write_aged_file(dir.path(), "notes.txt", b"x", days(30));
        write_aged_file(dir.path(), "today.txt", b"x", Duration::ZERO);

        RetentionManager::new(dir.path(), 7).clean().await.unwrap();
        assert_eq!(list_names(dir.path()), vec!["today.txt"]);
    }

    #[tokio::test]
    async fn test_subdirectories_are_left_alone() {
        let dir = test_utils::output_dir();
        std::fs::create_dir(dir.path().join("archive.partial")).unwrap();

        let report = RetentionManager::new(dir.path(), 1).clean().await.unwrap();
        assert_eq!(report.removed(), 0);
        assert_eq!(list_names(dir.path()), vec!["archive.partial"]);
    }

    #[tokio::test]
    async fn test_clean_at_future_time() {
        let dir = test_utils::output_dir();
        write_aged_file(dir.path(), "a.grb", b"x", Duration::ZERO);

        let manager = RetentionManager::new(dir.path(), 2);
        let later = SystemTime::now() + days(3);
        let report = manager.clean_at(later).await.unwrap();

        assert_eq!(report.removed_expired.len(), 1);
        assert!(list_names(dir.path()).is_empty());
    }

    fn refuse_locked(path: PathBuf) -> BoxFuture<'static, io::Result<()>> {
        Box::pin(async move {
            let locked = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("locked"));
            if locked {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"))
            } else {
                fs::remove_file(path).await
            }
        })
    }

    #[tokio::test]
    async fn test_failed_removal_does_not_stop_scan() {
        let dir = test_utils::output_dir();
        write_aged_file(dir.path(), "a-old.grb", b"x", days(10));
        write_aged_file(dir.path(), "locked-old.grb", b"x", days(10));
        write_aged_file(dir.path(), "locked.grb.partial", b"x", Duration::ZERO);
        write_aged_file(dir.path(), "z-old.grb", b"x", days(10));
        write_aged_file(dir.path(), "z-recent.grb", b"x", days(1));

        let report = RetentionManager::new(dir.path(), 7)
            .with_remover(refuse_locked)
            .clean()
            .await
            .unwrap();

        let mut failed: Vec<PathBuf> = report.failures.iter().map(|(p, _)| p.clone()).collect();
        failed.sort();
        assert_eq!(
            failed,
            vec![
                dir.path().join("locked-old.grb"),
                dir.path().join("locked.grb.partial"),
            ]
        );
        assert!(report.failures.iter().all(|(_, reason)| reason.contains("locked")));

        assert_eq!(report.removed_expired.len(), 2);
        assert!(report.removed_partial.is_empty());
        assert_eq!(report.retained, 1);
        assert_eq!(
            list_names(dir.path()),
            vec!["locked-old.grb", "locked.grb.partial", "z-recent.grb"]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = test_utils::output_dir();
        let manager = RetentionManager::new(dir.path().join("gone"), 7);
        assert!(manager.clean().await.is_err());
    }
}
