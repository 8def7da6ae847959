//! Sequential slice download into a single artifact.
//!
//! Offsets are fetched one at a time in ascending order so the artifact's
//! bytes follow offset order. A missing offset contributes nothing; a slice
//! that fails is rolled back and recorded, and the loop moves on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use grib_common::{ForecastCycle, Slice};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::artifact::ArtifactWriter;
use crate::config::AcquisitionConfig;
use crate::source::{ForecastSource, SliceOutcome, SourceError};

/// Upper bound on the delay between slice retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Per-offset accounting for one pass over a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Offsets whose body was appended
    pub fetched: Vec<u32>,
    /// Offsets the server reported as not found
    pub skipped: Vec<u32>,
    /// Offsets that failed with a transport or server error
    pub failed: Vec<u32>,
    /// Bytes appended to the artifact
    pub bytes: u64,
}

impl FetchReport {
    /// True when every requested offset made it into the artifact.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.fetched.len() + self.skipped.len() + self.failed.len()
    }
}

pub struct SliceDownloader<S: ?Sized> {
    source: Arc<S>,
    days: u32,
    retries: u32,
    retry_delay: Duration,
}

impl<S: ForecastSource + ?Sized> SliceDownloader<S> {
    pub fn new(source: Arc<S>, config: &AcquisitionConfig) -> Self {
        Self {
            source,
            days: config.days,
            retries: config.source.slice_retries,
            retry_delay: config.source.retry_delay,
        }
    }

    /// Fetch every offset of `cycle` into `artifact`.
    ///
    /// Only local write failures abort; remote failures are recorded in the
    /// returned report.
    #[instrument(skip(self, artifact), fields(cycle = %cycle, days = self.days))]
    pub async fn fetch_all(
        &self,
        cycle: ForecastCycle,
        artifact: &mut ArtifactWriter,
    ) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let total = grib_common::forecast_offsets(self.days).len();

        for slice in cycle.slices(self.days) {
            info!(
                offset = slice.offset,
                total = total,
                file = %slice.source_file(),
                "Downloading slice"
            );

            match self.fetch_one(&slice, artifact).await {
                Ok(SliceOutcome::Fetched { bytes }) => {
                    report.fetched.push(slice.offset);
                    report.bytes += bytes;
                }
                Ok(SliceOutcome::NotFound) => {
                    info!(offset = slice.offset, "Slice not published, skipping");
                    report.skipped.push(slice.offset);
                }
                Err(e) if e.is_local() => {
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to write offset {} to {}",
                            slice.offset,
                            artifact.partial_path().display()
                        )
                    });
                }
                Err(e) => {
                    warn!(offset = slice.offset, error = %e, "Slice failed, continuing");
                    report.failed.push(slice.offset);
                }
            }
        }

        info!(
            attempted = report.attempted(),
            fetched = report.fetched.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            bytes = report.bytes,
            "Slice download pass complete"
        );

        Ok(report)
    }

    /// One slice with optional retry, rolling back any partial body.
    async fn fetch_one(
        &self,
        slice: &Slice,
        artifact: &mut ArtifactWriter,
    ) -> Result<SliceOutcome, SourceError> {
        let mut attempt = 0;
        let mut delay = self.retry_delay;

        loop {
            let mark = artifact.len();

            match self.source.fetch_slice(slice, artifact).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    artifact.truncate(mark).await?;

                    if e.is_local() || attempt >= self.retries {
                        return Err(e);
                    }
                    attempt += 1;

                    debug!(
                        offset = slice.offset,
                        error = %e,
                        retry = attempt,
                        max_retries = self.retries,
                        delay_secs = delay.as_secs(),
                        "Slice failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, MAX_RETRY_DELAY);
                }
            }
        }
    }
}
