//! Run scheduling: an optional startup run followed by periodic runs.
//!
//! Each run performs, in order: retention pass (when enabled), cycle
//! resolution, slice download into an in-progress artifact, and
//! finalization. Runs never overlap. A failed run is logged and recorded;
//! the loop keeps going until the cancellation token fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use grib_common::ForecastCycle;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::artifact::ArtifactWriter;
use crate::config::AcquisitionConfig;
use crate::download::{FetchReport, SliceDownloader};
use crate::resolver::{CycleResolution, CycleResolver};
use crate::retention::{RetentionManager, RetentionReport};
use crate::source::ForecastSource;
use crate::state::{RunHistory, RunRecord, RunStatus};

/// Result of a run that reached a resolved cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cycle: ForecastCycle,
    pub artifact: PathBuf,
    pub fetch: FetchReport,
    pub retention: Option<RetentionReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub enum RunOutcome {
    /// Artifact finalized; check `fetch` for gaps
    Completed(RunReport),
    /// No cycle within the fallback bound was published
    NoCycleAvailable { attempted: Vec<ForecastCycle> },
}

pub struct Scheduler<S: ?Sized> {
    config: Arc<AcquisitionConfig>,
    resolver: CycleResolver<S>,
    downloader: SliceDownloader<S>,
    retention: RetentionManager,
    history: Option<Arc<RunHistory>>,
    interval: Duration,
    poll: Duration,
}

impl<S: ForecastSource + ?Sized> Scheduler<S> {
    pub fn new(config: Arc<AcquisitionConfig>, source: Arc<S>) -> Self {
        Self {
            resolver: CycleResolver::new(source.clone()),
            downloader: SliceDownloader::new(source, &config),
            retention: RetentionManager::new(&config.output_dir, config.retention_days),
            history: None,
            interval: config.run_interval,
            poll: config.poll_granularity,
            config,
        }
    }

    /// Persist every run to `history`.
    pub fn with_history(mut self, history: Arc<RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    #[cfg(test)]
    fn with_timing(mut self, interval: Duration, poll: Duration) -> Self {
        self.interval = interval;
        self.poll = poll;
        self
    }

    /// Perform a single run.
    ///
    /// Errors are returned only for failures that abort the run: a probe
    /// error, or a filesystem error on the artifact. Cleaning failures are
    /// logged and the run proceeds.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let started_at = Utc::now();

        let retention = if self.config.clean_enabled {
            match self.retention.clean().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Cleaning pass failed, continuing with download");
                    None
                }
            }
        } else {
            None
        };

        let cycle = match self
            .resolver
            .resolve(started_at)
            .await
            .context("Cycle probe failed")?
        {
            CycleResolution::Resolved(cycle) => cycle,
            CycleResolution::Exhausted { attempted } => {
                return Ok(RunOutcome::NoCycleAvailable { attempted });
            }
        };

        let mut artifact = ArtifactWriter::create(&self.config.output_dir, started_at)
            .await
            .with_context(|| {
                format!(
                    "Failed to create artifact in {}",
                    self.config.output_dir.display()
                )
            })?;

        info!(
            cycle = %cycle,
            target = %artifact.final_path().display(),
            "Starting download run"
        );

        let fetch = self.downloader.fetch_all(cycle, &mut artifact).await?;
        let artifact = artifact
            .finalize()
            .await
            .context("Failed to finalize artifact")?;

        Ok(RunOutcome::Completed(RunReport {
            cycle,
            artifact,
            fetch,
            retention,
            started_at,
            finished_at: Utc::now(),
        }))
    }

    /// Run once, log the outcome and record it in the history.
    pub async fn run_and_record(&self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let result = self.run_once().await;

        match &result {
            Ok(RunOutcome::Completed(report)) if report.fetch.is_complete() => {
                info!(
                    cycle = %report.cycle,
                    artifact = %report.artifact.display(),
                    bytes = report.fetch.bytes,
                    cleaned = report.retention.as_ref().map_or(0, |r| r.removed()),
                    "Run complete"
                );
            }
            Ok(RunOutcome::Completed(report)) => {
                warn!(
                    cycle = %report.cycle,
                    artifact = %report.artifact.display(),
                    skipped = ?report.fetch.skipped,
                    failed = ?report.fetch.failed,
                    "Run complete with missing offsets"
                );
            }
            Ok(RunOutcome::NoCycleAvailable { attempted }) => {
                let attempted: Vec<String> = attempted.iter().map(|c| c.to_string()).collect();
                error!(attempted = ?attempted, "No suitable forecast cycle, skipping run");
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Run failed");
            }
        }

        if let Some(history) = &self.history {
            let record = to_record(started_at, &result);
            if let Err(e) = history.record(&record).await {
                warn!(error = %e, "Failed to record run");
            }
        }

        result
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The token is checked between runs and while waiting; a run in
    /// progress is never interrupted.
    pub async fn run_forever(&self, shutdown: CancellationToken) -> Result<()> {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        if self.config.run_at_startup {
            info!("Running startup download");
            // outcome already logged and recorded
            let _ = self.run_and_record().await;
        }
        let mut last_run = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down scheduler");
                    break;
                }
                _ = tokio::time::sleep(self.poll) => {
                    // Continue polling
                }
            }

            if last_run.elapsed() >= self.interval {
                info!("Running scheduled download");
                let _ = self.run_and_record().await;
                last_run = Instant::now();
            }
        }

        Ok(())
    }
}

fn to_record(started_at: DateTime<Utc>, result: &Result<RunOutcome>) -> RunRecord {
    let mut record = RunRecord {
        started_at,
        finished_at: Utc::now(),
        cycle: None,
        artifact: None,
        status: RunStatus::Failed,
        fetched: 0,
        skipped: 0,
        failed: 0,
        bytes: 0,
        error_message: None,
    };

    match result {
        Ok(RunOutcome::Completed(report)) => {
            record.cycle = Some(report.cycle.to_string());
            record.artifact = report
                .artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            record.status = if report.fetch.is_complete() {
                RunStatus::Completed
            } else {
                RunStatus::Partial
            };
            record.fetched = report.fetch.fetched.len() as u32;
            record.skipped = report.fetch.skipped.len() as u32;
            record.failed = report.fetch.failed.len() as u32;
            record.bytes = report.fetch.bytes;
        }
        Ok(RunOutcome::NoCycleAvailable { attempted }) => {
            record.status = RunStatus::NoCycle;
            record.error_message = Some(format!(
                "no published cycle after {} attempts",
                attempted.len()
            ));
        }
        Err(e) => {
            record.error_message = Some(format!("{:#}", e));
        }
    }

    record
}
