//! Scripted forecast source and config builders for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use grib_common::{BoundingBox, ForecastCycle, Slice, Variable};
use reqwest::{StatusCode, Url};

use crate::artifact::ArtifactWriter;
use crate::config::{AcquisitionConfig, SourceSettings};
use crate::source::{ForecastSource, ProbeOutcome, SliceOutcome, SourceError};

/// A validated-looking config pointing at `output_dir` and `base_url`.
pub fn test_config(output_dir: &Path, base_url: &str) -> AcquisitionConfig {
    AcquisitionConfig {
        region: BoundingBox::new(-10.0, 20.0, 35.0, 60.0),
        days: 1,
        variables: Variable::ALL.to_vec(),
        run_interval: Duration::from_secs(60 * 60),
        run_at_startup: true,
        poll_granularity: Duration::from_secs(60),
        clean_enabled: true,
        retention_days: 7,
        output_dir: output_dir.to_path_buf(),
        source: SourceSettings {
            base_url: Url::parse(base_url).expect("test base url"),
            request_timeout: Duration::from_secs(10),
            slice_retries: 0,
            retry_delay: Duration::ZERO,
        },
    }
}

/// How the scripted source answers a given offset.
#[derive(Debug, Clone)]
pub enum SliceScript {
    NotFound,
    ServerError,
    /// Append these bytes, then fail as if the connection dropped
    FailMidStream(Vec<u8>),
    /// Fail this many times, then serve the default payload
    FailTimes(u32),
}

enum ProbeScript {
    Outcome(ProbeOutcome),
    Error,
}

/// In-memory [`ForecastSource`].
///
/// Probes answer from a queue (defaulting to `Available` once drained);
/// slices answer [`test_utils::slice_payload`] unless scripted otherwise.
#[derive(Default)]
pub struct ScriptedSource {
    probes: Mutex<VecDeque<ProbeScript>>,
    probed: Mutex<Vec<ForecastCycle>>,
    slices: HashMap<u32, SliceScript>,
    fetches: Mutex<HashMap<u32, u32>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probes(self, outcomes: impl IntoIterator<Item = ProbeOutcome>) -> Self {
        self.probes
            .lock()
            .unwrap()
            .extend(outcomes.into_iter().map(ProbeScript::Outcome));
        self
    }

    pub fn with_probe_error(self) -> Self {
        self.probes.lock().unwrap().push_back(ProbeScript::Error);
        self
    }

    pub fn with_slice(mut self, offset: u32, script: SliceScript) -> Self {
        self.slices.insert(offset, script);
        self
    }

    /// Cycles probed so far, in order.
    pub fn probed(&self) -> Vec<ForecastCycle> {
        self.probed.lock().unwrap().clone()
    }

    /// Number of fetch attempts seen for an offset.
    pub fn fetch_count(&self, offset: u32) -> u32 {
        self.fetches.lock().unwrap().get(&offset).copied().unwrap_or(0)
    }

    fn server_error(slice: &Slice) -> SourceError {
        SourceError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: slice.source_file(),
        }
    }
}

#[async_trait]
impl ForecastSource for ScriptedSource {
    async fn probe_cycle(&self, cycle: &ForecastCycle) -> Result<ProbeOutcome, SourceError> {
        self.probed.lock().unwrap().push(*cycle);
        match self.probes.lock().unwrap().pop_front() {
            Some(ProbeScript::Outcome(outcome)) => Ok(outcome),
            Some(ProbeScript::Error) => Err(SourceError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                url: cycle.remote_dir(),
            }),
            None => Ok(ProbeOutcome::Available),
        }
    }

    async fn fetch_slice(
        &self,
        slice: &Slice,
        artifact: &mut ArtifactWriter,
    ) -> Result<SliceOutcome, SourceError> {
        let attempt = {
            let mut fetches = self.fetches.lock().unwrap();
            let count = fetches.entry(slice.offset).or_insert(0);
            *count += 1;
            *count
        };

        match self.slices.get(&slice.offset) {
            Some(SliceScript::NotFound) => return Ok(SliceOutcome::NotFound),
            Some(SliceScript::ServerError) => return Err(Self::server_error(slice)),
            Some(SliceScript::FailMidStream(partial)) => {
                artifact.append(partial).await?;
                return Err(Self::server_error(slice));
            }
            Some(SliceScript::FailTimes(n)) if attempt <= *n => {
                return Err(Self::server_error(slice));
            }
            _ => {}
        }

        let body = test_utils::slice_payload(slice.offset);
        artifact.append(&body).await?;
        Ok(SliceOutcome::Fetched {
            bytes: body.len() as u64,
        })
    }
}
