//! Remote forecast source: cycle probing and slice retrieval.
//!
//! [`ForecastSource`] is the seam between the pipeline and the network.
//! [`NomadsSource`] talks to the NOMADS GFS 0.25° filter service.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use grib_common::{BoundingBox, ForecastCycle, Slice, Variable};
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::artifact::ArtifactWriter;
use crate::config::AcquisitionConfig;

/// Filter script path, relative to the base URL.
const FILTER_PATH: &str = "cgi-bin/filter_gfs_0p25.pl";

/// Root of the per-cycle directory tree, relative to the base URL.
const PROD_PATH: &str = "pub/data/nccf/com/gfs/prod";

/// Vertical levels requested for every slice.
pub const LEVELS: [&str; 5] = [
    "lev_10_m_above_ground",
    "lev_2_m_above_ground",
    "lev_mean_sea_level",
    "lev_entire_atmosphere",
    "lev_surface",
];

/// Result of asking whether a cycle directory is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Available,
    NotReady,
}

/// Result of fetching one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Body appended to the artifact
    Fetched { bytes: u64 },
    /// The server does not (yet) have this offset
    NotFound,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to write slice to artifact: {0}")]
    Write(#[from] std::io::Error),
}

impl SourceError {
    /// Local disk failures abort the run; remote ones only affect one slice.
    pub fn is_local(&self) -> bool {
        matches!(self, SourceError::Write(_))
    }
}

#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Lightweight existence check for a cycle's remote directory.
    async fn probe_cycle(&self, cycle: &ForecastCycle) -> Result<ProbeOutcome, SourceError>;

    /// Stream one slice's body onto the end of `artifact`.
    async fn fetch_slice(
        &self,
        slice: &Slice,
        artifact: &mut ArtifactWriter,
    ) -> Result<SliceOutcome, SourceError>;
}

/// NOMADS filter-service client.
pub struct NomadsSource {
    client: Client,
    base_url: Url,
    region: BoundingBox,
    variables: Vec<Variable>,
}

impl NomadsSource {
    pub fn new(config: &AcquisitionConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.source.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(&config.source.base_url),
            region: config.region,
            variables: config.variables.clone(),
        })
    }

    /// Directory URL probed for a cycle.
    pub fn probe_url(&self, cycle: &ForecastCycle) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!(
            "{}{}/{}/",
            self.base_url.path(),
            PROD_PATH,
            cycle.remote_dir()
        ));
        url
    }

    /// Filter URL for one slice.
    pub fn slice_url(&self, slice: &Slice) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}{}", self.base_url.path(), FILTER_PATH));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("file", &slice.source_file());
            for level in LEVELS {
                query.append_pair(level, "on");
            }
            for variable in &self.variables {
                query.append_pair(&variable.query_key(), "on");
            }
            query
                .append_pair("subregion", "")
                .append_pair("leftlon", &self.region.lon_min.to_string())
                .append_pair("rightlon", &self.region.lon_max.to_string())
                .append_pair("toplat", &self.region.lat_max.to_string())
                .append_pair("bottomlat", &self.region.lat_min.to_string())
                .append_pair("dir", &format!("/{}", slice.cycle.remote_dir()));
        }
        url
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl ForecastSource for NomadsSource {
    #[instrument(skip(self), fields(cycle = %cycle))]
    async fn probe_cycle(&self, cycle: &ForecastCycle) -> Result<ProbeOutcome, SourceError> {
        let url = self.probe_url(cycle);
        let response = self.client.head(url.clone()).send().await?;

        match response.status() {
            status if status.is_success() => Ok(ProbeOutcome::Available),
            StatusCode::NOT_FOUND => Ok(ProbeOutcome::NotReady),
            status => Err(SourceError::Status {
                status,
                url: url.to_string(),
            }),
        }
    }

    async fn fetch_slice(
        &self,
        slice: &Slice,
        artifact: &mut ArtifactWriter,
    ) -> Result<SliceOutcome, SourceError> {
        let url = self.slice_url(slice);
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(SliceOutcome::NotFound),
            status => {
                return Err(SourceError::Status {
                    status,
                    url: url.to_string(),
                })
            }
        }

        let mut stream = response.bytes_stream();
        let mut bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            artifact.append(&chunk).await?;
            bytes += chunk.len() as u64;
        }

        debug!(file = %slice.source_file(), bytes = bytes, "Slice received");
        Ok(SliceOutcome::Fetched { bytes })
    }
}
