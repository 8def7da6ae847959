//! Acquisition configuration loading and validation.
//!
//! The YAML document is parsed into a [`RawConfig`] and validated once at
//! startup into an immutable [`AcquisitionConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use grib_common::{BoundingBox, ConfigError, Variable, VariableSelection};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

/// Default upstream serving the GFS filter and directory listings.
pub const DEFAULT_BASE_URL: &str = "https://nomads.ncep.noaa.gov";

/// Forecast days accepted by the filter service.
pub const DAYS_RANGE: (i64, i64) = (1, 12);

/// Extra attempts allowed per slice.
pub const SLICE_RETRIES_RANGE: (i64, i64) = (0, 10);

/// Initial delay between slice attempts, in seconds.
pub const RETRY_DELAY_RANGE: (i64, i64) = (0, 120);

/// Configuration as read from YAML, before validation.
///
/// Integer fields are signed so that negative values reach validation and
/// are reported against their field instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub region: BoundingBox,
    pub forecast: ForecastSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub retention: RetentionSection,
    pub output: OutputSection,
    #[serde(default)]
    pub source: SourceSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastSection {
    pub days: i64,
    #[serde(default)]
    pub variables: VariableSelection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default = "default_run_interval")]
    pub run_interval_minutes: i64,
    #[serde(default = "default_true")]
    pub run_at_startup: bool,
    /// How often the scheduler wakes to check whether a run is due
    #[serde(default = "default_poll_granularity")]
    pub poll_granularity_secs: i64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            run_interval_minutes: default_run_interval(),
            run_at_startup: true,
            poll_granularity_secs: default_poll_granularity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSection {
    /// Whether a cleaning pass precedes every run
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub days: i64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: i64,
    /// Extra attempts for a slice after a transport or server error
    #[serde(default)]
    pub slice_retries: i64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: i64,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            slice_retries: 0,
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_run_interval() -> i64 {
    60
}

fn default_poll_granularity() -> i64 {
    60
}

fn default_retention_days() -> i64 {
    7 // one week
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> i64 {
    600 // 10 minutes
}

fn default_retry_delay() -> i64 {
    2
}

/// Validated, immutable acquisition settings.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub region: BoundingBox,
    pub days: u32,
    /// Enabled variables in canonical order, never empty
    pub variables: Vec<Variable>,
    pub run_interval: Duration,
    pub run_at_startup: bool,
    pub poll_granularity: Duration,
    pub clean_enabled: bool,
    pub retention_days: u32,
    pub output_dir: PathBuf,
    pub source: SourceSettings,
}

/// Remote endpoint and per-request behaviour.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub slice_retries: u32,
    pub retry_delay: Duration,
}

impl RawConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RawConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded acquisition config");
        Ok(config)
    }

    /// Check every field and produce the immutable runtime configuration.
    pub fn validate(self) -> Result<AcquisitionConfig, ConfigError> {
        self.region.validate()?;

        let days = check_int("forecast.days", self.forecast.days, DAYS_RANGE)?;

        let variables = self.forecast.variables.enabled();
        if variables.is_empty() {
            return Err(ConfigError::invalid(
                "forecast.variables",
                "at least one variable must be enabled",
            ));
        }

        let run_interval_minutes = check_min(
            "schedule.run_interval_minutes",
            self.schedule.run_interval_minutes,
        )?;
        let poll_granularity_secs = check_min(
            "schedule.poll_granularity_secs",
            self.schedule.poll_granularity_secs,
        )?;
        let retention_days = check_min("retention.days", self.retention.days)?;

        let output_dir = validate_output_dir(&self.output.path)?;

        let base_url = Url::parse(&self.source.base_url)
            .map_err(|e| ConfigError::invalid("source.base_url", e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "source.base_url",
                format!("unsupported scheme '{}'", base_url.scheme()),
            ));
        }
        let request_timeout_secs =
            check_min("source.request_timeout_secs", self.source.request_timeout_secs)?;
        let slice_retries = check_int(
            "source.slice_retries",
            self.source.slice_retries,
            SLICE_RETRIES_RANGE,
        )?;
        let retry_delay_secs = check_int(
            "source.retry_delay_secs",
            self.source.retry_delay_secs,
            RETRY_DELAY_RANGE,
        )?;

        Ok(AcquisitionConfig {
            region: self.region,
            days: days as u32,
            variables,
            run_interval: Duration::from_secs(run_interval_minutes * 60),
            run_at_startup: self.schedule.run_at_startup,
            poll_granularity: Duration::from_secs(poll_granularity_secs),
            clean_enabled: self.retention.enabled,
            retention_days: retention_days as u32,
            output_dir,
            source: SourceSettings {
                base_url,
                request_timeout: Duration::from_secs(request_timeout_secs),
                slice_retries: slice_retries as u32,
                retry_delay: Duration::from_secs(retry_delay_secs as u64),
            },
        })
    }
}

fn check_int(field: &'static str, value: i64, (min, max): (i64, i64)) -> Result<i64, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(field, value, min, max))
    }
}

fn check_min(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    check_int(field, value, (1, u32::MAX as i64)).map(|v| v as u64)
}

fn validate_output_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid("output.path", "must not be empty"));
    }
    if !path.is_dir() {
        return Err(ConfigError::invalid(
            "output.path",
            format!("directory does not exist: {}", path.display()),
        ));
    }
    Ok(path.to_path_buf())
}

/// Load and validate the configuration, applying an optional output override.
pub fn load_config(path: &Path, output_override: Option<&Path>) -> Result<AcquisitionConfig> {
    let mut raw = RawConfig::load(path)?;
    if let Some(dir) = output_override {
        raw.output.path = dir.to_path_buf();
    }
    raw.validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}
