//! Error types for configuration and cycle handling.

use thiserror::Error;

/// A configuration value rejected during startup validation.
///
/// Every variant carries the dotted path of the offending field
/// (e.g. `region.lon_min`) so the operator knows what to fix.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub fn out_of_range<T: ToString>(field: &'static str, value: T, min: T, max: T) -> Self {
        ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }

    /// The configuration field this error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigError::OutOfRange { field, .. } | ConfigError::Invalid { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("Invalid cycle hour: {0} (expected one of 0, 6, 12, 18)")]
    InvalidHour(u32),

    #[error("Invalid cycle date: {0}")]
    InvalidDate(String),
}
