//! Geographic subregion requested from the forecast filter.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longitude limits accepted by the filter service, in degrees.
pub const LON_RANGE: (f64, f64) = (-180.0, 180.0);

/// Latitude limits accepted for the subregion, in degrees.
pub const LAT_RANGE: (f64, f64) = (0.0, 90.0);

/// A geographic bounding box in degrees.
///
/// Corners are not reordered; the filter service receives them exactly as
/// configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Self {
        Self {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        }
    }

    /// Check every corner against the accepted ranges.
    ///
    /// The first offending field is reported, in the order
    /// `lon_min`, `lon_max`, `lat_min`, `lat_max`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("region.lon_min", self.lon_min, LON_RANGE)?;
        check_range("region.lon_max", self.lon_max, LON_RANGE)?;
        check_range("region.lat_min", self.lat_min, LAT_RANGE)?;
        check_range("region.lat_max", self.lat_max, LAT_RANGE)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    // NaN fails both comparisons, so test for containment rather than exclusion
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, value, min, max))
    }
}
