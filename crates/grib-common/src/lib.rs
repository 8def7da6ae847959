//! Common types shared by the GRIB acquisition service and its tests.

pub mod bbox;
pub mod cycle;
pub mod error;
pub mod variable;

pub use bbox::BoundingBox;
pub use cycle::{forecast_offsets, ForecastCycle, ModelCycle, Slice};
pub use error::{ConfigError, CycleError};
pub use variable::{Variable, VariableSelection};
