//! Forecast cycles and the per-offset slices published for them.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CycleError;

/// Forecast offsets fetched per configured day.
pub const OFFSETS_PER_DAY: u32 = 12;

/// Model run cycles (GFS runs 4x daily).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelCycle {
    /// 00Z run
    Z00,
    /// 06Z run
    Z06,
    /// 12Z run
    Z12,
    /// 18Z run
    Z18,
}

impl ModelCycle {
    pub fn from_hour(hour: u32) -> Option<Self> {
        match hour {
            0 => Some(ModelCycle::Z00),
            6 => Some(ModelCycle::Z06),
            12 => Some(ModelCycle::Z12),
            18 => Some(ModelCycle::Z18),
            _ => None,
        }
    }

    pub fn hour(&self) -> u32 {
        match self {
            ModelCycle::Z00 => 0,
            ModelCycle::Z06 => 6,
            ModelCycle::Z12 => 12,
            ModelCycle::Z18 => 18,
        }
    }
}

/// A published forecast run: calendar date (UTC) plus cycle hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastCycle {
    date: NaiveDate,
    cycle: ModelCycle,
}

impl ForecastCycle {
    pub fn new(date: NaiveDate, hour: u32) -> Result<Self, CycleError> {
        let cycle = ModelCycle::from_hour(hour).ok_or(CycleError::InvalidHour(hour))?;
        Ok(Self { date, cycle })
    }

    /// Build a cycle from calendar parts, e.g. `from_ymdh(2024, 1, 15, 12)`.
    pub fn from_ymdh(year: i32, month: u32, day: u32, hour: u32) -> Result<Self, CycleError> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| CycleError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))?;
        Self::new(date, hour)
    }

    /// The newest cycle believed to be published at `now`.
    ///
    /// Hours strictly after 18, 12 or 6 floor to that cycle of the same day.
    /// Anything up to and including 06Z falls back to 18Z of the previous day,
    /// since the 00Z run is rarely on the server that early.
    pub fn naive_candidate(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        match now.hour() {
            h if h > 18 => Self { date: today, cycle: ModelCycle::Z18 },
            h if h > 12 => Self { date: today, cycle: ModelCycle::Z12 },
            h if h > 6 => Self { date: today, cycle: ModelCycle::Z06 },
            _ => Self {
                date: previous_day(today),
                cycle: ModelCycle::Z18,
            },
        }
    }

    /// The cycle six hours earlier, wrapping 00Z to 18Z of the previous day.
    pub fn previous(&self) -> Self {
        match self.cycle {
            ModelCycle::Z18 => Self { date: self.date, cycle: ModelCycle::Z12 },
            ModelCycle::Z12 => Self { date: self.date, cycle: ModelCycle::Z06 },
            ModelCycle::Z06 => Self { date: self.date, cycle: ModelCycle::Z00 },
            ModelCycle::Z00 => Self {
                date: previous_day(self.date),
                cycle: ModelCycle::Z18,
            },
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hour(&self) -> u32 {
        self.cycle.hour()
    }

    /// Date component as used in remote paths: `YYYYMMDD`.
    pub fn date_string(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// Remote directory holding this cycle's files: `gfs.YYYYMMDD/HH/atmos`.
    pub fn remote_dir(&self) -> String {
        format!("gfs.{}/{:02}/atmos", self.date_string(), self.hour())
    }

    /// All slices of this cycle for the given number of forecast days.
    pub fn slices(&self, days: u32) -> impl Iterator<Item = Slice> {
        let cycle = *self;
        forecast_offsets(days).map(move |offset| Slice { cycle, offset })
    }
}

impl fmt::Display for ForecastCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}Z", self.date_string(), self.hour())
    }
}

fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(NaiveDate::MIN)
}

/// Forecast offsets (hours) fetched for `days` days: `0..days * 12`.
pub fn forecast_offsets(days: u32) -> Range<u32> {
    0..days.saturating_mul(OFFSETS_PER_DAY)
}

/// One forecast offset of a cycle, fetched as a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    pub cycle: ForecastCycle,
    pub offset: u32,
}

impl Slice {
    /// Remote source filename, e.g. `gfs.t12z.pgrb2.0p25.f003`.
    pub fn source_file(&self) -> String {
        format!(
            "gfs.t{:02}z.pgrb2.0p25.f{:03}",
            self.cycle.hour(),
            self.offset
        )
    }
}
