//! Forecast-cycle discovery with bounded fallback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use grib_common::ForecastCycle;
use tracing::{info, warn};

use crate::source::{ForecastSource, ProbeOutcome, SourceError};

/// Earlier cycles tried after the naive candidate reports "not ready".
pub const MAX_FALLBACKS: usize = 2;

/// Outcome of cycle discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleResolution {
    /// The newest cycle the server reports as published
    Resolved(ForecastCycle),
    /// Every candidate within the fallback bound was not ready
    Exhausted { attempted: Vec<ForecastCycle> },
}

pub struct CycleResolver<S: ?Sized> {
    source: Arc<S>,
    max_fallbacks: usize,
}

impl<S: ForecastSource + ?Sized> CycleResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            max_fallbacks: MAX_FALLBACKS,
        }
    }

    /// Resolve starting from the naive candidate for `now`.
    pub async fn resolve(&self, now: DateTime<Utc>) -> Result<CycleResolution, SourceError> {
        self.resolve_from(ForecastCycle::naive_candidate(now)).await
    }

    /// Probe `start`, then step back one cycle per "not ready" answer.
    ///
    /// Any probe error other than "not ready" is returned immediately.
    pub async fn resolve_from(
        &self,
        start: ForecastCycle,
    ) -> Result<CycleResolution, SourceError> {
        let mut candidate = start;
        let mut attempted = Vec::with_capacity(self.max_fallbacks + 1);

        loop {
            attempted.push(candidate);

            match self.source.probe_cycle(&candidate).await? {
                ProbeOutcome::Available => {
                    info!(cycle = %candidate, attempts = attempted.len(), "Resolved forecast cycle");
                    return Ok(CycleResolution::Resolved(candidate));
                }
                ProbeOutcome::NotReady if attempted.len() > self.max_fallbacks => {
                    warn!(
                        attempts = attempted.len(),
                        oldest = %candidate,
                        "No published forecast cycle within fallback bound"
                    );
                    return Ok(CycleResolution::Exhausted { attempted });
                }
                ProbeOutcome::NotReady => {
                    let previous = candidate.previous();
                    info!(cycle = %candidate, fallback = %previous, "Cycle not ready, falling back");
                    candidate = previous;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedSource;
    use chrono::TimeZone;

    fn cycle(day: u32, hour: u32) -> ForecastCycle {
        ForecastCycle::from_ymdh(2024, 3, day, hour).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_first_available() {
        let source = Arc::new(ScriptedSource::new().with_probes([ProbeOutcome::Available]));
        let resolver = CycleResolver::new(source.clone());

        let resolution = resolver.resolve_from(cycle(10, 12)).await.unwrap();
        assert_eq!(resolution, CycleResolution::Resolved(cycle(10, 12)));
        assert_eq!(source.probed(), vec![cycle(10, 12)]);
    }

    #[tokio::test]
    async fn test_falls_back_across_midnight() {
        let source = Arc::new(ScriptedSource::new().with_probes([
            ProbeOutcome::NotReady,
            ProbeOutcome::NotReady,
            ProbeOutcome::Available,
        ]));
        let resolver = CycleResolver::new(source.clone());

        let resolution = resolver.resolve_from(cycle(10, 0)).await.unwrap();
        assert_eq!(resolution, CycleResolution::Resolved(cycle(9, 12)));
        assert_eq!(source.probed(), vec![cycle(10, 0), cycle(9, 18), cycle(9, 12)]);
    }

    #[tokio::test]
    async fn test_exhausted_after_two_fallbacks() {
        let source = Arc::new(ScriptedSource::new().with_probes([
            ProbeOutcome::NotReady,
            ProbeOutcome::NotReady,
            ProbeOutcome::NotReady,
            ProbeOutcome::Available,
        ]));
        let resolver = CycleResolver::new(source.clone());

        let resolution = resolver.resolve_from(cycle(10, 0)).await.unwrap();
        assert_eq!(
            resolution,
            CycleResolution::Exhausted {
                attempted: vec![cycle(10, 0), cycle(9, 18), cycle(9, 12)]
            }
        );
        // the fourth scripted answer is never consumed
        assert_eq!(source.probed().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_error_is_not_a_fallback() {
        let source = Arc::new(ScriptedSource::new().with_probe_error());
        let resolver = CycleResolver::new(source.clone());

        assert!(resolver.resolve_from(cycle(10, 6)).await.is_err());
        assert_eq!(source.probed(), vec![cycle(10, 6)]);
    }

    #[tokio::test]
    async fn test_resolve_uses_naive_candidate() {
        let source = Arc::new(ScriptedSource::new().with_probes([ProbeOutcome::Available]));
        let resolver = CycleResolver::new(source);
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 14, 5, 0).unwrap();

        assert_eq!(
            resolver.resolve(now).await.unwrap(),
            CycleResolution::Resolved(cycle(10, 12))
        );
    }
}
