//! Time instants tagged with an explicit [`TimeSystem`]. Per the design
//! notes, arithmetic between instants of different systems is rejected at
//! the point of use rather than silently converted — callers that need a
//! cross-system comparison must call [`Instant::to_system`] first.

use hifitime::{Duration as HifiDuration, Epoch, TimeScale};

use crate::error::CoreError;

/// The time system an [`Instant`] is expressed in. Distinct from
/// [`hifitime::TimeScale`] because hifitime converts between scales
/// transparently; this crate wants mismatches to fail fast with
/// [`CoreError::TimeSystemMismatch`] instead of silently converting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSystem {
    Gps,
    Utc,
    Bdt,
    Glo,
    Gst,
}

impl TimeSystem {
    fn scale(self) -> TimeScale {
        match self {
            TimeSystem::Gps => TimeScale::GPST,
            TimeSystem::Utc => TimeScale::UTC,
            TimeSystem::Bdt => TimeScale::BDT,
            TimeSystem::Glo => TimeScale::UTC, // GLONASS time is UTC + 3h, handled by caller offset
            TimeSystem::Gst => TimeScale::GST,
        }
    }
}

/// A time instant tagged with the system it was produced in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instant {
    pub epoch: Epoch,
    pub system: TimeSystem,
}

impl Instant {
    pub fn new(epoch: Epoch, system: TimeSystem) -> Self {
        Self { epoch, system }
    }

    /// Current wall-clock time, tagged UTC.
    pub fn now_utc() -> Self {
        Self {
            epoch: Epoch::now().unwrap_or(Epoch::from_gregorian_utc_at_midnight(1980, 1, 6)),
            system: TimeSystem::Utc,
        }
    }

    /// Re-expresses this instant in another time system, converting through
    /// hifitime's leap-second tables. This is the only sanctioned way to
    /// cross a [`TimeSystem`] boundary.
    pub fn to_system(self, system: TimeSystem) -> Self {
        if system == self.system {
            return self;
        }
        Self {
            epoch: self.epoch.to_time_scale(system.scale()),
            system,
        }
    }

    /// Checked difference in seconds, `self - other`. Fails if the two
    /// instants were not tagged with the same [`TimeSystem`].
    pub fn sub_checked(self, other: Instant) -> Result<f64, CoreError> {
        if self.system != other.system {
            return Err(CoreError::TimeSystemMismatch {
                lhs: self.system,
                rhs: other.system,
            });
        }
        Ok((self.epoch - other.epoch).to_seconds())
    }

    /// Like [`Instant::sub_checked`] but panics on mismatch; only ever used
    /// internally where the two instants are known (by construction) to
    /// share a system.
    pub fn sub_unchecked(self, other: Instant) -> f64 {
        (self.epoch - other.epoch).to_seconds()
    }

    pub fn add_seconds(self, secs: f64) -> Self {
        Self {
            epoch: self.epoch + HifiDuration::from_seconds(secs),
            system: self.system,
        }
    }

    /// GPS week and seconds-of-week, converting to GPS time first if needed.
    pub fn gps_week_sow(self) -> (u32, f64) {
        let gps = self.to_system(TimeSystem::Gps);
        let (week, elapsed_ns) = gps.epoch.to_time_of_week();
        (week, elapsed_ns as f64 / 1.0e9)
    }

    /// Resolves a raw periodic field (a TOW/TOD counter that wraps every
    /// `period_secs`) to an absolute instant close to `around`, by shifting
    /// in whole periods until the result is within half a period of
    /// `around`. This is the generalized form of the SSR epoch-time rule
    /// ("shift by the message's own period until within half a period of
    /// the wall clock") and also covers GPS/GLONASS observation TOW/TOD
    /// assembly, which wrap on a week/day boundary respectively.
    pub fn resolve_periodic(
        around: Instant,
        system: TimeSystem,
        raw_seconds: f64,
        period_secs: f64,
    ) -> Self {
        let around = around.to_system(system);
        let around_secs = around.epoch.duration.to_seconds();
        let period_index = (around_secs / period_secs).floor();
        let mut candidate_secs = period_index * period_secs + raw_seconds;
        if candidate_secs - around_secs > period_secs / 2.0 {
            candidate_secs -= period_secs;
        } else if around_secs - candidate_secs > period_secs / 2.0 {
            candidate_secs += period_secs;
        }
        let epoch = Epoch::from_duration(
            HifiDuration::from_seconds(candidate_secs),
            around.epoch.time_scale,
        );
        Self { epoch, system }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_systems_reject_subtraction() {
        let a = Instant::new(Epoch::from_gpst_seconds(100.0), TimeSystem::Gps);
        let b = Instant::new(Epoch::from_gpst_seconds(10.0), TimeSystem::Utc);
        assert!(matches!(
            a.sub_checked(b),
            Err(CoreError::TimeSystemMismatch { .. })
        ));
    }

    #[test]
    fn matching_systems_subtract() {
        let a = Instant::new(Epoch::from_gpst_seconds(100.0), TimeSystem::Gps);
        let b = Instant::new(Epoch::from_gpst_seconds(10.0), TimeSystem::Gps);
        assert!((a.sub_checked(b).unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn resolve_periodic_picks_the_occurrence_nearest_the_anchor() {
        let anchor = Instant::new(Epoch::from_gpst_seconds(100_000.0), TimeSystem::Gps);
        let (_, sow) = anchor.gps_week_sow();
        let resolved = Instant::resolve_periodic(anchor, TimeSystem::Gps, sow, 604_800.0);
        let dt = resolved.sub_checked(anchor).unwrap();
        assert!(dt.abs() < 1.0, "expected near-zero offset, got {dt}");
    }
}
