//! Per-station, time-keyed observation accumulator with a deferred-dump
//! policy, grounded on `SignalCenter::newObs`/`dumpObsEpoch`. The original
//! keeps two maps (`m_epoObsMap: time -> obs`, `m_staObsMap: station ->
//! obs`) behind a mutex and flushes everything up to `t - dump_wait`
//! whenever a new observation arrives `dump_wait` seconds past the last
//! flush; this module is the un-locked core of that policy.

use std::collections::BTreeMap;

use gnss_rs::prelude::SV;

use crate::model::Observation;
use crate::time::Instant;

const DEFAULT_DUMP_WAIT_S: f64 = 33.0;
const MAX_DT_REALTIME_S: f64 = 600.0;

/// A flushed batch: one epoch's worth of observations, grouped by station
/// for the snapshot handed to writers/subscribers.
pub struct FlushedEpoch {
    pub time: Instant,
    pub records: Vec<Observation>,
}

pub struct EpochAssembler {
    per_epoch: BTreeMap<i64, Vec<Observation>>,
    last_seen: std::collections::HashMap<(u16, SV), Instant>,
    last_dump_time: Option<Instant>,
    dump_wait_s: f64,
}

/// Epochs are keyed by whole milliseconds since an arbitrary but stable
/// origin (the instant's own GPST representation) so `BTreeMap` ordering
/// matches time ordering without requiring `Instant: Ord`.
fn epoch_key(t: Instant) -> i64 {
    let gps = t.to_system(crate::time::TimeSystem::Gps);
    (gps.epoch.duration.to_seconds() * 1000.0).round() as i64
}

impl EpochAssembler {
    pub fn new(dump_wait_s: f64) -> Self {
        Self {
            per_epoch: BTreeMap::new(),
            last_seen: std::collections::HashMap::new(),
            last_dump_time: None,
            dump_wait_s,
        }
    }

    pub fn with_default_wait() -> Self {
        Self::new(DEFAULT_DUMP_WAIT_S)
    }

    /// Accepts one observation, rejecting stale or duplicate records.
    /// Returns a [`FlushedEpoch`] if accepting this record crosses the
    /// dump-wait threshold and triggers a flush.
    pub fn ingest(&mut self, obs: Observation, now: Instant) -> Option<FlushedEpoch> {
        if let Some(last_dump) = self.last_dump_time {
            if obs.time.sub_checked(last_dump).map(|dt| dt <= 0.0).unwrap_or(false) {
                return None;
            }
        } else {
            // First observation ever: anchor one tick before it, matching
            // the original's `m_lastObsDumpTime = obs._time - 1.0`.
            self.last_dump_time = Some(obs.time.add_seconds(-1.0));
        }

        let key = (obs.station, obs.sat);
        if let Some(&prev_time) = self.last_seen.get(&key) {
            if obs.time.sub_checked(prev_time).map(|dt| dt <= 0.0).unwrap_or(false) {
                return None;
            }
        }
        let age_from_now = now.sub_checked(obs.time).unwrap_or(0.0);
        if age_from_now.abs() > MAX_DT_REALTIME_S {
            return None;
        }

        self.last_seen.insert(key, obs.time);
        let epoch_time = obs.time;
        self.per_epoch.entry(epoch_key(epoch_time)).or_default().push(obs);

        let last_dump = self.last_dump_time.unwrap();
        if epoch_time.sub_checked(last_dump).map(|dt| dt > self.dump_wait_s).unwrap_or(false) {
            let cut = epoch_time.add_seconds(-self.dump_wait_s);
            return self.flush(cut);
        }
        None
    }

    /// Flushes every buffered epoch with `time <= cut`, merging them into
    /// one batch (the original dumps per-epoch but hands the accumulated
    /// per-station map to the PPP thread as a single snapshot).
    fn flush(&mut self, cut: Instant) -> Option<FlushedEpoch> {
        let cut_key = epoch_key(cut);
        let mut flushed = Vec::new();
        let keys_to_remove: Vec<i64> = self
            .per_epoch
            .range(..=cut_key)
            .map(|(k, _)| *k)
            .collect();
        for k in keys_to_remove {
            if let Some(records) = self.per_epoch.remove(&k) {
                flushed.extend(records);
            }
        }
        self.last_dump_time = Some(cut);
        if flushed.is_empty() {
            None
        } else {
            Some(FlushedEpoch { time: cut, records: flushed })
        }
    }

    pub fn last_dump_time(&self) -> Option<Instant> {
        self.last_dump_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObsEntry, ObsFlags};
    use crate::time::TimeSystem;
    use gnss_rs::prelude::Constellation;
    use hifitime::Epoch;

    fn obs(station: u16, sat: SV, secs: f64) -> Observation {
        Observation {
            time: Instant::new(Epoch::from_gpst_seconds(secs), TimeSystem::Gps),
            sat,
            station,
            frequencies: vec![ObsEntry::empty("1C")],
        }
    }

    #[test]
    fn first_observation_never_flushes_immediately() {
        let mut asm = EpochAssembler::new(33.0);
        let sat = SV::new(Constellation::GPS, 1);
        let o = obs(1, sat, 100_000.0);
        let now = o.time;
        assert!(asm.ingest(o, now).is_none());
    }

    #[test]
    fn flushes_once_dump_wait_elapses() {
        let mut asm = EpochAssembler::new(33.0);
        let sat = SV::new(Constellation::GPS, 1);
        let first = obs(1, sat, 100_000.0);
        let now = first.time;
        asm.ingest(first, now);

        let later = obs(1, sat, 100_034.0);
        let later_time = later.time;
        let flushed = asm.ingest(later, later_time);
        assert!(flushed.is_some());
        assert_eq!(flushed.unwrap().records.len(), 1);
    }

    #[test]
    fn rejects_duplicate_or_earlier_record_for_same_station_sat() {
        let mut asm = EpochAssembler::new(33.0);
        let sat = SV::new(Constellation::GPS, 1);
        let first = obs(1, sat, 100_000.0);
        let now = first.time;
        asm.ingest(first, now);

        let duplicate = obs(1, sat, 100_000.0);
        assert!(asm.ingest(duplicate, now).is_none());
    }
}
