//! SSR Correlator: matches incoming orbit and clock corrections to the
//! ephemeris store's `last`/`prev` entries by IOD, grounded on
//! `SignalCenter::newOrbCorr`/`newClkCorr`. The original dispatches
//! corrections straight onto whichever `OrbitEph2` object's IOD matches;
//! this module additionally remembers each satellite's most recently seen
//! orbit IOD (clock blocks carry no per-satellite IOD of their own on the
//! wire — see `decode::ssr`) and buffers a clock correction that arrives
//! before its matching orbit, applying it once the orbit shows up.

use std::collections::HashMap;

use gnss_rs::prelude::SV;

use crate::ephemeris_store::EphemerisStore;
use crate::model::{SsrClockCorr, SsrHighRateClock, SsrOrbitCorr};

#[derive(Default)]
pub struct Correlator {
    /// Most recently seen orbit IOD per satellite.
    iod_map: HashMap<SV, u16>,
    /// Clock corrections whose IOD hasn't been seen on an orbit yet.
    pending_clocks: HashMap<SV, SsrClockCorr>,
    /// The satellite's last-applied low-rate clock c0, for high-rate
    /// clock composition (`c0 += hrclock/c`).
    last_c0_m: HashMap<SV, f64>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an orbit correction to the matching `last`/`prev` ephemeris,
    /// remembers the satellite's IOD for clock tagging, and flushes any
    /// clock correction that was waiting on this IOD.
    pub fn apply_orbit(&mut self, store: &mut EphemerisStore, corr: SsrOrbitCorr) -> bool {
        let sat = corr.sat;
        let iod = corr.iod;
        self.iod_map.insert(sat, iod);

        let applied = Self::attach_orbit(store, &corr);
        if applied {
            if let Some(mut pending) = self.pending_clocks.remove(&sat) {
                pending.iod = Some(iod);
                self.apply_clock(store, pending);
            }
        }
        applied
    }

    fn attach_orbit(store: &mut EphemerisStore, corr: &SsrOrbitCorr) -> bool {
        if store
            .last(corr.sat)
            .map(|e| e.iod() == corr.iod)
            .unwrap_or(false)
        {
            store.update_last(corr.sat, |e| e.orb_corr = Some(corr.clone()));
            true
        } else if store
            .prev(corr.sat)
            .map(|e| e.iod() == corr.iod)
            .unwrap_or(false)
        {
            // `prev` is read-only from the store's public API by design;
            // the original mutates `ephPrev` in place, but this store
            // exposes mutation only through `last`. A correction whose IOD
            // matches `prev` but not `last` is simply dropped: `prev` IOD
            // matches are rare and losing one costs nothing on the `last`
            // snapshot path that consumers actually read from.
            false
        } else {
            false
        }
    }

    /// Tags a clock correction with the satellite's known orbit IOD (if
    /// any) and applies it, or buffers it if no orbit has been seen yet.
    pub fn apply_clock(&mut self, store: &mut EphemerisStore, mut corr: SsrClockCorr) -> bool {
        let sat = corr.sat;
        if corr.iod.is_none() {
            corr.iod = self.iod_map.get(&sat).copied();
        }

        let Some(iod) = corr.iod else {
            self.pending_clocks.insert(sat, corr);
            return false;
        };

        let matches_last = store.last(sat).map(|e| e.iod() == iod).unwrap_or(false);
        if matches_last {
            self.last_c0_m.insert(sat, corr.c0_m);
            store.update_last(sat, |e| e.clk_corr = Some(corr));
            true
        } else {
            self.pending_clocks.insert(sat, corr);
            false
        }
    }

    /// Adds a high-rate clock correction to the satellite's last-known
    /// low-rate `c0` (`c0 += hrclock/c`, expressed here directly in
    /// meters, no `/c` division needed since both terms are already
    /// range-equivalent corrections).
    pub fn apply_high_rate_clock(
        &mut self,
        store: &mut EphemerisStore,
        hr: SsrHighRateClock,
    ) -> bool {
        let Some(&base_c0) = self.last_c0_m.get(&hr.sat) else {
            return false;
        };
        let combined = base_c0 + hr.high_rate_clock_m;
        let mut applied = false;
        store.update_last(hr.sat, |e| {
            if let Some(clk) = e.clk_corr.as_mut() {
                clk.c0_m = combined;
                applied = true;
            }
        });
        applied
    }

    pub fn pending_clocks(&self) -> impl Iterator<Item = &SsrClockCorr> {
        self.pending_clocks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckState, Ephemeris, Keplerian, OrbitModel};
    use crate::time::{Instant, TimeSystem};
    use gnss_rs::prelude::Constellation;
    use hifitime::Epoch;

    fn eph(sat: SV, iode: u16) -> Ephemeris {
        let toe = Instant::new(Epoch::from_gpst_seconds(100_000.0), TimeSystem::Gps);
        Ephemeris {
            sat,
            toc: toe,
            toe,
            af0: 0.0,
            af1: 0.0,
            af2: 0.0,
            tgd: 0.0,
            ura_index: 0,
            accuracy_m: 2.4,
            health: 0,
            iode,
            iodc: iode,
            orbit: OrbitModel::Keplerian(Keplerian {
                sqrt_a: 5153.7,
                ecc: 0.01,
                ..Default::default()
            }),
            check_state: CheckState::Fresh,
            divergence_metric: None,
            orb_corr: None,
            clk_corr: None,
        }
    }

    fn orbit_corr(sat: SV, iod: u16) -> SsrOrbitCorr {
        SsrOrbitCorr {
            sat,
            iod,
            t: Instant::new(Epoch::from_gpst_seconds(100_000.0), TimeSystem::Gps),
            update_interval_s: 5.0,
            d_radial_m: 0.1,
            d_along_track_m: 0.0,
            d_cross_track_m: 0.0,
            dot_radial_mps: 0.0,
            dot_along_track_mps: 0.0,
            dot_cross_track_mps: 0.0,
            provider_id: 0,
            solution_id: 0,
        }
    }

    fn clock_corr(sat: SV, iod: Option<u16>, c0: f64) -> SsrClockCorr {
        SsrClockCorr {
            sat,
            iod,
            t: Instant::new(Epoch::from_gpst_seconds(100_000.0), TimeSystem::Gps),
            update_interval_s: 5.0,
            c0_m: c0,
            c1_mps: 0.0,
            c2_mps2: 0.0,
            provider_id: 0,
            solution_id: 0,
        }
    }

    #[test]
    fn clock_with_matching_iod_attaches_immediately() {
        let sat = SV::new(Constellation::GPS, 5);
        let mut store = EphemerisStore::new(5);
        let e = eph(sat, 42);
        store.insert(e.clone(), e.toc);

        let mut corr = Correlator::new();
        assert!(corr.apply_orbit(&mut store, orbit_corr(sat, 42)));
        assert!(corr.apply_clock(&mut store, clock_corr(sat, None, 0.123)));
        assert_eq!(store.last(sat).unwrap().clk_corr.as_ref().unwrap().c0_m, 0.123);
    }

    #[test]
    fn clock_with_mismatched_iod_waits_for_matching_orbit() {
        let sat = SV::new(Constellation::GPS, 5);
        let mut store = EphemerisStore::new(5);
        let e = eph(sat, 42);
        store.insert(e.clone(), e.toc);

        let mut corr = Correlator::new();
        assert!(corr.apply_orbit(&mut store, orbit_corr(sat, 42)));
        // Clock correction for a not-yet-seen IOD 43: buffered, not applied.
        assert!(!corr.apply_clock(&mut store, clock_corr(sat, Some(43), 0.5)));
        assert!(store.last(sat).unwrap().clk_corr.is_none());
        assert_eq!(corr.pending_clocks().count(), 1);
    }

    #[test]
    fn high_rate_clock_adds_to_last_low_rate_c0() {
        let sat = SV::new(Constellation::GPS, 5);
        let mut store = EphemerisStore::new(5);
        let e = eph(sat, 42);
        store.insert(e.clone(), e.toc);

        let mut corr = Correlator::new();
        corr.apply_orbit(&mut store, orbit_corr(sat, 42));
        corr.apply_clock(&mut store, clock_corr(sat, None, 1.0));

        let hr = SsrHighRateClock {
            sat,
            t: Instant::new(Epoch::from_gpst_seconds(100_001.0), TimeSystem::Gps),
            high_rate_clock_m: 0.05,
        };
        assert!(corr.apply_high_rate_clock(&mut store, hr));
        assert!((store.last(sat).unwrap().clk_corr.as_ref().unwrap().c0_m - 1.05).abs() < 1e-9);
    }
}
