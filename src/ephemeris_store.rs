//! Per-satellite bounded deque of decoded ephemerides with freshness and
//! divergence checks, grounded on `RealTimeEphStore::putNewEph`/
//! `checkEphmeris`/`ephLast`/`ephPrev`. The original keeps one global
//! `std::map<SatID, deque<OrbitEph2*>>` behind a mutex; this module is the
//! un-locked core, wrapped in a `Mutex` by [`crate::context::CoreContext`]
//! per the concurrency model.

use std::collections::HashMap;
use std::collections::VecDeque;

use gnss_rs::prelude::{Constellation, SV};

use crate::kepler;
use crate::model::{CheckState, Ephemeris, OrbitModel};
use crate::time::Instant;

const MIN_RADIUS_M: f64 = 2.0e7;
const MAX_RADIUS_M: f64 = 6.0e7;
const MAX_DIVERGENCE_M: f64 = 1000.0;
const LIGHT_MPS: f64 = 299_792_458.0;

fn outdated_window_secs(c: Constellation) -> f64 {
    match c {
        Constellation::Glonass => 3600.0,
        Constellation::BeiDou => 6.0 * 3600.0,
        _ => 4.0 * 3600.0, // GPS, Galileo, QZSS
    }
}

/// A satellite's radial distance and clock bias at its own ToC, used both
/// by the sanity check and the divergence check. State-vector broadcasts
/// (GLONASS, SBAS) use their reported position directly; Keplerian
/// broadcasts are solved via [`kepler::solve`].
fn position_and_clock_at_toc(eph: &Ephemeris) -> Option<(nalgebra::Vector3<f64>, f64)> {
    match &eph.orbit {
        OrbitModel::StateVector(sv) => {
            Some((nalgebra::Vector3::from(sv.pos_m), eph.af0))
        },
        OrbitModel::Keplerian(_) => {
            let state = kepler::solve(eph, eph.toc, 30).ok()?;
            Some((state.pos_ecef_m, state.clock_bias_s))
        },
    }
}

/// Runs the full freshness/sanity/divergence pipeline on `candidate`
/// against the satellite's current `last` ephemeris, returning the
/// (possibly updated) check states for both and the divergence metric
/// recorded regardless of outcome.
struct CheckOutcome {
    candidate_state: CheckState,
    last_state_update: Option<CheckState>,
    divergence_metric: Option<f64>,
}

fn check_ephemeris(candidate: &Ephemeris, now: Instant, last: Option<&Ephemeris>) -> CheckOutcome {
    let Some((pos, clk)) = position_and_clock_at_toc(candidate) else {
        return CheckOutcome {
            candidate_state: CheckState::Bad,
            last_state_update: None,
            divergence_metric: None,
        };
    };

    let radius = pos.norm();
    if !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(&radius) {
        return CheckOutcome {
            candidate_state: CheckState::Bad,
            last_state_update: None,
            divergence_metric: None,
        };
    }

    let toc_utc = candidate.toc.to_system(crate::time::TimeSystem::Utc);
    let now_utc = now.to_system(crate::time::TimeSystem::Utc);
    let age = toc_utc.sub_unchecked(now_utc).abs();
    if age > outdated_window_secs(candidate.sat.constellation) {
        return CheckOutcome {
            candidate_state: CheckState::Outdated,
            last_state_update: None,
            divergence_metric: None,
        };
    }

    let Some(last) = last else {
        return CheckOutcome {
            candidate_state: CheckState::Ok,
            last_state_update: None,
            divergence_metric: None,
        };
    };

    let dt = candidate.toc.sub_unchecked(last.toc);
    if dt.abs() > outdated_window_secs(candidate.sat.constellation) {
        return CheckOutcome {
            candidate_state: CheckState::Ok,
            last_state_update: Some(CheckState::Outdated),
            divergence_metric: None,
        };
    }

    let Some((last_pos, last_clk)) = position_and_clock_at_toc(last) else {
        return CheckOutcome {
            candidate_state: CheckState::Ok,
            last_state_update: None,
            divergence_metric: None,
        };
    };

    let diff_pos_m = (pos - last_pos).norm();
    let diff_clk_m = (clk - last_clk).abs() * LIGHT_MPS;
    let divergence_metric = Some(diff_pos_m.max(diff_clk_m));

    if diff_pos_m < MAX_DIVERGENCE_M && diff_clk_m < MAX_DIVERGENCE_M {
        if dt != 0.0 {
            CheckOutcome {
                candidate_state: CheckState::Ok,
                last_state_update: Some(CheckState::Ok),
                divergence_metric,
            }
        } else {
            CheckOutcome {
                candidate_state: CheckState::Ok,
                last_state_update: None,
                divergence_metric,
            }
        }
    } else if last.check_state == CheckState::Ok {
        // The divergence only poisons the newer record: a trusted prior
        // ephemeris is left untouched so consumers keep using it.
        CheckOutcome {
            candidate_state: CheckState::Bad,
            last_state_update: None,
            divergence_metric,
        }
    } else {
        CheckOutcome {
            candidate_state: CheckState::Ok,
            last_state_update: None,
            divergence_metric,
        }
    }
}

/// Per-satellite bounded FIFO of decoded ephemerides plus the store's
/// insertion and lookup logic.
pub struct EphemerisStore {
    by_sat: HashMap<SV, VecDeque<Ephemeris>>,
    max_queue_len: usize,
}

impl EphemerisStore {
    pub fn new(max_queue_len: usize) -> Self {
        Self {
            by_sat: HashMap::new(),
            max_queue_len,
        }
    }

    /// Runs the check pipeline and, if the candidate passes, pushes it onto
    /// the satellite's deque (evicting the oldest entry past
    /// `max_queue_len`). Returns `true` if the candidate was accepted.
    pub fn insert(&mut self, mut candidate: Ephemeris, now: Instant) -> bool {
        let last_snapshot = self.last(candidate.sat).cloned();
        let outcome = check_ephemeris(&candidate, now, last_snapshot.as_ref());
        candidate.check_state = outcome.candidate_state;
        candidate.divergence_metric = outcome.divergence_metric;

        if let Some(new_last_state) = outcome.last_state_update {
            if let Some(deque) = self.by_sat.get_mut(&candidate.sat) {
                if let Some(last) = deque.back_mut() {
                    last.check_state = new_last_state;
                }
            }
        }

        let last_is_trusted = self
            .last(candidate.sat)
            .map(|e| !matches!(e.check_state, CheckState::Bad | CheckState::Outdated))
            .unwrap_or(true);

        let accept = last_is_trusted
            && !matches!(candidate.check_state, CheckState::Bad | CheckState::Outdated)
            && self
                .last(candidate.sat)
                .map(|last| candidate.is_newer_than(last))
                .unwrap_or(true);

        if accept {
            let deque = self.by_sat.entry(candidate.sat).or_default();
            deque.push_back(candidate);
            if deque.len() > self.max_queue_len {
                deque.pop_front();
            }
        }
        accept
    }

    pub fn last(&self, sat: SV) -> Option<&Ephemeris> {
        self.by_sat.get(&sat).and_then(|d| d.back())
    }

    pub fn prev(&self, sat: SV) -> Option<&Ephemeris> {
        self.by_sat.get(&sat).and_then(|d| {
            let n = d.len();
            if n > 1 {
                d.get(n - 2)
            } else {
                None
            }
        })
    }

    pub fn sat_list(&self) -> Vec<SV> {
        self.by_sat.keys().copied().collect()
    }

    /// Applies `f` to the satellite's `last` ephemeris in place, e.g. to
    /// attach an SSR correlation result. No-op if no ephemeris is stored.
    pub fn update_last(&mut self, sat: SV, f: impl FnOnce(&mut Ephemeris)) {
        if let Some(deque) = self.by_sat.get_mut(&sat) {
            if let Some(last) = deque.back_mut() {
                f(last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Keplerian;
    use crate::time::TimeSystem;
    use hifitime::Epoch;

    fn gps_eph(prn: u8, toe_secs: f64, iode: u16) -> Ephemeris {
        let toe = Instant::new(Epoch::from_gpst_seconds(toe_secs), TimeSystem::Gps);
        Ephemeris {
            sat: SV::new(Constellation::GPS, prn),
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
                i0_rad: 0.96,
                idot_rad_s: 0.0,
                omega0_rad: 0.1,
                omega_rad: 0.2,
                omega_dot_rad_s: -8e-9,
                m0_rad: 0.3,
                dn_rad_s: 4e-9,
                cuc: 0.0,
                cus: 0.0,
                cic: 0.0,
                cis: 0.0,
                crc: 0.0,
                crs: 0.0,
            }),
            check_state: CheckState::Fresh,
            divergence_metric: None,
            orb_corr: None,
            clk_corr: None,
        }
    }

    #[test]
    fn accepts_first_ephemeris_for_a_satellite() {
        let mut store = EphemerisStore::new(5);
        let eph = gps_eph(5, 100_000.0, 1);
        let now = eph.toc;
        assert!(store.insert(eph, now));
        assert!(store.last(SV::new(Constellation::GPS, 5)).is_some());
    }

    #[test]
    fn evicts_oldest_past_bound() {
        let mut store = EphemerisStore::new(2);
        let sat = SV::new(Constellation::GPS, 5);
        for i in 0..4u16 {
            let eph = gps_eph(5, 100_000.0 + i as f64 * 7200.0, i + 1);
            let now = eph.toc;
            store.insert(eph, now);
        }
        assert!(store.by_sat.get(&sat).unwrap().len() <= 2);
    }

    #[test]
    fn rejects_a_candidate_that_is_not_newer() {
        let mut store = EphemerisStore::new(5);
        let newer = gps_eph(5, 200_000.0, 2);
        let older = gps_eph(5, 100_000.0, 1);
        store.insert(newer.clone(), newer.toc);
        let accepted = store.insert(older, newer.toc);
        assert!(!accepted);
        assert_eq!(store.last(newer.sat).unwrap().iode, 2);
    }
}
