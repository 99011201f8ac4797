//! Combines a solved broadcast orbit with its attached SSR orbit/clock
//! corrections into the position/velocity/clock-bias triple the SP3 writer
//! (and, eventually, a PPP consumer) actually wants. The orbit-correction
//! decomposition into radial/along-track/cross-track unit vectors and its
//! sign convention (correction subtracted from the broadcast position)
//! follows the widely used RTCM-SSR convention also implemented by RTKLIB's
//! `satpos_ssr` — no single file in the retrieved corpus carries this
//! composition, since the original keeps it inline in `OrbitEph2::getCrd`.

use nalgebra::Vector3;

use crate::error::CoreError;
use crate::kepler::{self, OrbitState};
use crate::model::Ephemeris;
use crate::time::Instant;

const SPEED_OF_LIGHT_MPS: f64 = 299_792_458.0;

/// Solves the broadcast orbit at `t` and layers on the ephemeris's attached
/// SSR orbit/clock corrections (linearly extrapolated by their own rate
/// terms to `t`), if any are attached. Corrections with no rate terms are
/// held constant past their own validity window; callers that care about
/// SSR content being stale should check `SsrOrbitCorr::t`/`update_interval_s`
/// themselves.
pub fn solve_corrected(eph: &Ephemeris, t: Instant) -> Result<OrbitState, CoreError> {
    let mut state = kepler::solve(eph, t, 30)?;

    if let Some(orb) = &eph.orb_corr {
        let dt = t.sub_checked(orb.t).unwrap_or(0.0);

        let radial = state.pos_ecef_m.normalize();
        let cross = state.pos_ecef_m.cross(&state.vel_ecef_mps).normalize();
        let along = cross.cross(&radial).normalize();

        let d_radial = orb.d_radial_m + orb.dot_radial_mps * dt;
        let d_along = orb.d_along_track_m + orb.dot_along_track_mps * dt;
        let d_cross = orb.d_cross_track_m + orb.dot_cross_track_mps * dt;

        let correction: Vector3<f64> = radial * d_radial + along * d_along + cross * d_cross;
        state.pos_ecef_m -= correction;
    }

    if let Some(clk) = &eph.clk_corr {
        let dt = t.sub_checked(clk.t).unwrap_or(0.0);
        let correction_m = clk.c0_m + clk.c1_mps * dt + clk.c2_mps2 * dt * dt;
        state.clock_bias_s += correction_m / SPEED_OF_LIGHT_MPS;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckState, Keplerian, OrbitModel, SsrClockCorr, SsrOrbitCorr};
    use crate::time::TimeSystem;
    use gnss_rs::prelude::{Constellation, SV};
    use hifitime::Epoch;

    fn eph_with_corrections() -> Ephemeris {
        let toe = Instant::new(Epoch::from_gpst_seconds(100_000.0), TimeSystem::Gps);
        Ephemeris {
            sat: SV::new(Constellation::GPS, 5),
            toc: toe,
            toe,
            af0: 0.0,
            af1: 0.0,
            af2: 0.0,
            tgd: 0.0,
            ura_index: 0,
            accuracy_m: 2.4,
            health: 0,
            iode: 10,
            iodc: 10,
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
            check_state: CheckState::Ok,
            divergence_metric: None,
            orb_corr: Some(SsrOrbitCorr {
                sat: SV::new(Constellation::GPS, 5),
                iod: 10,
                t: toe,
                update_interval_s: 5.0,
                d_radial_m: 1.0,
                d_along_track_m: 0.0,
                d_cross_track_m: 0.0,
                dot_radial_mps: 0.0,
                dot_along_track_mps: 0.0,
                dot_cross_track_mps: 0.0,
                provider_id: 0,
                solution_id: 0,
            }),
            clk_corr: Some(SsrClockCorr {
                sat: SV::new(Constellation::GPS, 5),
                iod: Some(10),
                t: toe,
                update_interval_s: 5.0,
                c0_m: 0.3,
                c1_mps: 0.0,
                c2_mps2: 0.0,
                provider_id: 0,
                solution_id: 0,
            }),
        }
    }

    #[test]
    fn radial_correction_shrinks_the_radius_by_its_magnitude() {
        let eph = eph_with_corrections();
        let uncorrected = kepler::solve(&eph, eph.toe, 30).unwrap();
        let corrected = solve_corrected(&eph, eph.toe).unwrap();
        let delta = (uncorrected.pos_ecef_m.norm() - corrected.pos_ecef_m.norm()).abs();
        assert!((delta - 1.0).abs() < 1e-6, "expected 1m shift, got {delta}");
    }

    #[test]
    fn clock_correction_adds_its_range_equivalent_to_the_bias() {
        let eph = eph_with_corrections();
        let uncorrected = kepler::solve(&eph, eph.toe, 30).unwrap();
        let corrected = solve_corrected(&eph, eph.toe).unwrap();
        let delta_s = corrected.clock_bias_s - uncorrected.clock_bias_s;
        assert!((delta_s - 0.3 / SPEED_OF_LIGHT_MPS).abs() < 1e-15);
    }
}
