//! Kepler orbit solver: turns a [`crate::model::Ephemeris`]'s Keplerian
//! elements into an ECEF position/velocity/clock-bias triple at a given
//! instant. Adapted from the `Solver`/`Ephemeris::solver` pair in
//! nav-solutions-rinex's `navigation::ephemeris::kepler` module, swapping
//! its `anise::math` vector types for `nalgebra` (this crate carries no
//! planetary ephemerides dependency) and its `Ephemeris::to_keplerian`
//! helper for a direct read of [`crate::model::Keplerian`]'s fields (this
//! crate's `Ephemeris` already stores Keplerian elements rather than raw
//! orbit-determination polynomials).

use gnss_rs::prelude::{Constellation, SV};
use nalgebra::{Matrix3, Rotation3, SMatrix, Vector3, Vector4};

use crate::error::CoreError;
use crate::model::{Ephemeris, Keplerian, OrbitModel};
use crate::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitState {
    pub pos_ecef_m: Vector3<f64>,
    pub vel_ecef_mps: Vector3<f64>,
    /// Clock bias in seconds, `af0 + af1*dt + af2*dt^2 + relativistic`.
    pub clock_bias_s: f64,
}

fn gravitational_constant(c: Constellation) -> f64 {
    match c {
        Constellation::BeiDou => 3.986_004_418e14,
        Constellation::Glonass => 3.986_0044e14,
        Constellation::Galileo => 3.986_004_418e14,
        _ => 3.986_005_0e14, // GPS ICD
    }
}

fn earth_rotation_rate(c: Constellation) -> f64 {
    match c {
        Constellation::BeiDou => 7.292_115e-5,
        Constellation::Glonass => 7.292_115e-5,
        Constellation::Galileo => 7.292_115_146_7e-5,
        _ => 7.292_115_146_7e-5, // GPS ICD
    }
}

fn relativistic_factor(c: Constellation) -> f64 {
    match c {
        Constellation::BeiDou | Constellation::Galileo => -0.000_000_000_444_280_730_904_397_75,
        _ => -0.000_000_000_444_280_763_339_306, // GPS ICD
    }
}

/// BeiDou GEO satellites (PRNs 1-5 and 59-63) use a distinct orbit-to-ECEF
/// rotation from the MEO/IGSO constellation, per the BeiDou ICD.
fn is_beidou_geo(sat: SV) -> bool {
    sat.constellation == Constellation::BeiDou && matches!(sat.prn, 1..=5 | 59..=63)
}

fn orbit_velocity(r_k: f64, fd_r_k: f64, u_k: f64, fd_u_k: f64) -> (f64, f64) {
    let (sin_u_k, cos_u_k) = u_k.sin_cos();
    let fd_x = fd_r_k * cos_u_k - r_k * fd_u_k * sin_u_k;
    let fd_y = fd_r_k * sin_u_k + r_k * fd_u_k * cos_u_k;
    (fd_x, fd_y)
}

struct Intermediate {
    dt_seconds: f64,
    u_k: f64,
    r_k: f64,
    i_k: f64,
    omega_k: f64,
    fd_u_k: f64,
    fd_r_k: f64,
    fd_i_k: f64,
    fd_omega_k: f64,
    dtr: f64,
    fd_dtr: f64,
    r_sv: (f64, f64, f64),
}

fn beidou_geo_state(im: &Intermediate) -> (Vector3<f64>, Vector3<f64>) {
    let omega_bds = 7.292_115e-5_f64;
    let orbit_xyz = Vector3::new(im.r_sv.0, im.r_sv.1, 0.0);
    let rotation_x = Rotation3::from_axis_angle(&Vector3::x_axis(), im.i_k);
    let rotation_z = Rotation3::from_axis_angle(&Vector3::z_axis(), im.omega_k);
    let meo = rotation_z * rotation_x;
    let tilt = Rotation3::from_axis_angle(&Vector3::x_axis(), 5f64.to_radians());
    let spin = Rotation3::from_axis_angle(&Vector3::z_axis(), -omega_bds * im.dt_seconds);
    let pos = spin * tilt * meo * orbit_xyz;

    let (x, y, _) = im.r_sv;
    let (sin_omega_k, cos_omega_k) = im.omega_k.sin_cos();
    let (sin_i_k, cos_i_k) = im.i_k.sin_cos();
    let (fd_x, fd_y) = orbit_velocity(im.r_k, im.fd_r_k, im.u_k, im.fd_u_k);
    let fd_xgk = -y * im.fd_omega_k - fd_y * cos_i_k * sin_omega_k + fd_x * cos_omega_k;
    let fd_ygk = x * im.fd_omega_k + fd_y * cos_i_k * cos_omega_k + fd_x * sin_omega_k;
    let fd_zgk = fd_y * sin_i_k + y * im.fd_i_k * cos_i_k;

    let (sin_omega_tk, cos_omega_tk) = (omega_bds * im.dt_seconds).sin_cos();
    let fd_spin = im.fd_omega_k
        * Matrix3::new(
            -sin_omega_tk,
            cos_omega_tk,
            0.0,
            -cos_omega_tk,
            -sin_omega_tk,
            0.0,
            0.0,
            0.0,
            0.0,
        );
    let fd_pos = Vector3::new(fd_xgk, fd_ygk, fd_zgk);
    let vel = fd_spin * tilt * meo * orbit_xyz + spin * tilt * meo * fd_pos;

    (pos, vel)
}

fn meo_state(im: &Intermediate) -> (Vector3<f64>, Vector3<f64>) {
    let (x_m, y_m, _) = im.r_sv;
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), im.omega_k)
        * Rotation3::from_axis_angle(&Vector3::x_axis(), im.i_k);
    let pos = rotation * Vector3::new(x_m, y_m, 0.0);

    let (fd_x, fd_y) = orbit_velocity(im.r_k, im.fd_r_k, im.u_k, im.fd_u_k);
    let (sin_omega_k, cos_omega_k) = im.omega_k.sin_cos();
    let (sin_i_k, cos_i_k) = im.i_k.sin_cos();

    let mut fd_r = SMatrix::<f64, 3, 4>::zeros();
    fd_r[(0, 0)] = cos_omega_k;
    fd_r[(0, 1)] = -sin_omega_k * cos_i_k;
    fd_r[(0, 2)] = -(x_m * sin_omega_k + y_m * cos_omega_k * cos_i_k);
    fd_r[(0, 3)] = y_m * sin_omega_k * sin_i_k;
    fd_r[(1, 0)] = sin_omega_k;
    fd_r[(1, 1)] = cos_omega_k * cos_i_k;
    fd_r[(1, 2)] = x_m * cos_omega_k - y_m * sin_omega_k * cos_i_k;
    fd_r[(1, 3)] = y_m * cos_omega_k * sin_i_k;
    fd_r[(2, 1)] = sin_i_k;
    fd_r[(2, 3)] = y_m * cos_i_k;

    let vel = fd_r * Vector4::new(fd_x, fd_y, im.fd_omega_k, im.fd_i_k);
    (pos, vel)
}

/// Solves `eph`'s Keplerian elements at instant `t`, returning ECEF
/// position/velocity in meters and the broadcast clock bias in seconds
/// (relativistic correction included, `af0`/`af1`/`af2` not — callers add
/// those, and any SSR `clk_corr`, themselves).
pub fn solve(eph: &Ephemeris, t: Instant, max_iterations: usize) -> Result<OrbitState, CoreError> {
    let kep = match &eph.orbit {
        OrbitModel::Keplerian(k) => k,
        OrbitModel::StateVector(_) => {
            return Err(CoreError::UnsupportedSystem(eph.sat.constellation))
        },
    };

    let c = eph.sat.constellation;
    let gm = gravitational_constant(c);
    let omega_e = earth_rotation_rate(c);
    let dtr_f = relativistic_factor(c);

    let dt_seconds = t.sub_checked(eph.toe)?;

    let sma_m = kep.sqrt_a * kep.sqrt_a;
    let sqrt_sma_m = kep.sqrt_a;

    let n0 = (gm / sma_m.powi(3)).sqrt();
    let n = n0 + kep.dn_rad_s;
    let m_k = kep.m0_rad + n * dt_seconds;

    let mut e_k = m_k;
    let mut e_k_lst = 0.0f64;
    let mut i = 0;
    loop {
        if i > max_iterations {
            return Err(CoreError::DataMismatch(
                "kepler solver failed to converge on eccentric anomaly",
            ));
        }
        e_k = m_k + kep.ecc * e_k_lst.sin();
        if (e_k - e_k_lst).abs() < 1e-10 {
            break;
        }
        i += 1;
        e_k_lst = e_k;
    }

    let (sin_e_k, cos_e_k) = e_k.sin_cos();
    let v_k = ((1.0 - kep.ecc.powi(2)).sqrt() * sin_e_k).atan2(cos_e_k - kep.ecc);

    let phi_k = v_k + kep.omega_rad;
    let (x2_sin_phi_k, x2_cos_phi_k) = (2.0 * phi_k).sin_cos();

    let du_k = kep.cus * x2_sin_phi_k + kep.cuc * x2_cos_phi_k;
    let u_k = phi_k + du_k;

    let dr_k = kep.crs * x2_sin_phi_k + kep.crc * x2_cos_phi_k;
    let r_k = sma_m * (1.0 - kep.ecc * e_k.cos()) + dr_k;

    let di_k = kep.cis * x2_sin_phi_k + kep.cic * x2_cos_phi_k;

    let fd_omega_k = kep.omega_dot_rad_s - omega_e;
    let fd_e_k = n / (1.0 - kep.ecc * e_k.cos());
    let fd_phi_k = ((1.0 + kep.ecc) / (1.0 - kep.ecc)).sqrt()
        * ((v_k / 2.0).cos() / (e_k / 2.0).cos()).powi(2)
        * fd_e_k;

    let fd_u_k =
        (kep.cus * x2_cos_phi_k - kep.cuc * x2_sin_phi_k) * fd_phi_k * 2.0 + fd_phi_k;
    let fd_r_k = sma_m * kep.ecc * e_k.sin() * fd_e_k
        + 2.0 * (kep.crs * x2_cos_phi_k - kep.crc * x2_sin_phi_k) * fd_phi_k;
    let fd_i_k = kep.idot_rad_s
        + 2.0 * (kep.cis * x2_cos_phi_k - kep.cic * x2_sin_phi_k) * fd_phi_k;

    let dtr = dtr_f * kep.ecc * sqrt_sma_m * e_k.sin();
    let fd_dtr = dtr_f * kep.ecc * sqrt_sma_m * e_k.cos() * fd_e_k;

    let (toe_week, toe_sow) = eph.toe.gps_week_sow();
    let _ = toe_week;

    let omega_k = if is_beidou_geo(eph.sat) {
        kep.omega0_rad + kep.omega_dot_rad_s * dt_seconds - omega_e * toe_sow
    } else {
        kep.omega0_rad + (kep.omega_dot_rad_s - omega_e) * dt_seconds - omega_e * toe_sow
    };

    let i_k = kep.i0_rad + di_k + kep.idot_rad_s * dt_seconds;

    let (x, y) = (r_k * u_k.cos(), r_k * u_k.sin());

    let im = Intermediate {
        dt_seconds,
        u_k,
        r_k,
        i_k,
        omega_k,
        fd_u_k,
        fd_r_k,
        fd_i_k,
        fd_omega_k,
        dtr,
        fd_dtr,
        r_sv: (x, y, 0.0),
    };

    let (pos_ecef_m, vel_ecef_mps) = if is_beidou_geo(eph.sat) {
        beidou_geo_state(&im)
    } else {
        meo_state(&im)
    };

    let clock_bias_s = eph.af0 + eph.af1 * dt_seconds + eph.af2 * dt_seconds.powi(2) + dtr;

    Ok(OrbitState {
        pos_ecef_m,
        vel_ecef_mps,
        clock_bias_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CheckState;
    use hifitime::Epoch;

    fn circular_gps_ephemeris() -> Ephemeris {
        let toe = Instant::new(Epoch::from_gpst_seconds(100_000.0), crate::time::TimeSystem::Gps);
        Ephemeris {
            sat: SV::new(Constellation::GPS, 1),
            toc: toe,
            toe,
            af0: 0.0,
            af1: 0.0,
            af2: 0.0,
            tgd: 0.0,
            ura_index: 0,
            accuracy_m: 2.4,
            health: 0,
            iode: 1,
            iodc: 1,
            orbit: OrbitModel::Keplerian(Keplerian {
                sqrt_a: 5153.7,
                ecc: 0.0,
                i0_rad: 0.96,
                idot_rad_s: 0.0,
                omega0_rad: 0.0,
                omega_rad: 0.0,
                omega_dot_rad_s: 0.0,
                m0_rad: 0.0,
                dn_rad_s: 0.0,
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
    fn solves_a_circular_orbit_at_the_reference_epoch() {
        let eph = circular_gps_ephemeris();
        let state = solve(&eph, eph.toe, 10).unwrap();
        let radius = state.pos_ecef_m.norm();
        let expected = eph_radius(&eph);
        assert!((radius - expected).abs() < 1.0, "radius {radius} vs {expected}");
    }

    fn eph_radius(eph: &Ephemeris) -> f64 {
        match &eph.orbit {
            OrbitModel::Keplerian(k) => k.sqrt_a * k.sqrt_a,
            _ => unreachable!(),
        }
    }

    #[test]
    fn rejects_state_vector_ephemerides() {
        let mut eph = circular_gps_ephemeris();
        eph.orbit = OrbitModel::StateVector(Default::default());
        assert!(matches!(
            solve(&eph, eph.toe, 10),
            Err(CoreError::UnsupportedSystem(_))
        ));
    }
}
