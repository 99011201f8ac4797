//! Low-precision analytic solar position, used only for the APC→CoM
//! sun-vector construction (§4.7's orbit-correction writer). The original
//! calls out to GPSTk's `SunPosition`, a full ephemeris lookup; this crate
//! carries no planetary ephemerides dependency (the same reasoning behind
//! `kepler.rs` dropping `anise`), so this uses the standard low-precision
//! solar formula from the Astronomical Almanac — the same one RTKLIB's
//! `sunmoonpos` implements — which is accurate to a few arcminutes, more
//! than sufficient for a ~1m antenna offset correction.

use nalgebra::{Matrix3, Vector3};

use crate::time::{Instant, TimeSystem};

/// Approximate Sun position in ECEF meters at `t`.
pub fn sun_position_ecef(t: Instant) -> Vector3<f64> {
    let tt = t.to_system(TimeSystem::Utc);
    let jd = tt.epoch.to_jde_utc_days();
    let d = jd - 2_451_545.0;

    let mean_longitude = (280.460 + 0.9856474 * d).to_radians();
    let mean_anomaly = (357.528 + 0.9856003 * d).to_radians();
    let ecliptic_longitude =
        mean_longitude + (1.915 * mean_anomaly.sin() + 0.020 * (2.0 * mean_anomaly).sin()).to_radians();
    let obliquity = (23.439 - 0.0000004 * d).to_radians();
    let distance_au = 1.00014 - 0.01671 * mean_anomaly.cos() - 0.00014 * (2.0 * mean_anomaly).cos();
    const AU_M: f64 = 1.495_978_707e11;
    let r = distance_au * AU_M;

    let x_eci = r * ecliptic_longitude.cos();
    let y_eci = r * ecliptic_longitude.sin() * obliquity.cos();
    let z_eci = r * ecliptic_longitude.sin() * obliquity.sin();

    let gmst_rad = greenwich_mean_sidereal_time_rad(jd);
    let rotation = Matrix3::new(
        gmst_rad.cos(),
        gmst_rad.sin(),
        0.0,
        -gmst_rad.sin(),
        gmst_rad.cos(),
        0.0,
        0.0,
        0.0,
        1.0,
    );
    rotation * Vector3::new(x_eci, y_eci, z_eci)
}

fn greenwich_mean_sidereal_time_rad(jd: f64) -> f64 {
    let t = (jd - 2_451_545.0) / 36525.0;
    let gmst_deg = 280.460_618_37
        + 360.985_647_366_29 * (jd - 2_451_545.0)
        + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    (gmst_deg.rem_euclid(360.0)).to_radians()
}
