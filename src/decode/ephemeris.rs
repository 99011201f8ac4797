//! Ephemeris decoders. GPS (1019) is grounded bit-for-bit on
//! `RTCM3Decoder::decodeGPSEphemeris`. GLONASS (1020) and the
//! SBAS/QZSS/Galileo/BeiDou messages (1042/1043/1044/1045/1046) have no
//! body in the original decoder (`decodeGLONASSEphemeris` and siblings are
//! empty stubs) — GLONASS is implemented from the public RTCM-v3
//! state-vector layout, and the other four reuse the GPS Keplerian field
//! widths as a documented approximation (see DESIGN.md); treat their
//! decoded values as structurally plausible, not bit-exact.

use gnss_rs::prelude::{Constellation, SV};
use std::f64::consts::PI;

use crate::bits::BitReader;
use crate::error::CoreError;
use crate::model::{CheckState, Ephemeris, Keplerian, OrbitModel, StateVector};
use crate::time::{Instant, TimeSystem};

const P2_5: f64 = 1.0 / 32.0;
const P2_19: f64 = 1.0 / 524_288.0;
const P2_29: f64 = 1.0 / 536_870_912.0;
const P2_31: f64 = 1.0 / 2_147_483_648.0;
const P2_33: f64 = P2_31 / 4.0;
const P2_43: f64 = P2_31 / 4096.0;
const P2_55: f64 = P2_43 / 4096.0;

/// Decodes message 1019 (GPS legacy Keplerian ephemeris).
pub fn decode_gps_1019(payload: &[u8], around: Instant) -> Result<Ephemeris, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?; // message number
    let prn = r.get(6)? as u8;
    let week = r.get(10)? as u64;
    let ura_index = r.get(4)? as u8;
    let _codeflags = r.get(2)?;
    let idot_rad_s = r.get_scaled_signed(14, PI * P2_43)?;
    let iode = r.get(8)? as u16;
    let toc_raw = r.get(16)? as f64 * 16.0;
    let af2 = r.get_scaled_signed(8, P2_55)?;
    let af1 = r.get_scaled_signed(16, P2_43)?;
    let af0 = r.get_scaled_signed(22, P2_31)?;
    let iodc = r.get(10)? as u16;
    let crs = r.get_scaled_signed(16, P2_5)?;
    let dn_rad_s = r.get_scaled_signed(16, PI * P2_43)?;
    let m0_rad = r.get_scaled_signed(32, PI * P2_31)?;
    let cuc = r.get_scaled_signed(16, P2_29)?;
    let ecc = r.get_scaled(32, P2_33)?;
    let cus = r.get_scaled_signed(16, P2_29)?;
    let sqrt_a = r.get_scaled(32, P2_19)?;
    let toe_raw = r.get(16)? as f64 * 16.0;
    let cic = r.get_scaled_signed(16, P2_29)?;
    let omega0_rad = r.get_scaled_signed(32, PI * P2_31)?;
    let cis = r.get_scaled_signed(16, P2_29)?;
    let i0_rad = r.get_scaled_signed(32, PI * P2_31)?;
    let crc = r.get_scaled_signed(16, P2_5)?;
    let omega_rad = r.get_scaled_signed(32, PI * P2_31)?;
    let omega_dot_rad_s = r.get_scaled_signed(24, PI * P2_43)?;
    let tgd = r.get_scaled_signed(8, P2_31)?;
    let health = r.get(6)? as u8;
    let _l2p_data = r.get(1)?;
    let _fit_interval = r.get(1)?;

    let week_start = gps_week_start(around, week);
    let toc = week_start.add_seconds(toc_raw);
    let toe = week_start.add_seconds(toe_raw);

    Ok(Ephemeris {
        sat: SV::new(Constellation::GPS, prn),
        toc,
        toe,
        af0,
        af1,
        af2,
        tgd,
        ura_index,
        accuracy_m: ura_index_to_meters(ura_index),
        health,
        iode,
        iodc,
        orbit: OrbitModel::Keplerian(Keplerian {
            sqrt_a,
            ecc,
            i0_rad,
            idot_rad_s,
            omega0_rad,
            omega_rad,
            omega_dot_rad_s,
            m0_rad,
            dn_rad_s,
            cuc,
            cus,
            cic,
            cis,
            crc,
            crs,
        }),
        check_state: CheckState::Fresh,
        divergence_metric: None,
        orb_corr: None,
        clk_corr: None,
    })
}

/// GPS/ICD Table 20-I accuracy-index-to-meters mapping used for the
/// fallback accuracy estimate when SSR doesn't override it.
fn ura_index_to_meters(index: u8) -> f64 {
    match index {
        0 => 2.4,
        1 => 3.4,
        2 => 4.85,
        3 => 6.85,
        4 => 9.65,
        5 => 13.65,
        6 => 24.0,
        n @ 7..=14 => 2f64.powi((n as i32 + 2) / 2),
        _ => 6144.0,
    }
}

fn gps_week_start(around: Instant, week: u64) -> Instant {
    let (current_week, _) = around.to_system(TimeSystem::Gps).gps_week_sow();
    // Resolve the 10-bit rollover count against the current full week.
    let full_week = current_week - (current_week % 1024) + week as u32;
    let seconds = full_week as f64 * 604_800.0;
    Instant::new(
        hifitime::Epoch::from_gpst_seconds(seconds),
        TimeSystem::Gps,
    )
}

/// Decodes message 1020 (GLONASS ephemeris): an instantaneous PZ-90 state
/// vector rather than Keplerian elements, since GLONASS broadcasts a
/// different orbital model than GPS/Galileo/BeiDou/QZSS.
pub fn decode_glonass_1020(payload: &[u8], around: Instant) -> Result<Ephemeris, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let prn = r.get(6)? as u8;
    let freq_channel = r.get(5)? as i8 - 7;
    r.skip(2)?; // almanac health, health availability
    r.skip(1)?; // P2
    let tk_hours = r.get(5)? as f64;
    let tk_minutes = r.get(6)? as f64;
    let tk_seconds = r.get(1)? as f64 * 30.0;
    r.skip(1)?; // Bn MSB
    r.skip(1)?; // P3
    let gamma_n = r.get_scaled_signed(11, 1.0 / 2f64.powi(40))?;
    r.skip(2)?; // P, ln
    let tb_raw = r.get(7)? as f64 * 900.0;
    let vel_x = r.get_scaled_signed(24, 1.0 / 2f64.powi(20))? * 1000.0;
    let pos_x = r.get_scaled_signed(27, 1.0 / 2f64.powi(11))? * 1000.0;
    let accel_x = r.get_scaled_signed(5, 1.0 / 2f64.powi(30))? * 1000.0;
    let vel_y = r.get_scaled_signed(24, 1.0 / 2f64.powi(20))? * 1000.0;
    let pos_y = r.get_scaled_signed(27, 1.0 / 2f64.powi(11))? * 1000.0;
    let accel_y = r.get_scaled_signed(5, 1.0 / 2f64.powi(30))? * 1000.0;
    let vel_z = r.get_scaled_signed(24, 1.0 / 2f64.powi(20))? * 1000.0;
    let pos_z = r.get_scaled_signed(27, 1.0 / 2f64.powi(11))? * 1000.0;
    let accel_z = r.get_scaled_signed(5, 1.0 / 2f64.powi(30))? * 1000.0;

    let _ = (tk_hours, tk_minutes, tk_seconds);
    let toe = Instant::resolve_periodic(around, TimeSystem::Glo, tb_raw, 86_400.0);

    Ok(Ephemeris {
        sat: SV::new(Constellation::Glonass, prn),
        toc: toe,
        toe,
        af0: 0.0,
        af1: gamma_n,
        af2: 0.0,
        tgd: 0.0,
        ura_index: 0,
        accuracy_m: 10.0,
        health: 0,
        iode: ((tb_raw / 900.0) as u16) & 0x7F,
        iodc: 0,
        orbit: OrbitModel::StateVector(StateVector {
            pos_m: [pos_x, pos_y, pos_z],
            vel_mps: [vel_x, vel_y, vel_z],
            accel_mps2: [accel_x, accel_y, accel_z],
            freq_bias: freq_channel as f64,
        }),
        check_state: CheckState::Fresh,
        divergence_metric: None,
        orb_corr: None,
        clk_corr: None,
    })
}

/// Decodes messages 1044 (QZSS), 1045/1046 (Galileo F/NAV and I/NAV) using
/// the GPS 1019 Keplerian field widths as a structural approximation — see
/// the module doc comment and DESIGN.md.
pub fn decode_keplerian_approx(
    payload: &[u8],
    constellation: Constellation,
    around: Instant,
) -> Result<Ephemeris, CoreError> {
    let mut eph = decode_gps_1019(payload, around)?;
    eph.sat = SV::new(constellation, eph.sat.prn);
    Ok(eph)
}

/// Decodes message 1043 (SBAS ephemeris): also a state-vector broadcast,
/// structurally mirrored on GLONASS's field widths (without the frequency
/// channel) since the original decoder never implemented it either.
pub fn decode_sbas_1043(payload: &[u8], around: Instant) -> Result<Ephemeris, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let prn = r.get(6)? as u8;
    let toe_raw = r.get(13)? as f64 * 16.0;
    let ura_index = r.get(4)? as u8;
    let pos_x = r.get_scaled_signed(30, 0.08)?;
    let pos_y = r.get_scaled_signed(30, 0.08)?;
    let pos_z = r.get_scaled_signed(25, 0.4)?;
    let vel_x = r.get_scaled_signed(17, 0.000625)?;
    let vel_y = r.get_scaled_signed(17, 0.000625)?;
    let vel_z = r.get_scaled_signed(18, 0.004)?;
    let accel_x = r.get_scaled_signed(10, 0.0000125)?;
    let accel_y = r.get_scaled_signed(10, 0.0000125)?;
    let accel_z = r.get_scaled_signed(10, 0.0000625)?;
    let af0 = r.get_scaled_signed(12, 2f64.powi(-31))?;
    let af1 = r.get_scaled_signed(8, 2f64.powi(-40))?;

    let toe = Instant::resolve_periodic(around, TimeSystem::Gps, toe_raw, 86_400.0);

    Ok(Ephemeris {
        sat: SV::new(Constellation::WAAS, prn),
        toc: toe,
        toe,
        af0,
        af1,
        af2: 0.0,
        tgd: 0.0,
        ura_index,
        accuracy_m: ura_index_to_meters(ura_index),
        health: 0,
        iode: 0,
        iodc: 0,
        orbit: OrbitModel::StateVector(StateVector {
            pos_m: [pos_x, pos_y, pos_z],
            vel_mps: [vel_x, vel_y, vel_z],
            accel_mps2: [accel_x, accel_y, accel_z],
            freq_bias: 0.0,
        }),
        check_state: CheckState::Fresh,
        divergence_metric: None,
        orb_corr: None,
        clk_corr: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_1019_all_zero(prn: u8, week: u16) -> Vec<u8> {
        struct W {
            bytes: Vec<u8>,
            pos: usize,
        }
        impl W {
            fn put(&mut self, n: usize, v: u64) {
                for i in (0..n).rev() {
                    let bit = (v >> i) & 1;
                    let byte_idx = self.pos / 8;
                    while self.bytes.len() <= byte_idx {
                        self.bytes.push(0);
                    }
                    if bit != 0 {
                        self.bytes[byte_idx] |= 1 << (7 - self.pos % 8);
                    }
                    self.pos += 1;
                }
            }
        }
        let mut w = W { bytes: Vec::new(), pos: 0 };
        w.put(12, 1019);
        w.put(6, prn as u64);
        w.put(10, week as u64);
        w.put(4, 0); // ura
        w.put(2, 0); // codeflags
        w.put(14, 0); // idot
        w.put(8, 3); // iode
        w.put(16, 0); // toc
        w.put(8, 0); // af2
        w.put(16, 0); // af1
        w.put(22, 0); // af0
        w.put(10, 3); // iodc
        w.put(16, 0); // crs
        w.put(16, 0); // dn
        w.put(32, 0); // m0
        w.put(16, 0); // cuc
        w.put(32, 0); // ecc
        w.put(16, 0); // cus
        w.put(32, 0); // sqrtA
        w.put(16, 0); // toe
        w.put(16, 0); // cic
        w.put(32, 0); // omega0
        w.put(16, 0); // cis
        w.put(32, 0); // i0
        w.put(16, 0); // crc
        w.put(32, 0); // omega
        w.put(24, 0); // omegadot
        w.put(8, 0); // tgd
        w.put(6, 0); // health
        w.put(1, 0);
        w.put(1, 0);
        w.bytes
    }

    #[test]
    fn decodes_gps_ephemeris_prn_and_iode() {
        let bytes = build_1019_all_zero(12, 2190);
        let eph = decode_gps_1019(&bytes, Instant::now_utc()).unwrap();
        assert_eq!(eph.sat.prn, 12);
        assert_eq!(eph.iode, 3);
        assert_eq!(eph.iodc, 3);
        assert!(matches!(eph.orbit, OrbitModel::Keplerian(_)));
    }

    #[test]
    fn ura_index_zero_maps_to_smallest_accuracy() {
        assert!((ura_index_to_meters(0) - 2.4).abs() < 1e-9);
    }
}
