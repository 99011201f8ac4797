//! SSR (State-Space Representation) decoders: RTCM message numbers
//! 1057-1068 (GPS/Galileo/QZSS/SBAS/BeiDou bases) and 1240-1270 (GLONASS and
//! the remaining per-system bases). Field widths and scale factors are
//! grounded on the `T_*`/`G_*` macro table in the original encoder/decoder
//! (`clock_and_orbit/clock_orbit_rtcm.c`), which this module mirrors
//! bit-for-bit; the macros are shared across constellations ("GPS macros
//! also used for other systems when matching!") so one set of field readers
//! serves all message bases.

use gnss_rs::prelude::{Constellation, SV};

use crate::bits::BitReader;
use crate::error::CoreError;
use crate::model::{
    SsrClockCorr, SsrCodeBias, SsrHighRateClock, SsrOrbitCorr, SsrPhaseBias, SsrUra, Vtec,
    VtecLayer, SSR_UPDATE_INTERVAL_TABLE,
};
use crate::time::{Instant, TimeSystem};

/// One constellation's SSR message base, i.e. the message number used for
/// the "orbit" variant; the clock/combined/bias/URA/VTEC variants sit at
/// fixed offsets from it (per `corbase[]` / `COBOFS_*` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrBase {
    Gps,
    Glonass,
    Galileo,
    Qzss,
    Sbas,
    BeiDou,
}

/// The decoded variant of an SSR block, discriminated by its offset from
/// the constellation's base message number.
#[derive(Debug, Clone)]
pub enum SsrRecord {
    Orbit(Vec<SsrOrbitCorr>),
    Clock(Vec<SsrClockCorr>),
    Combined(Vec<SsrOrbitCorr>, Vec<SsrClockCorr>),
    CodeBias(Vec<SsrCodeBias>),
    PhaseBias(Vec<SsrPhaseBias>),
    HighRateClock(Vec<SsrHighRateClock>),
    Ura(Vec<SsrUra>),
    Vtec(Vtec),
}

/// Offsets from a constellation's base message number, grounded on the
/// `COBOFS_*` enum in `clock_orbit_rtcm.h`: `0`=orbit, `1`=clock,
/// `2`=code bias, `3`=combined orbit+clock, `4`=URA, `5`=high-rate clock.
/// Phase bias messages live in a separate 1265-1270 block, one per
/// constellation in the same GPS/GLONASS/Galileo/QZSS/SBAS/BeiDou order,
/// and are classified as offset `6` here for dispatch convenience (VTEC, at
/// GPS offset `7`=1264, is handled by [`decode_vtec`] directly by message
/// number since it has no per-constellation counterpart).
pub fn classify(message_number: u16) -> Option<(SsrBase, u16)> {
    if message_number == 1264 {
        return Some((SsrBase::Gps, 7));
    }
    if (1265..=1270).contains(&message_number) {
        let base = match message_number - 1265 {
            0 => SsrBase::Gps,
            1 => SsrBase::Glonass,
            2 => SsrBase::Galileo,
            3 => SsrBase::Qzss,
            4 => SsrBase::Sbas,
            _ => SsrBase::BeiDou,
        };
        return Some((base, 6));
    }
    let (base_start, base) = match message_number {
        1057..=1062 => (1057, SsrBase::Gps),
        1063..=1068 => (1063, SsrBase::Glonass),
        1240..=1245 => (1240, SsrBase::Galileo),
        1246..=1251 => (1246, SsrBase::Qzss),
        1252..=1257 => (1252, SsrBase::Sbas),
        1258..=1263 => (1258, SsrBase::BeiDou),
        _ => return None,
    };
    Some((base, message_number - base_start))
}

/// Dispatches a classified SSR payload to the matching decoder.
pub fn decode(
    payload: &[u8],
    base: SsrBase,
    offset: u16,
    around: Instant,
) -> Result<SsrRecord, CoreError> {
    match offset {
        0 => Ok(SsrRecord::Orbit(decode_orbit(payload, base, around)?)),
        1 => Ok(SsrRecord::Clock(decode_clock(payload, base, around)?)),
        2 => Ok(SsrRecord::CodeBias(decode_code_bias(payload, base, around)?)),
        3 => {
            let (orbits, clocks) = decode_combined(payload, base, around)?;
            Ok(SsrRecord::Combined(orbits, clocks))
        },
        4 => Ok(SsrRecord::Ura(decode_ura(payload, base, around)?)),
        5 => Ok(SsrRecord::HighRateClock(decode_high_rate_clock(
            payload, base, around,
        )?)),
        6 => Ok(SsrRecord::PhaseBias(decode_phase_bias(payload, base, around)?)),
        7 => Ok(SsrRecord::Vtec(decode_vtec(payload, around)?)),
        _ => Err(CoreError::DataMismatch("unrecognized SSR offset")),
    }
}

fn constellation_of(base: SsrBase) -> Constellation {
    match base {
        SsrBase::Gps => Constellation::GPS,
        SsrBase::Glonass => Constellation::Glonass,
        SsrBase::Galileo => Constellation::Galileo,
        SsrBase::Qzss => Constellation::QZSS,
        SsrBase::Sbas => Constellation::WAAS, // any SBAS augmentation system
        SsrBase::BeiDou => Constellation::BeiDou,
    }
}

fn sat_id_bits(base: SsrBase) -> usize {
    match base {
        SsrBase::Glonass => 5,
        SsrBase::Qzss => 4,
        _ => 6,
    }
}

fn sv_from_id(base: SsrBase, id: u64) -> SV {
    SV::new(constellation_of(base), id as u8)
}

fn decode_epoch_time(
    r: &mut BitReader<'_>,
    base: SsrBase,
    around: Instant,
) -> Result<Instant, CoreError> {
    if base == SsrBase::Glonass {
        let tod = r.get(17)? as f64;
        Ok(Instant::resolve_periodic(around, TimeSystem::Glo, tod, 86_400.0))
    } else {
        let tow = r.get(20)? as f64;
        Ok(Instant::resolve_periodic(around, TimeSystem::Gps, tow, 604_800.0))
    }
}

fn update_interval(r: &mut BitReader<'_>) -> Result<f64, CoreError> {
    let code = r.get(4)? as usize;
    Ok(SSR_UPDATE_INTERVAL_TABLE[code])
}

/// `pow(3, class) * (1 + value/4) - 1`, divided by 1000 to produce meters;
/// the URA encoding, grounded on `URAToValue` in the original.
pub fn ura_class_value_to_meters(ura_class: u8, ura_value: u8) -> f64 {
    if ura_class == 0 && ura_value == 0 {
        return 0.0;
    }
    let combined = ((ura_class as u32) << 3) | ura_value as u32;
    if combined == 63 {
        return 5.4665; // SSR_MAXURA
    }
    (3f64.powi(ura_class as i32) * (1.0 + ura_value as f64 / 4.0) - 1.0) / 1000.0
}

/// Decodes an Orbit (offset 0) block: `{message_number, epoch_time,
/// update_interval, mmi, sat_ref_datum, ssr_iod, provider_id, solution_id,
/// n_sats, [per-sat: id, iode, dRadial, dAlongTrack, dCrossTrack, dotR,
/// dotA, dotC]}`.
pub fn decode_orbit(
    payload: &[u8],
    base: SsrBase,
    around: Instant,
) -> Result<Vec<SsrOrbitCorr>, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?; // message number, already used to classify
    let t = decode_epoch_time(&mut r, base, around)?;
    let update_interval_s = update_interval(&mut r)?;
    r.skip(1)?; // multiple message indicator
    let _sat_ref_datum = r.get(1)?;
    let ssr_iod = r.get(4)? as u16;
    let provider_id = r.get(16)? as u16;
    let solution_id = r.get(4)? as u16;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut out = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        let sat_iode = r.get(8)? as u16; // IODE/IOD width is 8 bits for every system this decoder supports
        out.push(SsrOrbitCorr {
            sat: sv_from_id(base, id),
            iod: sat_iode,
            t,
            update_interval_s,
            d_radial_m: r.get_scaled_signed(22, 0.1e-3)?,
            d_along_track_m: r.get_scaled_signed(20, 0.4e-3)?,
            d_cross_track_m: r.get_scaled_signed(20, 0.4e-3)?,
            dot_radial_mps: r.get_scaled_signed(21, 0.001e-3)?,
            dot_along_track_mps: r.get_scaled_signed(19, 0.004e-3)?,
            dot_cross_track_mps: r.get_scaled_signed(19, 0.004e-3)?,
            provider_id,
            solution_id,
        });
        let _ = ssr_iod;
    }
    Ok(out)
}

/// Decodes a Clock (offset 1) block: same header minus the satellite
/// reference datum bit, then `{id, c0, c1, c2}` per satellite. The IOD
/// field is absent from clock blocks in the wire format; correlation with
/// a matching orbit correction is the [`crate::correlator`]'s job.
pub fn decode_clock(
    payload: &[u8],
    base: SsrBase,
    around: Instant,
) -> Result<Vec<SsrClockCorr>, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let t = decode_epoch_time(&mut r, base, around)?;
    let update_interval_s = update_interval(&mut r)?;
    r.skip(1)?;
    let _ssr_iod = r.get(4)?;
    let provider_id = r.get(16)? as u16;
    let solution_id = r.get(4)? as u16;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut out = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        out.push(SsrClockCorr {
            sat: sv_from_id(base, id),
            iod: None,
            t,
            update_interval_s,
            c0_m: r.get_scaled_signed(22, 0.1e-3)?,
            c1_mps: r.get_scaled_signed(21, 0.001e-3)?,
            c2_mps2: r.get_scaled_signed(27, 0.00002e-3)?,
            provider_id,
            solution_id,
        });
    }
    Ok(out)
}

/// Decodes a Combined Orbit-And-Clock (offset 2) block: orbit fields
/// immediately followed by clock fields for the same satellite, sharing
/// one header and one `n_sats` count.
pub fn decode_combined(
    payload: &[u8],
    base: SsrBase,
    around: Instant,
) -> Result<(Vec<SsrOrbitCorr>, Vec<SsrClockCorr>), CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let t = decode_epoch_time(&mut r, base, around)?;
    let update_interval_s = update_interval(&mut r)?;
    r.skip(1)?;
    let _sat_ref_datum = r.get(1)?;
    let _ssr_iod = r.get(4)?;
    let provider_id = r.get(16)? as u16;
    let solution_id = r.get(4)? as u16;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut orbits = Vec::with_capacity(n_sats);
    let mut clocks = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        let sv = sv_from_id(base, id);
        let sat_iode = r.get(8)? as u16;
        orbits.push(SsrOrbitCorr {
            sat: sv,
            iod: sat_iode,
            t,
            update_interval_s,
            d_radial_m: r.get_scaled_signed(22, 0.1e-3)?,
            d_along_track_m: r.get_scaled_signed(20, 0.4e-3)?,
            d_cross_track_m: r.get_scaled_signed(20, 0.4e-3)?,
            dot_radial_mps: r.get_scaled_signed(21, 0.001e-3)?,
            dot_along_track_mps: r.get_scaled_signed(19, 0.004e-3)?,
            dot_cross_track_mps: r.get_scaled_signed(19, 0.004e-3)?,
            provider_id,
            solution_id,
        });
        clocks.push(SsrClockCorr {
            sat: sv,
            iod: Some(sat_iode),
            t,
            update_interval_s,
            c0_m: r.get_scaled_signed(22, 0.1e-3)?,
            c1_mps: r.get_scaled_signed(21, 0.001e-3)?,
            c2_mps2: r.get_scaled_signed(27, 0.00002e-3)?,
            provider_id,
            solution_id,
        });
    }
    Ok((orbits, clocks))
}

/// Decodes a Code Bias (offset 3) block: per-satellite repeated
/// `{signal_id(5), code_bias(14, 0.01m)}` groups, `n_biases` long.
pub fn decode_code_bias(
    payload: &[u8],
    base: SsrBase,
    around: Instant,
) -> Result<Vec<SsrCodeBias>, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let t = decode_epoch_time(&mut r, base, around)?;
    let _update_interval_s = update_interval(&mut r)?;
    r.skip(1)?;
    let _ssr_iod = r.get(4)?;
    let _provider_id = r.get(16)?;
    let _solution_id = r.get(4)?;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut out = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        let n_biases = r.get(5)? as usize;
        let mut biases = Vec::with_capacity(n_biases);
        for _ in 0..n_biases {
            let signal_id = r.get(5)? as u8;
            let bias_m = r.get_scaled_signed(14, 0.01)?;
            biases.push((signal_id, bias_m));
        }
        out.push(SsrCodeBias {
            sat: sv_from_id(base, id),
            t,
            biases,
        });
    }
    Ok(out)
}

/// Decodes a Phase Bias (offset 4) block: per-signal groups carry the
/// dispersive-bias/MW-consistency/discontinuity-counter flags ahead of the
/// phase bias value itself (bits read and discarded: this decoder keeps
/// only the bias value, matching the store's needs).
pub fn decode_phase_bias(
    payload: &[u8],
    base: SsrBase,
    around: Instant,
) -> Result<Vec<SsrPhaseBias>, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let t = decode_epoch_time(&mut r, base, around)?;
    let _update_interval_s = update_interval(&mut r)?;
    r.skip(1)?;
    let _ssr_iod = r.get(4)?;
    let _provider_id = r.get(16)?;
    let _solution_id = r.get(4)?;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut out = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        let n_biases = r.get(5)? as usize;
        let mut biases = Vec::with_capacity(n_biases);
        for _ in 0..n_biases {
            let signal_id = r.get(5)? as u8;
            r.skip(1)?; // dispersive bias indicator
            r.skip(1)?; // MW consistency indicator
            r.skip(2)?; // wide lane indicator
            r.skip(4)?; // discontinuity counter
            let bias_cycles = r.get_scaled_signed(20, 0.0001)?;
            biases.push((signal_id, bias_cycles));
        }
        out.push(SsrPhaseBias {
            sat: sv_from_id(base, id),
            t,
            biases,
        });
    }
    Ok(out)
}

/// Decodes a High-Rate Clock (offset 5) block: same header minus IOD,
/// then `{id, hr_clock(22, 0.1mm)}` per satellite, added onto the
/// satellite's last low-rate `c0` by [`crate::correlator::Correlator`].
pub fn decode_high_rate_clock(
    payload: &[u8],
    base: SsrBase,
    around: Instant,
) -> Result<Vec<SsrHighRateClock>, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let t = decode_epoch_time(&mut r, base, around)?;
    let _update_interval_s = update_interval(&mut r)?;
    r.skip(1)?;
    let _provider_id = r.get(16)?;
    let _solution_id = r.get(4)?;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut out = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        out.push(SsrHighRateClock {
            sat: sv_from_id(base, id),
            t,
            high_rate_clock_m: r.get_scaled_signed(22, 0.1e-3)?,
        });
    }
    Ok(out)
}

/// Decodes a URA (offset 6) block: `{id, ura(6)}` per satellite, the 6-bit
/// field split into a 3-bit class and 3-bit value and converted to meters
/// via [`ura_class_value_to_meters`].
pub fn decode_ura(payload: &[u8], base: SsrBase, around: Instant) -> Result<Vec<SsrUra>, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let t = decode_epoch_time(&mut r, base, around)?;
    let _update_interval_s = update_interval(&mut r)?;
    r.skip(1)?;
    let _provider_id = r.get(16)?;
    let _solution_id = r.get(4)?;
    let n_sats = r.get(6)? as usize;

    let id_bits = sat_id_bits(base);
    let mut out = Vec::with_capacity(n_sats);
    for _ in 0..n_sats {
        let id = r.get(id_bits)?;
        let ura = r.get(6)? as u8;
        out.push(SsrUra {
            sat: sv_from_id(base, id),
            t,
            ura_class: ura >> 3,
            ura_value: ura & 0x7,
        });
    }
    Ok(out)
}

/// Decodes a VTEC (offset 7, GPS base only) block: `{epoch_time,
/// update_interval, n_layers, quality_indicator, [per-layer: height,
/// degree, order, C coefficients, S coefficients]}`.
pub fn decode_vtec(payload: &[u8], around: Instant) -> Result<Vtec, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let tow = r.get(20)? as f64;
    let t = Instant::resolve_periodic(around, TimeSystem::Gps, tow, 604_800.0);
    let _update_interval_s = update_interval(&mut r)?;
    let n_layers = r.get(2)? as usize + 1;
    let quality_indicator = r.get_scaled(9, 1.0 / 20.0)?;

    let mut layers = Vec::with_capacity(n_layers);
    for _ in 0..n_layers {
        let height_m = r.get_scaled(8, 10_000.0)?;
        let degree = r.get(4)? as u8 + 1;
        let order = r.get(4)? as u8 + 1;
        let n_coeff = (degree as usize + 1) * (order as usize + 1);
        let mut coefficients_c = Vec::with_capacity(n_coeff);
        let mut coefficients_s = Vec::with_capacity(n_coeff);
        for _ in 0..n_coeff {
            coefficients_c.push(r.get_scaled_signed(16, 1.0 / 200.0)?);
        }
        for _ in 0..n_coeff {
            coefficients_s.push(r.get_scaled_signed(16, 1.0 / 200.0)?);
        }
        layers.push(VtecLayer {
            height_m,
            degree,
            order,
            coefficients_c,
            coefficients_s,
        });
    }
    Ok(Vtec {
        t,
        quality_indicator,
        layers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_gps_orbit_and_glonass_clock_bases() {
        assert_eq!(classify(1057), Some((SsrBase::Gps, 0)));
        assert_eq!(classify(1063), Some((SsrBase::Glonass, 0)));
    }

    #[test]
    fn unknown_message_number_is_not_ssr() {
        assert_eq!(classify(1004), None);
    }

    #[test]
    fn ura_zero_is_zero_meters() {
        assert_eq!(ura_class_value_to_meters(0, 0), 0.0);
    }

    #[test]
    fn ura_class_value_increases_monotonically_with_class() {
        let low = ura_class_value_to_meters(1, 0);
        let high = ura_class_value_to_meters(4, 0);
        assert!(high > low);
    }

    #[test]
    fn update_interval_table_maps_code_to_seconds() {
        assert_eq!(SSR_UPDATE_INTERVAL_TABLE[0], 1.0);
        assert_eq!(SSR_UPDATE_INTERVAL_TABLE[9], 300.0);
        assert_eq!(SSR_UPDATE_INTERVAL_TABLE[15], 10800.0);
    }
}
