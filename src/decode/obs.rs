//! GPS (1001-1004) and GLONASS (1009-1012) observation decoders, grounded
//! on `RTCM3Decoder::decodeRTCM3GPS`/`decodeRTCM3GLONASS`. Only the
//! L1-only (1002) and L1+L2 (1004) / GLONASS equivalents (1010/1012)
//! variants are implemented; 1001/1003/1009/1011 (no SNR) aren't carried by
//! any caster this pipeline targets and are left undecoded.

use gnss_rs::prelude::{Constellation, SV};

use crate::bits::BitReader;
use crate::error::CoreError;
use crate::model::{ObsEntry, ObsFlags, Observation};
use crate::time::{Instant, TimeSystem};

const L1_WAVELENGTH_GPS: f64 = 0.190293672798;
const L2_WAVELENGTH_GPS: f64 = 0.244210213425;
const GLONASS_WAVELENGTH_L1: f64 = 0.187136365590;
const GLONASS_WAVELENGTH_L2: f64 = 0.242135527852;
const LIGHT_MS: f64 = 299_792.458;

/// One station epoch's worth of decoded satellite observations plus the
/// raw time-of-week/time-of-day the message carried, before the caller
/// resolves it to an absolute [`Instant`] and feeds it to the epoch
/// assembler.
pub struct ObsMessage {
    pub station: u16,
    pub raw_time_field: u64,
    pub sync: bool,
    pub observations: Vec<Observation>,
}

fn decode_gps_frequency(
    r: &mut BitReader<'_>,
    message_number: u16,
    l1_range_m: &mut f64,
    amb: &mut i64,
    second_freq: bool,
) -> Result<ObsEntry, CoreError> {
    if !second_freq {
        let code_bit = r.get(1)?;
        let rnx_code = if code_bit != 0 { "1W" } else { "1C" };
        let mut entry = ObsEntry::empty(rnx_code);
        let l1_range_whole = r.get(24)? as f64;
        let phase_diff = r.get_signed(20)?;
        *l1_range_m = l1_range_whole * 0.02;
        if phase_diff & 0xFFFFF != 0x80000 {
            entry.code_range_m = Some(*l1_range_m);
            entry.phase_cycles = Some((*l1_range_m + phase_diff as f64 * 0.0005) / L1_WAVELENGTH_GPS);
        }
        let slip = r.get(7)? as u8;
        entry.slip_counter = Some(slip);
        if message_number == 1002 || message_number == 1004 {
            let amb_raw = r.get(8)? as i64;
            *amb = amb_raw;
            if amb_raw != 0 {
                if let Some(c) = entry.code_range_m.as_mut() {
                    *c += amb_raw as f64 * LIGHT_MS;
                }
                if let Some(p) = entry.phase_cycles.as_mut() {
                    *p += (amb_raw as f64 * LIGHT_MS) / L1_WAVELENGTH_GPS;
                }
            }
            let snr_raw = r.get(8)? as u32;
            if snr_raw != 0 {
                entry.snr_dbhz = Some(snr_raw as f64 * 0.25);
            }
        }
        Ok(entry)
    } else {
        let code = r.get(2)?;
        let rnx_code = match code {
            3 | 2 => "2W",
            1 => "2P",
            _ => "2X",
        };
        let mut entry = ObsEntry::empty(rnx_code);
        let code_diff = r.get_signed(14)?;
        if code_diff & 0x3FFF != 0x2000 {
            entry.code_range_m =
                Some(*l1_range_m + code_diff as f64 * 0.02 + *amb as f64 * LIGHT_MS);
        }
        let phase_diff = r.get_signed(20)?;
        if phase_diff & 0xFFFFF != 0x80000 {
            entry.phase_cycles = Some(
                (*l1_range_m + phase_diff as f64 * 0.0005 + *amb as f64 * LIGHT_MS)
                    / L2_WAVELENGTH_GPS,
            );
        }
        let slip = r.get(7)? as u8;
        entry.slip_counter = Some(slip);
        if message_number == 1004 {
            let snr_raw = r.get(8)? as u32;
            if snr_raw != 0 {
                entry.snr_dbhz = Some(snr_raw as f64 * 0.25);
            }
        }
        Ok(entry)
    }
}

/// Decodes message 1002 (L1-only) or 1004 (L1+L2). `around` seeds the
/// within-week TOW resolution.
pub fn decode_gps(payload: &[u8], message_number: u16, around: Instant) -> Result<ObsMessage, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?; // message number
    let station = r.get(12)? as u16;
    let raw_tow = r.get(30)?;
    let sync = r.get(1)? != 0;
    let mut num_sats = r.get(5)?;
    r.skip(4)?; // smoothing indicator, smoothing interval

    let t = Instant::resolve_periodic(around, TimeSystem::Gps, raw_tow as f64 / 1000.0, 604_800.0);

    let mut observations = Vec::new();
    while num_sats > 0 {
        num_sats -= 1;
        let sv_raw = r.get(6)?;
        let sat = if sv_raw < 40 && sv_raw != 0 {
            SV::new(Constellation::GPS, sv_raw as u8)
        } else {
            SV::new(Constellation::WAAS, (sv_raw as i64 - 20).max(0) as u8)
        };

        let mut l1_range_m = 0.0;
        let mut amb = 0i64;
        let mut frequencies = vec![decode_gps_frequency(
            &mut r,
            message_number,
            &mut l1_range_m,
            &mut amb,
            false,
        )?];
        if message_number == 1003 || message_number == 1004 {
            frequencies.push(decode_gps_frequency(
                &mut r,
                message_number,
                &mut l1_range_m,
                &mut amb,
                true,
            )?);
        }

        if sat.constellation == Constellation::GPS {
            observations.push(Observation {
                time: t,
                sat,
                station,
                frequencies,
            });
        }
    }

    Ok(ObsMessage {
        station,
        raw_time_field: raw_tow,
        sync,
        observations,
    })
}

fn decode_glonass_frequency(
    r: &mut BitReader<'_>,
    message_number: u16,
    l1_range_m: &mut f64,
    freq_channel: i8,
    second_freq: bool,
) -> Result<ObsEntry, CoreError> {
    let (l1_wave, l2_wave) = glonass_wavelengths(freq_channel);
    if !second_freq {
        let code_bit = r.get(1)?;
        let rnx_code = if code_bit != 0 { "1P" } else { "1C" };
        let mut entry = ObsEntry::empty(rnx_code);
        r.skip(5)?; // frequency channel number, already passed in by caller
        let range_whole = r.get(25)? as f64;
        let phase_diff = r.get_signed(20)?;
        *l1_range_m = range_whole * 0.02;
        if phase_diff & 0xFFFFF != 0x80000 {
            entry.code_range_m = Some(*l1_range_m);
            entry.phase_cycles = Some((*l1_range_m + phase_diff as f64 * 0.0005) / l1_wave);
        }
        let slip = r.get(7)? as u8;
        entry.slip_counter = Some(slip);
        if message_number == 1010 || message_number == 1012 {
            r.skip(7)?; // integer ms ambiguity carried separately for GLONASS
            let snr_raw = r.get(8)? as u32;
            if snr_raw != 0 {
                entry.snr_dbhz = Some(snr_raw as f64 * 0.25);
            }
        }
        Ok(entry)
    } else {
        let code = r.get(2)?;
        let rnx_code = if code != 0 { "2P" } else { "2C" };
        let mut entry = ObsEntry::empty(rnx_code);
        let code_diff = r.get_signed(14)?;
        if code_diff & 0x3FFF != 0x2000 {
            entry.code_range_m = Some(*l1_range_m + code_diff as f64 * 0.02);
        }
        let phase_diff = r.get_signed(20)?;
        if phase_diff & 0xFFFFF != 0x80000 {
            entry.phase_cycles = Some((*l1_range_m + phase_diff as f64 * 0.0005) / l2_wave);
        }
        let slip = r.get(7)? as u8;
        entry.slip_counter = Some(slip);
        if message_number == 1012 {
            let snr_raw = r.get(8)? as u32;
            if snr_raw != 0 {
                entry.snr_dbhz = Some(snr_raw as f64 * 0.25);
            }
        }
        Ok(entry)
    }
}

fn glonass_wavelengths(freq_channel: i8) -> (f64, f64) {
    let df1 = 0.56250e6 * freq_channel as f64;
    let df2 = 0.43750e6 * freq_channel as f64;
    (
        299_792_458.0 / (1_602.0e6 + df1),
        299_792_458.0 / (1_246.0e6 + df2),
    )
}

/// Decodes message 1010 (L1-only) or 1012 (L1+L2) GLONASS observations.
/// Time-of-day wraps daily rather than weekly, since GLONASS's DF034 field
/// counts milliseconds since UTC midnight rather than GPS week seconds.
pub fn decode_glonass(
    payload: &[u8],
    message_number: u16,
    around: Instant,
) -> Result<ObsMessage, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let station = r.get(12)? as u16;
    let raw_tod = r.get(27)?;
    let sync = r.get(1)? != 0;
    let mut num_sats = r.get(5)?;
    r.skip(4)?;

    let t = Instant::resolve_periodic(
        around,
        TimeSystem::Glo,
        (raw_tod >> 7) as f64,
        86_400.0,
    );

    let mut observations = Vec::new();
    while num_sats > 0 {
        num_sats -= 1;
        let sv_raw = r.get(6)? as u8;
        let sat = SV::new(Constellation::Glonass, sv_raw);
        let freq_channel = (r.get(5)? as i8) - 7;

        let mut l1_range_m = 0.0;
        let mut frequencies = vec![decode_glonass_frequency(
            &mut r,
            message_number,
            &mut l1_range_m,
            freq_channel,
            false,
        )?];
        if message_number == 1011 || message_number == 1012 {
            frequencies.push(decode_glonass_frequency(
                &mut r,
                message_number,
                &mut l1_range_m,
                freq_channel,
                true,
            )?);
        }
        observations.push(Observation {
            time: t,
            sat,
            station,
            frequencies,
        });
    }

    Ok(ObsMessage {
        station,
        raw_time_field: raw_tod,
        sync,
        observations,
    })
}

/// Accumulates successive sync-bit-linked messages into one epoch's worth
/// of observations: messages carrying `sync=1` belong to the same epoch as
/// the next message with `sync=0`.
#[derive(Default)]
pub struct ObsEpochAccumulator {
    pending: Vec<Observation>,
}

impl ObsEpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one decoded message in; returns the completed epoch's
    /// observations once a `sync=false` message closes the run, or `None`
    /// while the epoch is still accumulating.
    pub fn push(&mut self, msg: ObsMessage) -> Option<Vec<Observation>> {
        self.pending.extend(msg.observations);
        if msg.sync {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn flags_for_slip(slip_counter: u8, previous: Option<u8>) -> ObsFlags {
        match previous {
            Some(prev) if prev != slip_counter => ObsFlags::SLIP,
            _ => ObsFlags::empty(),
        }
    }
}
