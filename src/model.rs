//! Core record types shared by the decoders, the ephemeris store and the
//! writers. A tagged sum (`Ephemeris::orbit: OrbitModel`) stands in for the
//! original decoder's class hierarchy (`OrbitEph2` base, `GPSEphemeris2`
//! subclass, ...), per the design note on replacing long class hierarchies
//! with a tagged sum plus free functions.

use gnss_rs::prelude::{Constellation, SV};

use crate::time::Instant;

/// Validity/slip-status bits carried per observation entry, modeled after
/// the RINEX Loss-of-Lock Indicator bitmask.
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObsFlags: u8 {
        const SLIP = 0b0000_0001;
        const HALF_CYCLE_AMBIGUOUS = 0b0000_0010;
    }
}

/// A single frequency's worth of observation data for one satellite at one
/// epoch. Each field's validity is encoded as `Option` rather than a
/// separate bitmask: reading a numeric field and checking its presence are
/// the same operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsEntry {
    /// RINEX observation code, e.g. "1C", "2W".
    pub rnx_code: &'static str,
    pub code_range_m: Option<f64>,
    pub phase_cycles: Option<f64>,
    pub doppler_hz: Option<f64>,
    pub snr_dbhz: Option<f64>,
    pub slip_counter: Option<u8>,
    pub flags: ObsFlags,
}

impl ObsEntry {
    pub fn empty(rnx_code: &'static str) -> Self {
        Self {
            rnx_code,
            code_range_m: None,
            phase_cycles: None,
            doppler_hz: None,
            snr_dbhz: None,
            slip_counter: None,
            flags: ObsFlags::empty(),
        }
    }
}

/// One satellite's observation record at one epoch, at one station.
/// Invariant: `frequencies` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub time: Instant,
    pub sat: SV,
    pub station: u16,
    pub frequencies: Vec<ObsEntry>,
}

/// Where an [`Ephemeris`] came from and how to interpret its orbital
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum OrbitModel {
    /// GPS/Galileo/BeiDou(MEO)/QZSS broadcast as Keplerian elements plus
    /// harmonic perturbation terms.
    Keplerian(Keplerian),
    /// GLONASS/SBAS broadcast as an instantaneous ECEF state vector
    /// (position/velocity/acceleration), propagated rather than solved.
    StateVector(StateVector),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keplerian {
    pub sqrt_a: f64,
    pub ecc: f64,
    pub i0_rad: f64,
    pub idot_rad_s: f64,
    pub omega0_rad: f64,
    pub omega_rad: f64,
    pub omega_dot_rad_s: f64,
    pub m0_rad: f64,
    pub dn_rad_s: f64,
    pub cuc: f64,
    pub cus: f64,
    pub cic: f64,
    pub cis: f64,
    pub crc: f64,
    pub crs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StateVector {
    pub pos_m: [f64; 3],
    pub vel_mps: [f64; 3],
    pub accel_mps2: [f64; 3],
    /// GLONASS frequency-channel relative clock bias term (`gamma_n`).
    pub freq_bias: f64,
}

/// Mutable freshness state a stored [`Ephemeris`] carries through its
/// `{Fresh -> Ok <-> Outdated -> Evicted}` / `{Fresh -> Bad -> Evicted}`
/// lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Fresh,
    Ok,
    Bad,
    Outdated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ephemeris {
    pub sat: SV,
    pub toc: Instant,
    pub toe: Instant,
    pub af0: f64,
    pub af1: f64,
    pub af2: f64,
    pub tgd: f64,
    pub ura_index: u8,
    pub accuracy_m: f64,
    pub health: u8,
    pub iode: u16,
    pub iodc: u16,
    pub orbit: OrbitModel,
    pub check_state: CheckState,
    /// Position-difference metric (meters) recorded against the previous
    /// `last()` ephemeris at insertion time, regardless of accept/reject
    /// outcome — kept even on rejection so callers can see how far a
    /// discarded broadcast diverged.
    pub divergence_metric: Option<f64>,
    pub orb_corr: Option<SsrOrbitCorr>,
    pub clk_corr: Option<SsrClockCorr>,
}

impl Ephemeris {
    /// The IOD used to correlate with SSR corrections: IODE for GPS/
    /// Galileo/BeiDou/QZSS Keplerian broadcasts.
    pub fn iod(&self) -> u16 {
        self.iode
    }

    /// `self` is newer than `other` if its ToE/ToC is later, or if it has
    /// the same epoch but a higher IODE (re-broadcast of the same epoch
    /// with revised parameters).
    pub fn is_newer_than(&self, other: &Ephemeris) -> bool {
        match self.toe.sub_checked(other.toe) {
            Ok(dt) if dt > 0.0 => true,
            Ok(dt) if dt < 0.0 => false,
            _ => self.iode > other.iode,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == 0
    }
}

/// Update interval codes (RTCM SSR DF391/DF392 "standard" scale), indexed
/// by the 4-bit field value.
pub const SSR_UPDATE_INTERVAL_TABLE: [f64; 16] = [
    1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 240.0, 300.0, 600.0, 900.0, 1800.0, 3600.0,
    7200.0, 10800.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatRefDatum {
    Itrf,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrOrbitCorr {
    pub sat: SV,
    pub iod: u16,
    pub t: Instant,
    pub update_interval_s: f64,
    pub d_radial_m: f64,
    pub d_along_track_m: f64,
    pub d_cross_track_m: f64,
    pub dot_radial_mps: f64,
    pub dot_along_track_mps: f64,
    pub dot_cross_track_mps: f64,
    pub provider_id: u16,
    pub solution_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrClockCorr {
    pub sat: SV,
    pub iod: Option<u16>,
    pub t: Instant,
    pub update_interval_s: f64,
    pub c0_m: f64,
    pub c1_mps: f64,
    pub c2_mps2: f64,
    pub provider_id: u16,
    pub solution_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrCodeBias {
    pub sat: SV,
    pub t: Instant,
    pub biases: Vec<(u8, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrPhaseBias {
    pub sat: SV,
    pub t: Instant,
    pub biases: Vec<(u8, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrHighRateClock {
    pub sat: SV,
    pub t: Instant,
    pub high_rate_clock_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrUra {
    pub sat: SV,
    pub t: Instant,
    pub ura_class: u8,
    pub ura_value: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vtec {
    pub t: Instant,
    pub quality_indicator: f64,
    pub layers: Vec<VtecLayer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VtecLayer {
    pub height_m: f64,
    pub degree: u8,
    pub order: u8,
    pub coefficients_c: Vec<f64>,
    pub coefficients_s: Vec<f64>,
}

/// Antenna reference point (1005/1006) and descriptors (1007/1008/1033).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationInfo {
    pub station_id: u16,
    pub antenna_reference_point_ecef_m: Option<[f64; 3]>,
    pub antenna_height_m: Option<f64>,
    pub antenna_descriptor: Option<String>,
    pub antenna_serial: Option<String>,
    pub receiver_type: Option<String>,
    pub receiver_firmware: Option<String>,
    pub receiver_serial: Option<String>,
}

/// Satellite systems carried over RTCM-v3, used purely for dispatch and
/// logging; satellite identity itself is `gnss_rs::prelude::SV`.
pub fn system_name(c: Constellation) -> &'static str {
    match c {
        Constellation::GPS => "GPS",
        Constellation::Glonass => "GLONASS",
        Constellation::Galileo => "Galileo",
        Constellation::BeiDou => "BeiDou",
        Constellation::QZSS => "QZSS",
        _ => "SBAS",
    }
}
