//! Runtime configuration surface: a single flat struct rather than any one
//! file format (the original reads these values out of a `bnc`-style `.ini`
//! via Qt's `QSettings`, not a Rust pattern this crate reproduces). No file
//! format or CLI is implemented here, but the struct derives
//! `Serialize`/`Deserialize` behind the `serde` feature, the way `rinex`
//! derives them for its own record types, so a host binary can load one
//! from whatever format it likes.

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The SSR mountpoint whose corrections are authoritative.
    pub corr_mount: String,
    /// Root directory for correction dumps (RINEX-Obs/Nav, SP3).
    pub corr_path: std::path::PathBuf,
    /// SP3 output grid spacing, seconds.
    pub sample_secs: f64,
    /// Observation flush delay, seconds.
    pub dump_wait_secs: f64,
    /// Ephemeris deque bound per satellite.
    pub max_queue_size: usize,
    /// ANTEX file for the SP3 writer's APC→CoM correction.
    pub antex_file: Option<std::path::PathBuf>,
    /// Whether satellite-state queries apply SSR corrections at all.
    pub use_correction: bool,
    /// BeiDou broadcasts its TOW in BDT; some casters pre-adjust the
    /// leap-second offset to BeiDou, some don't. Resolved here as an
    /// explicit knob rather than a guess (see DESIGN.md).
    pub bds_tow_offset_seconds: f64,

    pub caster_host: String,
    pub caster_port: u16,
    pub mountpoint: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    /// NMEA GGA sentence resent periodically to VRS-style casters.
    pub gga_sentence: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corr_mount: "IGS03".to_string(),
            corr_path: std::path::PathBuf::from("."),
            sample_secs: 1.0,
            dump_wait_secs: 33.0,
            max_queue_size: 5,
            antex_file: None,
            use_correction: true,
            bds_tow_offset_seconds: 14.0,
            caster_host: String::new(),
            caster_port: 2101,
            mountpoint: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: "NTRIP ntrip-corr-core".to_string(),
            gga_sentence: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_configuration_surface() {
        let cfg = Config::default();
        assert_eq!(cfg.sample_secs, 1.0);
        assert_eq!(cfg.dump_wait_secs, 33.0);
        assert_eq!(cfg.max_queue_size, 5);
        assert_eq!(cfg.bds_tow_offset_seconds, 14.0);
        assert!(cfg.use_correction);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn round_trips_through_json() {
        let mut cfg = Config::default();
        cfg.caster_host = "caster.example.org".to_string();
        cfg.mountpoint = "IGS03".to_string();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
