//! Minimal ANTEX (Antenna Exchange) reader: just enough to pull a
//! satellite's L1 (`G01`) phase-center offset out of a calibration file for
//! the SP3 writer's APC→CoM correction. The pack's own `rinex::antex`
//! module covers the full format (PCV patterns, ZEN1/ZEN2/DAZI grids,
//! ground antennas) and isn't usable as-is (it doesn't parse), so this is a
//! narrow read grounded directly on the IGS ANTEX column layout rather than
//! adapted from that module.

use std::collections::HashMap;
use std::path::Path;

use gnss_rs::prelude::{Constellation, SV};

use crate::error::CoreError;

/// Phase-center offset in the satellite body frame, millimeters, in the
/// north/east/up convention ANTEX uses for satellite antennas (here:
/// along/across/radial relative to the nominal nadir-pointing attitude).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseCenterOffset {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AntexTable {
    by_sat: HashMap<SV, PhaseCenterOffset>,
}

impl AntexTable {
    pub fn l1_pco(&self, sat: SV) -> Option<PhaseCenterOffset> {
        self.by_sat.get(&sat).copied()
    }

    /// Parses an ANTEX file, keeping only each satellite's `G01` (GPS L1)
    /// phase-center offset. Other constellations' frequency codes
    /// (`E01`, `C01`, `R01`, `J01`) are recognized too, should the SP3
    /// writer's correction ever extend past GPS-only.
    pub fn parse(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        let mut by_sat = HashMap::new();

        let mut current_sat: Option<SV> = None;
        let mut in_target_frequency = false;

        for line in text.lines() {
            if line.len() < 60 {
                continue;
            }
            let (content, marker) = line.split_at(60);
            let marker = marker.trim();

            if marker == "START OF ANTENNA" {
                current_sat = None;
                in_target_frequency = false;
            } else if marker == "TYPE / SERIAL NO" {
                current_sat = parse_satellite_token(content);
            } else if marker == "START OF FREQUENCY" {
                let code = content.trim();
                in_target_frequency = matches!(code, "G01" | "E01" | "C01" | "R01" | "J01");
            } else if marker == "END OF FREQUENCY" {
                in_target_frequency = false;
            } else if marker == "NORTH / EAST / UP" && in_target_frequency {
                if let (Some(sat), Some(pco)) = (current_sat, parse_pco_line(content)) {
                    by_sat.entry(sat).or_insert(pco);
                }
            }
        }

        Ok(Self { by_sat })
    }
}

/// `TYPE / SERIAL NO` carries the satellite code (e.g. `G063`) in columns
/// 21-40; the leading letter gives the constellation and the PRN is read
/// off the line's satellite-system field when present as `Gnn`.
fn parse_satellite_token(content: &str) -> Option<SV> {
    let field = content.get(20..40)?.trim();
    let token = field.split_whitespace().next()?;
    let (letter, digits) = token.split_at(1);
    let prn: u8 = digits.trim_start_matches('0').parse().unwrap_or(0);
    let constellation = match letter {
        "G" => Constellation::GPS,
        "R" => Constellation::Glonass,
        "E" => Constellation::Galileo,
        "C" => Constellation::BeiDou,
        "J" => Constellation::QZSS,
        _ => return None,
    };
    Some(SV::new(constellation, prn))
}

fn parse_pco_line(content: &str) -> Option<PhaseCenterOffset> {
    let north: f64 = content.get(0..10)?.trim().parse().ok()?;
    let east: f64 = content.get(10..20)?.trim().parse().ok()?;
    let up: f64 = content.get(20..30)?.trim().parse().ok()?;
    Some(PhaseCenterOffset {
        x_mm: north,
        y_mm: east,
        z_mm: up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_satellite_token_from_type_serial_field() {
        let content = "BLOCK IIR-M         GPS-OS        G018                ";
        let sat = parse_satellite_token(content);
        assert_eq!(sat, Some(SV::new(Constellation::GPS, 18)));
    }

    #[test]
    fn parses_pco_line_in_millimeters() {
        let content = "    279.3   0.0   1097.5                               ";
        let pco = parse_pco_line(content).unwrap();
        assert!((pco.x_mm - 279.3).abs() < 1e-6);
        assert!((pco.z_mm - 1097.5).abs() < 1e-6);
    }
}
