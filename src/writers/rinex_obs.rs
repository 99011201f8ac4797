//! RINEX-Obs v3.00 writer: fixed filename derived from civil time, a header
//! on first write, and one `>`-prefixed epoch record per flushed epoch
//! group handed over by the epoch assembler. Field widths and the `>`
//! epoch-line/per-satellite-line layout are grounded on
//! `observation::formatting::format_epoch_v3`/`format_v3`; this writer
//! only ever emits v3 (no Hatanaka compression, no v2 fallback).

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use gnss_rs::prelude::{Constellation, SV};

use crate::error::CoreError;
use crate::model::Observation;
use crate::time::{Instant, TimeSystem};

pub struct RinexObsWriter {
    out_dir: PathBuf,
    marker_name: String,
    agency: String,
    file: Option<File>,
    header_written: bool,
}

impl RinexObsWriter {
    pub fn new(out_dir: impl Into<PathBuf>, marker_name: impl Into<String>, agency: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            marker_name: marker_name.into(),
            agency: agency.into(),
            file: None,
            header_written: false,
        }
    }

    /// `brdcDDDH.YYn`-style day-of-year naming is used for nav; obs files
    /// use the same day/hour convention with an `o` suffix.
    fn resolve_file_name(&self, t: Instant) -> String {
        let utc = t.to_system(TimeSystem::Utc);
        let doy = utc.epoch.day_of_year() as u32;
        let (y, _, _, h, _, _, _) = utc.epoch.to_gregorian_utc();
        let hour_letter = hour_letter(h);
        format!("{}{doy:03}{hour_letter}.{:02}o", self.marker_name, y % 100)
    }

    fn ensure_open(&mut self, t: Instant) -> Result<(), CoreError> {
        if self.file.is_none() {
            std::fs::create_dir_all(&self.out_dir)?;
            let path = self.out_dir.join(self.resolve_file_name(t));
            let existed = path.exists();
            self.file = Some(OpenOptions::new().create(true).append(true).open(path)?);
            self.header_written = existed;
        }
        Ok(())
    }

    fn print_header(&mut self) -> Result<(), CoreError> {
        let file = self.file.as_mut().expect("ensure_open called first");
        writeln!(
            file,
            "{:9}{:11}{:<20}{:<20}{:<20}",
            "3.00", "OBSERVATION DATA", "M (MIXED)", "", "RINEX VERSION / TYPE"
        )?;
        writeln!(
            file,
            "{:<20}{:<20}{:<20}{:<20}",
            "ntrip-corr-core", &self.agency, "", "PGM / RUN BY / DATE"
        )?;
        writeln!(file, "{:<60}{:<20}", &self.marker_name, "MARKER NAME")?;
        writeln!(
            file,
            "{:6}{:6}{:6}{:42}{:<20}",
            "G", "", "", "", "SYS / # / OBS TYPES"
        )?;
        writeln!(file, "{:<60}{:<20}", "", "END OF HEADER")?;
        self.header_written = true;
        Ok(())
    }

    fn format_epoch_header(&mut self, t: Instant, sats: &BTreeSet<SV>) -> Result<(), CoreError> {
        let utc = t.to_system(TimeSystem::Utc);
        let (y, mo, d, h, mi, s, ns) = utc.epoch.to_gregorian_utc();
        let sec_f = s as f64 + ns as f64 * 1.0e-9;
        let file = self.file.as_mut().unwrap();
        writeln!(
            file,
            "> {y:4} {mo:02} {d:02} {h:02} {mi:02}{sec_f:11.7}  0{:3}",
            sats.len()
        )?;
        Ok(())
    }

    fn sat_letter(sat: SV) -> char {
        match sat.constellation {
            Constellation::GPS => 'G',
            Constellation::Glonass => 'R',
            Constellation::Galileo => 'E',
            Constellation::BeiDou => 'C',
            Constellation::QZSS => 'J',
            _ => 'S',
        }
    }

    /// Writes one flushed epoch's worth of observations (already grouped by
    /// the epoch assembler). `records` need not be sorted; this groups by
    /// `(time, sat)` internally.
    pub fn write_epoch(&mut self, t: Instant, records: &[Observation]) -> Result<(), CoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_open(t)?;
        if !self.header_written {
            self.print_header()?;
        }

        let sats: BTreeSet<SV> = records.iter().map(|o| o.sat).collect();
        self.format_epoch_header(t, &sats)?;

        let mut by_sat: Vec<&Observation> = records.iter().collect();
        by_sat.sort_by_key(|o| (format!("{:?}", o.sat.constellation), o.sat.prn));

        let file = self.file.as_mut().unwrap();
        for obs in by_sat {
            write!(file, "{}{:02}", Self::sat_letter(obs.sat), obs.sat.prn)?;
            for entry in &obs.frequencies {
                match entry.code_range_m {
                    Some(v) => write!(file, "{v:14.3}")?,
                    None => write!(file, "{:14}", "")?,
                }
                let lli = if entry.flags.bits() != 0 {
                    char::from_digit(entry.flags.bits() as u32, 10).unwrap_or(' ')
                } else {
                    ' '
                };
                write!(file, "{lli}")?;
                write!(file, " ")?;
            }
            writeln!(file)?;
        }
        Ok(())
    }
}

fn hour_letter(hour: u8) -> char {
    if hour < 9 {
        (b'0' + hour) as char
    } else {
        (b'a' + (hour - 9)) as char
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObsEntry, ObsFlags};
    use hifitime::Epoch;

    fn obs(sat: SV, t: Instant) -> Observation {
        Observation {
            time: t,
            sat,
            station: 7,
            frequencies: vec![ObsEntry {
                rnx_code: "1C",
                code_range_m: Some(21_000_000.123),
                phase_cycles: None,
                doppler_hz: None,
                snr_dbhz: None,
                slip_counter: None,
                flags: ObsFlags::empty(),
            }],
        }
    }

    #[test]
    fn hour_letter_maps_midnight_and_late_hours() {
        assert_eq!(hour_letter(0), '0');
        assert_eq!(hour_letter(9), 'a');
        assert_eq!(hour_letter(23), 'o');
    }

    #[test]
    fn writes_header_and_epoch_record() {
        let dir = {
            let mut p = std::env::temp_dir();
            p.push("ntrip-corr-core-rinexobs-test");
            p
        };
        let _ = std::fs::remove_dir_all(&dir);
        let t = Instant::new(Epoch::from_gpst_seconds(100_000.0), TimeSystem::Gps);
        let sat = SV::new(Constellation::GPS, 5);

        let mut writer = RinexObsWriter::new(&dir, "TEST", "ntrip-corr-core");
        writer.write_epoch(t, &[obs(sat, t)]).unwrap();

        let name = writer.resolve_file_name(t);
        let contents = std::fs::read_to_string(dir.join(name)).unwrap();
        assert!(contents.contains("RINEX VERSION / TYPE"));
        assert!(contents.contains("G05"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
