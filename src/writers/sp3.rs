//! SP3 precise-orbit writer: resolves a filename from the first epoch seen,
//! emits a header on first write, and grid-dumps interpolated satellite
//! state whenever a new clock-correction time advances past the last
//! written epoch. Grounded on `NtripSP3Stream::printHeader`/`writeFile`/
//! `dumpEpoch`/`satConvertToCoM`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use gnss_rs::prelude::{Constellation, SV};

use crate::antex::AntexTable;
use crate::corrected_state;
use crate::error::CoreError;
use crate::ephemeris_store::EphemerisStore;
use crate::sun;
use crate::time::{Instant, TimeSystem};

/// Antenna reference point the writer emits positions relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePoint {
    /// Antenna Phase Center: no correction applied.
    Apc,
    /// Center of Mass: APC→CoM offset subtracted using the sun-vector
    /// construction. Only applied for GPS, the one constellation an ANTEX
    /// table's phase-center offset is looked up for here.
    CenterOfMass,
}

pub struct Sp3Writer {
    out_dir: PathBuf,
    mount: String,
    sample_secs: f64,
    reference_point: ReferencePoint,
    antex: Option<AntexTable>,
    file: Option<File>,
    file_name: Option<String>,
    header_written: bool,
    last_epoch: Option<Instant>,
    last_clk_corr_time: Option<Instant>,
}

impl Sp3Writer {
    pub fn new(out_dir: impl Into<PathBuf>, mount: impl Into<String>, sample_secs: f64) -> Self {
        Self {
            out_dir: out_dir.into(),
            mount: mount.into(),
            sample_secs,
            reference_point: ReferencePoint::Apc,
            antex: None,
            file: None,
            file_name: None,
            header_written: false,
            last_epoch: None,
            last_clk_corr_time: None,
        }
    }

    pub fn with_antex(mut self, table: AntexTable) -> Self {
        self.reference_point = ReferencePoint::CenterOfMass;
        self.antex = Some(table);
        self
    }

    /// `<mount><GPSweek><dow>.sp3`.
    fn resolve_file_name(&self, t: Instant) -> String {
        let (week, sow) = t.gps_week_sow();
        let dow = (sow / 86_400.0).floor() as u32;
        format!("{}{}{}.sp3", self.mount, week, dow)
    }

    fn ensure_open(&mut self, t: Instant) -> Result<(), CoreError> {
        let name = self.resolve_file_name(t);
        if self.file_name.as_deref() != Some(name.as_str()) {
            std::fs::create_dir_all(&self.out_dir)?;
            let path = self.out_dir.join(&name);
            let existed = path.exists();
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.file = Some(file);
            self.file_name = Some(name);
            self.header_written = existed;
        }
        Ok(())
    }

    fn print_header(&mut self, epoch: Instant) -> Result<(), CoreError> {
        let (week, sow) = epoch.gps_week_sow();
        let utc = epoch.to_system(TimeSystem::Utc);
        let (y, mo, d, h, mi, s, ns) = utc.epoch.to_gregorian_utc();
        let sec_f = s as f64 + ns as f64 * 1.0e-9;
        let mjd = utc.epoch.to_mjd_utc_days();
        let mjd_int = mjd.floor();
        let day_frac = mjd - mjd_int;

        let file = self.file.as_mut().expect("ensure_open called first");
        writeln!(
            file,
            "#aP{y:04}{mo:2}{d:2}{h:2}{mi:2}{sec_f:11.8}  1440 ORBIT IGS08 HLM  IGS"
        )?;
        writeln!(
            file,
            "## {week:4}{sow:16.8}{sample:15.8}{mjd_int:6}{day_frac:16.13}",
            sample = self.sample_secs
        )?;
        writeln!(file, "+   32   G01G02G03G04G05G06G07G08G09G10G11G12G13G14G15G16G17")?;
        writeln!(file, "+        G18G19G20G21G22G23G24G25G26G27G28G29G30G31G32  0  0")?;
        for _ in 0..3 {
            writeln!(file, "+          0  0  0  0  0  0  0  0  0  0  0  0  0  0  0  0  0")?;
        }
        for _ in 0..5 {
            writeln!(file, "++         0  0  0  0  0  0  0  0  0  0  0  0  0  0  0  0  0")?;
        }
        writeln!(file, "%c G  cc GPS ccc cccc cccc cccc cccc ccccc ccccc ccccc ccccc")?;
        writeln!(file, "%c cc cc ccc ccc cccc cccc cccc cccc ccccc ccccc ccccc ccccc")?;
        writeln!(file, "%f  0.0000000  0.000000000  0.00000000000  0.000000000000000")?;
        writeln!(file, "%f  0.0000000  0.000000000  0.00000000000  0.000000000000000")?;
        writeln!(file, "%i    0    0    0    0      0      0      0      0         0")?;
        writeln!(file, "%i    0    0    0    0      0      0      0      0         0")?;
        for _ in 0..4 {
            writeln!(file, "/*")?;
        }
        self.header_written = true;
        Ok(())
    }

    fn sat_code(sat: SV) -> String {
        let letter = match sat.constellation {
            Constellation::GPS => 'G',
            Constellation::Glonass => 'R',
            Constellation::Galileo => 'E',
            Constellation::BeiDou => 'C',
            Constellation::QZSS => 'J',
            _ => 'S',
        };
        format!("{letter}{:02}", sat.prn)
    }

    fn write_record(
        &mut self,
        epoch: Instant,
        sat: SV,
        pos_m: [f64; 3],
        clock_bias_s: f64,
    ) -> Result<(), CoreError> {
        self.ensure_open(epoch)?;
        if !self.header_written {
            self.print_header(epoch)?;
        }

        if self.last_epoch != Some(epoch) {
            let utc = epoch.to_system(TimeSystem::Utc);
            let (y, mo, d, h, mi, s, _) = utc.epoch.to_gregorian_utc();
            let file = self.file.as_mut().unwrap();
            writeln!(file, "*  {y:04} {mo:2} {d:2} {h:2} {mi:2} {s:2}.00000000")?;
            self.last_epoch = Some(epoch);
        }

        let clk_us = clock_bias_s * 1.0e6;
        let file = self.file.as_mut().unwrap();
        writeln!(
            file,
            "P{}{:14.6}{:14.6}{:14.6}{:14.6}",
            Self::sat_code(sat),
            pos_m[0] / 1000.0,
            pos_m[1] / 1000.0,
            pos_m[2] / 1000.0,
            clk_us,
        )?;
        Ok(())
    }

    /// Subtracts the antenna phase-center offset, rotated into ECEF via the
    /// satellite-to-Earth and Earth-to-Sun unit vectors, leaving `pos`
    /// unchanged when no ANTEX table was loaded or the satellite isn't GPS.
    fn apc_to_com(&self, sat: SV, t: Instant, pos_m: [f64; 3]) -> [f64; 3] {
        if self.reference_point != ReferencePoint::CenterOfMass || sat.constellation != Constellation::GPS {
            return pos_m;
        }
        let Some(table) = &self.antex else {
            return pos_m;
        };
        let Some(pco) = table.l1_pco(sat) else {
            return pos_m;
        };

        let sat_pos = nalgebra::Vector3::new(pos_m[0], pos_m[1], pos_m[2]);
        let sun_pos = sun::sun_position_ecef(t);

        let r_k = -sat_pos.normalize();
        let r_i = sun_pos.normalize();
        let r_j = r_k.cross(&r_i).normalize();
        let r_i = r_j.cross(&r_k).normalize();

        let offset_m = pco.z_mm / 1000.0 * r_i + pco.y_mm / 1000.0 * r_j + pco.x_mm / 1000.0 * r_k;
        [sat_pos.x - offset_m.x, sat_pos.y - offset_m.y, sat_pos.z - offset_m.z]
    }

    /// Called on every accepted clock correction time; grid-dumps one row
    /// per satellite for each sample-interval epoch between the writer's
    /// last written epoch (exclusive) and `clk_corr_time` (inclusive).
    pub fn on_clock_correction_time(
        &mut self,
        store: &EphemerisStore,
        clk_corr_time: Instant,
    ) -> Result<(), CoreError> {
        if self.sample_secs <= 0.0 {
            return Ok(());
        }
        if self.last_clk_corr_time == Some(clk_corr_time) {
            return Ok(());
        }
        self.last_clk_corr_time = Some(clk_corr_time);

        let start = match self.last_epoch {
            Some(last) => last.add_seconds(self.sample_secs),
            None => clk_corr_time,
        };

        let mut epoch = start;
        loop {
            let past_end = epoch.sub_checked(clk_corr_time).map(|dt| dt > 0.0).unwrap_or(true);
            if past_end {
                break;
            }
            self.dump_epoch(store, epoch)?;
            epoch = epoch.add_seconds(self.sample_secs);
        }
        Ok(())
    }

    fn dump_epoch(&mut self, store: &EphemerisStore, t: Instant) -> Result<(), CoreError> {
        for sat in store.sat_list() {
            let Some(eph) = store.last(sat) else {
                continue;
            };
            if !eph.is_healthy() {
                continue;
            }
            let Ok(state) = corrected_state::solve_corrected(eph, t) else {
                continue;
            };
            let pos = [state.pos_ecef_m.x, state.pos_ecef_m.y, state.pos_ecef_m.z];
            let pos = self.apc_to_com(sat, t, pos);
            self.write_record(t, sat, pos, state.clock_bias_s)?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), CoreError> {
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "EOF")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckState, Ephemeris, Keplerian, OrbitModel};
    use hifitime::Epoch;

    fn gps_eph(prn: u8, toe_secs: f64) -> Ephemeris {
        let toe = Instant::new(Epoch::from_gpst_seconds(toe_secs), TimeSystem::Gps);
        Ephemeris {
            sat: SV::new(Constellation::GPS, prn),
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
            orb_corr: None,
            clk_corr: None,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ntrip-corr-core-sp3-test-{name}"));
        p
    }

    #[test]
    fn writes_header_once_and_one_record_per_satellite() {
        let dir = scratch_dir("single-epoch");
        let _ = std::fs::remove_dir_all(&dir);
        let mut store = EphemerisStore::new(5);
        let eph = gps_eph(5, 100_000.0);
        store.insert(eph.clone(), eph.toc);

        let mut writer = Sp3Writer::new(&dir, "TEST", 30.0);
        writer.dump_epoch(&store, eph.toc).unwrap();
        writer.close().unwrap();

        let name = writer.resolve_file_name(eph.toc);
        let contents = std::fs::read_to_string(dir.join(name)).unwrap();
        assert!(contents.starts_with("#aP"));
        assert!(contents.contains("PG05"));
        assert!(contents.trim_end().ends_with("EOF"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn grid_loop_emits_one_epoch_per_sample_interval() {
        let dir = scratch_dir("grid-loop");
        let _ = std::fs::remove_dir_all(&dir);
        let mut store = EphemerisStore::new(5);
        let eph = gps_eph(5, 100_000.0);
        store.insert(eph.clone(), eph.toc);

        let mut writer = Sp3Writer::new(&dir, "TEST", 30.0);
        writer.last_epoch = Some(eph.toc);
        let clk_corr_time = eph.toc.add_seconds(90.0);
        writer.on_clock_correction_time(&store, clk_corr_time).unwrap();
        writer.close().unwrap();

        let name = writer.resolve_file_name(eph.toc);
        let contents = std::fs::read_to_string(dir.join(name)).unwrap();
        let epoch_lines = contents.lines().filter(|l| l.starts_with('*')).count();
        assert_eq!(epoch_lines, 3);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
