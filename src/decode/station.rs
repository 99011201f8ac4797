//! Station metadata decoders (1005/1006 antenna reference point,
//! 1007/1008 antenna descriptor/serial, 1033 receiver+antenna combined),
//! grounded on `RTCM3Decoder::decodeAntennaPosition`/`decodeAntennaDescriptor`/
//! `decodeRcvAnt`. `StationInfo` fields are additive: each decoder fills in
//! only the fields its message carries, leaving the rest `None` for the
//! caller to merge into a per-station running record.

use crate::bits::BitReader;
use crate::error::CoreError;
use crate::model::StationInfo;

/// `GETSTRING`: an 8-bit length prefix followed by that many raw bytes,
/// byte-aligned, read as Latin-1/ASCII per RTCM convention.
fn get_string(r: &mut BitReader<'_>) -> Result<String, CoreError> {
    let len = r.get(8)? as usize;
    let bytes = r.get_string(len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decodes message 1005 or 1006 (antenna reference point, with or without
/// antenna height).
pub fn decode_antenna_position(payload: &[u8], message_number: u16) -> Result<StationInfo, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let station_id = r.get(12)? as u16;
    r.skip(6)?; // ITRF realization year
    r.skip(4)?;
    let x = r.get_scaled_signed(38, 0.0001)?;
    r.skip(2)?;
    let y = r.get_scaled_signed(38, 0.0001)?;
    r.skip(2)?;
    let z = r.get_scaled_signed(38, 0.0001)?;

    let antenna_height_m = if message_number == 1006 {
        Some(r.get_scaled(16, 0.0001)?)
    } else {
        None
    };

    Ok(StationInfo {
        station_id,
        antenna_reference_point_ecef_m: Some([x, y, z]),
        antenna_height_m,
        ..Default::default()
    })
}

/// Decodes message 1007 or 1008 (antenna descriptor, with or without
/// serial number).
pub fn decode_antenna_descriptor(
    payload: &[u8],
    message_number: u16,
) -> Result<StationInfo, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let station_id = r.get(12)? as u16;
    let antenna_descriptor = Some(get_string(&mut r)?);
    r.skip(8)?; // setup ID

    let antenna_serial = if message_number == 1008 {
        Some(get_string(&mut r)?)
    } else {
        None
    };

    Ok(StationInfo {
        station_id,
        antenna_descriptor,
        antenna_serial,
        ..Default::default()
    })
}

/// Decodes message 1033 (antenna + receiver descriptor combined).
pub fn decode_receiver_antenna(payload: &[u8]) -> Result<StationInfo, CoreError> {
    let mut r = BitReader::new(payload);
    r.skip(12)?;
    let station_id = r.get(12)? as u16;
    let antenna_descriptor = Some(get_string(&mut r)?);
    r.skip(8)?; // setup ID
    let antenna_serial = Some(get_string(&mut r)?);
    let receiver_type = Some(get_string(&mut r)?);
    let receiver_firmware = Some(get_string(&mut r)?);
    let receiver_serial = Some(get_string(&mut r)?);

    Ok(StationInfo {
        station_id,
        antenna_descriptor,
        antenna_serial,
        receiver_type,
        receiver_firmware,
        receiver_serial,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

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
        fn put_string(&mut self, s: &str) {
            self.put(8, s.len() as u64);
            for b in s.bytes() {
                self.put(8, b as u64);
            }
        }
    }

    #[test]
    fn decodes_1006_with_height() {
        let mut w = W { bytes: Vec::new(), pos: 0 };
        w.put(12, 1006);
        w.put(12, 7);
        w.put(6, 0);
        w.put(4, 0);
        w.put(38, (12345i64 & ((1i64 << 38) - 1)) as u64);
        w.put(2, 0);
        w.put(38, 0);
        w.put(2, 0);
        w.put(38, 0);
        w.put(16, 500);
        let info = decode_antenna_position(&w.bytes, 1006).unwrap();
        assert_eq!(info.station_id, 7);
        assert!(info.antenna_height_m.is_some());
    }

    #[test]
    fn decodes_1033_descriptor_strings() {
        let mut w = W { bytes: Vec::new(), pos: 0 };
        w.put(12, 1033);
        w.put(12, 3);
        w.put_string("TRM59800.00");
        w.put(8, 0);
        w.put_string("12345");
        w.put_string("TRIMBLE NETR9");
        w.put_string("5.44");
        w.put_string("5429K69050");
        let info = decode_receiver_antenna(&w.bytes).unwrap();
        assert_eq!(info.antenna_descriptor.as_deref(), Some("TRM59800.00"));
        assert_eq!(info.receiver_type.as_deref(), Some("TRIMBLE NETR9"));
    }
}
