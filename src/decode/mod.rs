//! Message decoders: pure functions from a validated [`crate::frame::Frame`]
//! to a typed record, dispatched by message number. Grounded on
//! `RTCM3Decoder::HandleByte`'s `switch(type)` in the original decoder,
//! which this module's [`dispatch`] mirrors.

pub mod ephemeris;
pub mod obs;
pub mod ssr;
pub mod station;

use gnss_rs::prelude::Constellation;

use crate::error::CoreError;
use crate::frame::Frame;
use crate::model::{Ephemeris, Observation, StationInfo};
use crate::time::Instant;

/// The outcome of decoding one frame: either a typed record, or a message
/// number this decoder doesn't carry semantics for (forwarded to callers
/// that may want to log it, never an error).
#[derive(Debug, Clone)]
pub enum DecodedRecord {
    Observations(Vec<Observation>),
    Ephemeris(Ephemeris),
    Station(StationInfo),
    Ssr(ssr::SsrRecord),
    Unhandled(u16),
}

/// Decodes `frame` against the message number it carries. `around` is the
/// wall-clock instant used to resolve within-period time fields (TOW/TOD)
/// to an absolute [`Instant`].
pub fn dispatch(frame: &Frame, around: Instant) -> Result<DecodedRecord, CoreError> {
    let n = frame.message_number;
    if let Some((base, offset)) = ssr::classify(n) {
        return Ok(DecodedRecord::Ssr(ssr::decode(
            &frame.payload,
            base,
            offset,
            around,
        )?));
    }

    match n {
        1002 | 1004 => {
            let msg = obs::decode_gps(&frame.payload, n, around)?;
            Ok(DecodedRecord::Observations(msg.observations))
        },
        1010 | 1012 => {
            let msg = obs::decode_glonass(&frame.payload, n, around)?;
            Ok(DecodedRecord::Observations(msg.observations))
        },
        1019 => Ok(DecodedRecord::Ephemeris(ephemeris::decode_gps_1019(
            &frame.payload,
            around,
        )?)),
        1020 => Ok(DecodedRecord::Ephemeris(ephemeris::decode_glonass_1020(
            &frame.payload,
            around,
        )?)),
        1043 => Ok(DecodedRecord::Ephemeris(ephemeris::decode_sbas_1043(
            &frame.payload,
            around,
        )?)),
        1042 => Ok(DecodedRecord::Ephemeris(ephemeris::decode_keplerian_approx(
            &frame.payload,
            Constellation::BeiDou,
            around,
        )?)),
        1044 => Ok(DecodedRecord::Ephemeris(ephemeris::decode_keplerian_approx(
            &frame.payload,
            Constellation::QZSS,
            around,
        )?)),
        1045 | 1046 => Ok(DecodedRecord::Ephemeris(ephemeris::decode_keplerian_approx(
            &frame.payload,
            Constellation::Galileo,
            around,
        )?)),
        1005 | 1006 => Ok(DecodedRecord::Station(station::decode_antenna_position(
            &frame.payload,
            n,
        )?)),
        1007 | 1008 => Ok(DecodedRecord::Station(station::decode_antenna_descriptor(
            &frame.payload,
            n,
        )?)),
        1033 => Ok(DecodedRecord::Station(station::decode_receiver_antenna(
            &frame.payload,
        )?)),
        other => Ok(DecodedRecord::Unhandled(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_message_number_is_unhandled_not_an_error() {
        let frame = Frame {
            message_number: 9999,
            payload: vec![0x27, 0x0F, 0, 0],
        };
        match dispatch(&frame, Instant::now_utc()).unwrap() {
            DecodedRecord::Unhandled(n) => assert_eq!(n, 9999),
            other => panic!("expected Unhandled, got {other:?}"),
        }
    }
}
