//! Crate-wide error taxonomy, as laid out in the error handling design:
//! frame-level faults never escape the codec, decoder faults are logged
//! and skip the offending frame, and only NTRIP/filesystem/config faults
//! are meant to reach a caller.

use thiserror::Error;

/// Every fallible operation in this crate returns this error type.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("short message: needed more bytes than the frame carried")]
    ShortMessage,

    #[error("CRC-24Q mismatch")]
    CrcMismatch,

    #[error("unknown or unsupported RTCM message type {0}")]
    UnknownMessageType(u16),

    #[error("time system mismatch: {lhs:?} vs {rhs:?}")]
    TimeSystemMismatch {
        lhs: crate::time::TimeSystem,
        rhs: crate::time::TimeSystem,
    },

    #[error("data mismatch decoding {0}")]
    DataMismatch(&'static str),

    #[error("NTRIP mountpoint not found (caster returned a source table)")]
    MountPointNotFound,

    #[error("NTRIP authentication failed")]
    AuthFailure,

    #[error("NTRIP caster unreachable")]
    CasterUnreachable,

    #[error("socket closed by peer")]
    SocketClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed RINEX/SP3 header input: {0}")]
    MalformedHeader(&'static str),

    #[error("ephemeris is outdated with respect to the requested epoch")]
    OutdatedEphemeris,

    #[error("ephemeris failed its freshness/sanity check")]
    EphemerisCheckFailed,

    #[error("{0:?} is not supported by the orbit solver")]
    UnsupportedSystem(gnss_rs::prelude::Constellation),

    #[error("no ephemeris on file for {0}")]
    NoEphemeris(gnss_rs::prelude::SV),
}

pub type Result<T> = std::result::Result<T, CoreError>;
