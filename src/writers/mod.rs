//! Stateful file sinks: RINEX-Obs, RINEX-Nav and SP3. Each resolves its own
//! filename from the civil time of the record it is about to write, opens
//! (or reopens, in append mode) lazily, and emits its format-specific
//! header exactly once per file.

pub mod rinex_nav;
pub mod rinex_obs;
pub mod sp3;

pub use rinex_nav::RinexNavWriter;
pub use rinex_obs::RinexObsWriter;
pub use sp3::{ReferencePoint, Sp3Writer};
