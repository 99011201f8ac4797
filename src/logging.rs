//! A small rate-limited logging helper so a noisy caster (bad CRCs, a flaky
//! socket) doesn't flood the log: decoder and writer I/O errors should be
//! logged once per minute per kind, not once per occurrence. This crate
//! logs through the `log` facade, gated behind a Cargo feature, and
//! installs no subscriber of its own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimitedLogger {
    period: Duration,
    last_logged: Mutex<HashMap<&'static str, Instant>>,
}

impl RateLimitedLogger {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Returns `true` if `kind` hasn't been logged within the rate-limit
    /// period, and records that it's being logged now.
    fn should_log(&self, kind: &'static str) -> bool {
        let mut map = self.last_logged.lock().unwrap();
        let now = Instant::now();
        match map.get(kind) {
            Some(last) if now.duration_since(*last) < self.period => false,
            _ => {
                map.insert(kind, now);
                true
            },
        }
    }

    #[cfg(feature = "log")]
    pub fn warn(&self, kind: &'static str, message: &str) {
        if self.should_log(kind) {
            log::warn!("[{kind}] {message}");
        }
    }

    #[cfg(not(feature = "log"))]
    pub fn warn(&self, kind: &'static str, _message: &str) {
        let _ = self.should_log(kind);
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::per_minute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_repeats_within_the_period() {
        let logger = RateLimitedLogger::new(Duration::from_secs(60));
        assert!(logger.should_log("crc_mismatch"));
        assert!(!logger.should_log("crc_mismatch"));
    }

    #[test]
    fn distinct_kinds_are_tracked_independently() {
        let logger = RateLimitedLogger::new(Duration::from_secs(60));
        assert!(logger.should_log("crc_mismatch"));
        assert!(logger.should_log("short_message"));
    }

    #[test]
    fn logs_again_once_the_period_elapses() {
        let logger = RateLimitedLogger::new(Duration::from_millis(10));
        assert!(logger.should_log("crc_mismatch"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(logger.should_log("crc_mismatch"));
    }
}
