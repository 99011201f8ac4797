//! `CoreContext`: a named replacement for the original's `SignalCenter`
//! singleton. Where the original reaches every component through
//! `SignalCenter::instance()`, every component here takes a `&CoreContext`
//! (or a clone of the one handle it needs) at construction — no global
//! statics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::ephemeris_store::EphemerisStore;
use crate::hub::Broadcast;
use crate::model::{Ephemeris, Observation, SsrClockCorr, SsrOrbitCorr};

const HUB_CAPACITY: usize = 64;

/// Owns the shared, mutex-guarded ephemeris store, the per-record-kind
/// broadcast hubs PPP-style subscribers attach to, a `Config` snapshot, and
/// the shutdown flags for every thread this context's owner spawns.
pub struct CoreContext {
    pub config: Config,
    ephemeris_store: Mutex<EphemerisStore>,
    pub obs_hub: Broadcast<Observation>,
    pub eph_hub: Broadcast<Ephemeris>,
    pub orbit_corr_hub: Broadcast<SsrOrbitCorr>,
    pub clock_corr_hub: Broadcast<SsrClockCorr>,
    shutdown: AtomicBool,
}

impl CoreContext {
    pub fn new(config: Config) -> Arc<Self> {
        let max_queue_size = config.max_queue_size;
        Arc::new(Self {
            config,
            ephemeris_store: Mutex::new(EphemerisStore::new(max_queue_size)),
            obs_hub: Broadcast::new(HUB_CAPACITY),
            eph_hub: Broadcast::new(HUB_CAPACITY),
            orbit_corr_hub: Broadcast::new(HUB_CAPACITY),
            clock_corr_hub: Broadcast::new(HUB_CAPACITY),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn ephemeris_store(&self) -> std::sync::MutexGuard<'_, EphemerisStore> {
        self.ephemeris_store.lock().unwrap()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_not_shutting_down() {
        let ctx = CoreContext::new(Config::default());
        assert!(!ctx.is_shutting_down());
    }

    #[test]
    fn shutdown_flag_is_observable_after_request() {
        let ctx = CoreContext::new(Config::default());
        ctx.request_shutdown();
        assert!(ctx.is_shutting_down());
    }

    #[test]
    fn ephemeris_store_starts_empty() {
        let ctx = CoreContext::new(Config::default());
        assert!(ctx.ephemeris_store().sat_list().is_empty());
    }
}
