use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::engine::EngineError;
use crate::limits::MAX_MONITORS;

/// One registered callback target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorEntry {
    pub target: SocketAddr,
    pub expiry: Instant,
}

impl MonitorEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        self.expiry > now
    }
}

/// Callback registrations per facility.
///
/// Entries are appended on register and only leave through
/// [`MonitorRegistry::sweep_expired`]; lookups filter by expiry so a stale
/// entry between sweeps is never returned.
pub struct MonitorRegistry {
    by_facility: DashMap<String, Vec<MonitorEntry>>,
    total: AtomicUsize,
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self {
            by_facility: DashMap::new(),
            total: AtomicUsize::new(0),
        }
    }

    /// Register `target` for updates on `facility` until `now + duration`.
    pub fn register(
        &self,
        target: SocketAddr,
        facility: &str,
        duration: Duration,
        now: Instant,
    ) -> Result<Instant, EngineError> {
        if facility.is_empty() {
            return Err(EngineError::EmptyName("facility"));
        }
        if self.total.load(Ordering::Relaxed) >= MAX_MONITORS {
            return Err(EngineError::LimitExceeded("too many monitors"));
        }
        let expiry = now + duration;
        self.by_facility
            .entry(facility.to_string())
            .or_default()
            .push(MonitorEntry { target, expiry });
        self.total.fetch_add(1, Ordering::Relaxed);
        Ok(expiry)
    }

    /// Snapshot of the unexpired entries for `facility`.
    pub fn active_for(&self, facility: &str, now: Instant) -> Vec<MonitorEntry> {
        self.by_facility
            .get(facility)
            .map(|entries| entries.iter().filter(|e| e.is_live(now)).copied().collect())
            .unwrap_or_default()
    }

    /// Drop every entry with `expiry <= now`. Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.by_facility.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.is_live(now));
            removed += before - entries.len();
            !entries.is_empty()
        });
        self.total.fetch_sub(removed, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
