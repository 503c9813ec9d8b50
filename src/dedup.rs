use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::limits::MAX_CACHE_TTL;

/// Requests are identified by who sent them and the id they chose.
pub type RequestKey = (SocketAddr, u32);

struct Cached {
    response: Bytes,
    expiry: Instant,
}

/// Response cache for at-most-once requests.
///
/// Holds the exact bytes sent for a request so a retransmission is answered
/// identically without executing the operation again.
pub struct DedupCache {
    entries: HashMap<RequestKey, Cached>,
    ttl: Duration,
}

impl DedupCache {
    /// `ttl` is capped at [`MAX_CACHE_TTL`] so expiry instants stay representable.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: ttl.min(MAX_CACHE_TTL),
        }
    }

    /// Cached response for `key`, if present and not yet expired.
    pub fn get(&self, key: &RequestKey, now: Instant) -> Option<Bytes> {
        self.entries
            .get(key)
            .filter(|c| c.expiry > now)
            .map(|c| c.response.clone())
    }

    pub fn insert(&mut self, key: RequestKey, response: Bytes, now: Instant) {
        self.entries.insert(
            key,
            Cached {
                response,
                expiry: now + self.ttl,
            },
        );
    }

    /// Drop every entry with `expiry <= now`. Returns how many were removed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, c| c.expiry > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
