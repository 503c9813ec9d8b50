mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use mutations::Shift;
pub use store::FacilityStore;

use std::collections::HashMap;

/// Reservation engine: the business rules over the facility store plus the
/// per-facility usage counters.
///
/// All methods are synchronous. The server keeps one `Engine` behind a single
/// lock, so every read-check-write sequence below is atomic with respect to
/// other requests.
pub struct Engine {
    store: FacilityStore,
    usage: HashMap<String, i64>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            store: FacilityStore::new(),
            usage: HashMap::new(),
        }
    }

    pub fn store(&self) -> &FacilityStore {
        &self.store
    }
}
