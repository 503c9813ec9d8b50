use std::collections::BTreeSet;

use crate::model::*;

use super::availability::free_intervals;
use super::{Engine, EngineError};

impl Engine {
    /// Free intervals of `facility` on `day`, in start order.
    pub fn query_day(&mut self, facility: &str, day: Day) -> Result<Vec<Interval>, EngineError> {
        self.store.ensure_facility(facility)?;
        self.free_on(facility, day)
    }

    /// Same as [`Engine::query_day`] without creating the facility. Used to
    /// build callback payloads from a read-only view.
    pub fn free_on(&self, facility: &str, day: Day) -> Result<Vec<Interval>, EngineError> {
        free_intervals(self.store.facility(facility), day)
            .into_iter()
            .map(|span| {
                Interval::from_span(span).map_err(|e| EngineError::Internal(e.to_string()))
            })
            .collect()
    }

    /// Days of the week that at least one booking on `facility` overlaps.
    /// An overnight booking counts for both of its days.
    pub fn days_with_bookings(&self, facility: &str) -> BTreeSet<Day> {
        self.store
            .facility(facility)
            .map(|f| f.bookings.iter().flat_map(|(span, _)| span.days()).collect())
            .unwrap_or_default()
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.store.get_booking(id)
    }

    pub fn bookings_of(&self, facility: &str) -> Vec<Booking> {
        self.store
            .bookings_of(facility)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn usage(&self, facility: &str) -> i64 {
        self.usage.get(facility).copied().unwrap_or(0)
    }
}
