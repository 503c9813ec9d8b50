use std::collections::HashMap;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Owns every facility and booking. The per-facility booking lists and the
/// global id index are only ever changed together, through the methods below.
pub struct FacilityStore {
    facilities: HashMap<String, FacilityState>,
    bookings: HashMap<BookingId, Booking>,
    next_id: BookingId,
}

impl Default for FacilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FacilityStore {
    pub fn new() -> Self {
        Self {
            facilities: HashMap::new(),
            bookings: HashMap::new(),
            next_id: 1,
        }
    }

    // ── Facilities ───────────────────────────────────────────

    /// The only creation path: facilities spring into existence on first use.
    pub fn ensure_facility(&mut self, name: &str) -> Result<&mut FacilityState, EngineError> {
        if name.is_empty() {
            return Err(EngineError::EmptyName("facility"));
        }
        if name.len() > MAX_FACILITY_NAME_LEN {
            return Err(EngineError::LimitExceeded("facility name too long"));
        }
        if !self.facilities.contains_key(name) {
            if self.facilities.len() >= MAX_FACILITIES {
                return Err(EngineError::LimitExceeded("too many facilities"));
            }
            self.facilities
                .insert(name.to_string(), FacilityState::new(name));
        }
        self.facilities
            .get_mut(name)
            .ok_or_else(|| EngineError::Internal(format!("facility {name} vanished")))
    }

    pub fn facility(&self, name: &str) -> Option<&FacilityState> {
        self.facilities.get(name)
    }

    pub fn facility_count(&self) -> usize {
        self.facilities.len()
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn get_booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.get(&id)
    }

    /// Monotonic; ids are never handed out twice, even after removal.
    pub fn allocate_id(&mut self) -> BookingId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert_booking(&mut self, booking: Booking) -> Result<(), EngineError> {
        let facility = self.ensure_facility(&booking.facility)?;
        if facility.bookings.len() >= MAX_BOOKINGS_PER_FACILITY {
            return Err(EngineError::LimitExceeded("too many bookings on facility"));
        }
        facility.insert(booking.span, booking.id);
        self.bookings.insert(booking.id, booking);
        Ok(())
    }

    /// Move a booking to a new span, returning the old one.
    pub fn update_span(&mut self, id: BookingId, span: Span) -> Result<Span, EngineError> {
        let booking = self.bookings.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        let facility = self
            .facilities
            .get_mut(&booking.facility)
            .ok_or_else(|| EngineError::Internal(format!("booking {id} has no facility")))?;
        let old = booking.span;
        facility.remove(id);
        facility.insert(span, id);
        booking.span = span;
        Ok(old)
    }

    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        let booking = self.bookings.remove(&id)?;
        if let Some(facility) = self.facilities.get_mut(&booking.facility) {
            facility.remove(id);
        }
        Some(booking)
    }

    /// Bookings of a facility in start order.
    pub fn bookings_of(&self, name: &str) -> Vec<&Booking> {
        self.facilities
            .get(name)
            .map(|f| {
                f.bookings
                    .iter()
                    .filter_map(|(_, id)| self.bookings.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(store: &mut FacilityStore, facility: &str, start: Minute, end: Minute) -> BookingId {
        let id = store.allocate_id();
        store
            .insert_booking(Booking {
                id,
                facility: facility.into(),
                user: "u".into(),
                span: Span::new(start, end),
            })
            .unwrap();
        id
    }

    #[test]
    fn ensure_facility_creates_once() {
        let mut store = FacilityStore::new();
        store.ensure_facility("LabA").unwrap();
        store.ensure_facility("LabA").unwrap();
        assert_eq!(store.facility_count(), 1);
        assert!(store.facility("LabB").is_none());
    }

    #[test]
    fn ensure_facility_rejects_bad_names() {
        let mut store = FacilityStore::new();
        assert_eq!(
            store.ensure_facility("").err(),
            Some(EngineError::EmptyName("facility"))
        );
        let long = "x".repeat(MAX_FACILITY_NAME_LEN + 1);
        assert!(matches!(
            store.ensure_facility(&long),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut store = FacilityStore::new();
        let a = booking(&mut store, "LabA", 0, 10);
        store.remove_booking(a).unwrap();
        let b = booking(&mut store, "LabA", 0, 10);
        assert!(b > a);
    }

    #[test]
    fn indexes_stay_consistent() {
        let mut store = FacilityStore::new();
        let a = booking(&mut store, "LabA", 100, 200);
        let b = booking(&mut store, "LabA", 0, 50);
        let c = booking(&mut store, "LabB", 0, 50);

        let ids: Vec<_> = store.bookings_of("LabA").iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![b, a]);

        let old = store.update_span(b, Span::new(300, 350)).unwrap();
        assert_eq!(old, Span::new(0, 50));
        let ids: Vec<_> = store.bookings_of("LabA").iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(store.get_booking(b).unwrap().span, Span::new(300, 350));

        store.remove_booking(a).unwrap();
        assert!(store.get_booking(a).is_none());
        assert_eq!(store.facility("LabA").unwrap().bookings.len(), 1);
        assert_eq!(store.booking_count(), 2);
        assert_eq!(store.bookings_of("LabB")[0].id, c);
    }

    #[test]
    fn update_unknown_booking_is_not_found() {
        let mut store = FacilityStore::new();
        assert_eq!(
            store.update_span(42, Span::new(0, 1)),
            Err(EngineError::NotFound(42))
        );
        assert!(store.remove_booking(42).is_none());
    }
}
