use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{Engine, EngineError};

/// Result of moving a booking: where it was and where it is now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    pub booking_id: BookingId,
    pub facility: String,
    pub from: Span,
    pub to: Span,
}

impl Shift {
    pub fn interval(&self) -> Result<Interval, EngineError> {
        Interval::from_span(self.to).map_err(|e| EngineError::Internal(e.to_string()))
    }
}

impl Engine {
    /// Book `[start, end)` on `facility` for `user`. Fails with `Conflict` if
    /// any existing booking on the facility overlaps.
    pub fn book(
        &mut self,
        facility: &str,
        user: &str,
        start: WeeklyTime,
        end: WeeklyTime,
    ) -> Result<BookingId, EngineError> {
        if user.is_empty() {
            return Err(EngineError::EmptyName("user"));
        }
        if user.len() > MAX_USER_NAME_LEN {
            return Err(EngineError::LimitExceeded("user name too long"));
        }
        let span = Span {
            start: start.to_minute_of_week(),
            end: end.to_minute_of_week(),
        };
        validate_span(&span)?;

        let state = self.store.ensure_facility(facility)?;
        check_no_conflict(state, &span, None)?;

        let id = self.store.allocate_id();
        self.store.insert_booking(Booking {
            id,
            facility: facility.to_string(),
            user: user.to_string(),
            span,
        })?;
        Ok(id)
    }

    /// Shift a booking by `offset_minutes`, preserving its duration. The week
    /// does not wrap: a shift that would leave `[0, 10080)` is a `Conflict`.
    pub fn change(&mut self, id: BookingId, offset_minutes: i32) -> Result<Shift, EngineError> {
        let booking = self.store.get_booking(id).ok_or(EngineError::NotFound(id))?;
        let from = booking.span;
        let facility = booking.facility.clone();

        let start = i64::from(from.start) + i64::from(offset_minutes);
        let end = i64::from(from.end) + i64::from(offset_minutes);
        if start < 0 || end >= i64::from(MINUTES_PER_WEEK) {
            return Err(EngineError::OutsideWeek {
                start: start.clamp(i64::from(Minute::MIN), i64::from(Minute::MAX)) as Minute,
                end: end.clamp(i64::from(Minute::MIN), i64::from(Minute::MAX)) as Minute,
            });
        }
        let to = Span::new(start as Minute, end as Minute);

        let state = self
            .store
            .facility(&facility)
            .ok_or_else(|| EngineError::Internal(format!("booking {id} has no facility")))?;
        check_no_conflict(state, &to, Some(id))?;

        self.store.update_span(id, to)?;
        Ok(Shift {
            booking_id: id,
            facility,
            from,
            to,
        })
    }

    /// Remove every booking on `facility` that starts on `day` and return them.
    /// A second call with nothing booked in between removes nothing.
    pub fn reset_day(&mut self, facility: &str, day: Day) -> Result<Vec<Booking>, EngineError> {
        let state = self.store.ensure_facility(facility)?;
        let doomed: Vec<BookingId> = state
            .bookings
            .iter()
            .filter(|(span, _)| Day::of_minute(span.start) == Some(day))
            .map(|(_, id)| *id)
            .collect();

        doomed.into_iter().map(|id| self.cancel(id)).collect()
    }

    /// Delete a single booking from both store indexes.
    fn cancel(&mut self, id: BookingId) -> Result<Booking, EngineError> {
        self.store.remove_booking(id).ok_or(EngineError::NotFound(id))
    }

    /// Bump the facility's usage counter by exactly one and return the new value.
    pub fn increment_usage(&mut self, facility: &str) -> Result<i64, EngineError> {
        self.store.ensure_facility(facility)?;
        let counter = self.usage.entry(facility.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
