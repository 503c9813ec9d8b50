use crate::model::*;

use super::EngineError;

/// A booking must cover at least one minute and stay inside the week.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::EmptySpan(*span));
    }
    if span.start < 0 || span.end >= MINUTES_PER_WEEK {
        return Err(EngineError::OutsideWeek {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}

/// Fails with the id of the first booking on `facility` that overlaps `span`,
/// skipping `exclude` (the booking being moved).
pub(crate) fn check_no_conflict(
    facility: &FacilityState,
    span: &Span,
    exclude: Option<BookingId>,
) -> Result<(), EngineError> {
    for (existing, id) in facility.overlapping(span) {
        if Some(*id) == exclude {
            continue;
        }
        if existing.overlaps(span) {
            return Err(EngineError::Conflict(*id));
        }
    }
    Ok(())
}
