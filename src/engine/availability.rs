use crate::model::*;

// ── Free-interval Algorithm ───────────────────────────────────────

/// Free intervals of `facility` within `day`'s window `[00:00, 23:59]`.
///
/// Bookings overlapping the window are clamped to it, merged, and subtracted
/// from the window in start order. A facility with nothing booked that day
/// yields the whole window.
pub(super) fn free_intervals(facility: Option<&FacilityState>, day: Day) -> Vec<Span> {
    let window = day.window();
    let Some(facility) = facility else {
        return vec![window];
    };

    let booked: Vec<Span> = facility
        .overlapping(&window)
        .map(|(span, _)| Span::new(span.start.max(window.start), span.end.min(window.end)))
        .collect();
    if booked.is_empty() {
        return vec![window];
    }

    // already sorted by start; merge in case of touching bookings
    let booked = merge_overlapping(&booked);
    subtract_intervals(&[window], &booked)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
