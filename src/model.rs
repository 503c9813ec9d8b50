use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Minutes since Monday 00:00. The only time type inside the engine.
pub type Minute = i32;

/// Booking identifiers, allocated by the store and never reused.
pub type BookingId = i64;

pub const MINUTES_PER_HOUR: Minute = 60;
pub const MINUTES_PER_DAY: Minute = 24 * MINUTES_PER_HOUR;
pub const MINUTES_PER_WEEK: Minute = 7 * MINUTES_PER_DAY;

/// Half-open interval `[start, end)` in minute-of-week space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `max(startA, startB) < min(endA, endB)`.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    /// Every day the span overlaps, from its start day through the day of `end - 1`.
    pub fn days(&self) -> impl Iterator<Item = Day> + use<> {
        let first = Day::of_minute(self.start).map(Day::as_u8);
        let last = Day::of_minute(self.end - 1).map(Day::as_u8);
        let range = match (first, last) {
            (Some(first), Some(last)) => first..=last,
            _ => 1..=0,
        };
        Day::ALL
            .into_iter()
            .filter(move |day| range.contains(&day.as_u8()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    /// Wire byte: Monday = 0 .. Sunday = 6.
    pub fn as_u8(self) -> u8 {
        match self {
            Day::Monday => 0,
            Day::Tuesday => 1,
            Day::Wednesday => 2,
            Day::Thursday => 3,
            Day::Friday => 4,
            Day::Saturday => 5,
            Day::Sunday => 6,
        }
    }

    /// The day's window `[day 00:00, day 23:59]` in minute-of-week.
    pub fn window(self) -> Span {
        let start = self.as_u8() as Minute * MINUTES_PER_DAY;
        Span::new(start, start + MINUTES_PER_DAY - 1)
    }

    /// Day containing the given minute-of-week, if it lies inside the week.
    pub fn of_minute(minute: Minute) -> Option<Day> {
        if !(0..MINUTES_PER_WEEK).contains(&minute) {
            return None;
        }
        Day::try_from((minute / MINUTES_PER_DAY) as u8).ok()
    }
}

impl TryFrom<u8> for Day {
    type Error = InvalidTime;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Day::ALL
            .get(value as usize)
            .copied()
            .ok_or(InvalidTime::Day(value))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTime {
    Day(u8),
    Hour(u8),
    Minute(u8),
    OutsideWeek(Minute),
}

impl fmt::Display for InvalidTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidTime::Day(d) => write!(f, "invalid day: {d}"),
            InvalidTime::Hour(h) => write!(f, "invalid hour: {h}"),
            InvalidTime::Minute(m) => write!(f, "invalid minute: {m}"),
            InvalidTime::OutsideWeek(m) => write!(f, "minute-of-week {m} outside [0, {MINUTES_PER_WEEK})"),
        }
    }
}

impl std::error::Error for InvalidTime {}

/// A point in the weekly schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeeklyTime {
    pub day: Day,
    pub hour: u8,
    pub minute: u8,
}

impl WeeklyTime {
    pub fn new(day: Day, hour: u8, minute: u8) -> Result<Self, InvalidTime> {
        if hour > 23 {
            return Err(InvalidTime::Hour(hour));
        }
        if minute > 59 {
            return Err(InvalidTime::Minute(minute));
        }
        Ok(Self { day, hour, minute })
    }

    pub fn to_minute_of_week(self) -> Minute {
        self.day.as_u8() as Minute * MINUTES_PER_DAY
            + self.hour as Minute * MINUTES_PER_HOUR
            + self.minute as Minute
    }

    pub fn from_minute_of_week(minute: Minute) -> Result<Self, InvalidTime> {
        let day = Day::of_minute(minute).ok_or(InvalidTime::OutsideWeek(minute))?;
        let in_day = minute % MINUTES_PER_DAY;
        Ok(Self {
            day,
            hour: (in_day / MINUTES_PER_HOUR) as u8,
            minute: (in_day % MINUTES_PER_HOUR) as u8,
        })
    }
}

impl fmt::Display for WeeklyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:{:02}", self.day, self.hour, self.minute)
    }
}

/// Failure to parse a day or time typed by a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(pub String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse {:?}: expected e.g. \"mon\" or \"mon/09:30\"", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

/// Accepts full or three-letter English names in any case, or `0`..`6`.
impl FromStr for Day {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Ok(n) = lower.parse::<u8>() {
            return Day::try_from(n).map_err(|_| ParseTimeError(s.to_string()));
        }
        Day::ALL
            .into_iter()
            .find(|d| {
                let name = d.to_string().to_ascii_lowercase();
                lower == name || (lower.len() >= 3 && name.starts_with(&lower))
            })
            .ok_or_else(|| ParseTimeError(s.to_string()))
    }
}

/// `<day>/HH:MM` or `<day> HH:MM`.
impl FromStr for WeeklyTime {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (day, clock) = s
            .trim()
            .split_once(['/', ' '])
            .ok_or_else(err)?;
        let (hour, minute) = clock.trim().split_once(':').ok_or_else(err)?;
        let day: Day = day.parse().map_err(|_| err())?;
        let hour: u8 = hour.parse().map_err(|_| err())?;
        let minute: u8 = minute.parse().map_err(|_| err())?;
        WeeklyTime::new(day, hour, minute).map_err(|_| err())
    }
}

/// Interval expressed in schedule terms, as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: WeeklyTime,
    pub end: WeeklyTime,
}

impl Interval {
    pub fn new(start: WeeklyTime, end: WeeklyTime) -> Self {
        Self { start, end }
    }

    /// Both endpoints must lie inside the week, which every `Span` produced
    /// by the engine does.
    pub fn from_span(span: Span) -> Result<Self, InvalidTime> {
        Ok(Self {
            start: WeeklyTime::from_minute_of_week(span.start)?,
            end: WeeklyTime::from_minute_of_week(span.end)?,
        })
    }

    pub fn to_span(self) -> Span {
        Span {
            start: self.start.to_minute_of_week(),
            end: self.end.to_minute_of_week(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub facility: String,
    pub user: String,
    pub span: Span,
}

/// A facility and the ids of the bookings that reference it, sorted by start.
#[derive(Debug, Clone, Default)]
pub struct FacilityState {
    pub name: String,
    pub bookings: Vec<(Span, BookingId)>,
}

impl FacilityState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by `span.start`.
    pub fn insert(&mut self, span: Span, id: BookingId) {
        let pos = self
            .bookings
            .binary_search_by_key(&span.start, |(s, _)| s.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, (span, id));
    }

    pub fn remove(&mut self, id: BookingId) -> Option<Span> {
        let pos = self.bookings.iter().position(|(_, b)| *b == id)?;
        Some(self.bookings.remove(pos).0)
    }

    /// Bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(Span, BookingId)> {
        let right_bound = self.bookings.partition_point(|(s, _)| s.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |(s, _)| s.end > query.start)
    }
}
