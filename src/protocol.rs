//! Operations and their payload shapes. Framing lives in [`crate::wire`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::model::{BookingId, Day, Interval, WeeklyTime};
use crate::wire::{WireError, WireReader, WireWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    QueryAvail,
    Book,
    ChangeBooking,
    Monitor,
    /// Idempotent custom operation: clear one day of a facility's schedule.
    ResetDay,
    /// Non-idempotent custom operation: bump a facility's usage counter.
    IncrementUsage,
}

impl OpCode {
    pub fn as_u16(self) -> u16 {
        match self {
            OpCode::QueryAvail => 0x0001,
            OpCode::Book => 0x0002,
            OpCode::ChangeBooking => 0x0003,
            OpCode::Monitor => 0x0004,
            OpCode::ResetDay => 0x1001,
            OpCode::IncrementUsage => 0x1002,
        }
    }

    /// Short label for metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            OpCode::QueryAvail => "query_avail",
            OpCode::Book => "book",
            OpCode::ChangeBooking => "change_booking",
            OpCode::Monitor => "monitor",
            OpCode::ResetDay => "reset_day",
            OpCode::IncrementUsage => "increment_usage",
        }
    }
}

impl TryFrom<u16> for OpCode {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(OpCode::QueryAvail),
            0x0002 => Ok(OpCode::Book),
            0x0003 => Ok(OpCode::ChangeBooking),
            0x0004 => Ok(OpCode::Monitor),
            0x1001 => Ok(OpCode::ResetDay),
            0x1002 => Ok(OpCode::IncrementUsage),
            other => Err(WireError::UnknownOp(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::Conflict => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::BadRequest => 3,
            ErrorKind::Internal => 4,
        }
    }

    /// Unknown codes from a newer peer are treated as internal errors.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => ErrorKind::Conflict,
            2 => ErrorKind::NotFound,
            3 => ErrorKind::BadRequest,
            _ => ErrorKind::Internal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    QueryAvail {
        facility: String,
        day: Day,
    },
    Book {
        facility: String,
        user: String,
        start: WeeklyTime,
        end: WeeklyTime,
    },
    ChangeBooking {
        booking_id: BookingId,
        /// Carried as a u32 on the wire; negative shifts are two's complement.
        offset_minutes: i32,
    },
    Monitor {
        facility: String,
        window_secs: u32,
        callback_port: u32,
    },
    ResetDay {
        facility: String,
        day: Day,
    },
    IncrementUsage {
        facility: String,
    },
}

impl Request {
    pub fn op(&self) -> OpCode {
        match self {
            Request::QueryAvail { .. } => OpCode::QueryAvail,
            Request::Book { .. } => OpCode::Book,
            Request::ChangeBooking { .. } => OpCode::ChangeBooking,
            Request::Monitor { .. } => OpCode::Monitor,
            Request::ResetDay { .. } => OpCode::ResetDay,
            Request::IncrementUsage { .. } => OpCode::IncrementUsage,
        }
    }

    pub fn encode_payload(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::new();
        match self {
            Request::QueryAvail { facility, day } | Request::ResetDay { facility, day } => {
                buf.put_wire_str(facility)?;
                buf.put_u8(day.as_u8());
            }
            Request::Book {
                facility,
                user,
                start,
                end,
            } => {
                buf.put_wire_str(facility)?;
                buf.put_wire_str(user)?;
                buf.put_weekly_time(*start);
                buf.put_weekly_time(*end);
            }
            Request::ChangeBooking {
                booking_id,
                offset_minutes,
            } => {
                buf.put_i64_halves(*booking_id);
                buf.put_u32(*offset_minutes as u32);
            }
            Request::Monitor {
                facility,
                window_secs,
                callback_port,
            } => {
                buf.put_wire_str(facility)?;
                buf.put_u32(*window_secs);
                buf.put_u32(*callback_port);
            }
            Request::IncrementUsage { facility } => {
                buf.put_wire_str(facility)?;
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(op: OpCode, payload: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(payload);
        let req = match op {
            OpCode::QueryAvail => Request::QueryAvail {
                facility: r.str()?,
                day: r.day()?,
            },
            OpCode::Book => Request::Book {
                facility: r.str()?,
                user: r.str()?,
                start: r.weekly_time()?,
                end: r.weekly_time()?,
            },
            OpCode::ChangeBooking => Request::ChangeBooking {
                booking_id: r.i64_halves()?,
                offset_minutes: r.u32()? as i32,
            },
            OpCode::Monitor => Request::Monitor {
                facility: r.str()?,
                window_secs: r.u32()?,
                callback_port: r.u32()?,
            },
            OpCode::ResetDay => Request::ResetDay {
                facility: r.str()?,
                day: r.day()?,
            },
            OpCode::IncrementUsage => Request::IncrementUsage { facility: r.str()? },
        };
        Ok(req)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Response {
    Availability(Vec<Interval>),
    Booked(BookingId),
    Changed(Interval),
    Monitoring,
    Reset(u32),
    Usage(i64),
}

impl Response {
    pub fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Response::Availability(intervals) => encode_intervals(&mut buf, intervals),
            Response::Booked(id) => buf.put_i64_halves(*id),
            Response::Changed(interval) => {
                buf.put_weekly_time(interval.start);
                buf.put_weekly_time(interval.end);
            }
            Response::Monitoring => buf.put_u16(1),
            Response::Reset(removed) => buf.put_u32(*removed),
            Response::Usage(count) => buf.put_i64_halves(*count),
        }
        buf.freeze()
    }

    /// Decode the success payload of a reply to `op`.
    pub fn decode(op: OpCode, payload: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(payload);
        let resp = match op {
            OpCode::QueryAvail => Response::Availability(decode_intervals(&mut r)?),
            OpCode::Book => Response::Booked(r.i64_halves()?),
            OpCode::ChangeBooking => {
                let start = r.weekly_time()?;
                let end = r.weekly_time()?;
                Response::Changed(Interval::new(start, end))
            }
            OpCode::Monitor => {
                // ok flag; the server only ever sends 1
                r.u16()?;
                Response::Monitoring
            }
            OpCode::ResetDay => Response::Reset(r.u32()?),
            OpCode::IncrementUsage => Response::Usage(r.i64_halves()?),
        };
        Ok(resp)
    }
}

/// `count:u16` followed by `count` pairs of `WeeklyTime`. Also the callback body.
pub fn encode_intervals(buf: &mut BytesMut, intervals: &[Interval]) {
    // a day holds at most 720 disjoint free intervals, far below u16::MAX
    buf.put_u16(intervals.len() as u16);
    for iv in intervals {
        buf.put_weekly_time(iv.start);
        buf.put_weekly_time(iv.end);
    }
}

pub fn decode_intervals(r: &mut WireReader<'_>) -> Result<Vec<Interval>, WireError> {
    let count = r.u16()? as usize;
    let mut out = Vec::with_capacity(count.min(r.remaining() / 6));
    for _ in 0..count {
        let start = r.weekly_time()?;
        let end = r.weekly_time()?;
        out.push(Interval::new(start, end));
    }
    Ok(out)
}

/// Payload of an error response: `errCode:u16` then a length-prefixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReply {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.kind.code());
        // keep the reply well-formed even for absurdly long messages
        let mut msg = self.message.as_str();
        if msg.len() > u16::MAX as usize {
            let mut cut = u16::MAX as usize;
            while !msg.is_char_boundary(cut) {
                cut -= 1;
            }
            msg = &msg[..cut];
        }
        let _ = buf.put_wire_str(msg);
        buf.freeze()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(payload);
        let kind = ErrorKind::from_code(r.u16()?);
        let message = r.str()?;
        Ok(Self { kind, message })
    }
}
