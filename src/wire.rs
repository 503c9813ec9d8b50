//! Byte-exact framing shared by client and server.
//!
//! Every datagram is a fixed 16-byte header followed by `payload_len` bytes:
//!
//! ```text
//!  0      2      4              8              12             16
//!  +------+------+--------------+--------------+--------------+----------
//!  | ver  |  op  |  request id  |    flags     | payload len  | payload..
//!  +------+------+--------------+--------------+--------------+----------
//! ```
//!
//! All integers are big-endian. Strings are a u16 length followed by raw
//! UTF-8. A `WeeklyTime` is three bytes: day, hour, minute. 64-bit values
//! travel as two 32-bit halves, high word first.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::model::{Day, InvalidTime, WeeklyTime};

pub const PROTOCOL_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 16;

/// Set on the op code of every error response. Never set on a request.
pub const ERROR_MASK: u16 = 0x8000;

/// Client asks the server to execute this request at most once.
pub const FLAG_AT_MOST_ONCE: u32 = 1 << 0;
/// Unsolicited server-to-client push.
pub const FLAG_CALLBACK: u32 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Truncated { needed: usize, remaining: usize },
    PayloadLength { advertised: u32, available: usize },
    StringTooLong(usize),
    InvalidUtf8,
    InvalidTime(InvalidTime),
    UnsupportedVersion(u16),
    UnknownOp(u16),
    UnexpectedOp { expected: u16, actual: u16 },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Truncated { needed, remaining } => {
                write!(f, "truncated: need {needed} bytes, {remaining} remaining")
            }
            WireError::PayloadLength { advertised, available } => write!(
                f,
                "payload length {advertised} exceeds the {available} bytes after the header"
            ),
            WireError::StringTooLong(len) => write!(f, "string of {len} bytes exceeds u16 length prefix"),
            WireError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            WireError::InvalidTime(e) => write!(f, "{e}"),
            WireError::UnsupportedVersion(v) => write!(f, "unsupported protocol version {v}"),
            WireError::UnknownOp(op) => write!(f, "unknown opcode {op:#06x}"),
            WireError::UnexpectedOp { expected, actual } => {
                write!(f, "expected opcode {expected:#06x}, got {actual:#06x}")
            }
        }
    }
}

impl std::error::Error for WireError {}

impl From<InvalidTime> for WireError {
    fn from(e: InvalidTime) -> Self {
        WireError::InvalidTime(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub op_code: u16,
    pub request_id: u32,
    pub flags: u32,
    pub payload_len: u32,
}

impl Header {
    pub fn new(op_code: u16, request_id: u32, flags: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            op_code,
            request_id,
            flags,
            payload_len: 0,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.version);
        buf.put_u16(self.op_code);
        buf.put_u32(self.request_id);
        buf.put_u32(self.flags);
        buf.put_u32(self.payload_len);
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        self.encode(&mut &mut out[..]);
        out
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                needed: HEADER_LEN,
                remaining: buf.len(),
            });
        }
        Ok(Self {
            version: buf.get_u16(),
            op_code: buf.get_u16(),
            request_id: buf.get_u32(),
            flags: buf.get_u32(),
            payload_len: buf.get_u32(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.op_code & ERROR_MASK != 0
    }

    pub fn at_most_once(&self) -> bool {
        self.flags & FLAG_AT_MOST_ONCE != 0
    }

    pub fn is_callback(&self) -> bool {
        self.flags & FLAG_CALLBACK != 0
    }
}

/// Split a datagram into its header and exactly `payload_len` payload bytes.
pub fn split_datagram(datagram: &[u8]) -> Result<(Header, &[u8]), WireError> {
    let header = Header::decode(datagram)?;
    let body = &datagram[HEADER_LEN..];
    let len = header.payload_len as usize;
    if len > body.len() {
        return Err(WireError::PayloadLength {
            advertised: header.payload_len,
            available: body.len(),
        });
    }
    Ok((header, &body[..len]))
}

/// Prefix `payload` with `header`, filling in its payload length.
pub fn frame(mut header: Header, payload: &[u8]) -> Bytes {
    header.payload_len = payload.len() as u32;
    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    header.encode(&mut out);
    out.put_slice(payload);
    out.freeze()
}

/// Writers for the protocol's composite field types.
pub trait WireWrite: BufMut {
    fn put_wire_str(&mut self, s: &str) -> Result<(), WireError> {
        let len = u16::try_from(s.len()).map_err(|_| WireError::StringTooLong(s.len()))?;
        self.put_u16(len);
        self.put_slice(s.as_bytes());
        Ok(())
    }

    fn put_weekly_time(&mut self, t: WeeklyTime) {
        self.put_u8(t.day.as_u8());
        self.put_u8(t.hour);
        self.put_u8(t.minute);
    }

    fn put_i64_halves(&mut self, v: i64) {
        let bits = v as u64;
        self.put_u32((bits >> 32) as u32);
        self.put_u32(bits as u32);
    }
}

impl<B: BufMut + ?Sized> WireWrite for B {}

/// Bounds-checked cursor over a payload. Every read fails with
/// [`WireError::Truncated`] instead of panicking on short input.
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.buf.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, WireError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn i64_halves(&mut self) -> Result<i64, WireError> {
        self.need(8)?;
        let high = self.buf.get_u32() as u64;
        let low = self.buf.get_u32() as u64;
        Ok(((high << 32) | low) as i64)
    }

    pub fn str(&mut self) -> Result<String, WireError> {
        let len = self.u16()? as usize;
        self.need(len)?;
        let (raw, rest) = self.buf.split_at(len);
        self.buf = rest;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    pub fn day(&mut self) -> Result<Day, WireError> {
        Ok(Day::try_from(self.u8()?)?)
    }

    pub fn weekly_time(&mut self) -> Result<WeeklyTime, WireError> {
        let day = self.day()?;
        let hour = self.u8()?;
        let minute = self.u8()?;
        Ok(WeeklyTime::new(day, hour, minute)?)
    }
}
