//! Client side of the protocol: an invoker that owns retransmission and
//! request ids, a typed [`Client`] over it, and a [`CallbackListener`] for
//! monitor pushes.

mod listener;

pub use listener::{AvailabilityUpdate, CallbackCodec, CallbackListener};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::{ClientConfig, InvokerConfig};
use crate::limits::{MAX_ATTEMPT_TIMEOUT, MAX_DATAGRAM_SIZE};
use crate::model::{BookingId, Day, Interval, WeeklyTime};
use crate::protocol::{ErrorKind, ErrorReply, OpCode, Request, Response};
use crate::wire::{self, FLAG_AT_MOST_ONCE, Header, WireError};

/// Invocation semantics chosen per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Semantics {
    /// Retransmissions may execute the operation again.
    #[default]
    AtLeastOnce,
    /// Retransmissions are answered from the server's reply cache.
    AtMostOnce,
}

impl Semantics {
    pub fn flags(self) -> u32 {
        match self {
            Semantics::AtLeastOnce => 0,
            Semantics::AtMostOnce => FLAG_AT_MOST_ONCE,
        }
    }
}

#[derive(Debug)]
pub enum ClientError {
    /// No reply arrived across every attempt.
    Delivery { attempts: u32 },
    /// The server executed (or refused) the request and said why.
    Server { kind: ErrorKind, message: String },
    /// A reply decoded to a different operation than the one requested.
    UnexpectedResponse(OpCode),
    Io(std::io::Error),
    Wire(WireError),
}

impl ClientError {
    pub fn server_kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Server { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Delivery { attempts } => {
                write!(f, "no reply from server after {attempts} attempts")
            }
            ClientError::Server { kind, message } => write!(f, "{kind}: {message}"),
            ClientError::UnexpectedResponse(op) => {
                write!(f, "unexpected response to {}", op.label())
            }
            ClientError::Io(e) => write!(f, "io: {e}"),
            ClientError::Wire(e) => write!(f, "malformed reply: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<WireError> for ClientError {
    fn from(e: WireError) -> Self {
        ClientError::Wire(e)
    }
}

/// Process-local request id source. Starts at a random point so ids from a
/// restarted client do not collide with cached replies of its predecessor.
pub struct RequestIds(AtomicU32);

impl RequestIds {
    pub fn seeded() -> Self {
        Self::starting_at(rand::random::<u32>() & 0x3FFF_FFFF)
    }

    pub fn starting_at(first: u32) -> Self {
        Self(AtomicU32::new(first))
    }

    /// Next id. Zero is reserved for callbacks and skipped on wrap.
    pub fn next(&self) -> u32 {
        loop {
            let id = self.0.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

/// Sends one request at a time and waits for its reply, retransmitting the
/// same datagram (same request id) on timeout.
pub struct Invoker {
    socket: UdpSocket,
    server: SocketAddr,
    config: InvokerConfig,
    ids: RequestIds,
    buf: Vec<u8>,
}

impl Invoker {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let bind: SocketAddr = if config.server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self::with_socket(socket, config, RequestIds::seeded()))
    }

    /// The per-attempt timeout is capped at [`MAX_ATTEMPT_TIMEOUT`].
    pub fn with_socket(socket: UdpSocket, config: ClientConfig, ids: RequestIds) -> Self {
        let invoker = InvokerConfig {
            timeout: config.invoker.timeout.min(MAX_ATTEMPT_TIMEOUT),
            ..config.invoker
        };
        Self {
            socket,
            server: config.server,
            config: invoker,
            ids,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Send `payload` as `op` and return the reply payload.
    ///
    /// The request id is allocated once and reused on every retry. Replies
    /// that belong to another request, callbacks, and datagrams from other
    /// hosts are ignored while the attempt's deadline runs.
    pub async fn invoke(
        &mut self,
        op: OpCode,
        payload: &[u8],
        semantics: Semantics,
    ) -> Result<Bytes, ClientError> {
        let request_id = self.ids.next();
        let datagram = wire::frame(
            Header::new(op.as_u16(), request_id, semantics.flags()),
            payload,
        );
        let attempts = self.config.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            debug!(
                "{} #{request_id} attempt {attempt}/{attempts} to {}",
                op.label(),
                self.server
            );
            self.socket.send_to(&datagram, self.server).await?;

            let deadline = tokio::time::Instant::now() + self.config.timeout;
            loop {
                let received =
                    tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;
                let (len, from) = match received {
                    Err(_) => break,
                    Ok(Err(e)) => {
                        debug!("recv error: {e}");
                        continue;
                    }
                    Ok(Ok(r)) => r,
                };
                if from != self.server {
                    continue;
                }
                let Ok((header, body)) = wire::split_datagram(&self.buf[..len]) else {
                    debug!("ignoring malformed datagram from {from}");
                    continue;
                };
                if header.is_callback() || header.request_id != request_id {
                    continue;
                }
                if header.is_error() {
                    let reply = ErrorReply::decode(body)?;
                    return Err(ClientError::Server {
                        kind: reply.kind,
                        message: reply.message,
                    });
                }
                if header.op_code != op.as_u16() {
                    return Err(WireError::UnexpectedOp {
                        expected: op.as_u16(),
                        actual: header.op_code,
                    }
                    .into());
                }
                return Ok(Bytes::copy_from_slice(body));
            }
            debug!("{} #{request_id} attempt {attempt} timed out", op.label());
        }

        Err(ClientError::Delivery { attempts })
    }
}

/// Typed operations over an [`Invoker`].
pub struct Client {
    invoker: Invoker,
    semantics: Semantics,
}

impl Client {
    pub async fn connect(config: ClientConfig, semantics: Semantics) -> Result<Self, ClientError> {
        Ok(Self {
            invoker: Invoker::connect(config).await?,
            semantics,
        })
    }

    pub fn from_invoker(invoker: Invoker, semantics: Semantics) -> Self {
        Self { invoker, semantics }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        self.invoker.local_addr()
    }

    /// Run any request and decode its reply.
    pub async fn request(&mut self, request: &Request) -> Result<Response, ClientError> {
        let op = request.op();
        let payload = request.encode_payload()?;
        let reply = self.invoker.invoke(op, &payload, self.semantics).await?;
        Ok(Response::decode(op, &reply)?)
    }

    pub async fn query_availability(
        &mut self,
        facility: &str,
        day: Day,
    ) -> Result<Vec<Interval>, ClientError> {
        let req = Request::QueryAvail {
            facility: facility.into(),
            day,
        };
        match self.request(&req).await? {
            Response::Availability(free) => Ok(free),
            _ => Err(ClientError::UnexpectedResponse(req.op())),
        }
    }

    pub async fn book(
        &mut self,
        facility: &str,
        user: &str,
        start: WeeklyTime,
        end: WeeklyTime,
    ) -> Result<BookingId, ClientError> {
        let req = Request::Book {
            facility: facility.into(),
            user: user.into(),
            start,
            end,
        };
        match self.request(&req).await? {
            Response::Booked(id) => Ok(id),
            _ => Err(ClientError::UnexpectedResponse(req.op())),
        }
    }

    pub async fn change_booking(
        &mut self,
        booking_id: BookingId,
        offset_minutes: i32,
    ) -> Result<Interval, ClientError> {
        let req = Request::ChangeBooking {
            booking_id,
            offset_minutes,
        };
        match self.request(&req).await? {
            Response::Changed(interval) => Ok(interval),
            _ => Err(ClientError::UnexpectedResponse(req.op())),
        }
    }

    /// Ask the server to push availability of `facility` to
    /// `callback_port` on this host for `window`.
    pub async fn monitor(
        &mut self,
        facility: &str,
        window: Duration,
        callback_port: u16,
    ) -> Result<(), ClientError> {
        let req = Request::Monitor {
            facility: facility.into(),
            window_secs: u32::try_from(window.as_secs()).unwrap_or(u32::MAX),
            callback_port: u32::from(callback_port),
        };
        match self.request(&req).await? {
            Response::Monitoring => Ok(()),
            _ => Err(ClientError::UnexpectedResponse(req.op())),
        }
    }

    pub async fn reset_day(&mut self, facility: &str, day: Day) -> Result<u32, ClientError> {
        let req = Request::ResetDay {
            facility: facility.into(),
            day,
        };
        match self.request(&req).await? {
            Response::Reset(removed) => Ok(removed),
            _ => Err(ClientError::UnexpectedResponse(req.op())),
        }
    }

    pub async fn increment_usage(&mut self, facility: &str) -> Result<i64, ClientError> {
        let req = Request::IncrementUsage {
            facility: facility.into(),
        };
        match self.request(&req).await? {
            Response::Usage(count) => Ok(count),
            _ => Err(ClientError::UnexpectedResponse(req.op())),
        }
    }
}
