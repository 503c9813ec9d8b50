use std::net::SocketAddr;

use bytes::BytesMut;
use futures::StreamExt;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio_util::codec::Decoder;
use tokio_util::udp::UdpFramed;
use tracing::warn;

use crate::model::{Day, Interval};
use crate::protocol::{OpCode, Response};
use crate::wire;

use super::ClientError;

/// Free intervals of one day, pushed by the server after a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityUpdate {
    pub intervals: Vec<Interval>,
}

impl AvailabilityUpdate {
    /// The day the update describes. `None` when the day is fully booked,
    /// since the payload then carries no interval to read it from.
    pub fn day(&self) -> Option<Day> {
        self.intervals.first().map(|iv| iv.start.day)
    }
}

/// Turns one callback datagram into an [`AvailabilityUpdate`]. Anything that
/// is not a well-formed callback is skipped.
#[derive(Debug, Default)]
pub struct CallbackCodec;

impl Decoder for CallbackCodec {
    type Item = AvailabilityUpdate;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // one datagram per call; consume it whole
        let datagram = src.split();
        let (header, payload) = match wire::split_datagram(&datagram) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("ignoring malformed callback: {e}");
                return Ok(None);
            }
        };
        if !header.is_callback() || header.op_code != OpCode::QueryAvail.as_u16() {
            warn!("ignoring non-callback datagram (op {:#06x})", header.op_code);
            return Ok(None);
        }
        match Response::decode(OpCode::QueryAvail, payload) {
            Ok(Response::Availability(intervals)) => Ok(Some(AvailabilityUpdate { intervals })),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("ignoring malformed callback payload: {e}");
                Ok(None)
            }
        }
    }
}

/// Receives monitor pushes on its own socket.
pub struct CallbackListener {
    frames: UdpFramed<CallbackCodec>,
}

impl CallbackListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            frames: UdpFramed::new(socket, CallbackCodec),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.frames.get_ref().local_addr()?)
    }

    /// Next update and the address it came from. `None` only if the socket
    /// stream ends.
    pub async fn next(&mut self) -> Option<Result<(AvailabilityUpdate, SocketAddr), ClientError>> {
        self.frames.next().await
    }
}
