use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::dedup::DedupCache;
use crate::engine::{Engine, EngineError};
use crate::limits::MAX_MONITOR_WINDOW_SECS;
use crate::model::Day;
use crate::monitor::MonitorRegistry;
use crate::observability::*;
use crate::protocol::{ErrorKind, ErrorReply, OpCode, Request, Response};
use crate::wire::{self, ERROR_MASK, FLAG_CALLBACK, Header, PROTOCOL_VERSION, WireError};

/// Everything a request may read or mutate, guarded as one unit so that the
/// dedup lookup, the execution and the cache insert happen under one lock.
pub struct ServerState {
    pub engine: Engine,
    pub dedup: DedupCache,
}

/// A datagram to push to a monitoring client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    pub target: SocketAddr,
    pub datagram: Bytes,
}

/// What the server loop must send after handling one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub reply: Bytes,
    pub callbacks: Vec<Callback>,
}

/// Decodes requests, runs them against the engine and encodes replies.
pub struct Router {
    state: Mutex<ServerState>,
    monitors: MonitorRegistry,
    at_most_once: bool,
}

/// Successful execution plus the facility whose monitors should hear about it.
struct Executed {
    response: Response,
    touched: Option<Touched>,
}

struct Touched {
    facility: String,
    /// Days to report even if nothing is booked on them anymore.
    extra_days: Vec<Day>,
}

impl From<EngineError> for ErrorReply {
    fn from(e: EngineError) -> Self {
        ErrorReply::new(e.kind(), e.to_string())
    }
}

impl From<WireError> for ErrorReply {
    fn from(e: WireError) -> Self {
        ErrorReply::new(ErrorKind::BadRequest, e.to_string())
    }
}

impl Router {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_settings(config.cache_ttl, config.at_most_once)
    }

    pub fn with_settings(cache_ttl: Duration, at_most_once: bool) -> Self {
        Self {
            state: Mutex::new(ServerState {
                engine: Engine::new(),
                dedup: DedupCache::new(cache_ttl),
            }),
            monitors: MonitorRegistry::new(),
            at_most_once,
        }
    }

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    pub async fn handle(&self, datagram: &[u8], peer: SocketAddr) -> Option<Dispatch> {
        self.handle_at(datagram, peer, Instant::now()).await
    }

    /// Handle one request datagram from `peer`.
    ///
    /// Returns `None` when the datagram is too broken to address a reply to.
    /// Every other failure, including an unknown op or a malformed payload,
    /// becomes an error reply carrying the request's id and flags.
    pub async fn handle_at(
        &self,
        datagram: &[u8],
        peer: SocketAddr,
        now: Instant,
    ) -> Option<Dispatch> {
        let (header, payload) = match wire::split_datagram(datagram) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("dropping datagram from {peer}: {e}");
                metrics::counter!(MALFORMED_DATAGRAMS_TOTAL).increment(1);
                return None;
            }
        };
        let started = Instant::now();
        let op_label = OpCode::try_from(header.op_code).map_or("unknown", OpCode::label);

        let mut state = self.state.lock().await;
        let dedup = self.at_most_once && header.at_most_once();
        let key = (peer, header.request_id);

        if dedup && let Some(cached) = state.dedup.get(&key, now) {
            debug!(
                "replaying cached reply for {peer} request {}",
                header.request_id
            );
            metrics::counter!(DEDUP_HITS_TOTAL).increment(1);
            metrics::counter!(REQUESTS_TOTAL, "op" => op_label, "status" => "replayed")
                .increment(1);
            return Some(Dispatch {
                reply: cached,
                callbacks: Vec::new(),
            });
        }

        let result = self.execute(&mut state.engine, &header, payload, peer, now);
        let (reply, callbacks, status) = match result {
            Ok(executed) => {
                let reply = wire::frame(
                    Header::new(header.op_code, header.request_id, header.flags),
                    &executed.response.encode_payload(),
                );
                let callbacks = match executed.touched {
                    Some(touched) => self.callbacks_for(&state.engine, &touched, now),
                    None => Vec::new(),
                };
                (reply, callbacks, "ok")
            }
            Err(err) => {
                debug!("{op_label} from {peer} failed: {}", err.message);
                let reply = wire::frame(
                    Header::new(
                        header.op_code | ERROR_MASK,
                        header.request_id,
                        header.flags,
                    ),
                    &err.encode_payload(),
                );
                (reply, Vec::new(), err.kind.label())
            }
        };

        if dedup {
            state.dedup.insert(key, reply.clone(), now);
        }
        drop(state);

        metrics::counter!(REQUESTS_TOTAL, "op" => op_label, "status" => status).increment(1);
        metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op_label)
            .record(started.elapsed().as_secs_f64());

        Some(Dispatch { reply, callbacks })
    }

    fn execute(
        &self,
        engine: &mut Engine,
        header: &Header,
        payload: &[u8],
        peer: SocketAddr,
        now: Instant,
    ) -> Result<Executed, ErrorReply> {
        if header.version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(header.version).into());
        }
        let op = OpCode::try_from(header.op_code)?;
        let request = Request::decode(op, payload)?;
        debug!("{peer} #{}: {request:?}", header.request_id);

        let executed = match request {
            Request::QueryAvail { facility, day } => Executed {
                response: Response::Availability(engine.query_day(&facility, day)?),
                touched: None,
            },
            Request::Book {
                facility,
                user,
                start,
                end,
            } => {
                let id = engine.book(&facility, &user, start, end)?;
                Executed {
                    response: Response::Booked(id),
                    touched: Some(Touched {
                        facility,
                        extra_days: Vec::new(),
                    }),
                }
            }
            Request::ChangeBooking {
                booking_id,
                offset_minutes,
            } => {
                let shift = engine.change(booking_id, offset_minutes)?;
                let interval = shift.interval()?;
                // the old days may be empty now; their watchers still need the update
                let extra_days = shift.from.days().collect();
                Executed {
                    response: Response::Changed(interval),
                    touched: Some(Touched {
                        facility: shift.facility,
                        extra_days,
                    }),
                }
            }
            Request::Monitor {
                facility,
                window_secs,
                callback_port,
            } => {
                let port = u16::try_from(callback_port).map_err(|_| {
                    ErrorReply::new(
                        ErrorKind::BadRequest,
                        format!("callback port {callback_port} out of range"),
                    )
                })?;
                if window_secs > MAX_MONITOR_WINDOW_SECS {
                    return Err(ErrorReply::new(
                        ErrorKind::BadRequest,
                        format!("monitor window of {window_secs}s exceeds one week"),
                    ));
                }
                let target = SocketAddr::new(peer.ip(), port);
                self.monitors.register(
                    target,
                    &facility,
                    Duration::from_secs(u64::from(window_secs)),
                    now,
                )?;
                debug!("{target} monitoring {facility} for {window_secs}s");
                Executed {
                    response: Response::Monitoring,
                    touched: None,
                }
            }
            Request::ResetDay { facility, day } => {
                let removed = engine.reset_day(&facility, day)?;
                let mut extra_days = vec![day];
                extra_days.extend(removed.iter().flat_map(|b| b.span.days()));
                Executed {
                    response: Response::Reset(removed.len() as u32),
                    touched: Some(Touched {
                        facility,
                        extra_days,
                    }),
                }
            }
            Request::IncrementUsage { facility } => Executed {
                response: Response::Usage(engine.increment_usage(&facility)?),
                touched: None,
            },
        };
        Ok(executed)
    }

    /// One datagram per (live monitor, affected day) of the touched facility.
    fn callbacks_for(&self, engine: &Engine, touched: &Touched, now: Instant) -> Vec<Callback> {
        let watchers = self.monitors.active_for(&touched.facility, now);
        if watchers.is_empty() {
            return Vec::new();
        }

        let mut days: BTreeSet<Day> = engine.days_with_bookings(&touched.facility);
        days.extend(touched.extra_days.iter().copied());

        let mut bodies = Vec::with_capacity(days.len());
        for day in days {
            match engine.free_on(&touched.facility, day) {
                Ok(free) => bodies.push(wire::frame(
                    Header::new(OpCode::QueryAvail.as_u16(), 0, FLAG_CALLBACK),
                    &Response::Availability(free).encode_payload(),
                )),
                Err(e) => warn!("skipping {day} callback for {}: {e}", touched.facility),
            }
        }

        watchers
            .iter()
            .flat_map(|w| {
                bodies.iter().map(move |datagram| Callback {
                    target: w.target,
                    datagram: datagram.clone(),
                })
            })
            .collect()
    }

    /// Expire dedup entries and monitors. Returns `(dedup, monitors)` removed.
    pub async fn sweep(&self, now: Instant) -> (usize, usize) {
        let mut state = self.state.lock().await;
        let dedup = state.dedup.sweep_expired(now);
        let cached = state.dedup.len();
        let facilities = state.engine.store().facility_count();
        let bookings = state.engine.store().booking_count();
        drop(state);

        let monitors = self.monitors.sweep_expired(now);
        metrics::gauge!(DEDUP_ENTRIES).set(cached as f64);
        metrics::gauge!(FACILITIES).set(facilities as f64);
        metrics::gauge!(BOOKINGS_ACTIVE).set(bookings as f64);
        metrics::gauge!(MONITORS_ACTIVE).set(self.monitors.len() as f64);
        if dedup + monitors > 0 {
            debug!("swept {dedup} cached replies, {monitors} monitors");
        }
        (dedup, monitors)
    }
}
