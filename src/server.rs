use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::limits::MAX_DATAGRAM_SIZE;
use crate::observability::*;
use crate::router::{Dispatch, Router};

/// Drops outbound datagrams with a fixed probability.
pub struct LossSimulator {
    rate: f64,
    rng: StdRng,
}

impl LossSimulator {
    pub fn new(rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rate: if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 },
            rng,
        }
    }

    pub fn should_drop(&mut self) -> bool {
        self.rate > 0.0 && self.rng.gen_bool(self.rate)
    }
}

/// Single-threaded request loop: receive, handle fully, send, repeat.
pub struct Server {
    socket: UdpSocket,
    router: Router,
    loss: LossSimulator,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.addr()).await?;
        Ok(Self {
            socket,
            router: Router::new(&config),
            loss: LossSimulator::new(config.loss_rate, config.loss_seed),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serve until `shutdown` resolves.
    ///
    /// The receive timeout bounds how long the loop waits for traffic, so
    /// expired cache entries and monitors are swept even when the server is
    /// idle.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        let addr = self.local_addr()?;
        info!("slotwire listening on udp://{addr}");
        info!("  at_most_once: {}", self.config.at_most_once);
        info!("  loss_rate: {}", self.config.loss_rate);
        info!("  cache_ttl: {:?}", self.config.cache_ttl);

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut last_sweep = Instant::now();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping receive loop");
                    break;
                }
                received = tokio::time::timeout(
                    self.config.recv_timeout,
                    self.socket.recv_from(&mut buf),
                ) => {
                    match received {
                        Ok(Ok((len, peer))) => {
                            if let Some(dispatch) = self.router.handle(&buf[..len], peer).await {
                                self.deliver(peer, dispatch).await;
                            }
                        }
                        // e.g. ICMP port unreachable surfacing from an earlier send
                        Ok(Err(e)) => debug!("recv error: {e}"),
                        Err(_) => {}
                    }
                }
            }

            let now = Instant::now();
            if now.duration_since(last_sweep) >= self.config.sweep_interval {
                self.router.sweep(now).await;
                last_sweep = now;
            }
        }

        info!("slotwire stopped");
        Ok(())
    }

    async fn deliver(&mut self, peer: SocketAddr, dispatch: Dispatch) {
        self.transmit(peer, &dispatch.reply).await;
        for callback in dispatch.callbacks {
            if self.transmit(callback.target, &callback.datagram).await {
                metrics::counter!(CALLBACKS_SENT_TOTAL).increment(1);
            }
        }
    }

    async fn transmit(&mut self, target: SocketAddr, datagram: &Bytes) -> bool {
        if self.loss.should_drop() {
            debug!("simulated loss of {} bytes to {target}", datagram.len());
            metrics::counter!(DATAGRAMS_DROPPED_TOTAL, "reason" => "simulated").increment(1);
            return false;
        }
        match self.socket.send_to(datagram, target).await {
            Ok(_) => true,
            Err(e) => {
                warn!("send to {target} failed: {e}");
                metrics::counter!(DATAGRAMS_DROPPED_TOTAL, "reason" => "send_error").increment(1);
                false
            }
        }
    }
}

/// A server running on a background task.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    /// Bind with `config` and serve on a spawned task.
    pub async fn spawn(config: ServerConfig) -> io::Result<Self> {
        let server = Server::bind(config).await?;
        let addr = server.local_addr()?;
        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(server.run(async {
            let _ = rx.await;
        }));
        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn stop(self) -> io::Result<()> {
        let _ = self.shutdown.send(());
        self.task.await.map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OpCode, Request, Response};
    use crate::wire::{self, Header};

    #[test]
    fn zero_rate_never_drops() {
        let mut loss = LossSimulator::new(0.0, Some(1));
        assert!((0..1000).all(|_| !loss.should_drop()));
    }

    #[test]
    fn full_rate_always_drops() {
        let mut loss = LossSimulator::new(1.0, Some(1));
        assert!((0..1000).all(|_| loss.should_drop()));
    }

    #[test]
    fn seeded_loss_is_reproducible() {
        let mut a = LossSimulator::new(0.3, Some(99));
        let mut b = LossSimulator::new(0.3, Some(99));
        let run_a: Vec<bool> = (0..200).map(|_| a.should_drop()).collect();
        let run_b: Vec<bool> = (0..200).map(|_| b.should_drop()).collect();
        assert_eq!(run_a, run_b);
        assert!(run_a.iter().any(|d| *d));
        assert!(run_a.iter().any(|d| !*d));
    }

    #[test]
    fn nonsense_rate_is_clamped() {
        let mut loss = LossSimulator::new(f64::NAN, None);
        assert!(!loss.should_drop());
        let mut loss = LossSimulator::new(7.5, None);
        assert!(loss.should_drop());
    }

    #[tokio::test]
    async fn serves_requests_until_stopped() {
        let handle = ServerHandle::spawn(ServerConfig::local()).await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let req = Request::IncrementUsage {
            facility: "LabA".into(),
        };
        let datagram = wire::frame(
            Header::new(req.op().as_u16(), 1, 0),
            &req.encode_payload().unwrap(),
        );
        socket.send_to(&datagram, handle.addr()).await.unwrap();

        let mut buf = [0u8; 512];
        let (len, from) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, handle.addr());
        let (header, payload) = wire::split_datagram(&buf[..len]).unwrap();
        assert_eq!(header.request_id, 1);
        assert_eq!(
            Response::decode(OpCode::IncrementUsage, payload).unwrap(),
            Response::Usage(1)
        );

        handle.stop().await.unwrap();
    }
}
