use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::MAX_CACHE_TTL;

pub const DEFAULT_PORT: u16 = 9999;

/// Server settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// When off the at-most-once flag is ignored: no cache lookups, no inserts.
    pub at_most_once: bool,
    /// Probability in `[0, 1]` that an outbound datagram is silently dropped.
    pub loss_rate: f64,
    /// Fixed seed for the loss simulation; random when unset.
    pub loss_seed: Option<u64>,
    pub cache_ttl: Duration,
    pub recv_timeout: Duration,
    pub sweep_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            at_most_once: true,
            loss_rate: 0.0,
            loss_seed: None,
            cache_ttl: Duration::from_secs(60),
            recv_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(1),
            metrics_port: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("SLOTWIRE_BIND").unwrap_or(defaults.bind),
            port: env_parse("SLOTWIRE_PORT").unwrap_or(defaults.port),
            at_most_once: std::env::var("SLOTWIRE_AT_MOST_ONCE")
                .ok()
                .and_then(|s| parse_switch(&s))
                .unwrap_or(defaults.at_most_once),
            loss_rate: env_parse::<f64>("SLOTWIRE_LOSS_RATE")
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(defaults.loss_rate),
            loss_seed: env_parse("SLOTWIRE_LOSS_SEED"),
            cache_ttl: env_parse("SLOTWIRE_CACHE_TTL_SECS")
                .map(|secs| Duration::from_secs(secs).min(MAX_CACHE_TTL))
                .unwrap_or(defaults.cache_ttl),
            recv_timeout: env_parse("SLOTWIRE_RECV_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.recv_timeout),
            sweep_interval: defaults.sweep_interval,
            metrics_port: env_parse("SLOTWIRE_METRICS_PORT"),
        }
    }

    /// A config for an ephemeral loopback server.
    pub fn local() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 0,
            ..Self::default()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Client invoker settings.
#[derive(Debug, Clone, Copy)]
pub struct InvokerConfig {
    /// How long one attempt waits for its reply.
    pub timeout: Duration,
    /// Retransmissions after the first attempt.
    pub max_retries: u32,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub invoker: InvokerConfig,
}

impl ClientConfig {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            invoker: InvokerConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
