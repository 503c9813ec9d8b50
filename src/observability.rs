use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "slotwire_requests_total";

/// Histogram: time from datagram decode to reply, in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "slotwire_request_duration_seconds";

/// Counter: at-most-once requests answered from the response cache.
pub const DEDUP_HITS_TOTAL: &str = "slotwire_dedup_hits_total";

/// Counter: datagrams too short or inconsistent to carry a header.
pub const MALFORMED_DATAGRAMS_TOTAL: &str = "slotwire_malformed_datagrams_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: callback datagrams pushed to monitors.
pub const CALLBACKS_SENT_TOTAL: &str = "slotwire_callbacks_sent_total";

/// Counter: outbound datagrams dropped. Labels: reason (simulated, send_error).
pub const DATAGRAMS_DROPPED_TOTAL: &str = "slotwire_datagrams_dropped_total";

/// Gauge: live monitor registrations after the last sweep.
pub const MONITORS_ACTIVE: &str = "slotwire_monitors_active";

/// Gauge: cached at-most-once responses after the last sweep.
pub const DEDUP_ENTRIES: &str = "slotwire_dedup_entries";

/// Gauge: facilities known to the engine after the last sweep.
pub const FACILITIES: &str = "slotwire_facilities";

/// Gauge: bookings held across all facilities after the last sweep.
pub const BOOKINGS_ACTIVE: &str = "slotwire_bookings_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
