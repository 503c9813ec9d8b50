use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use slotwire::client::{Client, Semantics};
use slotwire::config::{ClientConfig, ServerConfig};
use slotwire::model::{Day, MINUTES_PER_WEEK, WeeklyTime};
use slotwire::server::ServerHandle;

/// Length of every benchmark booking, in minutes.
const SLOT: i32 = 10;
const SLOTS_PER_FACILITY: usize = (MINUTES_PER_WEEK / SLOT) as usize - 1;

async fn connect(server: SocketAddr, semantics: Semantics) -> Client {
    Client::connect(ClientConfig::new(server), semantics)
        .await
        .expect("connect failed")
}

fn slot(i: usize) -> (WeeklyTime, WeeklyTime) {
    let start = (i % SLOTS_PER_FACILITY) as i32 * SLOT;
    (
        WeeklyTime::from_minute_of_week(start).unwrap(),
        WeeklyTime::from_minute_of_week(start + SLOT).unwrap(),
    )
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(server: SocketAddr, prefix: &str) {
    let mut client = connect(server, Semantics::AtMostOnce).await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let facility = format!("{prefix}-seq-{}", i / SLOTS_PER_FACILITY);
        let (s, e) = slot(i);
        let t = Instant::now();
        client.book(&facility, "bench", s, e).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("book latency", &mut latencies);
}

async fn phase2_concurrent(server: SocketAddr, prefix: &str) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let facility = format!("{prefix}-conc-{i}");
        handles.push(tokio::spawn(async move {
            let mut client = connect(server, Semantics::AtMostOnce).await;
            for j in 0..n_per_task {
                let (s, e) = slot(j);
                client.book(&facility, "bench", s, e).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} clients x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(server: SocketAddr, prefix: &str) {
    let facility = format!("{prefix}-read");
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let facility = facility.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut client = connect(server, Semantics::AtMostOnce).await;
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) && i < SLOTS_PER_FACILITY {
                let (s, e) = slot(i);
                client.book(&facility, "writer", s, e).await.unwrap();
                i += 1;
            }
            i
        })
    };

    let mut reader = connect(server, Semantics::AtLeastOnce).await;
    let n = 1000;
    let mut latencies = Vec::with_capacity(n);
    for i in 0..n {
        let day = Day::ALL[i % 7];
        let t = Instant::now();
        reader.query_availability(&facility, day).await.unwrap();
        latencies.push(t.elapsed());
    }

    stop.store(true, Ordering::Relaxed);
    let written = writer.await.unwrap();
    println!("  writer booked {written} slots meanwhile");
    print_latency("query latency", &mut latencies);
}

async fn phase4_semantics_cost(server: SocketAddr, prefix: &str) {
    let n = 1000;
    for semantics in [Semantics::AtLeastOnce, Semantics::AtMostOnce] {
        let mut client = connect(server, semantics).await;
        let facility = format!("{prefix}-usage-{semantics:?}");
        let mut latencies = Vec::with_capacity(n);
        for _ in 0..n {
            let t = Instant::now();
            client.increment_usage(&facility).await.unwrap();
            latencies.push(t.elapsed());
        }
        print_latency(&format!("{semantics:?} increment latency"), &mut latencies);
    }
}

#[tokio::main]
async fn main() {
    // Target an external server when SLOTWIRE_PORT is set, otherwise run one in-process.
    let external = std::env::var("SLOTWIRE_PORT").ok();
    let (server, handle) = match external {
        Some(port) => {
            let host = std::env::var("SLOTWIRE_HOST").unwrap_or_else(|_| "127.0.0.1".into());
            let addr = format!("{host}:{port}")
                .parse::<SocketAddr>()
                .expect("invalid SLOTWIRE_HOST/SLOTWIRE_PORT");
            (addr, None)
        }
        None => {
            let handle = ServerHandle::spawn(ServerConfig::local())
                .await
                .expect("failed to start server");
            (handle.addr(), Some(handle))
        }
    };
    let prefix = format!("bench{:08x}", rand::random::<u32>());

    println!("=== slotwire stress benchmark ===");
    println!("target: udp://{server}\n");

    println!("[phase 1] sequential book throughput");
    phase1_sequential(server, &prefix).await;

    println!("\n[phase 2] concurrent clients");
    phase2_concurrent(server, &prefix).await;

    println!("\n[phase 3] query latency under write load");
    phase3_read_under_load(server, &prefix).await;

    println!("\n[phase 4] at-least-once vs at-most-once");
    phase4_semantics_cost(server, &prefix).await;

    if let Some(handle) = handle {
        handle.stop().await.expect("server did not stop cleanly");
    }
    println!("\n=== benchmark complete ===");
}
