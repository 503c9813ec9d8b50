use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_test::{assert_err, assert_ok};

use slotwire::client::{CallbackListener, Client, ClientError, Semantics};
use slotwire::config::{ClientConfig, InvokerConfig, ServerConfig};
use slotwire::model::{Day, Interval, WeeklyTime};
use slotwire::protocol::ErrorKind;
use slotwire::server::ServerHandle;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(config: ServerConfig) -> ServerHandle {
    ServerHandle::spawn(config).await.unwrap()
}

async fn connect(server: SocketAddr, semantics: Semantics) -> Client {
    let config = ClientConfig {
        server,
        invoker: InvokerConfig {
            timeout: Duration::from_millis(300),
            max_retries: 3,
        },
    };
    Client::connect(config, semantics).await.unwrap()
}

fn wt(day: Day, hour: u8, minute: u8) -> WeeklyTime {
    WeeklyTime::new(day, hour, minute).unwrap()
}

/// Forwards datagrams between one client and `server`, dropping the first
/// `drop_replies` datagrams coming back from the server.
async fn lossy_proxy(server: SocketAddr, drop_replies: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let dropped = Arc::new(AtomicUsize::new(0));
    let counter = dropped.clone();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 64 * 1024];
        let mut client: Option<SocketAddr> = None;
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                break;
            };
            if from == server {
                if counter.load(Ordering::SeqCst) < drop_replies {
                    counter.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                if let Some(client) = client {
                    let _ = socket.send_to(&buf[..len], client).await;
                }
            } else {
                client = Some(from);
                let _ = socket.send_to(&buf[..len], server).await;
            }
        }
    });

    (addr, dropped)
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_query_reset_end_to_end() {
    let server = start_test_server(ServerConfig::local()).await;
    let mut client = connect(server.addr(), Semantics::AtMostOnce).await;

    let id = assert_ok!(
        client
            .book("LabA", "alice", wt(Day::Monday, 9, 0), wt(Day::Monday, 10, 30))
            .await
    );
    assert!(id > 0);

    let free = client.query_availability("LabA", Day::Monday).await.unwrap();
    assert_eq!(
        free,
        vec![
            Interval::new(wt(Day::Monday, 0, 0), wt(Day::Monday, 9, 0)),
            Interval::new(wt(Day::Monday, 10, 30), wt(Day::Monday, 23, 59)),
        ]
    );

    assert_eq!(client.reset_day("LabA", Day::Monday).await.unwrap(), 1);
    assert_eq!(client.reset_day("LabA", Day::Monday).await.unwrap(), 0);

    let free = client.query_availability("LabA", Day::Monday).await.unwrap();
    assert_eq!(
        free,
        vec![Interval::new(wt(Day::Monday, 0, 0), wt(Day::Monday, 23, 59))]
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn domain_errors_cross_the_wire() {
    let server = start_test_server(ServerConfig::local()).await;
    let mut client = connect(server.addr(), Semantics::AtLeastOnce).await;

    client
        .book("LabA", "alice", wt(Day::Monday, 9, 0), wt(Day::Monday, 10, 30))
        .await
        .unwrap();
    let err = assert_err!(
        client
            .book("LabA", "bob", wt(Day::Monday, 9, 30), wt(Day::Monday, 9, 45))
            .await
    );
    assert_eq!(err.server_kind(), Some(ErrorKind::Conflict));

    let err = assert_err!(client.change_booking(404, 15).await);
    assert_eq!(err.server_kind(), Some(ErrorKind::NotFound));

    let err = assert_err!(
        client
            .book("LabA", "carol", wt(Day::Friday, 10, 0), wt(Day::Friday, 9, 0))
            .await
    );
    assert_eq!(err.server_kind(), Some(ErrorKind::BadRequest));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn change_moves_booking_within_the_week() {
    let server = start_test_server(ServerConfig::local()).await;
    let mut client = connect(server.addr(), Semantics::AtMostOnce).await;

    let id = client
        .book("LabA", "alice", wt(Day::Sunday, 22, 0), wt(Day::Sunday, 23, 0))
        .await
        .unwrap();
    let moved = client.change_booking(id, -90).await.unwrap();
    assert_eq!(
        moved,
        Interval::new(wt(Day::Sunday, 20, 30), wt(Day::Sunday, 21, 30))
    );

    // would end at 10080: no wrap into next Monday
    let err = client.change_booking(id, 24 * 60).await.unwrap_err();
    assert_eq!(err.server_kind(), Some(ErrorKind::Conflict));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn counter_counts_each_call() {
    let server = start_test_server(ServerConfig::local()).await;
    let mut client = connect(server.addr(), Semantics::AtLeastOnce).await;
    for expected in 1..=3 {
        assert_eq!(client.increment_usage("LabA").await.unwrap(), expected);
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn at_most_once_retry_does_not_reexecute() {
    let server = start_test_server(ServerConfig::local()).await;
    let (proxy, dropped) = lossy_proxy(server.addr(), 1).await;
    let mut client = connect(proxy, Semantics::AtMostOnce).await;

    // first reply is lost, the retransmission is answered from the cache
    assert_eq!(client.increment_usage("LabA").await.unwrap(), 1);
    assert_eq!(dropped.load(Ordering::SeqCst), 1);

    let mut direct = connect(server.addr(), Semantics::AtLeastOnce).await;
    assert_eq!(direct.increment_usage("LabA").await.unwrap(), 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn at_least_once_retry_reexecutes() {
    let server = start_test_server(ServerConfig::local()).await;
    let (proxy, _) = lossy_proxy(server.addr(), 1).await;
    let mut client = connect(proxy, Semantics::AtLeastOnce).await;

    // the lost reply's execution still happened
    assert_eq!(client.increment_usage("LabA").await.unwrap(), 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn disabled_server_dedup_reexecutes_even_at_most_once() {
    let config = ServerConfig {
        at_most_once: false,
        ..ServerConfig::local()
    };
    let server = start_test_server(config).await;
    let (proxy, _) = lossy_proxy(server.addr(), 1).await;
    let mut client = connect(proxy, Semantics::AtMostOnce).await;

    assert_eq!(client.increment_usage("LabA").await.unwrap(), 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn no_reply_is_a_delivery_failure() {
    let config = ServerConfig {
        loss_rate: 1.0,
        ..ServerConfig::local()
    };
    let server = start_test_server(config).await;
    let mut client = Client::connect(
        ClientConfig {
            server: server.addr(),
            invoker: InvokerConfig {
                timeout: Duration::from_millis(100),
                max_retries: 2,
            },
        },
        Semantics::AtLeastOnce,
    )
    .await
    .unwrap();

    let err = client.increment_usage("LabA").await.unwrap_err();
    assert!(matches!(err, ClientError::Delivery { attempts: 3 }));
    assert_eq!(err.server_kind(), None);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn monitor_receives_callbacks() {
    let server = start_test_server(ServerConfig::local()).await;
    let mut watcher = connect(server.addr(), Semantics::AtLeastOnce).await;
    let mut booker = connect(server.addr(), Semantics::AtMostOnce).await;

    let mut listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    watcher
        .monitor("LabA", Duration::from_secs(30), port)
        .await
        .unwrap();

    booker
        .book("LabA", "alice", wt(Day::Wednesday, 14, 0), wt(Day::Wednesday, 15, 0))
        .await
        .unwrap();

    let (update, from) = tokio::time::timeout(Duration::from_secs(2), listener.next())
        .await
        .expect("no callback within 2s")
        .unwrap()
        .unwrap();
    assert_eq!(from, server.addr());
    assert_eq!(update.day(), Some(Day::Wednesday));
    assert_eq!(
        update.intervals,
        vec![
            Interval::new(wt(Day::Wednesday, 0, 0), wt(Day::Wednesday, 14, 0)),
            Interval::new(wt(Day::Wednesday, 15, 0), wt(Day::Wednesday, 23, 59)),
        ]
    );

    // other facilities stay quiet
    booker
        .book("LabB", "bob", wt(Day::Monday, 9, 0), wt(Day::Monday, 10, 0))
        .await
        .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(300), listener.next())
            .await
            .is_err()
    );

    server.stop().await.unwrap();
}
