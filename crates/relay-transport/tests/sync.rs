//! End-to-end catch-up and live delivery over loopback TCP.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use relay_core::{CursorStore, Hub, Message, RelayError};
use relay_cursor::{FileCursor, MemoryCursor};
use relay_transport::{
    RelayServer, ServerConfig, SyncClient, SyncRequest,
    protocol::{self, DEFAULT_MAX_FRAME_LEN, LineFramed},
};
use tempfile::TempDir;
use tokio::{net::TcpStream, sync::mpsc};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(150);

async fn start_server() -> (Arc<Hub>, SocketAddr) {
    let config = ServerConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..ServerConfig::default()
    };
    let hub = Arc::new(Hub::with_max_text_len(config.max_text_len()));
    let server = RelayServer::bind(config, Arc::clone(&hub)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let _accept = server.spawn();
    (hub, addr)
}

async fn connect_raw(addr: SocketAddr, first_frame: &str) -> LineFramed<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut lines = protocol::framed(stream, DEFAULT_MAX_FRAME_LEN);
    lines.send(first_frame.to_string()).await.unwrap();
    lines
}

async fn sync(addr: SocketAddr, cursor: u64) -> LineFramed<TcpStream> {
    connect_raw(addr, &SyncRequest::new(cursor).encode()).await
}

async fn next_line(lines: &mut LineFramed<TcpStream>) -> String {
    tokio::time::timeout(WAIT, lines.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream closed")
        .expect("read failed")
}

async fn assert_quiet(lines: &mut LineFramed<TcpStream>) {
    assert!(
        tokio::time::timeout(QUIET, lines.next()).await.is_err(),
        "unexpected frame"
    );
}

async fn wait_for_clients(hub: &Hub, n: usize) {
    tokio::time::timeout(WAIT, hub.wait_for_clients(n))
        .await
        .expect("clients never registered");
}

async fn wait_for_registry_len(hub: &Hub, n: usize) {
    tokio::time::timeout(WAIT, async {
        while hub.registry().len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never settled");
}

#[tokio::test]
async fn test_hello_world_scenario() {
    let (hub, addr) = start_server().await;
    assert_eq!(*hub.publish("hello").unwrap().message, Message::new(1, "hello"));
    assert_eq!(*hub.publish("world").unwrap().message, Message::new(2, "world"));

    let mut lines = sync(addr, 0).await;
    assert_eq!(next_line(&mut lines).await, "1:hello");
    assert_eq!(next_line(&mut lines).await, "2:world");
    assert_quiet(&mut lines).await;
}

#[tokio::test]
async fn test_replay_only_after_cursor() {
    let (hub, addr) = start_server().await;
    for i in 1..=10 {
        hub.publish(&format!("msg {i}")).unwrap();
    }

    let mut lines = sync(addr, 4).await;
    for i in 5..=10 {
        assert_eq!(next_line(&mut lines).await, format!("{i}:msg {i}"));
    }
    assert_quiet(&mut lines).await;
}

#[tokio::test]
async fn test_live_delivery_after_registration() {
    let (hub, addr) = start_server().await;
    let mut lines = sync(addr, 0).await;
    wait_for_clients(&hub, 1).await;

    for text in ["a", "b:with:colons", "c"] {
        hub.publish(text).unwrap();
    }
    assert_eq!(next_line(&mut lines).await, "1:a");
    assert_eq!(next_line(&mut lines).await, "2:b:with:colons");
    assert_eq!(next_line(&mut lines).await, "3:c");
}

#[tokio::test]
async fn test_publish_without_clients_is_replayed_later() {
    let (hub, addr) = start_server().await;
    let published = hub.publish("nobody home").unwrap();
    assert_eq!(published.recipients, 0);

    let mut lines = sync(addr, 0).await;
    assert_eq!(next_line(&mut lines).await, "1:nobody home");
}

#[tokio::test]
async fn test_oversized_publish_never_blocks_catch_up() {
    let (hub, addr) = start_server().await;
    let too_long = "a".repeat(DEFAULT_MAX_FRAME_LEN);
    assert!(matches!(
        hub.publish(&too_long),
        Err(RelayError::MessageTooLong { .. })
    ));

    // the longest accepted text still fits a frame with a 20-digit id
    let longest = "b".repeat(ServerConfig::default().max_text_len());
    hub.publish(&longest).unwrap();
    hub.publish("after").unwrap();

    for _ in 0..2 {
        let mut client = SyncClient::connect(addr, MemoryCursor::new(0), DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = tokio::spawn(async move {
            client
                .run(|m| {
                    let _ = tx.send(m.clone());
                })
                .await
        });

        let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, Message::new(1, longest.clone()));
        let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(second, Message::new(2, "after"));
        session.abort();
    }
}

#[tokio::test]
async fn test_malformed_sync_replays_everything() {
    let (hub, addr) = start_server().await;
    hub.publish("one").unwrap();
    hub.publish("two").unwrap();

    let mut lines = connect_raw(addr, "HELLO THERE").await;
    assert_eq!(next_line(&mut lines).await, "1:one");
    assert_eq!(next_line(&mut lines).await, "2:two");
}

#[tokio::test]
async fn test_dead_client_does_not_affect_others() {
    let (hub, addr) = start_server().await;
    let a = sync(addr, 0).await;
    let mut b = sync(addr, 0).await;
    wait_for_clients(&hub, 2).await;

    drop(a);
    hub.publish("first").unwrap();
    hub.publish("second").unwrap();

    assert_eq!(next_line(&mut b).await, "1:first");
    assert_eq!(next_line(&mut b).await, "2:second");
    wait_for_registry_len(&hub, 1).await;

    let ids: Vec<_> = hub.history().since(0).iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_restart_gap_recovery() {
    let (hub, addr) = start_server().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cursor");

    // first session: live for ids 1-5
    let mut client = SyncClient::connect(addr, FileCursor::new(&path), DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = tokio::spawn(async move {
        let _ = client.run(|m| {
            let _ = tx.send(m.clone());
        })
        .await;
    });
    wait_for_clients(&hub, 1).await;

    for i in 1..=5 {
        hub.publish(&format!("update {i}")).unwrap();
    }
    for i in 1..=5 {
        let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.id, i);
    }
    tokio::time::timeout(WAIT, async {
        while FileCursor::new(&path).load().await != 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cursor never reached 5");

    session.abort();
    let _ = session.await;
    wait_for_registry_len(&hub, 0).await;

    // offline: ids 6-8
    for i in 6..=8 {
        hub.publish(&format!("update {i}")).unwrap();
    }

    // second session resumes from the persisted cursor
    let mut client = SyncClient::connect(addr, FileCursor::new(&path), DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    assert_eq!(client.last_seen(), 5);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _session = tokio::spawn(async move {
        let _ = client.run(|m| {
            let _ = tx.send(m.clone());
        })
        .await;
    });

    for i in 6..=8 {
        let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg, Message::new(i, format!("update {i}")));
    }

    // then live
    wait_for_clients(&hub, 1).await;
    hub.publish("update 9").unwrap();
    let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.id, 9);
    assert!(tokio::time::timeout(QUIET, rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_concurrent_joins_see_every_id_once() {
    const TOTAL: u64 = 200;
    let (hub, addr) = start_server().await;

    let publisher = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            for i in 1..=TOTAL {
                hub.publish(&format!("m{i}")).unwrap();
                if i % 10 == 0 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..5 {
        let mut lines = sync(addr, 0).await;
        readers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while ids.last() != Some(&TOTAL) {
                let line = next_line(&mut lines).await;
                ids.push(Message::parse(&line).unwrap().id);
            }
            ids
        }));
        tokio::time::sleep(Duration::from_millis(7)).await;
    }

    publisher.await.unwrap();
    for reader in readers {
        let ids = reader.await.unwrap();
        assert_eq!(ids, (1..=TOTAL).collect::<Vec<_>>());
    }
}
