use std::time::Duration;

use lib_common::core::{ConnectionState, FeedHandle, FeedSession, validate_endpoint};
use lib_common::ingestors::WsTransport;
use lib_common::results::{RecordId, ReconciliationStore};
use project_tests::LoopbackServer;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

async fn wait_state(feed: &FeedHandle, wanted: ConnectionState) {
    let mut states = feed.subscribe_states();
    timeout(WAIT, states.wait_for(|s| *s == wanted)).await.unwrap().unwrap();
}

#[tokio::test]
async fn websocket_feed_end_to_end() {
    let mut server = LoopbackServer::start().await.unwrap();
    let (session, feed) = FeedSession::new(WsTransport::new(), server.url().clone(), ReconciliationStore::default());
    let task = tokio::spawn(session.run());

    let peer = timeout(WAIT, server.next_peer()).await.unwrap().unwrap();
    wait_state(&feed, ConnectionState::Open).await;

    assert!(peer.send_text(r#"[{"id":1,"sportsmen_id":7,"sportsmen_name":"Anna"},{"id":2,"sportsmen_id":8,"sportsmen_name":"Berit"}]"#));
    assert!(peer.send_binary(br#"{"id":2,"time_finish":3723004}"#));

    let mut snapshots = feed.subscribe_snapshots();
    let snapshot = timeout(WAIT, snapshots.wait_for(|s| s.version() >= 2)).await.unwrap().unwrap().clone();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.find(&RecordId::Int(2)).unwrap().time_finish, "1:2:3.4");
    assert_eq!(snapshot.find(&RecordId::Int(1)).unwrap().time_finish, "");

    assert!(peer.close("race over"));
    wait_state(&feed, ConnectionState::Closed).await;

    feed.shutdown();
    let final_snapshot = timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(final_snapshot.version(), 2);
}

#[tokio::test]
async fn shutdown_closes_the_socket() {
    let mut server = LoopbackServer::start().await.unwrap();
    let (session, feed) = FeedSession::new(WsTransport::new(), server.url().clone(), ReconciliationStore::default());
    let task = tokio::spawn(session.run());

    let mut peer = timeout(WAIT, server.next_peer()).await.unwrap().unwrap();
    wait_state(&feed, ConnectionState::Open).await;

    feed.shutdown();
    timeout(WAIT, task).await.unwrap().unwrap();
    timeout(WAIT, peer.wait_closed()).await.unwrap();

    // The released connection can no longer touch the feed.
    peer.send_text(r#"[{"id":1}]"#);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(feed.snapshot().is_empty());
}

#[tokio::test]
async fn refused_connection_ends_closed() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = validate_endpoint(&format!("ws://{}/dashboard", addr)).unwrap();
    let (session, feed) = FeedSession::new(WsTransport::new(), endpoint, ReconciliationStore::default());
    let task = tokio::spawn(session.run());

    wait_state(&feed, ConnectionState::Closed).await;
    assert!(feed.snapshot().is_empty());

    feed.shutdown();
    timeout(WAIT, task).await.unwrap().unwrap();
}
