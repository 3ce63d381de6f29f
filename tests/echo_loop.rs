//! End-to-end echo loop tests: a KCP client session against the echo server
//! on loopback.

#![cfg(feature = "server")]

use std::net::SocketAddr;
use std::time::Duration;

use kcp_echo_bench::engine::EngineConfig;
use kcp_echo_bench::server::{EchoServer, EchoServerBuilder, ServerHandle};
use kcp_echo_bench::session::{Session, SessionConfigBuilder, SessionState};
use kcp_echo_bench::transport::LossConfig;

async fn spawn_server() -> (SocketAddr, ServerHandle) {
    let config = EchoServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .build();
    let server = EchoServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    tokio::spawn(server.run());
    (addr, handle)
}

fn client(server: SocketAddr) -> SessionConfigBuilder {
    SessionConfigBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .peer_addr(server)
}

#[tokio::test]
async fn test_haha_sixteen_round_trips() {
    let (server, server_handle) = spawn_server().await;
    let session = Session::bind(client(server).payload_size(16).max_round_trips(20).build())
        .await
        .unwrap();
    assert_eq!(session.harness().message().as_bytes(), b"hahahahahahahaha");
    assert_eq!(session.state(), SessionState::Created);

    let summary = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("20 lossless round trips must finish")
        .unwrap();
    server_handle.stop();

    assert_eq!(summary.round_trips, 20);
    assert_eq!(summary.sends, summary.round_trips + 1);
    assert_eq!(summary.mismatches, 0);
    assert_eq!(summary.rejected_sends, 0);
    assert_eq!(summary.samples.len(), 21);
    assert!(summary.samples.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.reports[0].round_trips, 10);
    assert_eq!(summary.reports[1].round_trips, 20);
    let span = summary.samples[20] - summary.samples[0];
    assert_eq!(summary.reports[1].avg_total_ms, span / 20);
}

#[tokio::test]
async fn test_progress_under_loss() {
    let (server, server_handle) = spawn_server().await;
    let config = client(server)
        .loss(LossConfig {
            loss_ratio: 30,
            damage_ratio: 0,
            seed: Some(7),
        })
        .max_round_trips(10)
        .build();
    let session = Session::bind(config).await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(60), session.run())
        .await
        .expect("retransmission must recover from 30% loss")
        .unwrap();
    server_handle.stop();

    assert_eq!(summary.round_trips, 10);
    assert_eq!(summary.reports.len(), 1);
    assert!(summary.inbound_dropped + summary.outbound_dropped > 0);
}

#[tokio::test]
async fn test_stop_mid_flight() {
    let (server, server_handle) = spawn_server().await;
    let session = Session::bind(client(server).build()).await.unwrap();
    let handle = session.handle();
    let run = tokio::spawn(session.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop();
    assert!(handle.is_stopped());

    let summary = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("stop must not hang")
        .unwrap()
        .unwrap();
    server_handle.stop();

    assert!(summary.round_trips > 0);
    assert!(summary.samples.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_oversized_payload_stalls() {
    let (server, server_handle) = spawn_server().await;
    let engine = EngineConfig {
        max_message_size: 1024,
        ..EngineConfig::default()
    };
    let session = Session::bind(client(server).payload_size(2000).engine(engine).build())
        .await
        .unwrap();
    let handle = session.handle();
    let run = tokio::spawn(session.run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop();

    let summary = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("stalled session must still stop")
        .unwrap()
        .unwrap();
    server_handle.stop();

    assert_eq!(summary.rejected_sends, 1);
    assert_eq!(summary.round_trips, 0);
    assert!(summary.reports.is_empty());
}

#[tokio::test]
async fn test_two_clients_share_a_server() {
    let (server, server_handle) = spawn_server().await;
    let first = Session::bind(client(server).conversation_id(1).max_round_trips(10).build())
        .await
        .unwrap();
    let second = Session::bind(client(server).conversation_id(2).max_round_trips(10).build())
        .await
        .unwrap();

    let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(first.run(), second.run())
    })
    .await
    .expect("both sessions must finish");
    server_handle.stop();

    assert_eq!(a.unwrap().round_trips, 10);
    assert_eq!(b.unwrap().round_trips, 10);
}

#[tokio::test]
async fn test_client_restart_on_same_port() {
    let (server, server_handle) = spawn_server().await;
    let conv = 123_456;

    let first = Session::bind(client(server).conversation_id(conv).max_round_trips(5).build())
        .await
        .unwrap();
    let local = first.local_addr().unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), first.run())
        .await
        .expect("first run must finish")
        .unwrap();
    assert_eq!(summary.round_trips, 5);

    // Same address and conversation, sequence numbers start over.
    let config = client(server)
        .bind_addr(local)
        .conversation_id(conv)
        .max_round_trips(5)
        .build();
    let second = Session::bind(config).await.unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), second.run())
        .await
        .expect("restarted client must not stall against the old engine")
        .unwrap();
    server_handle.stop();

    assert_eq!(summary.round_trips, 5);
    assert_eq!(summary.mismatches, 0);
}
