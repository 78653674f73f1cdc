//! Full socket-based integration tests for client <-> server communication.

use std::time::Duration;

use arena_client::GameClient;
use arena_server::server::{bind_ephemeral, GameServer};
use arena_shared::config::{ClientConfig, ServerConfig};
use arena_shared::protocol::{self, PacketType};

/// Unit-style test: wire protocol datagrams roundtrip correctly.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let connect_req = protocol::encode(PacketType::ConnectReq, 1, 0, 0, &protocol::encode_connect_req());
    let (header, _) = protocol::decode(&connect_req)?;
    assert_eq!(header.kind, PacketType::ConnectReq);

    let ack_payload = protocol::encode_connect_ack(7, 800.0, 600.0);
    let (client_id, w, h) = protocol::decode_connect_ack(&ack_payload)?;
    assert_eq!((client_id, w, h), (7, 800.0, 600.0));

    let ping = protocol::encode_timestamp(123_456);
    assert_eq!(protocol::decode_timestamp(&ping)?, 123_456);

    Ok(())
}

fn client_cfg_for(addr: std::net::SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        tick_hz: 64,
        headless: true,
        loss: 0.0,
        latency_secs: 0.0,
    }
}

/// Full integration: spawn a server, connect a client, exchange input and
/// snapshots over real UDP sockets on loopback.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_server_full_roundtrip() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    let mut server = bind_ephemeral(64).await?;
    let server_addr = server.local_addr()?;

    let server_handle = tokio::spawn(async move {
        for _ in 0..30 {
            server.step(1.0 / 64.0).await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok::<_, anyhow::Error>(server)
    });

    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut client = GameClient::connect(&client_cfg_for(server_addr)).await?;
    assert!(client.client_id().is_some());

    for _ in 0..20 {
        client.tick(1.0, 0.0, 0, 1.0 / 64.0).await?;
        client.drain_incoming(1.0 / 64.0).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let server = server_handle.await??;
    assert_eq!(server.client_count(), 1);
    assert!(client.remote.latest_tick().is_some(), "expected at least one snapshot");

    let own_id = client.client_id().unwrap();
    // The client's own entity moved forward under positive moveX input.
    assert!(client.world.as_ref().unwrap().predicted.pos.x > arena_shared::physics::WORLD_W / 2.0);
    let _ = own_id;

    Ok(())
}

/// With the server's outbound path dropping 30% of snapshots, the client
/// should still keep up: it just has gaps in its snapshot buffer rather
/// than stalling, and its own predicted entity keeps moving regardless
/// since prediction never depends on snapshot delivery.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn survives_moderate_snapshot_loss() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    let lossy_cfg = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tick_hz: 64,
        loss: 0.3,
        latency_secs: 0.0,
    };
    let mut server = GameServer::new(lossy_cfg).await?;
    let server_addr = server.local_addr()?;

    let server_handle = tokio::spawn(async move {
        for _ in 0..80 {
            server.step(1.0 / 64.0).await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok::<_, anyhow::Error>(server)
    });

    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut client = GameClient::connect(&client_cfg_for(server_addr)).await?;

    for _ in 0..60 {
        client.tick(0.0, 1.0, 0, 1.0 / 64.0).await?;
        client.drain_incoming(1.0 / 64.0).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let server = server_handle.await??;
    assert_eq!(server.client_count(), 1);
    // Enough of the 80 broadcast snapshots should have survived 30% loss
    // that the client observed forward tick progress.
    assert!(client.remote.latest_tick().unwrap_or(0) > 10);
    assert!(client.world.as_ref().unwrap().predicted.pos.y > arena_shared::physics::WORLD_H / 2.0);

    Ok(())
}
