//! Standalone server binary.
//!
//! Usage:
//!   arena-server [--host 127.0.0.1] [--port 40000] [--tick-rate 20] [--loss 0.0] [--latency 0.0]
//!
//! Binds a UDP socket, runs the fixed-timestep authoritative loop forever,
//! and broadcasts snapshots to connected clients.

use std::env;

use anyhow::Context;
use tracing::info;

use arena_server::server::GameServer;
use arena_shared::config::ServerConfig;

fn parse_args() -> ServerConfig {
    let mut cfg = ServerConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" if i + 1 < args.len() => {
                cfg.host = args[i + 1].clone();
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1].parse().unwrap_or(cfg.port);
                i += 2;
            }
            "--tick-rate" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--loss" if i + 1 < args.len() => {
                cfg.loss = args[i + 1].parse().unwrap_or(0.0);
                i += 2;
            }
            "--latency" if i + 1 < args.len() => {
                cfg.latency_secs = args[i + 1].parse().unwrap_or(0.0);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    if let Err(e) = cfg.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    info!(host = %cfg.host, port = cfg.port, tick_hz = cfg.tick_hz, "starting server");

    let mut server = GameServer::new(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "server listening");

    let result = server.run_forever().await;
    server.shutdown_broadcast().await;
    result
}
