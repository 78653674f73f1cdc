//! Standalone client binary.
//!
//! Usage:
//!   arena-client [--host 127.0.0.1] [--port 40000] [--tick-rate 20] [--headless]
//!
//! Connects to the server, predicts its own entity locally, and
//! interpolates every other entity from the snapshot stream. With
//! `--headless` (the default, since this crate has no renderer) it just
//! runs the network loop and logs occasional snapshot info.

use std::env;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use arena_client::client::{ClientState, GameClient};
use arena_shared::config::ClientConfig;

fn parse_args() -> ClientConfig {
    let mut cfg = ClientConfig::default();
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
            "--headless" => {
                cfg.headless = true;
                i += 1;
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

    info!(server = %cfg.server_addr(), "connecting");
    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    info!(client_id = ?client.client_id(), "connected");

    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let dt = tick_interval.as_secs_f32();
    let mut tick: u64 = 0;

    loop {
        if client.state == ClientState::Disconnected {
            info!("disconnected, exiting");
            break;
        }

        // No real input device is wired up in headless mode; a renderer
        // front end would sample keyboard/mouse here instead.
        client.tick(0.0, 0.0, 0, dt).await?;
        client.drain_incoming(dt).await?;

        if tick % (cfg.tick_hz as u64) == 0 {
            if let Some(render_tick) = client.remote.render_tick() {
                info!(render_tick, buffered = client.remote.len(), "snapshot status");
            }
            client.send_ping().await?;
        }

        tick += 1;
        tokio::time::sleep(tick_interval).await;
    }

    client.disconnect().await?;
    Ok(())
}
