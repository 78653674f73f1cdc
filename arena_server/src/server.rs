//! Authoritative server implementation.
//!
//! This is a fixed-timestep tick loop: each tick drains the inbound socket,
//! applies at most one input per client, advances the shared physics step,
//! and broadcasts a snapshot. There is no map/BSP layer and no TCP control
//! plane — the custom binary protocol in `arena_shared::protocol` is the
//! only wire format, carried entirely over one UDP socket.
//!
//! Determinism notes:
//! - The simulation only ever advances by the configured fixed `dt`.
//! - Iteration order over clients and entities is stable (`BTreeMap`-backed
//!   ack state aside, the world itself is a flat slot table keyed by id).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use arena_shared::config::ServerConfig;
use arena_shared::error::CodecError;
use arena_shared::input::Input;
use arena_shared::metrics::MetricsLogger;
use arena_shared::netsim::{NetworkConditions, NetworkSimulator};
use arena_shared::physics::{self, WORLD_H, WORLD_W};
use arena_shared::protocol::{self, PacketType};
use arena_shared::snapshot::{AckTrailerEntry, EntityState, WorldState};

use crate::client_manager::ClientManager;

/// A client is dropped after this long without hearing from it.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Caps the number of datagrams drained per tick so one connection can
/// never starve the rest of the loop.
const MAX_PACKETS_PER_TICK: usize = 1024;

/// RELIABLE_EVENT payload kinds: a one-byte tag followed by the affected
/// client id, used for roster-change notifications.
const RELIABLE_EVENT_JOIN: u8 = 1;
const RELIABLE_EVENT_LEAVE: u8 = 2;

/// The authoritative game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    socket: std::sync::Arc<UdpSocket>,
    netsim: Option<NetworkSimulator>,
    clients: ClientManager,
    world: WorldState,
    tick: u32,
    metrics: MetricsLogger,
    started_at: Instant,
}

impl GameServer {
    /// Binds the UDP socket and constructs an empty server ready to run.
    pub async fn new(cfg: ServerConfig) -> anyhow::Result<Self> {
        cfg.validate().map_err(|e| anyhow::anyhow!(e))?;
        let addr: SocketAddr = cfg.bind_addr().parse().context("parse bind address")?;
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        let socket = std::sync::Arc::new(socket);

        let netsim = if cfg.loss > 0.0 || cfg.latency_secs > 0.0 {
            Some(NetworkSimulator::new(
                socket.clone(),
                NetworkConditions {
                    loss: cfg.loss,
                    base_latency: Duration::from_secs_f64(cfg.latency_secs),
                    jitter: Duration::from_millis(0),
                },
            ))
        } else {
            None
        };

        Ok(Self {
            cfg,
            socket,
            netsim,
            clients: ClientManager::new(),
            world: WorldState::new(),
            tick: 0,
            metrics: MetricsLogger::new(),
            started_at: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Runs the server for a fixed number of ticks at `1 / cfg.tick_hz`
    /// wall-clock spacing, used by integration tests and `run_forever`.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = tokio::time::Instant::now();
        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Runs forever on the configured tick rate. Scheduling is absolute
    /// (`next += dt` each iteration) so a slow tick never compounds drift;
    /// an overrun tick is simply not caught up, it just runs late once.
    pub async fn run_forever(&mut self) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = tokio::time::Instant::now();
        loop {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
    }

    /// Executes one fixed simulation step: drain input, simulate, expire
    /// idle clients, broadcast a snapshot.
    pub async fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        let tick_start = Instant::now();

        self.drain_inbound().await?;
        self.apply_pending_inputs(dt_sec);
        self.tick = self.tick.wrapping_add(1);
        self.world.tick = self.tick;

        let now = Instant::now();
        for id in self.clients.expire_stale(now, CLIENT_TIMEOUT) {
            self.world.remove(id);
            info!(client_id = id, "client timed out, disconnecting");
            self.broadcast_reliable_event(&[RELIABLE_EVENT_LEAVE, id], None).await;
        }

        self.process_reliability(self.elapsed_secs()).await;
        self.broadcast_snapshot().await?;

        let elapsed = self.elapsed_secs();
        self.metrics
            .record_tick_time(elapsed, tick_start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Drains up to `MAX_PACKETS_PER_TICK` datagrams from the socket,
    /// non-blocking, dispatching each by packet type.
    async fn drain_inbound(&mut self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 64 * 1024];
        for _ in 0..MAX_PACKETS_PER_TICK {
            match self.socket.try_recv_from(&mut buf) {
                Ok((n, from)) => {
                    self.metrics.add_bytes_in(n as u64);
                    if let Err(e) = self.handle_datagram(&buf[..n], from).await {
                        debug!(%from, error = %e, "dropping malformed packet");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(())
    }

    async fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Result<(), CodecError> {
        let (header, payload) = protocol::decode(bytes)?;

        if header.kind == PacketType::ConnectReq {
            self.handle_connect_req(from, header.seq).await;
            return Ok(());
        }

        let Some(client_id) = self.clients.find_by_addr(from) else {
            trace!(%from, "packet from unknown address, ignoring");
            return Ok(());
        };

        let now = Instant::now();
        if let Some(client) = self.clients.get_mut(client_id) {
            client.last_heard_at = now;
            client.inbound.on_receive(header.seq);
            let confirmed = client.outbound.acked_by_peer(header.ack, header.ack_bits);
            for seq in confirmed {
                client.reliable.on_acked(seq);
            }
        }

        match header.kind {
            PacketType::Input => {
                let entries = protocol::decode_input_payload(&payload)?;
                if let Some(client) = self.clients.get_mut(client_id) {
                    for (seq, mx, my, actions) in entries {
                        client.enqueue_input(Input::new(seq, mx, my, actions));
                    }
                }
            }
            PacketType::Ping => {
                if let Ok(ts) = protocol::decode_timestamp(&payload) {
                    self.reply_pong(client_id, ts).await;
                }
            }
            PacketType::Disconnect => {
                if let Some(client) = self.clients.get_mut(client_id) {
                    client.pending_removal = true;
                }
            }
            PacketType::Heartbeat => {
                // last_heard_at already refreshed above; nothing else to do.
            }
            PacketType::ReliableEvent => {
                debug!(client_id, bytes = payload.len(), "reliable event received");
            }
            other => {
                trace!(?other, "unexpected packet type from client, ignoring");
            }
        }
        Ok(())
    }

    async fn handle_connect_req(&mut self, from: SocketAddr, wire_seq: u16) {
        if let Some(existing) = self.clients.find_by_addr(from) {
            debug!(client_id = existing, "duplicate CONNECT_REQ, re-acking");
            self.send_connect_ack(existing).await;
            return;
        }

        let now = Instant::now();
        let Some(id) = self.clients.connect(from, now) else {
            warn!(%from, "server full, ignoring CONNECT_REQ");
            return;
        };
        if let Some(client) = self.clients.get_mut(id) {
            client.inbound.on_receive(wire_seq);
        }
        self.world.insert(EntityState {
            id,
            pos: arena_shared::math::Vec2::new(WORLD_W / 2.0, WORLD_H / 2.0),
            vel: arena_shared::math::Vec2::ZERO,
            health: 100.0,
        });
        info!(client_id = id, %from, "client connected");
        self.send_connect_ack(id).await;
        self.broadcast_reliable_event(&[RELIABLE_EVENT_JOIN, id], Some(id)).await;
    }

    async fn send_connect_ack(&mut self, client_id: u8) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        let seq = client.outbound.next_outbound();
        let (ack, ack_bits) = client.inbound.outgoing_ack();
        let addr = client.addr;
        let payload = protocol::encode_connect_ack(client_id, WORLD_W, WORLD_H);
        let packet = protocol::encode(PacketType::ConnectAck, seq, ack, ack_bits, &payload);
        self.send_to(&packet, addr).await;
    }

    async fn reply_pong(&mut self, client_id: u8, ts: u64) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        let seq = client.outbound.next_outbound();
        let (ack, ack_bits) = client.inbound.outgoing_ack();
        let addr = client.addr;
        let payload = protocol::encode_timestamp(ts);
        let packet = protocol::encode(PacketType::Pong, seq, ack, ack_bits, &payload);
        self.send_to(&packet, addr).await;
    }

    /// Applies the newest queued input for each connected client through
    /// the shared physics step. A client with no new input this tick keeps
    /// its last simulated state untouched.
    fn apply_pending_inputs(&mut self, dt_sec: f32) {
        let mut updates: Vec<(u8, EntityState)> = Vec::new();
        let mut ids: Vec<u8> = self.clients.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        for id in ids {
            let Some(client) = self.clients.get_mut(id) else {
                continue;
            };
            let Some(state) = self.world.get(client.entity) else {
                continue;
            };
            if let Some(input) = client.take_latest_input() {
                updates.push((client.entity, physics::step(*state, input, dt_sec)));
            }
        }
        for (_id, state) in updates {
            self.world.insert(state);
        }
    }

    /// Builds one snapshot and unicasts it to every connected client, each
    /// carrying that client's own per-connection seq/ack header.
    async fn broadcast_snapshot(&mut self) -> anyhow::Result<()> {
        let trailer: Vec<AckTrailerEntry> = self
            .clients
            .iter()
            .filter_map(|c| {
                c.highest_applied_input_seq
                    .map(|seq| AckTrailerEntry {
                        client_id: c.id,
                        last_processed_input_seq: seq,
                    })
            })
            .collect();
        let snapshot = self.world.to_snapshot(trailer);
        let base_payload = snapshot.encode();

        let targets: Vec<(u16, u16, u32, SocketAddr)> = self
            .clients
            .iter_mut()
            .map(|c| {
                let seq = c.outbound.next_outbound();
                let (ack, ack_bits) = c.inbound.outgoing_ack();
                (seq, ack, ack_bits, c.addr)
            })
            .collect();

        for (seq, ack, ack_bits, addr) in targets {
            let packet = protocol::encode(
                PacketType::Snapshot,
                seq,
                ack,
                ack_bits,
                &base_payload,
            );
            self.send_to(&packet, addr).await;
        }
        Ok(())
    }

    async fn send_to(&mut self, packet: &[u8], addr: SocketAddr) {
        self.metrics.add_bytes_out(packet.len() as u64);
        if let Some(sim) = &self.netsim {
            sim.send_to(packet.to_vec(), addr);
        } else if let Err(e) = self.socket.send_to(packet, addr).await {
            debug!(%addr, error = %e, "send_to failed");
        }
    }

    /// Sends one reliable event to a single client, retaining it in that
    /// client's `ReliableEventChannel` until acked or reported lost.
    async fn send_reliable_event(&mut self, client_id: u8, payload: Vec<u8>) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        let seq = client.outbound.next_outbound();
        let (ack, ack_bits) = client.inbound.outgoing_ack();
        let addr = client.addr;
        client.reliable.send(seq, payload.clone());
        let packet = protocol::encode(
            PacketType::ReliableEvent,
            seq,
            ack,
            ack_bits,
            &protocol::encode_reliable_event(&payload),
        );
        self.send_to(&packet, addr).await;
    }

    /// Sends a reliable event to every connected client except `exclude`.
    async fn broadcast_reliable_event(&mut self, payload: &[u8], exclude: Option<u8>) {
        let targets: Vec<u8> = self
            .clients
            .iter()
            .map(|c| c.id)
            .filter(|&id| Some(id) != exclude)
            .collect();
        for id in targets {
            self.send_reliable_event(id, payload.to_vec()).await;
        }
    }

    /// Per-tick reliability pass: infers losses from each client's outbound
    /// ack state, feeds the aggregate into the loss metric, and resends any
    /// reliable event carried on a now-lost sequence.
    async fn process_reliability(&mut self, elapsed: f64) {
        let mut outgoing: Vec<(u16, u16, u32, SocketAddr, Vec<u8>)> = Vec::new();
        let mut total_lost_in_tick = 0u64;
        let mut total_sent = 0u64;
        for client in self.clients.iter_mut() {
            let lost = client.outbound.inferred_lost();
            total_lost_in_tick += lost.len() as u64;
            total_sent += client.outbound.total_sent;
            for lost_seq in lost {
                let resend_seq = client.outbound.next_outbound();
                let (ack, ack_bits) = client.inbound.outgoing_ack();
                for payload in client.reliable.on_lost(&[lost_seq], resend_seq) {
                    outgoing.push((resend_seq, ack, ack_bits, client.addr, payload));
                }
            }
        }
        if total_sent > 0 {
            self.metrics.record_loss(elapsed, total_lost_in_tick, total_sent);
        }
        for (seq, ack, ack_bits, addr, payload) in outgoing {
            let packet = protocol::encode(
                PacketType::ReliableEvent,
                seq,
                ack,
                ack_bits,
                &protocol::encode_reliable_event(&payload),
            );
            self.send_to(&packet, addr).await;
        }
    }

    /// Broadcasts a DISCONNECT to every connected client, best-effort, and
    /// does not wait for delivery. Used on graceful shutdown.
    pub async fn shutdown_broadcast(&mut self) {
        let payload = protocol::encode_disconnect();
        let targets: Vec<(u16, u16, u32, SocketAddr)> = self
            .clients
            .iter_mut()
            .map(|c| {
                let seq = c.outbound.next_outbound();
                let (ack, ack_bits) = c.inbound.outgoing_ack();
                (seq, ack, ack_bits, c.addr)
            })
            .collect();
        for (seq, ack, ack_bits, addr) in targets {
            let packet = protocol::encode(PacketType::Disconnect, seq, ack, ack_bits, &payload);
            self.send_to(&packet, addr).await;
        }
    }

    pub fn metrics_json(&mut self) -> String {
        let elapsed = self.elapsed_secs();
        self.metrics.flush_bandwidth_window(elapsed);
        self.metrics.flush_json()
    }
}

/// Test helper: binds to an ephemeral loopback port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<GameServer> {
    let cfg = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tick_hz,
        loss: 0.0,
        latency_secs: 0.0,
    };
    GameServer::new(cfg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_server_has_no_clients() {
        let server = bind_ephemeral(20).await.unwrap();
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.tick(), 0);
    }

    #[tokio::test]
    async fn step_advances_tick_counter() {
        let mut server = bind_ephemeral(20).await.unwrap();
        server.step(0.05).await.unwrap();
        server.step(0.05).await.unwrap();
        assert_eq!(server.tick(), 2);
    }
}
