//! Client implementation: connects to the server, predicts its own
//! movement, reconciles against authoritative snapshots, and
//! interpolates every other entity for rendering.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use arena_shared::ack::AckTracker;
use arena_shared::config::ClientConfig;
use arena_shared::error::CodecError;
use arena_shared::input::Input;
use arena_shared::math::Vec2;
use arena_shared::metrics::MetricsLogger;
use arena_shared::netsim::{NetworkConditions, NetworkSimulator};
use arena_shared::protocol::{self, PacketType};
use arena_shared::snapshot::{EntityId, EntityState, Snapshot};

use crate::input::InputSampler;
use crate::interp::SnapshotBuffer;
use crate::predict::ClientWorld;

/// Number of redundant copies of recent input sent with every INPUT
/// packet, oldest first, so a lost packet doesn't cost the server an
/// input sample as long as one of the next two redundant copies lands.
pub const INPUT_REDUNDANCY: usize = 3;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// RELIABLE_EVENT payload kinds, mirroring the server's roster-change tags.
const RELIABLE_EVENT_JOIN: u8 = 1;
const RELIABLE_EVENT_LEAVE: u8 = 2;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Connected,
    Disconnected,
}

pub struct GameClient {
    socket: Arc<UdpSocket>,
    netsim: Option<NetworkSimulator>,
    server_addr: SocketAddr,
    pub state: ClientState,

    /// Tracks packets sent to the server (our outbound seq, and
    /// interpreting the server's piggybacked ack/ack_bits).
    outbound: AckTracker,
    /// Tracks packets received from the server (drives the ack/ack_bits
    /// we piggyback on our own outbound packets).
    inbound: AckTracker,

    pub world: Option<ClientWorld>,
    pub remote: SnapshotBuffer,
    sampler: InputSampler,
    recent_inputs: std::collections::VecDeque<Input>,

    pub metrics: MetricsLogger,
    started_at: Instant,
}

impl GameClient {
    /// Binds a local UDP socket and sends CONNECT_REQ, retrying until
    /// CONNECT_ACK arrives or `CONNECT_TIMEOUT` elapses.
    pub async fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let local: SocketAddr = "0.0.0.0:0".parse().unwrap();
        let socket = UdpSocket::bind(local).await.context("udp bind")?;
        let server_addr: SocketAddr = cfg.server_addr().parse().context("parse server_addr")?;
        socket.connect(server_addr).await.context("udp connect")?;
        let socket = Arc::new(socket);

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

        let mut client = Self {
            socket,
            netsim,
            server_addr,
            state: ClientState::Connecting,
            outbound: AckTracker::new(),
            inbound: AckTracker::new(),
            world: None,
            remote: SnapshotBuffer::new(),
            sampler: InputSampler::new(),
            recent_inputs: std::collections::VecDeque::with_capacity(INPUT_REDUNDANCY),
            metrics: MetricsLogger::new(),
            started_at: Instant::now(),
        };

        client.handshake().await?;
        Ok(client)
    }

    async fn handshake(&mut self) -> anyhow::Result<()> {
        let deadline = Instant::now() + CONNECT_TIMEOUT;
        let mut buf = [0u8; 64];
        while Instant::now() < deadline {
            let seq = self.outbound.next_outbound();
            let (ack, ack_bits) = self.inbound.outgoing_ack();
            let payload = protocol::encode_connect_req();
            let packet = protocol::encode(PacketType::ConnectReq, seq, ack, ack_bits, &payload);
            self.send_to(&packet).await.context("send CONNECT_REQ")?;

            match tokio::time::timeout(CONNECT_RETRY_INTERVAL, self.socket.recv(&mut buf)).await {
                Ok(Ok(n)) => {
                    if let Ok((header, payload)) = protocol::decode(&buf[..n]) {
                        if header.kind == PacketType::ConnectAck {
                            self.inbound.on_receive(header.seq);
                            let (client_id, _w, _h) = protocol::decode_connect_ack(&payload)?;
                            self.world = Some(ClientWorld::new(
                                client_id,
                                EntityState {
                                    id: client_id,
                                    pos: Vec2::new(
                                        arena_shared::physics::WORLD_W / 2.0,
                                        arena_shared::physics::WORLD_H / 2.0,
                                    ),
                                    vel: Vec2::ZERO,
                                    health: 100.0,
                                },
                            ));
                            self.state = ClientState::Connected;
                            let server_addr = self.server_addr;
                            info!(client_id, %server_addr, "connected");
                            return Ok(());
                        }
                    }
                }
                Ok(Err(e)) => return Err(e).context("udp recv during handshake"),
                Err(_) => continue,
            }
        }
        anyhow::bail!("connect timed out after {:?}", CONNECT_TIMEOUT)
    }

    pub fn client_id(&self) -> Option<EntityId> {
        self.world.as_ref().map(|w| w.client_id)
    }

    /// Samples one input, predicts locally, and sends it (with the last
    /// `INPUT_REDUNDANCY` inputs, oldest first) to the server.
    pub async fn tick(&mut self, move_x: f32, move_y: f32, actions: u8, dt: f32) -> anyhow::Result<()> {
        let input = self.sampler.sample(move_x, move_y, actions);

        if let Some(world) = &mut self.world {
            world.predict(input, dt);
        }

        if self.recent_inputs.len() == INPUT_REDUNDANCY {
            self.recent_inputs.pop_front();
        }
        self.recent_inputs.push_back(input);

        let entries: Vec<(u32, f32, f32, u8)> = self
            .recent_inputs
            .iter()
            .map(|i| (i.seq, i.move_x, i.move_y, i.actions))
            .collect();

        let seq = self.outbound.next_outbound();
        let (ack, ack_bits) = self.inbound.outgoing_ack();
        let payload = protocol::encode_input_payload(&entries);
        let packet = protocol::encode(PacketType::Input, seq, ack, ack_bits, &payload);
        self.send_to(&packet).await.context("send INPUT")?;
        self.record_loss_sample();
        Ok(())
    }

    /// Sends one already-encoded packet to the server, subject to the
    /// configured `NetworkSimulator` if loss/latency injection is enabled.
    /// Mirrors `GameServer::send_to`: the simulator is applied symmetrically
    /// on each side's own outbound path.
    async fn send_to(&mut self, packet: &[u8]) -> anyhow::Result<()> {
        self.metrics.add_bytes_out(packet.len() as u64);
        if let Some(sim) = &self.netsim {
            sim.send_to(packet.to_vec(), self.server_addr);
            Ok(())
        } else {
            self.socket.send(packet).await?;
            Ok(())
        }
    }

    /// Drains every datagram currently available on the socket,
    /// non-blocking, applying snapshots and replying to pings.
    pub async fn drain_incoming(&mut self, dt: f32) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(n) => {
                    self.metrics.add_bytes_in(n as u64);
                    if let Err(e) = self.handle_datagram(&buf[..n], dt).await {
                        debug!(error = %e, "dropping malformed packet");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(())
    }

    async fn handle_datagram(&mut self, bytes: &[u8], dt: f32) -> Result<(), CodecError> {
        let (header, payload) = protocol::decode(bytes)?;
        self.inbound.on_receive(header.seq);
        self.outbound.acked_by_peer(header.ack, header.ack_bits);

        match header.kind {
            PacketType::Snapshot => {
                let snapshot = Snapshot::decode(&payload)?;
                self.on_snapshot(snapshot, dt);
            }
            PacketType::Pong => {
                if let Ok(ts) = protocol::decode_timestamp(&payload) {
                    self.on_pong(ts);
                }
            }
            PacketType::Disconnect => {
                info!("server closed the connection");
                self.state = ClientState::Disconnected;
            }
            PacketType::ReliableEvent => {
                self.on_reliable_event(&payload);
            }
            other => {
                debug!(?other, "unexpected packet type from server, ignoring");
            }
        }
        Ok(())
    }

    fn on_reliable_event(&mut self, payload: &[u8]) {
        match payload {
            [RELIABLE_EVENT_JOIN, id] => info!(client_id = *id, "player joined"),
            [RELIABLE_EVENT_LEAVE, id] => info!(client_id = *id, "player left"),
            _ => debug!(bytes = payload.len(), "reliable event with unrecognized payload"),
        }
    }

    /// Feeds this tick's inferred-lost outbound sequences into the loss
    /// metric. Must run periodically regardless of traffic, or the
    /// tracker's internal in-flight bookkeeping grows unboundedly.
    pub fn record_loss_sample(&mut self) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let lost = self.outbound.inferred_lost();
        if self.outbound.total_sent > 0 {
            self.metrics
                .record_loss(elapsed, lost.len() as u64, self.outbound.total_sent);
        }
    }

    fn on_snapshot(&mut self, snapshot: Snapshot, dt: f32) {
        if let Some(world) = &mut self.world {
            world.reconcile(&snapshot, dt);
        }
        self.remote.push(snapshot);
    }

    fn on_pong(&mut self, echoed_ts_millis: u64) {
        let now = self.started_at.elapsed().as_millis() as u64;
        let rtt_seconds = now.saturating_sub(echoed_ts_millis) as f64 / 1000.0;
        let elapsed = self.started_at.elapsed().as_secs_f64();
        self.metrics.record_rtt(elapsed, rtt_seconds);
        // Half the round trip approximates one-way transit for jitter
        // purposes; pings carry no server-side timestamp to do better.
        self.metrics.record_arrival_for_jitter(elapsed, rtt_seconds / 2.0);
    }

    pub async fn send_ping(&mut self) -> anyhow::Result<()> {
        let ts = self.started_at.elapsed().as_millis() as u64;
        let seq = self.outbound.next_outbound();
        let (ack, ack_bits) = self.inbound.outgoing_ack();
        let payload = protocol::encode_timestamp(ts);
        let packet = protocol::encode(PacketType::Ping, seq, ack, ack_bits, &payload);
        self.send_to(&packet).await.context("send PING")?;
        Ok(())
    }

    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        let seq = self.outbound.next_outbound();
        let (ack, ack_bits) = self.inbound.outgoing_ack();
        let payload = protocol::encode_disconnect();
        let packet = protocol::encode(PacketType::Disconnect, seq, ack, ack_bits, &payload);
        if let Err(e) = self.send_to(&packet).await {
            warn!(error = %e, "failed to send DISCONNECT");
        }
        self.state = ClientState::Disconnected;
        Ok(())
    }

    /// Interpolated render position for a remote entity (never this
    /// client's own predicted entity, which renders from `self.world`
    /// directly for zero added latency).
    pub fn render_position(&self, entity: EntityId) -> Option<Vec2> {
        self.remote.interpolate(entity)
    }
}
