//! Client lifecycle: id allocation, per-client ack state, and
//! the pending-input queue the tick loop drains each tick.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Instant;

use arena_shared::ack::AckTracker;
use arena_shared::input::Input;
use arena_shared::reliable::ReliableEventChannel;
use arena_shared::seq::newer32;
use arena_shared::snapshot::EntityId;

/// Bounds how many un-acked reliable events a single connection retains
/// for retransmission before the oldest is dropped.
const RELIABLE_IN_FLIGHT: usize = 32;

/// Server-side per-client state.
pub struct ClientRecord {
    pub id: u8,
    pub addr: SocketAddr,
    pub last_heard_at: Instant,

    /// Tracks packets received *from* this client — drives the
    /// (ack, ack_bits) we embed in packets we send back.
    pub inbound: AckTracker,
    /// Tracks packets sent *to* this client — drives our own outbound
    /// `seq` and interprets the (ack, ack_bits) this client echoes back.
    pub outbound: AckTracker,

    pub highest_seen_input_seq: Option<u32>,
    pub highest_applied_input_seq: Option<u32>,
    pub pending_inputs: BTreeMap<u32, Input>,

    /// Reliable events sent to this client, retained until acked or
    /// reported lost by `outbound`.
    pub reliable: ReliableEventChannel,

    pub entity: EntityId,
    pub pending_removal: bool,
}

impl ClientRecord {
    fn new(id: u8, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_heard_at: now,
            inbound: AckTracker::new(),
            outbound: AckTracker::new(),
            highest_seen_input_seq: None,
            highest_applied_input_seq: None,
            pending_inputs: BTreeMap::new(),
            reliable: ReliableEventChannel::new(RELIABLE_IN_FLIGHT),
            entity: id,
            pending_removal: false,
        }
    }

    /// Enqueues an input if its seq is strictly newer than anything seen
    /// from this client so far; older
    /// duplicates from the redundant array are discarded.
    pub fn enqueue_input(&mut self, input: Input) {
        let is_new = match self.highest_seen_input_seq {
            None => true,
            Some(hi) => newer32(input.seq, hi),
        };
        if is_new {
            self.highest_seen_input_seq = Some(input.seq);
        }
        if !self.pending_inputs.contains_key(&input.seq) {
            let already_applied = self
                .highest_applied_input_seq
                .is_some_and(|applied| !newer32(input.seq, applied));
            if !already_applied {
                self.pending_inputs.insert(input.seq, input);
            }
        }
    }

    /// Selects the newest queued input and discards everything else.
    pub fn take_latest_input(&mut self) -> Option<Input> {
        let latest_seq = *self.pending_inputs.keys().next_back()?;
        let latest = self.pending_inputs.remove(&latest_seq).unwrap();
        self.pending_inputs.clear();
        self.highest_applied_input_seq = Some(latest_seq);
        Some(latest)
    }
}

/// Allocates ids, tracks connected clients, and expires silent ones.
#[derive(Default)]
pub struct ClientManager {
    clients: HashMap<u8, ClientRecord>,
    addr_to_id: HashMap<SocketAddr, u8>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u8> {
        self.addr_to_id.get(&addr).copied()
    }

    pub fn get(&self, id: u8) -> Option<&ClientRecord> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut ClientRecord> {
        self.clients.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientRecord> {
        self.clients.values_mut()
    }

    /// Allocates the lowest free id in `1..=255`. Returns `None` when the
    /// server is full.
    pub fn connect(&mut self, addr: SocketAddr, now: Instant) -> Option<u8> {
        if self.clients.len() >= 255 {
            return None;
        }
        let id = (1u8..=255).find(|id| !self.clients.contains_key(id))?;
        self.clients.insert(id, ClientRecord::new(id, addr, now));
        self.addr_to_id.insert(addr, id);
        Some(id)
    }

    pub fn disconnect(&mut self, id: u8) {
        if let Some(record) = self.clients.remove(&id) {
            self.addr_to_id.remove(&record.addr);
        }
    }

    /// Removes every client whose `last_heard_at` has aged past `timeout`,
    /// or that was marked for removal by a DISCONNECT this tick.
    pub fn expire_stale(&mut self, now: Instant, timeout: std::time::Duration) -> Vec<u8> {
        let to_remove: Vec<u8> = self
            .clients
            .values()
            .filter(|c| c.pending_removal || now.duration_since(c.last_heard_at) > timeout)
            .map(|c| c.id)
            .collect();
        for id in &to_remove {
            self.disconnect(*id);
        }
        to_remove
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn connect_allocates_lowest_free_id() {
        let mut mgr = ClientManager::new();
        let now = Instant::now();
        assert_eq!(mgr.connect(addr(1), now), Some(1));
        assert_eq!(mgr.connect(addr(2), now), Some(2));
        mgr.disconnect(1);
        assert_eq!(mgr.connect(addr(3), now), Some(1));
    }

    #[test]
    fn capacity_exhausted_returns_none() {
        let mut mgr = ClientManager::new();
        let now = Instant::now();
        for p in 0..255u16 {
            assert!(mgr.connect(addr(p), now).is_some());
        }
        assert_eq!(mgr.connect(addr(9999), now), None);
    }

    #[test]
    fn latest_seq_wins_older_discarded() {
        let mut mgr = ClientManager::new();
        let now = Instant::now();
        let id = mgr.connect(addr(1), now).unwrap();
        let client = mgr.get_mut(id).unwrap();
        client.enqueue_input(Input::new(3, 0.0, 0.0, 0));
        client.enqueue_input(Input::new(1, 0.5, 0.5, 0));
        client.enqueue_input(Input::new(5, 1.0, 0.0, 0));
        let applied = client.take_latest_input().unwrap();
        assert_eq!(applied.seq, 5);
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn inputs_at_or_below_applied_seq_are_discarded() {
        let mut mgr = ClientManager::new();
        let now = Instant::now();
        let id = mgr.connect(addr(1), now).unwrap();
        let client = mgr.get_mut(id).unwrap();
        client.enqueue_input(Input::new(7, 0.0, 0.0, 0));
        client.take_latest_input();
        client.enqueue_input(Input::new(7, 1.0, 1.0, 0));
        client.enqueue_input(Input::new(3, 1.0, 1.0, 0));
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn expire_stale_removes_silent_clients() {
        let mut mgr = ClientManager::new();
        let now = Instant::now();
        let old = now - std::time::Duration::from_secs(10);
        let mut mgr2 = ClientManager::new();
        mgr2.connect(addr(1), old);
        let removed = mgr2.expire_stale(now, std::time::Duration::from_secs(5));
        assert_eq!(removed, vec![1]);
        assert!(mgr2.is_empty());
        let _ = &mut mgr;
    }
}
