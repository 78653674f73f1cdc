//! Snapshot model: entity state on the wire, the authoritative world
//! snapshot, and the per-client ack trailer appended by the server so each
//! client can find its own `last_processed_input_seq`.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::CodecError;
use crate::math::Vec2;

/// Entity ids are 1..=255; 0 is reserved (never assigned, used as a
/// sentinel in slot tables).
pub type EntityId = u8;

/// 21 bytes on the wire: id(1) posX(4) posY(4) velX(4) velY(4) health(4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub id: EntityId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub health: f32,
}

pub const ENTITY_STATE_LEN: usize = 1 + 4 + 4 + 4 + 4 + 4;

impl EntityState {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.id);
        buf.put_f32(self.pos.x);
        buf.put_f32(self.pos.y);
        buf.put_f32(self.vel.x);
        buf.put_f32(self.vel.y);
        buf.put_f32(self.health);
    }

    pub fn decode(payload: &mut &[u8]) -> Result<Self, CodecError> {
        if payload.len() < ENTITY_STATE_LEN {
            return Err(CodecError::TruncatedPayload);
        }
        let id = payload.get_u8();
        let pos = Vec2::new(payload.get_f32(), payload.get_f32());
        let vel = Vec2::new(payload.get_f32(), payload.get_f32());
        let health = payload.get_f32();
        Ok(Self { id, pos, vel, health })
    }
}

/// Per-client entry in the snapshot's trailer: lets a client locate its own
/// acknowledged input sequence without scanning the entity list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckTrailerEntry {
    pub client_id: u8,
    pub last_processed_input_seq: u32,
}

pub const TRAILER_ENTRY_LEN: usize = 1 + 4;

/// The authoritative world state at a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tick: u32,
    pub entities: Vec<EntityState>,
    pub trailer: Vec<AckTrailerEntry>,
}

impl Snapshot {
    /// Encodes the SNAPSHOT payload: tick(4) count(1) entities[count] then
    /// the trailer count(1) and trailer entries. The trailer's length is
    /// implied by the outer packet's `payload_len`, not self-described —
    /// so callers must know where the entity list ends, which is exactly
    /// `entityCount`.
    pub fn encode(&self) -> BytesMut {
        assert!(self.entities.len() <= 255, "entityCount must fit in u8");
        assert!(self.trailer.len() <= 255, "trailer count must fit in u8");

        let mut buf = BytesMut::with_capacity(
            4 + 1
                + self.entities.len() * ENTITY_STATE_LEN
                + 1
                + self.trailer.len() * TRAILER_ENTRY_LEN,
        );
        buf.put_u32(self.tick);
        buf.put_u8(self.entities.len() as u8);
        for e in &self.entities {
            e.encode(&mut buf);
        }
        buf.put_u8(self.trailer.len() as u8);
        for t in &self.trailer {
            buf.put_u8(t.client_id);
            buf.put_u32(t.last_processed_input_seq);
        }
        buf
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < 5 {
            return Err(CodecError::TruncatedPayload);
        }
        let tick = payload.get_u32();
        let entity_count = payload.get_u8() as usize;

        let mut entities = Vec::with_capacity(entity_count);
        for _ in 0..entity_count {
            entities.push(EntityState::decode(&mut payload)?);
        }

        if payload.is_empty() {
            return Err(CodecError::TruncatedPayload);
        }
        let trailer_count = payload.get_u8() as usize;
        let mut trailer = Vec::with_capacity(trailer_count);
        for _ in 0..trailer_count {
            if payload.len() < TRAILER_ENTRY_LEN {
                return Err(CodecError::TruncatedPayload);
            }
            let client_id = payload.get_u8();
            let last_processed_input_seq = payload.get_u32();
            trailer.push(AckTrailerEntry {
                client_id,
                last_processed_input_seq,
            });
        }

        Ok(Self {
            tick,
            entities,
            trailer,
        })
    }

    /// Finds the trailer entry for one client, used during reconciliation.
    pub fn trailer_for(&self, client_id: u8) -> Option<&AckTrailerEntry> {
        self.trailer.iter().find(|t| t.client_id == client_id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.id == id)
    }
}

/// Server-side authoritative world: a flat slot table keyed by entity id
/// rather than a pointer graph so entities can appear/disappear
/// between snapshots without invalidating references.
#[derive(Debug, Clone)]
pub struct WorldState {
    pub tick: u32,
    slots: [Option<EntityState>; 256],
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            slots: [None; 256],
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityState> {
        self.slots[id as usize].as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        self.slots[id as usize].as_mut()
    }

    pub fn insert(&mut self, state: EntityState) {
        self.slots[state.id as usize] = Some(state);
    }

    pub fn remove(&mut self, id: EntityId) {
        self.slots[id as usize] = None;
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Builds a snapshot of the whole world plus the given trailer.
    pub fn to_snapshot(&self, trailer: Vec<AckTrailerEntry>) -> Snapshot {
        Snapshot {
            tick: self.tick,
            entities: self.iter().copied().collect(),
            trailer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trip_single_entity() {
        let snap = Snapshot {
            tick: 42,
            entities: vec![EntityState {
                id: 1,
                pos: Vec2::new(10.0, 20.0),
                vel: Vec2::new(0.0, 0.0),
                health: 100.0,
            }],
            trailer: vec![AckTrailerEntry {
                client_id: 1,
                last_processed_input_seq: 7,
            }],
        };
        let bytes = snap.encode();
        let decoded = Snapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn snapshot_empty_round_trip() {
        let snap = Snapshot {
            tick: 0,
            entities: vec![],
            trailer: vec![],
        };
        let decoded = Snapshot::decode(&snap.encode()).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn world_state_slot_table_roundtrip() {
        let mut world = WorldState::new();
        world.tick = 5;
        world.insert(EntityState {
            id: 3,
            pos: Vec2::new(1.0, 2.0),
            vel: Vec2::ZERO,
            health: 50.0,
        });
        assert_eq!(world.get(3).unwrap().pos, Vec2::new(1.0, 2.0));
        world.remove(3);
        assert!(world.get(3).is_none());
    }
}
