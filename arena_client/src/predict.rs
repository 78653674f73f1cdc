//! Client-side prediction and server reconciliation.
//!
//! The client applies its own input locally the instant it is sampled
//! (prediction) instead of waiting for a round trip, then corrects itself
//! against the server's authoritative snapshot by rewinding to the
//! server's state and replaying every input the server hasn't acked yet
//! (reconciliation). Both sides run the identical
//! [`arena_shared::physics::step`], so a clean replay reproduces whatever
//! the server will eventually agree on.

use std::collections::VecDeque;

use arena_shared::input::Input;
use arena_shared::seq::newer32;
use arena_shared::snapshot::{EntityId, EntityState, Snapshot};

/// Bounds the input-history ring buffer; a client that goes this many
/// ticks without an ack from the server has bigger problems than memory.
pub const HISTORY_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct RecordedInput {
    input: Input,
    predicted_after: EntityState,
}

/// Tracks one client's own predicted entity and the unacknowledged inputs
/// that produced its current predicted state.
pub struct ClientWorld {
    pub client_id: EntityId,
    pub predicted: EntityState,
    history: VecDeque<RecordedInput>,
    last_reconciled_tick: Option<u32>,
}

impl ClientWorld {
    pub fn new(client_id: EntityId, spawn: EntityState) -> Self {
        Self {
            client_id,
            predicted: spawn,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            last_reconciled_tick: None,
        }
    }

    /// Applies `input` to the current predicted state and records it so a
    /// later reconciliation can replay it if needed.
    pub fn predict(&mut self, input: Input, dt: f32) {
        self.predicted = arena_shared::physics::step(self.predicted, input, dt);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(RecordedInput {
            input,
            predicted_after: self.predicted,
        });
    }

    /// Reconciles the predicted state against an incoming snapshot:
    /// rewinds to the server's authoritative state for this client's
    /// entity, drops every acked input, and replays the rest.
    ///
    /// No-op if the snapshot doesn't mention this client at all (not yet
    /// spawned server-side, or the entity has since been removed), or if
    /// the snapshot is not newer than the last one actually reconciled
    /// against — UDP can reorder datagrams, and rolling the predicted
    /// entity backward onto a stale snapshot would replay the wrong input
    /// set and produce a visible regression.
    pub fn reconcile(&mut self, snapshot: &Snapshot, dt: f32) {
        if let Some(last) = self.last_reconciled_tick {
            if !newer32(snapshot.tick, last) {
                return;
            }
        }

        let Some(authoritative) = snapshot.entity(self.client_id) else {
            return;
        };
        let Some(trailer) = snapshot.trailer_for(self.client_id) else {
            return;
        };
        let ack_seq = trailer.last_processed_input_seq;

        self.history.retain(|r| newer32(r.input.seq, ack_seq));

        self.predicted = *authoritative;
        for recorded in self.history.iter_mut() {
            self.predicted = arena_shared::physics::step(self.predicted, recorded.input, dt);
            recorded.predicted_after = self.predicted;
        }

        self.last_reconciled_tick = Some(snapshot.tick);
    }

    pub fn pending_input_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::math::Vec2;
    use arena_shared::snapshot::AckTrailerEntry;

    fn spawn_at(id: EntityId, x: f32, y: f32) -> EntityState {
        EntityState {
            id,
            pos: Vec2::new(x, y),
            vel: Vec2::ZERO,
            health: 100.0,
        }
    }

    #[test]
    fn misprediction_is_corrected_then_pending_inputs_replay() {
        let mut world = ClientWorld::new(1, spawn_at(1, 0.0, 0.0));
        let dt = 1.0 / 20.0;

        // Client predicts ticks 0..=9 moving right.
        for seq in 0..10u32 {
            world.predict(Input::new(seq, 1.0, 0.0, 0), dt);
        }
        let predicted_before = world.predicted;

        // Server says it only processed through seq 7, and landed the
        // entity somewhere slightly different (e.g. it started the
        // replay one tick later than the client assumed).
        let server_state = spawn_at(1, predicted_before.pos.x - 1.0, 0.0);
        let snapshot = Snapshot {
            tick: 8,
            entities: vec![server_state],
            trailer: vec![AckTrailerEntry {
                client_id: 1,
                last_processed_input_seq: 7,
            }],
        };

        world.reconcile(&snapshot, dt);

        // Inputs 8 and 9 are replayed on top of the corrected state.
        assert_eq!(world.pending_input_count(), 2);
        assert_ne!(world.predicted.pos.x, predicted_before.pos.x);
        assert!(world.predicted.pos.x > server_state.pos.x);
    }

    #[test]
    fn fully_acked_history_leaves_nothing_to_replay() {
        let mut world = ClientWorld::new(1, spawn_at(1, 0.0, 0.0));
        let dt = 1.0 / 20.0;
        for seq in 0..5u32 {
            world.predict(Input::new(seq, 1.0, 0.0, 0), dt);
        }
        let authoritative = world.predicted;
        let snapshot = Snapshot {
            tick: 5,
            entities: vec![authoritative],
            trailer: vec![AckTrailerEntry {
                client_id: 1,
                last_processed_input_seq: 4,
            }],
        };
        world.reconcile(&snapshot, dt);
        assert_eq!(world.pending_input_count(), 0);
        assert_eq!(world.predicted, authoritative);
    }

    #[test]
    fn stale_reordered_snapshot_is_ignored() {
        let mut world = ClientWorld::new(1, spawn_at(1, 0.0, 0.0));
        let dt = 1.0 / 20.0;
        for seq in 0..10u32 {
            world.predict(Input::new(seq, 1.0, 0.0, 0), dt);
        }

        let newer = Snapshot {
            tick: 8,
            entities: vec![spawn_at(1, 3.0, 0.0)],
            trailer: vec![AckTrailerEntry {
                client_id: 1,
                last_processed_input_seq: 7,
            }],
        };
        world.reconcile(&newer, dt);
        let after_newer = world.predicted;

        // A tick-5 snapshot arrives after the tick-8 one (reordered in
        // flight). It must not roll the predicted state backward.
        let stale = Snapshot {
            tick: 5,
            entities: vec![spawn_at(1, 0.0, 0.0)],
            trailer: vec![AckTrailerEntry {
                client_id: 1,
                last_processed_input_seq: 4,
            }],
        };
        world.reconcile(&stale, dt);
        assert_eq!(world.predicted, after_newer);
    }

    #[test]
    fn snapshot_missing_own_entity_is_ignored() {
        let mut world = ClientWorld::new(1, spawn_at(1, 5.0, 5.0));
        world.predict(Input::new(0, 1.0, 0.0, 0), 1.0 / 20.0);
        let before = world.predicted;
        let snapshot = Snapshot {
            tick: 1,
            entities: vec![],
            trailer: vec![],
        };
        world.reconcile(&snapshot, 1.0 / 20.0);
        assert_eq!(world.predicted, before);
    }
}
