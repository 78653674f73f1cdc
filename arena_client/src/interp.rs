//! Remote-entity interpolation.
//!
//! The client never renders another entity's latest-known snapshot
//! directly — that would visibly snap every time a new snapshot arrives.
//! Instead it buffers recent snapshots and renders a render tick that
//! trails the newest received tick by [`INTERP_DELAY`], lerping between
//! the two snapshots that bracket it. If only one snapshot brackets the
//! render tick the entity holds at that snapshot's value. An entity that
//! drops out of the newer of a bracketing pair is treated as having
//! disappeared at that point rather than being held in place forever.

use std::collections::VecDeque;

use arena_shared::math::Vec2;
use arena_shared::snapshot::{EntityId, Snapshot};

/// Ticks the render clock trails behind the newest received snapshot.
pub const INTERP_DELAY: u32 = 2;

/// Bounds how many snapshots are retained; must exceed `INTERP_DELAY` by
/// enough margin to tolerate a burst of jitter.
pub const SNAPSHOT_BUFFER_CAPACITY: usize = 16;

#[derive(Default)]
pub struct SnapshotBuffer {
    history: VecDeque<Snapshot>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(SNAPSHOT_BUFFER_CAPACITY),
        }
    }

    /// Inserts a snapshot in tick order, dropping anything older than the
    /// buffer's capacity. Snapshots arriving out of order (a UDP packet
    /// overtaken by a newer one) are inserted in place rather than
    /// appended, since the buffer is read by tick order, not arrival order.
    pub fn push(&mut self, snap: Snapshot) {
        let pos = self
            .history
            .iter()
            .position(|s| s.tick > snap.tick)
            .unwrap_or(self.history.len());
        if pos < self.history.len() && self.history[pos].tick == snap.tick {
            return;
        }
        if pos > 0 && self.history[pos - 1].tick == snap.tick {
            return;
        }
        self.history.insert(pos, snap);
        while self.history.len() > SNAPSHOT_BUFFER_CAPACITY {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn latest_tick(&self) -> Option<u32> {
        self.history.back().map(|s| s.tick)
    }

    /// The tick the renderer should draw, trailing the newest snapshot by
    /// `INTERP_DELAY`. `None` until at least one snapshot has arrived.
    pub fn render_tick(&self) -> Option<u32> {
        self.latest_tick().map(|t| t.saturating_sub(INTERP_DELAY))
    }

    /// Interpolated position for `entity` at the current render tick.
    ///
    /// Returns `None` if there isn't enough history yet, or if the entity
    /// is absent from the snapshot on the newer side of the bracketing
    /// pair (interpreted as the entity having disappeared).
    pub fn interpolate(&self, entity: EntityId) -> Option<Vec2> {
        let render_tick = self.render_tick()?;
        let (a, b) = self.bracket(render_tick)?;

        if a.tick == b.tick {
            return a.entity(entity).map(|e| e.pos);
        }

        let newer_has_entity = b.entity(entity).is_some();
        if !newer_has_entity {
            return None;
        }
        let pa = a.entity(entity).map(|e| e.pos);
        let pb = b.entity(entity).map(|e| e.pos);
        match (pa, pb) {
            (Some(pa), Some(pb)) => {
                let alpha = (render_tick - a.tick) as f32 / (b.tick - a.tick) as f32;
                Some(pa.lerp(pb, alpha.clamp(0.0, 1.0)))
            }
            // The entity just appeared between the two snapshots: hold at
            // its first known position rather than lerping from nothing.
            (None, Some(pb)) => Some(pb),
            _ => None,
        }
    }

    /// Finds the pair of consecutive buffered snapshots whose ticks
    /// straddle `render_tick`. Falls back to holding the newest known
    /// snapshot if `render_tick` is outside the buffered range.
    fn bracket(&self, render_tick: u32) -> Option<(&Snapshot, &Snapshot)> {
        if self.history.len() == 1 {
            let only = self.history.front().unwrap();
            return Some((only, only));
        }
        for i in 0..self.history.len().saturating_sub(1) {
            let a = &self.history[i];
            let b = &self.history[i + 1];
            if a.tick <= render_tick && render_tick <= b.tick {
                return Some((a, b));
            }
        }
        self.history.back().map(|s| (s, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::snapshot::EntityState;

    fn snap(tick: u32, entities: Vec<EntityState>) -> Snapshot {
        Snapshot {
            tick,
            entities,
            trailer: vec![],
        }
    }

    fn ent(id: EntityId, x: f32) -> EntityState {
        EntityState {
            id,
            pos: Vec2::new(x, 0.0),
            vel: Vec2::ZERO,
            health: 100.0,
        }
    }

    #[test]
    fn render_tick_trails_latest_by_interp_delay() {
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(10, vec![]));
        assert_eq!(buf.render_tick(), Some(8));
    }

    #[test]
    fn interpolates_between_bracketing_snapshots() {
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(0, vec![ent(1, 0.0)]));
        buf.push(snap(1, vec![ent(1, 10.0)]));
        buf.push(snap(2, vec![ent(1, 20.0)]));
        // latest tick 2, render_tick = 0, brackets (tick0, tick0) -> exact.
        assert_eq!(buf.interpolate(1), Some(Vec2::new(0.0, 0.0)));
    }

    #[test]
    fn midpoint_interpolation() {
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(0, vec![ent(1, 0.0)]));
        buf.push(snap(2, vec![ent(1, 20.0)]));
        buf.push(snap(4, vec![ent(1, 40.0)]));
        // latest 4, render_tick = 2 -> exact snapshot at tick 2.
        assert_eq!(buf.interpolate(1), Some(Vec2::new(20.0, 0.0)));
    }

    #[test]
    fn entity_absent_from_newer_snapshot_reads_as_disappeared() {
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(0, vec![ent(1, 0.0)]));
        buf.push(snap(1, vec![])); // entity 1 gone
        buf.push(snap(2, vec![]));
        assert_eq!(buf.interpolate(1), None);
    }

    #[test]
    fn single_snapshot_holds_its_value() {
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(5, vec![ent(1, 7.0)]));
        assert_eq!(buf.interpolate(1), Some(Vec2::new(7.0, 0.0)));
    }
}
