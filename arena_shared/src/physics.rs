//! The shared deterministic physics step.
//!
//! Exactly one function, reused bit-for-bit by the server's authoritative
//! simulation and the client's predictor. For identical `(state, input, dt)` both sides must
//! produce bit-identical output — this rules out `f64`, fused-multiply-add,
//! or reordered summation anywhere in this function.

use crate::input::Input;
use crate::math::Vec2;
use crate::snapshot::EntityState;

/// Movement speed in world units/second. The exact value is unimportant;
/// what matters is that both sides compile in the same constant.
pub const SPEED: f32 = 200.0;

pub const WORLD_W: f32 = 800.0;
pub const WORLD_H: f32 = 600.0;

pub const DEFAULT_TICK_HZ: u32 = 20;

fn clamp_to_world(pos: Vec2) -> Vec2 {
    Vec2::new(pos.x.clamp(0.0, WORLD_W), pos.y.clamp(0.0, WORLD_H))
}

/// Advances one entity by one fixed timestep under the given input.
///
/// Steps:
/// 1. clamp + diagonal-normalize the wish vector,
/// 2. scale by `SPEED` to get velocity,
/// 3. integrate position by `dt`,
/// 4. clamp position to the world rectangle.
///
/// Health is untouched by movement; it only participates in serialization.
pub fn step(state: EntityState, input: Input, dt: f32) -> EntityState {
    let wish = input.wish_vector();
    let vel = Vec2::new(wish.x * SPEED, wish.y * SPEED);
    let pos = clamp_to_world(Vec2::new(
        state.pos.x + vel.x * dt,
        state.pos.y + vel.y * dt,
    ));

    EntityState {
        id: state.id,
        pos,
        vel,
        health: state.health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_at(x: f32, y: f32) -> EntityState {
        EntityState {
            id: 1,
            pos: Vec2::new(x, y),
            vel: Vec2::ZERO,
            health: 100.0,
        }
    }

    #[test]
    fn diagonal_normalization_matches_spec_example() {
        // (1,1) for one tick at SPEED=200, dt=0.05.
        let result = step(entity_at(0.0, 0.0), Input::new(0, 1.0, 1.0, 0), 0.05);
        let expected = 200.0 * 0.05 / std::f32::consts::SQRT_2;
        assert!((result.pos.x - expected).abs() < 1e-4);
        assert!((result.pos.y - expected).abs() < 1e-4);
    }

    #[test]
    fn boundary_clamp_matches_spec_example() {
        // Entity at (WORLD_W - 1, 0), move (1,0) -> clamps to WORLD_W exactly.
        let result = step(entity_at(WORLD_W - 1.0, 0.0), Input::new(0, 1.0, 0.0, 0), 0.05);
        assert_eq!(result.pos.x, WORLD_W);
    }

    #[test]
    fn clamp_applies_on_all_four_edges() {
        let result = step(entity_at(0.0, 0.0), Input::new(0, -1.0, -1.0, 0), 1.0);
        assert_eq!(result.pos.x, 0.0);
        assert_eq!(result.pos.y, 0.0);
    }

    #[test]
    fn determinism_identical_inputs_give_identical_states() {
        let a = step(entity_at(100.0, 100.0), Input::new(5, 0.3, -0.7, 0b101), 1.0 / 20.0);
        let b = step(entity_at(100.0, 100.0), Input::new(5, 0.3, -0.7, 0b101), 1.0 / 20.0);
        assert_eq!(a, b);
    }

    #[test]
    fn health_is_untouched_by_movement() {
        let mut start = entity_at(0.0, 0.0);
        start.health = 42.0;
        let result = step(start, Input::new(0, 1.0, 0.0, 0), 0.1);
        assert_eq!(result.health, 42.0);
    }
}
