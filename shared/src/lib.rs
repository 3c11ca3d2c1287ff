//! Definitions shared by the authoritative server and the client mirror.
//!
//! Both sides compile against the same gameplay constants and the same wire
//! schema, so a snapshot produced by the room engine is exactly what the
//! client interpolates.

pub mod geometry;
pub mod protocol;

pub use geometry::Vector2;
pub use protocol::{
    ClientMessage, EjectedMassView, ErrorCode, FoodView, FragmentView, JoinRoom, PlayerData,
    PlayerView, RoomSnapshot, RoomStatus, RoomSummary, ServerMessage, SessionId, VirusView,
};

pub const MAP_WIDTH: f64 = 3000.0;
pub const MAP_HEIGHT: f64 = 3000.0;

/// Global simulation rate. Every per-tick constant below assumes this rate.
pub const TICK_RATE: u32 = 30;
pub const TICK_INTERVAL_MS: u64 = 1000 / TICK_RATE as u64;

pub const FRAGMENT_BASE_RADIUS: f64 = 12.0;
pub const FRAGMENT_RADIUS_PER_SQRT_MASS: f64 = 4.0;
pub const SPAWN_MASS: f64 = 10.0;
pub const SPAWN_INSET: f64 = 50.0;
pub const MAX_FRAGMENTS: usize = 16;

// Steering
pub const SPEED_COEFFICIENT: f64 = 12.0;
pub const SPEED_EXPONENT: f64 = -0.439;
pub const MIN_SPEED: f64 = 0.5;
pub const STEER_EPSILON: f64 = 1.0;
pub const LAUNCH_DECAY: f64 = 0.85;

// Own-fragment interaction
pub const MERGE_COOLDOWN_TICKS: u64 = 30 * TICK_RATE as u64;
pub const MERGE_OVERLAP_RATIO: f64 = 0.5;
pub const SEPARATION_FACTOR: f64 = 0.1;

pub const FOOD_COUNT: usize = 100;
pub const FOOD_RADIUS: f64 = 8.0;
pub const FOOD_MASS: f64 = 1.0;

pub const VIRUS_COUNT: usize = 10;
pub const VIRUS_RADIUS: f64 = 60.0;
pub const VIRUS_MASS: f64 = 100.0;
pub const VIRUS_POP_RATIO: f64 = 1.2;
pub const EXPLODE_PIECES: usize = 8;
pub const EXPLODE_SPEED: f64 = 10.0;

pub const EAT_RATIO: f64 = 1.15;

pub const DECAY_MIN_MASS: f64 = 20.0;
pub const DECAY_RATE: f64 = 0.0001;

pub const SPLIT_MIN_MASS: f64 = 20.0;
pub const SPLIT_SPEED: f64 = 25.0;

pub const EJECT_MIN_MASS: f64 = 25.0;
pub const EJECT_COST: f64 = 15.0;
pub const EJECTED_MASS: f64 = 10.0;
pub const EJECTED_RADIUS: f64 = 10.0;
pub const EJECT_SPAWN_GAP: f64 = 10.0;
pub const EJECT_SPEED: f64 = 20.0;
pub const EJECTED_FRICTION: f64 = 0.9;
pub const EJECTED_SETTLE_SPEED: f64 = 1.0;

// Room lifecycle, in seconds unless noted
pub const COUNTDOWN_SECONDS: u32 = 10;
pub const END_RESET_SECONDS: u32 = 10;
pub const LOBBY_RESPAWN_TICKS: u64 = 2 * TICK_RATE as u64;
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Minimum gap the server enforces between steering intents from one session.
pub const INPUT_THROTTLE_MS: u64 = 33;

pub const MAX_NAME_CHARS: usize = 20;
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Radius of a fragment with the given mass. Radius is always derived, never stored
/// independently of mass.
pub fn radius_for_mass(mass: f64) -> f64 {
    FRAGMENT_BASE_RADIUS + mass.max(0.0).sqrt() * FRAGMENT_RADIUS_PER_SQRT_MASS
}

/// Steering distance per tick for a fragment of the given mass.
pub fn speed_for_mass(mass: f64) -> f64 {
    (SPEED_COEFFICIENT * mass.powf(SPEED_EXPONENT)).max(MIN_SPEED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_radius_formula() {
        assert_approx_eq!(radius_for_mass(0.0), 12.0, 1e-9);
        assert_approx_eq!(radius_for_mass(100.0), 52.0, 1e-9);
        assert_approx_eq!(radius_for_mass(SPAWN_MASS), 12.0 + 10f64.sqrt() * 4.0, 1e-9);
    }

    #[test]
    fn test_radius_never_uses_negative_mass() {
        assert_approx_eq!(radius_for_mass(-5.0), FRAGMENT_BASE_RADIUS, 1e-9);
    }

    #[test]
    fn test_speed_decreases_with_mass() {
        let small = speed_for_mass(10.0);
        let large = speed_for_mass(1000.0);
        assert!(small > large);
        assert_approx_eq!(small, 12.0 * 10f64.powf(-0.439), 1e-9);
    }

    #[test]
    fn test_speed_has_floor() {
        assert_eq!(speed_for_mass(1.0e9), MIN_SPEED);
    }

    #[test]
    fn test_merge_cooldown_is_thirty_seconds_of_ticks() {
        assert_eq!(MERGE_COOLDOWN_TICKS, 900);
        assert_eq!(LOBBY_RESPAWN_TICKS, 60);
    }
}
