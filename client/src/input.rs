//! Client input management: pointer steering at a capped rate plus split/eject keys

use macroquad::prelude::*;
use shared::{ClientMessage, PlayerView, Vector2, INPUT_THROTTLE_MS};
use std::time::{Duration, Instant};

/// Headroom over the server's input throttle so delivery jitter never trips it.
pub const INPUT_MARGIN_MS: u64 = 7;

/// Minimum gap between steering intents.
pub const INPUT_INTERVAL: Duration = Duration::from_millis(INPUT_THROTTLE_MS + INPUT_MARGIN_MS);

/// One frame's raw input, sampled from the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub pointer: (f64, f64),
    pub screen: (f64, f64),
    pub split: bool,
    pub eject: bool,
}

impl FrameInput {
    pub fn sample() -> Self {
        let (x, y) = mouse_position();
        Self {
            pointer: (x as f64, y as f64),
            screen: (screen_width() as f64, screen_height() as f64),
            split: is_key_pressed(KeyCode::Space),
            eject: is_key_pressed(KeyCode::W),
        }
    }
}

/// World point the pointer designates, measured from the player's centroid.
pub fn aim(centroid: Vector2, frame: &FrameInput, scale: f64) -> Vector2 {
    let scale = if scale > 0.0 { scale } else { 1.0 };
    Vector2::new(
        centroid.x + (frame.pointer.0 - frame.screen.0 / 2.0) / scale,
        centroid.y + (frame.pointer.1 - frame.screen.1 / 2.0) / scale,
    )
}

/// Turns sampled frames into intents for the server
pub struct InputManager {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::with_interval(INPUT_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Returns the intents to send for this frame.
    /// Steering needs a living local player and is rate capped; split and eject are edge triggered.
    pub fn update(
        &mut self,
        frame: &FrameInput,
        player: Option<&PlayerView>,
        scale: f64,
        now: Instant,
    ) -> Vec<ClientMessage> {
        let mut intents = Vec::new();

        if let Some(centroid) = player.and_then(PlayerView::centroid) {
            let due = self
                .last_sent
                .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
            if due {
                let target = aim(centroid, frame, scale);
                intents.push(ClientMessage::Input {
                    x: target.x,
                    y: target.y,
                });
                self.last_sent = Some(now);
            }
        }

        if frame.split {
            intents.push(ClientMessage::Split);
        }
        if frame.eject {
            intents.push(ClientMessage::Eject);
        }
        intents
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
