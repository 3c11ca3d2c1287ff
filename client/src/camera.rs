//! Camera that follows the local player and zooms out as it grows

use shared::{PlayerView, Vector2, MAP_HEIGHT, MAP_WIDTH};

const POSITION_SMOOTHING: f64 = 0.15;
const ZOOM_SMOOTHING: f64 = 0.05;
const MIN_SCALE: f64 = 0.05;
/// Scale at which a fragment of `REFERENCE_RADIUS` is shown.
const REFERENCE_SCALE: f64 = 0.8;
const REFERENCE_RADIUS: f64 = 20.0;

/// Zoom level the camera eases toward for a player whose largest fragment has `max_radius`.
pub fn target_scale(max_radius: f64) -> Option<f64> {
    if max_radius <= 0.0 || !max_radius.is_finite() {
        return None;
    }
    Some((REFERENCE_SCALE / (max_radius / REFERENCE_RADIUS)).max(MIN_SCALE))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World point shown at the centre of the screen.
    pub position: Vector2,
    pub scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector2::new(MAP_WIDTH / 2.0, MAP_HEIGHT / 2.0),
            scale: 1.0,
        }
    }
}

impl Camera {
    /// Eases toward the player's centroid and the zoom its size calls for.
    /// A player without fragments leaves the camera where it is.
    pub fn follow(&mut self, player: &PlayerView) {
        let Some(centroid) = player.centroid() else {
            return;
        };
        self.position = self.position.lerp(&centroid, POSITION_SMOOTHING);
        if let Some(target) = target_scale(player.max_radius()) {
            self.scale += (target - self.scale) * ZOOM_SMOOTHING;
        }
    }

    pub fn world_to_screen(&self, world: Vector2, screen: (f64, f64)) -> (f64, f64) {
        (
            (world.x - self.position.x) * self.scale + screen.0 / 2.0,
            (world.y - self.position.y) * self.scale + screen.1 / 2.0,
        )
    }

    pub fn screen_to_world(&self, point: (f64, f64), screen: (f64, f64)) -> Vector2 {
        Vector2::new(
            (point.0 - screen.0 / 2.0) / self.scale + self.position.x,
            (point.1 - screen.1 / 2.0) / self.scale + self.position.y,
        )
    }
}
