use crate::{MAP_HEIGHT, MAP_WIDTH};

/// A vector in map space. Origin is the top-left corner, +x right, +y down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `angle` radians.
    pub fn from_angle(angle: f64) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn scale(&self, scalar: f64) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn distance(&self, other: &Vector2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Unit vector from `self` towards `target`.
    ///
    /// Points that (nearly) coincide have no direction; `(1, 0)` is returned so
    /// launches and pushes always go somewhere.
    pub fn unit_toward(&self, target: &Vector2) -> Vector2 {
        let dx = target.x - self.x;
        let dy = target.y - self.y;
        let dist = dx.hypot(dy);
        if dist < 0.0001 {
            Vector2 { x: 1.0, y: 0.0 }
        } else {
            Vector2 {
                x: dx / dist,
                y: dy / dist,
            }
        }
    }

    /// Clamps the point into `[0, MAP_WIDTH] x [0, MAP_HEIGHT]`.
    pub fn clamp_to_map(&self) -> Vector2 {
        Vector2 {
            x: self.x.clamp(0.0, MAP_WIDTH),
            y: self.y.clamp(0.0, MAP_HEIGHT),
        }
    }

    pub fn in_map(&self) -> bool {
        (0.0..=MAP_WIDTH).contains(&self.x) && (0.0..=MAP_HEIGHT).contains(&self.y)
    }

    /// Linear blend; exact at both `t = 0` and `t = 1`.
    pub fn lerp(&self, other: &Vector2, t: f64) -> Vector2 {
        Vector2 {
            x: self.x * (1.0 - t) + other.x * t,
            y: self.y * (1.0 - t) + other.y * t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_unit_toward_is_normalized() {
        let from = Vector2::new(10.0, 10.0);
        let dir = from.unit_toward(&Vector2::new(13.0, 14.0));
        assert_approx_eq!(dir.x, 0.6, 1e-9);
        assert_approx_eq!(dir.y, 0.8, 1e-9);
        assert_approx_eq!(dir.magnitude(), 1.0, 1e-9);
    }

    #[test]
    fn test_unit_toward_degenerate_points_right() {
        let p = Vector2::new(42.0, 42.0);
        assert_eq!(p.unit_toward(&p), Vector2::new(1.0, 0.0));
    }

    #[test]
    fn test_clamp_to_map() {
        let p = Vector2::new(MAP_WIDTH + 1000.0, -3.0).clamp_to_map();
        assert_eq!(p, Vector2::new(MAP_WIDTH, 0.0));
        assert!(p.in_map());
        assert!(!Vector2::new(-0.1, 5.0).in_map());
    }

    #[test]
    fn test_distance_and_lerp() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(30.0, 40.0);
        assert_approx_eq!(a.distance(&b), 50.0, 1e-9);
        assert_eq!(a.lerp(&b, 0.5), Vector2::new(15.0, 20.0));
        assert_eq!(a.lerp(&b, 1.0), b);
    }

    #[test]
    fn test_from_angle() {
        let v = Vector2::from_angle(std::f64::consts::FRAC_PI_2).scale(10.0);
        assert_approx_eq!(v.x, 0.0, 1e-9);
        assert_approx_eq!(v.y, 10.0, 1e-9);
    }
}
