//! Snapshot buffering and interpolation.
//!
//! The server sends one full snapshot per tick. Rendering runs at whatever rate
//! the display allows, so between arrivals the mirror blends fragment positions
//! from the previous snapshot toward the newest one. Everything except position
//! is taken straight from the newest snapshot.

use shared::{RoomSnapshot, Vector2, TICK_INTERVAL_MS};
use std::time::{Duration, Instant};

/// Interpolation factor for a snapshot that arrived `elapsed` ago.
pub fn interpolation_factor(elapsed: Duration, tick_interval: Duration) -> f64 {
    if tick_interval.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / tick_interval.as_secs_f64()).clamp(0.0, 1.0)
}

/// Blends fragment positions from `previous` toward `newest` by `t`.
///
/// Fragments are matched by index within each player. A player or fragment
/// missing from `previous` is shown at its newest position.
pub fn interpolate(previous: &RoomSnapshot, newest: &RoomSnapshot, t: f64) -> RoomSnapshot {
    let mut view = newest.clone();
    for (id, player) in view.players.iter_mut() {
        let Some(before) = previous.players.get(id) else {
            continue;
        };
        for (fragment, old) in player.fragments.iter_mut().zip(before.fragments.iter()) {
            let from = Vector2::new(old.x, old.y);
            let to = Vector2::new(fragment.x, fragment.y);
            let blended = from.lerp(&to, t);
            fragment.x = blended.x;
            fragment.y = blended.y;
        }
    }
    view
}

/// Holds the last two snapshots received from the room.
#[derive(Debug)]
pub struct SnapshotMirror {
    previous: Option<RoomSnapshot>,
    newest: Option<RoomSnapshot>,
    received_at: Option<Instant>,
    tick_interval: Duration,
    /// Arrival gap between the two buffered snapshots.
    last_gap: Option<Duration>,
}

impl Default for SnapshotMirror {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICK_INTERVAL_MS))
    }
}

impl SnapshotMirror {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            previous: None,
            newest: None,
            received_at: None,
            tick_interval,
            last_gap: None,
        }
    }

    pub fn push(&mut self, snapshot: RoomSnapshot, now: Instant) {
        if let Some(at) = self.received_at {
            self.last_gap = Some(now.saturating_duration_since(at));
        }
        self.previous = self.newest.replace(snapshot);
        self.received_at = Some(now);
    }

    pub fn newest(&self) -> Option<&RoomSnapshot> {
        self.newest.as_ref()
    }

    pub fn factor(&self, now: Instant) -> f64 {
        match self.received_at {
            Some(at) => interpolation_factor(now.saturating_duration_since(at), self.tick_interval),
            None => 1.0,
        }
    }

    /// The state to render at `now`, or `None` before the first snapshot.
    pub fn view(&self, now: Instant) -> Option<RoomSnapshot> {
        let newest = self.newest.as_ref()?;
        match &self.previous {
            Some(previous) => Some(interpolate(previous, newest, self.factor(now))),
            None => Some(newest.clone()),
        }
    }

    /// How far the last arrival gap strayed from the server tick interval.
    pub fn jitter(&self) -> Option<Duration> {
        self.last_gap.map(|gap| {
            if gap > self.tick_interval {
                gap - self.tick_interval
            } else {
                self.tick_interval - gap
            }
        })
    }

    pub fn clear(&mut self) {
        self.previous = None;
        self.newest = None;
        self.received_at = None;
        self.last_gap = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{FragmentView, PlayerView, RoomStatus};

    fn snapshot(fragments: &[(f64, f64)], mass: f64) -> RoomSnapshot {
        let mut snapshot = RoomSnapshot::default();
        snapshot.players.insert(
            1,
            PlayerView {
                id: 1,
                name: "Ann".to_string(),
                color: "hsl(0, 100%, 50%)".to_string(),
                fragments: fragments
                    .iter()
                    .enumerate()
                    .map(|(i, &(x, y))| FragmentView {
                        id: i as u64,
                        x,
                        y,
                        radius: shared::radius_for_mass(mass),
                        mass,
                    })
                    .collect(),
                total_mass: mass * fragments.len() as f64,
            },
        );
        snapshot
    }

    #[test]
    fn test_factor_is_clamped() {
        let tick = Duration::from_millis(40);
        assert_eq!(interpolation_factor(Duration::ZERO, tick), 0.0);
        assert_approx_eq!(interpolation_factor(Duration::from_millis(10), tick), 0.25, 1e-9);
        assert_eq!(interpolation_factor(Duration::from_millis(90), tick), 1.0);
        assert_eq!(interpolation_factor(Duration::from_millis(5), Duration::ZERO), 1.0);
    }

    #[test]
    fn test_positions_blend_other_fields_do_not() {
        let before = snapshot(&[(0.0, 0.0)], 10.0);
        let mut after = snapshot(&[(100.0, 50.0)], 12.0);
        after.status = RoomStatus::Active;
        after.countdown = 3;

        let view = interpolate(&before, &after, 0.5);
        let fragment = &view.players[&1].fragments[0];
        assert_approx_eq!(fragment.x, 50.0, 1e-9);
        assert_approx_eq!(fragment.y, 25.0, 1e-9);
        assert_eq!(fragment.mass, 12.0);
        assert_eq!(view.players[&1].total_mass, 12.0);
        assert_eq!(view.status, RoomStatus::Active);
        assert_eq!(view.countdown, 3);
    }

    #[test]
    fn test_new_fragment_index_is_not_blended() {
        let before = snapshot(&[(0.0, 0.0)], 10.0);
        let after = snapshot(&[(10.0, 10.0), (300.0, 400.0)], 10.0);

        let view = interpolate(&before, &after, 0.5);
        let fragments = &view.players[&1].fragments;
        assert_approx_eq!(fragments[0].x, 5.0, 1e-9);
        assert_eq!((fragments[1].x, fragments[1].y), (300.0, 400.0));
    }

    #[test]
    fn test_new_player_is_not_blended() {
        let before = RoomSnapshot::default();
        let after = snapshot(&[(70.0, 80.0)], 10.0);
        let view = interpolate(&before, &after, 0.0);
        assert_eq!(view, after);
    }

    #[test]
    fn test_full_factor_reproduces_newest() {
        let before = snapshot(&[(0.1, 0.7), (1234.567, 89.01)], 10.0);
        let after = snapshot(&[(2999.3, 0.3), (17.77, 1500.5)], 10.0);
        assert_eq!(interpolate(&before, &after, 1.0), after);
    }

    #[test]
    fn test_mirror_buffers_two_snapshots() {
        let start = Instant::now();
        let mut mirror = SnapshotMirror::new(Duration::from_millis(40));
        assert!(mirror.view(start).is_none());

        mirror.push(snapshot(&[(0.0, 0.0)], 10.0), start);
        assert_eq!(mirror.view(start).unwrap().players[&1].fragments[0].x, 0.0);
        assert!(mirror.jitter().is_none());

        let second = start + Duration::from_millis(50);
        mirror.push(snapshot(&[(40.0, 0.0)], 10.0), second);
        let halfway = mirror.view(second + Duration::from_millis(20)).unwrap();
        assert_approx_eq!(halfway.players[&1].fragments[0].x, 20.0, 1e-9);
        let settled = mirror.view(second + Duration::from_millis(100)).unwrap();
        assert_eq!(settled.players[&1].fragments[0].x, 40.0);

        assert_eq!(mirror.jitter(), Some(Duration::from_millis(10)));
        mirror.clear();
        assert!(mirror.newest().is_none());
    }
}
