//! Join limiters and per-action throttles.
//!
//! Everything here compares wall-clock deltas against a caller-supplied
//! `now`, so there are no timers to cancel and tests can drive time directly.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

pub const JOIN_INTERVAL: Duration = Duration::from_millis(100);
pub const IP_JOIN_INTERVAL: Duration = Duration::from_millis(100);
pub const INPUT_INTERVAL: Duration = Duration::from_millis(shared::INPUT_THROTTLE_MS);
pub const SPLIT_INTERVAL: Duration = Duration::from_millis(250);
pub const EJECT_INTERVAL: Duration = Duration::from_millis(150);

/// Entries older than this are evicted once the table grows past `sweep_threshold`.
pub const IP_ENTRY_TTL: Duration = Duration::from_secs(30);
pub const IP_SWEEP_THRESHOLD: usize = 10_000;

/// Minimum-interval gate for one kind of action.
#[derive(Debug, Clone)]
pub struct ActionThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ActionThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and records `now` if the interval has passed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Per-connection throttles, one per intent kind.
#[derive(Debug, Clone)]
pub struct ActionLimits {
    pub join: ActionThrottle,
    pub input: ActionThrottle,
    pub split: ActionThrottle,
    pub eject: ActionThrottle,
}

impl Default for ActionLimits {
    fn default() -> Self {
        Self {
            join: ActionThrottle::new(JOIN_INTERVAL),
            input: ActionThrottle::new(INPUT_INTERVAL),
            split: ActionThrottle::new(SPLIT_INTERVAL),
            eject: ActionThrottle::new(EJECT_INTERVAL),
        }
    }
}

/// Last join attempt per source address, shared by every connection.
#[derive(Debug)]
pub struct JoinLimiter {
    interval: Duration,
    ttl: Duration,
    sweep_threshold: usize,
    attempts: HashMap<IpAddr, Instant>,
}

impl Default for JoinLimiter {
    fn default() -> Self {
        Self::new(IP_JOIN_INTERVAL, IP_ENTRY_TTL, IP_SWEEP_THRESHOLD)
    }
}

impl JoinLimiter {
    pub fn new(interval: Duration, ttl: Duration, sweep_threshold: usize) -> Self {
        Self {
            interval,
            ttl,
            sweep_threshold,
            attempts: HashMap::new(),
        }
    }

    /// Records a join attempt from `ip`. Returns false if it came too soon after the last one.
    pub fn try_join(&mut self, ip: IpAddr, now: Instant) -> bool {
        if let Some(previous) = self.attempts.get(&ip) {
            if now.saturating_duration_since(*previous) < self.interval {
                return false;
            }
        }
        self.attempts.insert(ip, now);

        if self.attempts.len() > self.sweep_threshold {
            let ttl = self.ttl;
            self.attempts
                .retain(|_, at| now.saturating_duration_since(*at) <= ttl);
        }
        true
    }

    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}
