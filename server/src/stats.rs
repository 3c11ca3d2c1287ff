//! Boundary to the external player-stats store.
//!
//! Rooms never talk to the store directly. They emit [`StatsDelta`]s, the
//! event loop hands them to a [`StatsReporter`], and a background task
//! applies them through a [`StatsSink`]. Failures are logged and dropped,
//! so a slow or broken store can never hold up a tick.

use log::{error, info};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDelta {
    pub wallet_address: String,
    pub wins: u32,
    pub losses: u32,
    pub earnings: f64,
}

impl StatsDelta {
    pub fn loss(wallet_address: &str) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            wins: 0,
            losses: 1,
            earnings: 0.0,
        }
    }

    pub fn win(wallet_address: &str, earnings: f64) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            wins: 1,
            losses: 0,
            earnings,
        }
    }

    /// Checks the delta is something a store could apply.
    pub fn validate(&self) -> Result<(), StatsError> {
        let reason = if self.wallet_address.trim().is_empty() {
            "blank wallet address"
        } else if !(self.earnings.is_finite() && self.earnings >= 0.0) {
            "earnings must be a non-negative amount"
        } else {
            return Ok(());
        };
        Err(StatsError::Rejected {
            wallet: self.wallet_address.clone(),
            reason: reason.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats store unavailable: {0}")]
    Unavailable(String),
    #[error("stats store rejected update for {wallet}: {reason}")]
    Rejected { wallet: String, reason: String },
}

pub trait StatsSink: Send + Sync + 'static {
    fn apply(&self, delta: &StatsDelta) -> Result<(), StatsError>;
}

/// Default sink: records each delta in the log.
pub struct LogStatsSink;

impl StatsSink for LogStatsSink {
    fn apply(&self, delta: &StatsDelta) -> Result<(), StatsError> {
        delta.validate()?;
        info!(
            "Stats update for {}: +{} wins, +{} losses, +{:.2} earnings",
            delta.wallet_address, delta.wins, delta.losses, delta.earnings
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct StatsReporter {
    tx: mpsc::UnboundedSender<StatsDelta>,
}

impl StatsReporter {
    /// Spawns the background applier task. Must be called inside a tokio runtime.
    pub fn spawn<S: StatsSink>(sink: S) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatsDelta>();
        tokio::spawn(async move {
            while let Some(delta) = rx.recv().await {
                if let Err(e) = sink.apply(&delta) {
                    error!("Failed to update stats: {}", e);
                }
            }
        });
        Self { tx }
    }

    /// Reporter over an existing channel, for callers that consume deltas themselves.
    pub fn new(tx: mpsc::UnboundedSender<StatsDelta>) -> Self {
        Self { tx }
    }

    pub fn report(&self, delta: StatsDelta) {
        if self.tx.send(delta).is_err() {
            error!("Stats applier is gone, dropping update");
        }
    }
}
