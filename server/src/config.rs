//! Static room table, loaded once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read room config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse room config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid room config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: f64,
    pub max_players: usize,
    #[serde(default)]
    pub is_lobby: bool,
    /// Whether players may join a non-lobby room while its match is running.
    #[serde(default = "default_allow_hot_join")]
    pub allow_hot_join: bool,
}

fn default_allow_hot_join() -> bool {
    true
}

fn default_house_fee_rate() -> f64 {
    0.1
}

impl RoomConfig {
    pub fn arena(id: &str, price: f64, max_players: usize) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            price,
            max_players,
            is_lobby: false,
            allow_hot_join: true,
        }
    }

    pub fn lobby(id: &str, max_players: usize) -> Self {
        Self {
            id: id.to_string(),
            name: Some("Lobby".to_string()),
            price: 0.0,
            max_players,
            is_lobby: true,
            allow_hot_join: true,
        }
    }

    /// Winner's share of a full room's entry fees after the house cut.
    pub fn pot(&self, house_fee_rate: f64) -> f64 {
        self.price * self.max_players as f64 * (1.0 - house_fee_rate)
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} USDC", self.price),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaConfig {
    pub rooms: Vec<RoomConfig>,
    #[serde(default = "default_house_fee_rate")]
    pub house_fee_rate: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            rooms: vec![
                RoomConfig::lobby("0", 50),
                RoomConfig::arena("1", 1.0, 10),
                RoomConfig::arena("2", 5.0, 10),
                RoomConfig::arena("3", 10.0, 10),
            ],
            house_fee_rate: default_house_fee_rate(),
        }
    }
}

impl ArenaConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ArenaConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rooms.is_empty() {
            return Err(ConfigError::Invalid("no rooms configured".to_string()));
        }
        if !(0.0..1.0).contains(&self.house_fee_rate) {
            return Err(ConfigError::Invalid(format!(
                "house fee rate {} outside [0, 1)",
                self.house_fee_rate
            )));
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(room.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate room id {}", room.id)));
            }
            if room.max_players == 0 {
                return Err(ConfigError::Invalid(format!("room {} has no capacity", room.id)));
            }
            if !(room.price >= 0.0 && room.price.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "room {} has invalid price {}",
                    room.id, room.price
                )));
            }
        }

        if self.rooms.iter().filter(|r| r.is_lobby).count() > 1 {
            return Err(ConfigError::Invalid("more than one lobby".to_string()));
        }
        Ok(())
    }
}
