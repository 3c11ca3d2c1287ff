//! Wire schema between sessions and the room engine.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`. The
//! set of events is closed: anything that does not parse into one of these
//! variants is dropped at the session boundary.

use crate::geometry::Vector2;
use crate::{MAP_HEIGHT, MAP_WIDTH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle for one connection. The engine stores these, never sockets.
pub type SessionId = u64;

/// Intents sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(JoinRoom),
    Input { x: f64, y: f64 },
    Split,
    Eject,
    ListRooms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
    #[serde(default)]
    pub player_data: PlayerData,
    #[serde(default)]
    pub spectator: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

/// Notifications sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Welcome { session_id: SessionId },
    GameState(RoomSnapshot),
    PlayerJoined(PlayerView),
    PlayerLeft { id: SessionId },
    GameOver { winner: Option<String>, is_lobby: bool },
    Victory { pot: f64 },
    Error { code: ErrorCode },
    SpectatorJoined { room_id: String },
    RoomList(Vec<RoomSummary>),
}

impl ClientMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Starting,
    Active,
    Ended,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoomStatus::Waiting => "WAITING",
            RoomStatus::Starting => "STARTING",
            RoomStatus::Active => "ACTIVE",
            RoomStatus::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// Rejection reasons reported back to the originating session.
/// The wire name of each code is whatever [`ErrorCode::as_str`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ErrorCode {
    JoinRateLimited,
    IpJoinRateLimited,
    RoomNotFound,
    RoomFull,
    MatchInProgress,
    MatchEnded,
    ActionRateLimited,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 7] = [
        ErrorCode::JoinRateLimited,
        ErrorCode::IpJoinRateLimited,
        ErrorCode::RoomNotFound,
        ErrorCode::RoomFull,
        ErrorCode::MatchInProgress,
        ErrorCode::MatchEnded,
        ErrorCode::ActionRateLimited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::JoinRateLimited => "JOIN_RATE_LIMITED",
            ErrorCode::IpJoinRateLimited => "IP_JOIN_RATE_LIMITED",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::RoomFull => "ROOM_FULL",
            ErrorCode::MatchInProgress => "MATCH_IN_PROGRESS",
            ErrorCode::MatchEnded => "MATCH_ENDED",
            ErrorCode::ActionRateLimited => "ACTION_RATE_LIMITED",
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == name)
            .ok_or_else(|| format!("unknown error code {}", name))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public state of one room at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub players: BTreeMap<SessionId, PlayerView>,
    pub food: BTreeMap<u64, FoodView>,
    pub viruses: BTreeMap<u64, VirusView>,
    pub ejected_mass: BTreeMap<u64, EjectedMassView>,
    pub map_width: f64,
    pub map_height: f64,
    pub status: RoomStatus,
    pub countdown: u32,
    pub winner_name: Option<String>,
}

impl Default for RoomSnapshot {
    fn default() -> Self {
        Self {
            players: BTreeMap::new(),
            food: BTreeMap::new(),
            viruses: BTreeMap::new(),
            ejected_mass: BTreeMap::new(),
            map_width: MAP_WIDTH,
            map_height: MAP_HEIGHT,
            status: RoomStatus::Waiting,
            countdown: 0,
            winner_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: SessionId,
    pub name: String,
    pub color: String,
    pub fragments: Vec<FragmentView>,
    pub total_mass: f64,
}

impl PlayerView {
    /// Unweighted mean of the fragment centres, `None` while the player has no fragments.
    pub fn centroid(&self) -> Option<Vector2> {
        if self.fragments.is_empty() {
            return None;
        }
        let n = self.fragments.len() as f64;
        let (sx, sy) = self
            .fragments
            .iter()
            .fold((0.0, 0.0), |(sx, sy), f| (sx + f.x, sy + f.y));
        Some(Vector2::new(sx / n, sy / n))
    }

    pub fn max_radius(&self) -> f64 {
        self.fragments.iter().map(|f| f.radius).fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirusView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EjectedMassView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub color: String,
}

/// Room listing entry: static configuration plus live occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub max_players: usize,
    pub is_lobby: bool,
    pub players: usize,
    pub status: RoomStatus,
}
