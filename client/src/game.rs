use crate::camera::Camera;
use crate::mirror::SnapshotMirror;
use log::{debug, info, warn};
use shared::{
    ClientMessage, ErrorCode, JoinRoom, PlayerData, PlayerView, RoomSnapshot, RoomSummary,
    ServerMessage, SessionId,
};
use std::time::Instant;

/// Last elimination notice, kept for the HUD.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOver {
    pub winner: Option<String>,
    pub is_lobby: bool,
}

/// Client view of one session: identity, mirrored room state and HUD notices.
#[derive(Debug)]
pub struct GameClient {
    pub session_id: Option<SessionId>,
    pub room_id: String,
    pub spectator: bool,
    player_data: PlayerData,
    pub mirror: SnapshotMirror,
    pub camera: Camera,
    pub last_error: Option<ErrorCode>,
    pub game_over: Option<GameOver>,
    pub victory: Option<f64>,
    pub rooms: Vec<RoomSummary>,
}

impl GameClient {
    pub fn new(room_id: String, player_data: PlayerData, spectator: bool) -> Self {
        Self {
            session_id: None,
            room_id,
            spectator,
            player_data,
            mirror: SnapshotMirror::default(),
            camera: Camera::default(),
            last_error: None,
            game_over: None,
            victory: None,
            rooms: Vec::new(),
        }
    }

    pub fn join_message(&self) -> ClientMessage {
        ClientMessage::JoinRoom(JoinRoom {
            room_id: self.room_id.clone(),
            player_data: self.player_data.clone(),
            spectator: self.spectator,
        })
    }

    /// Applies one notification. Returns an intent to send in reply, if any.
    pub fn apply(&mut self, message: ServerMessage, now: Instant) -> Option<ClientMessage> {
        match message {
            ServerMessage::Welcome { session_id } => {
                info!("Connected as session {}", session_id);
                self.session_id = Some(session_id);
                return Some(self.join_message());
            }
            ServerMessage::GameState(snapshot) => {
                self.clear_respawned_notice(&snapshot);
                self.mirror.push(snapshot, now);
            }
            ServerMessage::PlayerJoined(player) => {
                debug!("{} joined the room", player.name);
            }
            ServerMessage::PlayerLeft { id } => {
                if Some(id) == self.session_id && !self.spectator {
                    // Our seat was dropped by the server; take a new one
                    warn!("Removed from room {}, rejoining", self.room_id);
                    return Some(self.join_message());
                }
                debug!("Player {} left the room", id);
            }
            ServerMessage::GameOver { winner, is_lobby } => {
                info!("Eliminated by {}", winner.as_deref().unwrap_or("unknown"));
                self.game_over = Some(GameOver { winner, is_lobby });
            }
            ServerMessage::Victory { pot } => {
                info!("Victory! Pot: {:.2}", pot);
                self.victory = Some(pot);
            }
            ServerMessage::Error { code } => {
                warn!("Server rejected request: {}", code);
                self.last_error = Some(code);
            }
            ServerMessage::SpectatorJoined { room_id } => {
                info!("Spectating room {}", room_id);
                self.spectator = true;
                self.room_id = room_id;
            }
            ServerMessage::RoomList(rooms) => {
                self.rooms = rooms;
            }
        }
        None
    }

    /// Lobby eliminations are temporary; drop the notice once we are back.
    fn clear_respawned_notice(&mut self, snapshot: &RoomSnapshot) {
        let back = self
            .local_player(snapshot)
            .is_some_and(|p| !p.fragments.is_empty());
        if back && self.game_over.as_ref().is_some_and(|g| g.is_lobby) {
            self.game_over = None;
        }
    }

    pub fn local_player<'a>(&self, snapshot: &'a RoomSnapshot) -> Option<&'a PlayerView> {
        self.session_id.and_then(|id| snapshot.players.get(&id))
    }

    /// Interpolated state for this frame, with the camera advanced to follow it.
    pub fn frame(&mut self, now: Instant) -> Option<RoomSnapshot> {
        let view = self.mirror.view(now)?;
        if let Some(player) = self.local_player(&view) {
            self.camera.follow(player);
        }
        Some(view)
    }
}
