//! Connection session handling.
//!
//! This module owns everything that is per connection:
//! - Session bookkeeping (room membership, spectator flag, outbound channel)
//! - Join limiting per connection and per source address
//! - Action throttles for steering input, split and eject
//! - Translating room events into notifications for the affected sessions
//!
//! Rooms never see a socket. They receive a [`SessionId`] and the manager
//! resolves it back to an outbound channel when something has to be sent.

use crate::rate_limit::{ActionLimits, JoinLimiter};
use crate::registry::Registry;
use crate::room::RoomEvent;
use crate::stats::StatsReporter;
use log::{debug, error, info};
use shared::{ClientMessage, ErrorCode, JoinRoom, RoomSnapshot, ServerMessage, SessionId};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// Serialized frames queued for one connection's writer task.
pub type Outbound = mpsc::UnboundedSender<String>;

/// One connected client.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub addr: SocketAddr,
    /// Room whose broadcasts this session receives.
    pub room: Option<String>,
    /// Spectators watch a room without a player entity.
    pub spectator: bool,
    limits: ActionLimits,
    outbound: Outbound,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: Outbound) -> Self {
        Self {
            id,
            addr,
            room: None,
            spectator: false,
            limits: ActionLimits::default(),
            outbound,
        }
    }

    fn send_raw(&self, frame: String) {
        // A closed channel means the writer is gone; the disconnect event follows.
        let _ = self.outbound.send(frame);
    }

    fn playing_in(&self) -> Option<&str> {
        if self.spectator {
            None
        } else {
            self.room.as_deref()
        }
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match message.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to serialize {:?}: {}", message, e);
            None
        }
    }
}

/// Tracks every session and dispatches their intents into the registry.
#[derive(Default)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, Session>,
    join_limiter: JoinLimiter,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Registers a new connection and greets it with its session id.
    pub fn register(&mut self, id: SessionId, addr: SocketAddr, outbound: Outbound) {
        info!("Session {} connected from {}", id, addr);
        self.sessions.insert(id, Session::new(id, addr, outbound));
        self.send(id, &ServerMessage::Welcome { session_id: id });
    }

    pub fn send(&self, id: SessionId, message: &ServerMessage) {
        if let (Some(session), Some(frame)) = (self.sessions.get(&id), encode(message)) {
            session.send_raw(frame);
        }
    }

    fn send_error(&self, id: SessionId, code: ErrorCode) {
        debug!("Session {} rejected: {}", id, code);
        self.send(id, &ServerMessage::Error { code });
    }

    /// Sends `message` to every session attached to `room`, players and spectators alike.
    pub fn broadcast_room(&self, room: &str, message: &ServerMessage, exclude: Option<SessionId>) {
        let Some(frame) = encode(message) else {
            return;
        };
        for session in self.sessions.values() {
            if session.room.as_deref() == Some(room) && Some(session.id) != exclude {
                session.send_raw(frame.clone());
            }
        }
    }

    /// Serializes each snapshot once and fans it out to that room's sessions.
    pub fn broadcast_snapshots(&self, snapshots: Vec<(String, RoomSnapshot)>) {
        for (room, snapshot) in snapshots {
            if !self
                .sessions
                .values()
                .any(|s| s.room.as_deref() == Some(room.as_str()))
            {
                continue;
            }
            self.broadcast_room(&room, &ServerMessage::GameState(snapshot), None);
        }
    }

    /// Applies one validated intent from `id`.
    pub fn handle(
        &mut self,
        registry: &mut Registry,
        id: SessionId,
        message: ClientMessage,
        now: Instant,
    ) {
        match message {
            ClientMessage::JoinRoom(join) => self.handle_join(registry, id, join, now),
            ClientMessage::Input { x, y } => {
                let Some(room_id) = self.admit_action(id, now, |l| &mut l.input) else {
                    return;
                };
                if !x.is_finite() || !y.is_finite() {
                    debug!("Session {} sent non-finite input", id);
                    return;
                }
                if let Ok(room) = registry.room_mut(&room_id) {
                    room.set_target(id, x, y);
                }
            }
            ClientMessage::Split => {
                if let Some(room_id) = self.admit_action(id, now, |l| &mut l.split) {
                    if let Ok(room) = registry.room_mut(&room_id) {
                        room.split(id);
                    }
                }
            }
            ClientMessage::Eject => {
                if let Some(room_id) = self.admit_action(id, now, |l| &mut l.eject) {
                    if let Ok(room) = registry.room_mut(&room_id) {
                        room.eject(id);
                    }
                }
            }
            ClientMessage::ListRooms => {
                self.send(id, &ServerMessage::RoomList(registry.summaries()));
            }
        }
    }

    /// Throttles an action and returns the room it applies to.
    /// Spectators and sessions outside a room get `None`.
    fn admit_action<F>(&mut self, id: SessionId, now: Instant, throttle: F) -> Option<String>
    where
        F: FnOnce(&mut ActionLimits) -> &mut crate::rate_limit::ActionThrottle,
    {
        let session = self.sessions.get_mut(&id)?;
        if !throttle(&mut session.limits).try_acquire(now) {
            self.send_error(id, ErrorCode::ActionRateLimited);
            return None;
        }
        session.playing_in().map(str::to_string)
    }

    fn handle_join(&mut self, registry: &mut Registry, id: SessionId, join: JoinRoom, now: Instant) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if !session.limits.join.try_acquire(now) {
            self.send_error(id, ErrorCode::JoinRateLimited);
            return;
        }
        let ip = session.addr.ip();
        if !self.join_limiter.try_join(ip, now) {
            self.send_error(id, ErrorCode::IpJoinRateLimited);
            return;
        }
        let Some(target) = registry.room(&join.room_id) else {
            self.send_error(id, ErrorCode::RoomNotFound);
            return;
        };

        // Repeating the current join only refreshes the view
        let seated = join.spectator || target.player(id).is_some();
        let unchanged = self.sessions.get(&id).is_some_and(|s| {
            s.room.as_deref() == Some(join.room_id.as_str()) && s.spectator == join.spectator
        });
        if seated && unchanged {
            debug!("Session {} repeated its join of room {}", id, join.room_id);
            self.send(id, &ServerMessage::GameState(target.snapshot()));
            return;
        }

        self.leave_room(registry, id);

        let room = match registry.room_mut(&join.room_id) {
            Ok(room) => room,
            Err(e) => {
                self.send_error(id, e.code());
                return;
            }
        };

        if join.spectator {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.room = Some(join.room_id.clone());
                session.spectator = true;
            }
            info!("Session {} spectating room {}", id, join.room_id);
            self.send(
                id,
                &ServerMessage::SpectatorJoined {
                    room_id: join.room_id.clone(),
                },
            );
            self.send(id, &ServerMessage::GameState(room.snapshot()));
            return;
        }

        match room.add_player(id, &join.player_data) {
            Ok(view) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.room = Some(join.room_id.clone());
                    session.spectator = false;
                }
                self.send(id, &ServerMessage::GameState(room.snapshot()));
                self.broadcast_room(&join.room_id, &ServerMessage::PlayerJoined(view), Some(id));
            }
            Err(e) => self.send_error(id, e.code()),
        }
    }

    /// Detaches `id` from its current room, removing its player if it had one.
    fn leave_room(&mut self, registry: &mut Registry, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let spectator = std::mem::take(&mut session.spectator);
        let Some(room_id) = session.room.take() else {
            return;
        };
        if spectator {
            return;
        }

        let removed = registry
            .room_mut(&room_id)
            .map(|room| room.remove_player(id).is_some())
            .unwrap_or(false);
        if removed {
            self.broadcast_room(&room_id, &ServerMessage::PlayerLeft { id }, Some(id));
        }
    }

    /// Detaches every player session from a room that lost its players to a reset.
    /// Each detached session hears `player-left` for itself and may join again.
    pub fn release_room(&mut self, room: &str) {
        let released: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.playing_in() == Some(room))
            .map(|s| s.id)
            .collect();

        for &id in &released {
            self.broadcast_room(room, &ServerMessage::PlayerLeft { id }, None);
        }
        for id in released {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.room = None;
            }
        }
    }

    /// Removes a closed connection and its player.
    pub fn disconnect(&mut self, registry: &mut Registry, id: SessionId) {
        self.leave_room(registry, id);
        if let Some(session) = self.sessions.remove(&id) {
            info!("Session {} disconnected ({})", id, session.addr);
        }
    }

    /// Delivers drained room events to the sessions they concern.
    pub fn flush_events(&self, events: Vec<(String, RoomEvent)>, stats: &StatsReporter) {
        for (_room, event) in events {
            match event {
                RoomEvent::Eliminated {
                    victim,
                    killer,
                    is_lobby,
                } => self.send(
                    victim,
                    &ServerMessage::GameOver {
                        winner: killer,
                        is_lobby,
                    },
                ),
                RoomEvent::Victory { winner, pot } => {
                    self.send(winner, &ServerMessage::Victory { pot })
                }
                RoomEvent::Stats(delta) => stats.report(delta),
            }
        }
    }
}
