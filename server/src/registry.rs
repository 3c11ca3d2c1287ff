//! Owns every room and fans out the per-tick work.

use crate::config::ArenaConfig;
use crate::room::{JoinError, Room, RoomEvent};
use log::error;
use shared::{RoomSnapshot, RoomSummary};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs `step` on one room. A panic is logged and the room is reset.
/// Returns false if the step faulted.
fn run_isolated<F: FnOnce(&mut Room)>(id: &str, room: &mut Room, step: F) -> bool {
    if catch_unwind(AssertUnwindSafe(|| step(room))).is_ok() {
        return true;
    }
    error!("Room {} faulted, resetting", id);
    room.reset();
    false
}

/// Fixed set of rooms, created once from the static configuration.
pub struct Registry {
    rooms: BTreeMap<String, Room>,
    /// Configuration order, used for listings.
    order: Vec<String>,
    /// Rooms reset after a fault since the last `drain_faults`.
    faulted: Vec<String>,
}

impl Registry {
    pub fn from_config(config: &ArenaConfig) -> Self {
        let rooms = config
            .rooms
            .iter()
            .map(|room| (room.id.clone(), Room::new(room.clone(), config.house_fee_rate)))
            .collect();
        Self::from_rooms(rooms, config.rooms.iter().map(|r| r.id.clone()).collect())
    }

    /// Registry over prebuilt rooms, listed in the given order.
    pub fn from_rooms(rooms: BTreeMap<String, Room>, order: Vec<String>) -> Self {
        Self {
            rooms,
            order,
            faulted: Vec::new(),
        }
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn room_mut(&mut self, id: &str) -> Result<&mut Room, JoinError> {
        self.rooms.get_mut(id).ok_or(JoinError::RoomNotFound)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Advances every room one tick and returns each room's snapshot.
    ///
    /// A room that panics mid-tick is logged and reset; the others carry on.
    pub fn tick(&mut self) -> Vec<(String, RoomSnapshot)> {
        self.step_rooms(Room::tick);
        self.rooms
            .iter()
            .map(|(id, room)| (id.clone(), room.snapshot()))
            .collect()
    }

    pub fn on_second(&mut self) {
        self.step_rooms(Room::on_second);
    }

    fn step_rooms<F: Fn(&mut Room)>(&mut self, step: F) {
        for (id, room) in self.rooms.iter_mut() {
            if !run_isolated(id, room, &step) {
                self.faulted.push(id.clone());
            }
        }
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.order
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .map(Room::summary)
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<(String, RoomEvent)> {
        let mut events = Vec::new();
        for (id, room) in self.rooms.iter_mut() {
            events.extend(room.drain_events().into_iter().map(|e| (id.clone(), e)));
        }
        events
    }

    /// Rooms that faulted and were reset. Their former players no longer exist.
    pub fn drain_faults(&mut self) -> Vec<String> {
        std::mem::take(&mut self.faulted)
    }

    pub fn player_count(&self) -> usize {
        self.rooms.values().map(Room::player_count).sum()
    }
}
