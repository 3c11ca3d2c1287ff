//! Room simulation engine.
//!
//! A [`Room`] owns every entity of one arena and advances them one tick at a
//! time. Sessions talk to it only through [`SessionId`]s, and everything the
//! outside world needs to hear about (eliminations, victories, stats) is queued
//! as a [`RoomEvent`] and drained by the caller after the tick.
//!
//! Lifecycle: `WAITING -> STARTING -> ACTIVE -> ENDED -> WAITING`. The lobby is
//! pinned to `ACTIVE` and respawns eliminated players instead of removing them.
//! Physics only runs while `ACTIVE`; the countdown and the end-of-match delay
//! are driven separately by [`Room::on_second`].

use crate::config::RoomConfig;
use crate::entity::{random_color, sanitize_name, EjectedMass, Food, Fragment, Player, Virus};
use crate::stats::StatsDelta;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    speed_for_mass, ErrorCode, PlayerData, PlayerView, RoomSnapshot, RoomStatus, RoomSummary,
    SessionId, Vector2, COUNTDOWN_SECONDS, EAT_RATIO, DECAY_MIN_MASS, DECAY_RATE, EJECTED_FRICTION,
    EJECTED_MASS, EJECT_COST, EJECT_MIN_MASS, EJECT_SPAWN_GAP, EJECT_SPEED, END_RESET_SECONDS,
    EXPLODE_PIECES, EXPLODE_SPEED, FOOD_COUNT, FOOD_MASS, LAUNCH_DECAY, LOBBY_RESPAWN_TICKS,
    MAP_HEIGHT, MAP_WIDTH, MAX_FRAGMENTS, MERGE_COOLDOWN_TICKS, MERGE_OVERLAP_RATIO,
    MIN_PLAYERS_TO_START, SEPARATION_FACTOR, SPAWN_INSET, SPAWN_MASS, SPLIT_MIN_MASS, SPLIT_SPEED,
    STEER_EPSILON, VIRUS_COUNT, VIRUS_MASS, VIRUS_POP_RATIO, VIRUS_RADIUS,
};
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room not found")]
    RoomNotFound,
    #[error("room is full")]
    RoomFull,
    #[error("match already in progress")]
    MatchInProgress,
    #[error("match has ended")]
    MatchEnded,
}

impl JoinError {
    pub fn code(&self) -> ErrorCode {
        match self {
            JoinError::RoomNotFound => ErrorCode::RoomNotFound,
            JoinError::RoomFull => ErrorCode::RoomFull,
            JoinError::MatchInProgress => ErrorCode::MatchInProgress,
            JoinError::MatchEnded => ErrorCode::MatchEnded,
        }
    }
}

/// Outcomes the session layer turns into notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Eliminated {
        victim: SessionId,
        killer: Option<String>,
        is_lobby: bool,
    },
    Victory {
        winner: SessionId,
        pot: f64,
    },
    Stats(StatsDelta),
}

pub struct Room {
    config: RoomConfig,
    pot: f64,
    status: RoomStatus,
    /// Seconds left before a STARTING room goes ACTIVE.
    countdown: u32,
    /// Seconds left before an ENDED room resets.
    end_delay: u32,
    winner_name: Option<String>,
    pub players: BTreeMap<SessionId, Player>,
    pub food: BTreeMap<u64, Food>,
    pub viruses: BTreeMap<u64, Virus>,
    pub ejected: BTreeMap<u64, EjectedMass>,
    next_entity_id: u64,
    /// Simulated time in ticks. Only advances while ACTIVE.
    clock: u64,
    rng: StdRng,
    events: Vec<RoomEvent>,
}

fn alloc_id(next: &mut u64) -> u64 {
    let id = *next;
    *next += 1;
    id
}

fn map_centre() -> Vector2 {
    Vector2::new(MAP_WIDTH / 2.0, MAP_HEIGHT / 2.0)
}

/// Launch decay, steering and bounds for one fragment.
fn steer(fragment: &mut Fragment, target: &Vector2) {
    fragment.position = fragment.position.add(&fragment.velocity).clamp_to_map();
    fragment.velocity = fragment.velocity.scale(LAUNCH_DECAY);

    if fragment.position.distance(target) > STEER_EPSILON {
        let dir = fragment.position.unit_toward(target);
        fragment.position = fragment
            .position
            .add(&dir.scale(speed_for_mass(fragment.mass)));
    }
    fragment.position = fragment.position.clamp_to_map();
}

impl Room {
    pub fn new(config: RoomConfig, house_fee_rate: f64) -> Self {
        Self::with_rng(config, house_fee_rate, StdRng::from_entropy())
    }

    /// Room with a caller-provided generator, so placement is reproducible.
    pub fn with_rng(config: RoomConfig, house_fee_rate: f64, rng: StdRng) -> Self {
        let pot = config.pot(house_fee_rate);
        let status = if config.is_lobby {
            RoomStatus::Active
        } else {
            RoomStatus::Waiting
        };

        let mut room = Self {
            config,
            pot,
            status,
            countdown: 0,
            end_delay: 0,
            winner_name: None,
            players: BTreeMap::new(),
            food: BTreeMap::new(),
            viruses: BTreeMap::new(),
            ejected: BTreeMap::new(),
            next_entity_id: 1,
            clock: 0,
            rng,
            events: Vec::new(),
        };
        room.init_entities();
        room
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn is_lobby(&self) -> bool {
        self.config.is_lobby
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn winner_name(&self) -> Option<&str> {
        self.winner_name.as_deref()
    }

    pub fn pot(&self) -> f64 {
        self.pot
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: SessionId) -> Option<&Player> {
        self.players.get(&id)
    }

    fn set_status(&mut self, status: RoomStatus) {
        if self.status != status {
            info!("Room {}: {} -> {}", self.config.id, self.status, status);
            self.status = status;
        }
    }

    fn init_entities(&mut self) {
        self.food.clear();
        self.viruses.clear();
        self.ejected.clear();
        for _ in 0..FOOD_COUNT {
            self.add_food();
        }
        for _ in 0..VIRUS_COUNT {
            self.add_virus();
        }
    }

    fn random_point(&mut self) -> Vector2 {
        Vector2::new(
            self.rng.gen::<f64>() * MAP_WIDTH,
            self.rng.gen::<f64>() * MAP_HEIGHT,
        )
    }

    fn spawn_point(&mut self) -> Vector2 {
        Vector2::new(
            self.rng.gen::<f64>() * (MAP_WIDTH - 2.0 * SPAWN_INSET) + SPAWN_INSET,
            self.rng.gen::<f64>() * (MAP_HEIGHT - 2.0 * SPAWN_INSET) + SPAWN_INSET,
        )
    }

    fn add_food(&mut self) {
        let id = alloc_id(&mut self.next_entity_id);
        let position = self.random_point();
        let color = random_color(&mut self.rng);
        self.food.insert(
            id,
            Food {
                id,
                position,
                color,
            },
        );
    }

    fn add_virus(&mut self) {
        let id = alloc_id(&mut self.next_entity_id);
        let position = self.random_point();
        self.viruses.insert(id, Virus { id, position });
    }

    fn spawn_fragment(&mut self) -> Fragment {
        let id = alloc_id(&mut self.next_entity_id);
        let position = self.spawn_point();
        Fragment::new(id, position, SPAWN_MASS, self.clock)
    }

    /// Adds a player for `session`, returning its public view.
    pub fn add_player(
        &mut self,
        session: SessionId,
        data: &PlayerData,
    ) -> Result<PlayerView, JoinError> {
        if self.players.len() >= self.config.max_players {
            return Err(JoinError::RoomFull);
        }
        if !self.config.is_lobby {
            match self.status {
                RoomStatus::Ended => return Err(JoinError::MatchEnded),
                RoomStatus::Active if !self.config.allow_hot_join => {
                    return Err(JoinError::MatchInProgress)
                }
                _ => {}
            }
        }

        let color = random_color(&mut self.rng);
        let mut player = Player::new(
            session,
            sanitize_name(data.name.as_deref()),
            data.wallet_address.clone(),
            color,
        );
        player.fragments.push(self.spawn_fragment());
        player.target = map_centre();
        player.refresh();

        let view = player.to_view();
        info!(
            "Player {} ({}) joined room {} ({} players)",
            session,
            player.name,
            self.config.id,
            self.players.len() + 1
        );
        self.players.insert(session, player);

        if self.config.is_lobby {
            self.set_status(RoomStatus::Active);
        } else if self.status == RoomStatus::Waiting
            && self.players.len() >= self.config.max_players.min(MIN_PLAYERS_TO_START)
        {
            self.start_countdown();
        }

        Ok(view)
    }

    /// Removes a player on disconnect or room switch. Unknown ids are ignored.
    pub fn remove_player(&mut self, session: SessionId) -> Option<Player> {
        let player = self.players.remove(&session)?;
        info!("Player {} left room {}", session, self.config.id);

        if self.config.is_lobby {
            return Some(player);
        }

        match self.status {
            RoomStatus::Starting if self.players.len() < MIN_PLAYERS_TO_START => {
                self.set_status(RoomStatus::Waiting);
                self.countdown = 0;
            }
            RoomStatus::Active if self.players.len() == 1 => {
                if let Some(&winner) = self.players.keys().next() {
                    self.end_match(winner);
                }
            }
            RoomStatus::Active if self.players.is_empty() => self.reset(),
            _ => {}
        }
        Some(player)
    }

    pub fn set_target(&mut self, session: SessionId, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        if let Some(player) = self.players.get_mut(&session) {
            player.target = Vector2::new(x, y).clamp_to_map();
        }
    }

    /// Halves every fragment heavy enough, launching the new half at the target.
    pub fn split(&mut self, session: SessionId) {
        if self.status != RoomStatus::Active {
            return;
        }
        let Some(player) = self.players.get_mut(&session) else {
            return;
        };

        let clock = self.clock;
        let target = player.target;
        let existing = player.fragments.len();
        let mut spawned = Vec::new();

        for fragment in player.fragments.iter_mut() {
            if existing + spawned.len() >= MAX_FRAGMENTS {
                break;
            }
            if fragment.mass < SPLIT_MIN_MASS {
                continue;
            }
            let half = fragment.mass / 2.0;
            fragment.set_mass(half);
            fragment.split_tick = clock;

            let dir = fragment.position.unit_toward(&target);
            let mut sibling = Fragment::new(
                alloc_id(&mut self.next_entity_id),
                fragment.position,
                half,
                clock,
            );
            sibling.velocity = dir.scale(SPLIT_SPEED);
            spawned.push(sibling);
        }

        if !spawned.is_empty() {
            debug!(
                "Player {} split into {} fragments",
                session,
                existing + spawned.len()
            );
        }
        player.fragments.extend(spawned);
        player.refresh();
    }

    /// Sheds a fixed amount of mass from every heavy fragment as a projectile.
    pub fn eject(&mut self, session: SessionId) {
        if self.status != RoomStatus::Active {
            return;
        }
        let Some(player) = self.players.get_mut(&session) else {
            return;
        };

        let target = player.target;
        for fragment in player.fragments.iter_mut() {
            if fragment.mass <= EJECT_MIN_MASS {
                continue;
            }
            let dir = fragment.position.unit_toward(&target);
            let position = fragment
                .position
                .add(&dir.scale(fragment.radius + EJECT_SPAWN_GAP));
            fragment.set_mass(fragment.mass - EJECT_COST);

            let id = alloc_id(&mut self.next_entity_id);
            self.ejected.insert(
                id,
                EjectedMass {
                    id,
                    position,
                    velocity: dir.scale(EJECT_SPEED),
                    color: player.color.clone(),
                },
            );
        }
        player.refresh();
    }

    /// Runs one physics step. A no-op unless the room is ACTIVE.
    pub fn tick(&mut self) {
        if self.status != RoomStatus::Active {
            return;
        }
        self.clock += 1;

        self.advance_ejected();
        self.respawn_lobby_players();

        let order: Vec<SessionId> = self.players.keys().copied().collect();
        for id in order {
            // Detached so it can interact with the rest of the room
            let Some(mut player) = self.players.remove(&id) else {
                continue;
            };
            if player.is_alive() {
                self.step_player(&mut player);
            }
            self.players.insert(id, player);
        }

        if !self.config.is_lobby && self.status == RoomStatus::Active && self.players.len() == 1 {
            if let Some(&winner) = self.players.keys().next() {
                self.end_match(winner);
            }
        }
    }

    fn advance_ejected(&mut self) {
        self.ejected.retain(|_, blob| {
            blob.position = blob.position.add(&blob.velocity);
            blob.velocity = blob.velocity.scale(EJECTED_FRICTION);
            blob.position.in_map()
        });
    }

    fn respawn_lobby_players(&mut self) {
        let clock = self.clock;
        let due: Vec<SessionId> = self
            .players
            .values()
            .filter(|p| p.respawn_at.is_some_and(|at| at <= clock))
            .map(|p| p.id)
            .collect();

        for id in due {
            let fragment = self.spawn_fragment();
            if let Some(player) = self.players.get_mut(&id) {
                player.fragments = vec![fragment];
                player.target = map_centre();
                player.respawn_at = None;
                player.refresh();
                debug!("Player {} respawned in room {}", id, self.config.id);
            }
        }
    }

    fn step_player(&mut self, player: &mut Player) {
        let mut index = 0;
        // Fragments spawned during this pass wait for the next tick
        let mut end = player.fragments.len();

        while index < end && index < player.fragments.len() {
            steer(&mut player.fragments[index], &player.target);

            let (i, e) = self.resolve_own_fragments(player, index, end);
            index = i;
            end = e;

            self.eat_food(player, index);
            self.absorb_ejected(player, index);
            self.hit_virus(player, index);
            self.prey_on_others(player, index);

            index += 1;
        }

        for fragment in &mut player.fragments {
            if fragment.mass > DECAY_MIN_MASS {
                fragment.set_mass(fragment.mass - fragment.mass * DECAY_RATE);
            }
        }
        player.refresh();
    }

    /// Merge or push apart the fragment at `index` against its siblings.
    /// Returns the fragment's index and the pass end after any merges.
    fn resolve_own_fragments(
        &self,
        player: &mut Player,
        mut index: usize,
        mut end: usize,
    ) -> (usize, usize) {
        let mut other = 0;
        while other < player.fragments.len() {
            if other == index {
                other += 1;
                continue;
            }

            let current = &player.fragments[index];
            let sibling = &player.fragments[other];
            let dist = current.position.distance(&sibling.position);
            let reach = current.radius + sibling.radius;
            let cooled = self.clock.saturating_sub(current.split_tick) >= MERGE_COOLDOWN_TICKS
                && self.clock.saturating_sub(sibling.split_tick) >= MERGE_COOLDOWN_TICKS;

            if cooled && dist < reach * MERGE_OVERLAP_RATIO {
                let absorbed = player.fragments.remove(other);
                if other < index {
                    index -= 1;
                }
                if other < end {
                    end -= 1;
                }
                player.fragments[index].gain(absorbed.mass);
                player.refresh();
                continue;
            }

            if dist < reach {
                let dir = current.position.unit_toward(&sibling.position);
                let push = dir.scale((reach - dist) * SEPARATION_FACTOR);
                let sibling = &mut player.fragments[other];
                sibling.position = sibling.position.add(&push).clamp_to_map();
            }
            other += 1;
        }
        (index, end)
    }

    fn eat_food(&mut self, player: &mut Player, index: usize) {
        let fragment = &player.fragments[index];
        let eaten: Vec<u64> = self
            .food
            .values()
            .filter(|f| f.position.distance(&fragment.position) < fragment.radius)
            .map(|f| f.id)
            .collect();
        if eaten.is_empty() {
            return;
        }

        for id in eaten {
            self.food.remove(&id);
            player.fragments[index].gain(FOOD_MASS);
            self.add_food();
        }
        player.refresh();
    }

    fn absorb_ejected(&mut self, player: &mut Player, index: usize) {
        let fragment = &player.fragments[index];
        if fragment.mass <= EJECTED_MASS {
            return;
        }
        let absorbed: Vec<u64> = self
            .ejected
            .values()
            .filter(|b| b.is_settled() && b.position.distance(&fragment.position) < fragment.radius)
            .map(|b| b.id)
            .collect();
        if absorbed.is_empty() {
            return;
        }

        for id in absorbed {
            self.ejected.remove(&id);
            player.fragments[index].gain(EJECTED_MASS);
        }
        player.refresh();
    }

    fn hit_virus(&mut self, player: &mut Player, index: usize) {
        let fragment = &player.fragments[index];
        if fragment.mass <= VIRUS_MASS * VIRUS_POP_RATIO {
            return;
        }
        let hit = self
            .viruses
            .values()
            .find(|v| v.position.distance(&fragment.position) < fragment.radius + VIRUS_RADIUS)
            .map(|v| v.id);

        if let Some(id) = hit {
            self.viruses.remove(&id);
            self.explode(player, index);
            self.add_virus();
        }
    }

    /// Splits the fragment at `index` into equal pieces flung in random directions.
    /// The piece count shrinks so the player never exceeds the fragment cap.
    fn explode(&mut self, player: &mut Player, index: usize) {
        let room_left = MAX_FRAGMENTS.saturating_sub(player.fragments.len()) + 1;
        let pieces = EXPLODE_PIECES.min(room_left);
        if pieces <= 1 {
            return;
        }

        let clock = self.clock;
        let fragment = &mut player.fragments[index];
        let share = fragment.mass / pieces as f64;
        let origin = fragment.position;
        fragment.set_mass(share);
        fragment.split_tick = clock;

        for _ in 1..pieces {
            let angle = self.rng.gen::<f64>() * TAU;
            let mut piece = Fragment::new(alloc_id(&mut self.next_entity_id), origin, share, clock);
            piece.velocity = Vector2::from_angle(angle).scale(EXPLODE_SPEED);
            player.fragments.push(piece);
        }
        player.refresh();
        debug!(
            "Player {} hit a virus in room {} and burst into {} pieces",
            player.id, self.config.id, pieces
        );
    }

    fn prey_on_others(&mut self, player: &mut Player, index: usize) {
        let others: Vec<SessionId> = self.players.keys().copied().collect();

        for victim_id in others {
            let Some(victim) = self.players.get_mut(&victim_id) else {
                continue;
            };

            let mut ate = false;
            let mut k = 0;
            while k < victim.fragments.len() {
                let eater = &player.fragments[index];
                let prey = &victim.fragments[k];
                if eater.position.distance(&prey.position) < eater.radius
                    && eater.mass > prey.mass * EAT_RATIO
                {
                    let prey = victim.fragments.remove(k);
                    player.fragments[index].gain(prey.mass);
                    ate = true;
                } else {
                    k += 1;
                }
            }

            if ate {
                victim.refresh();
                player.refresh();
                if !victim.is_alive() {
                    self.eliminate(victim_id, Some(player.name.clone()));
                }
            }
        }
    }

    fn eliminate(&mut self, victim: SessionId, killer: Option<String>) {
        let is_lobby = self.config.is_lobby;
        info!(
            "Player {} eliminated in room {} by {}",
            victim,
            self.config.id,
            killer.as_deref().unwrap_or("unknown")
        );
        self.events.push(RoomEvent::Eliminated {
            victim,
            killer,
            is_lobby,
        });

        let wallet = if is_lobby {
            let respawn_at = self.clock + LOBBY_RESPAWN_TICKS;
            self.players.get_mut(&victim).and_then(|player| {
                player.fragments.clear();
                player.refresh();
                player.respawn_at = Some(respawn_at);
                player.wallet.clone()
            })
        } else {
            self.players.remove(&victim).and_then(|player| player.wallet)
        };

        if let Some(wallet) = wallet {
            self.events.push(RoomEvent::Stats(StatsDelta::loss(&wallet)));
        }
    }

    fn start_countdown(&mut self) {
        if self.status == RoomStatus::Starting {
            return;
        }
        self.set_status(RoomStatus::Starting);
        self.countdown = COUNTDOWN_SECONDS;
    }

    fn start_match(&mut self) {
        if self.players.len() < MIN_PLAYERS_TO_START {
            self.set_status(RoomStatus::Waiting);
            self.countdown = 0;
            return;
        }
        self.set_status(RoomStatus::Active);
    }

    fn end_match(&mut self, winner: SessionId) {
        self.set_status(RoomStatus::Ended);
        self.end_delay = END_RESET_SECONDS;

        let Some(player) = self.players.get(&winner) else {
            return;
        };
        info!("Room {} won by {}", self.config.id, player.name);
        self.winner_name = Some(player.name.clone());
        self.events.push(RoomEvent::Victory {
            winner,
            pot: self.pot,
        });
        if let Some(wallet) = &player.wallet {
            self.events
                .push(RoomEvent::Stats(StatsDelta::win(wallet, self.pot)));
        }
    }

    /// Advances the countdown and the post-match delay. Driven once per second.
    pub fn on_second(&mut self) {
        match self.status {
            RoomStatus::Starting => {
                if self.players.len() < MIN_PLAYERS_TO_START {
                    self.set_status(RoomStatus::Waiting);
                    self.countdown = 0;
                    return;
                }
                self.countdown = self.countdown.saturating_sub(1);
                if self.countdown == 0 {
                    self.start_match();
                }
            }
            RoomStatus::Ended => {
                self.end_delay = self.end_delay.saturating_sub(1);
                if self.end_delay == 0 {
                    self.reset();
                }
            }
            RoomStatus::Waiting | RoomStatus::Active => {}
        }
    }

    /// Clears every player and restores the initial entity populations.
    pub fn reset(&mut self) {
        info!("Room {} reset", self.config.id);
        self.players.clear();
        self.init_entities();
        self.countdown = 0;
        self.end_delay = 0;
        self.winner_name = None;
        let status = if self.config.is_lobby {
            RoomStatus::Active
        } else {
            RoomStatus::Waiting
        };
        self.set_status(status);
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            players: self
                .players
                .iter()
                .map(|(id, p)| (*id, p.to_view()))
                .collect(),
            food: self.food.iter().map(|(id, f)| (*id, f.to_view())).collect(),
            viruses: self
                .viruses
                .iter()
                .map(|(id, v)| (*id, v.to_view()))
                .collect(),
            ejected_mass: self
                .ejected
                .iter()
                .map(|(id, b)| (*id, b.to_view()))
                .collect(),
            map_width: MAP_WIDTH,
            map_height: MAP_HEIGHT,
            status: self.status,
            countdown: self.countdown,
            winner_name: self.winner_name.clone(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.config.id.clone(),
            name: self.config.display_name(),
            price: self.config.price,
            max_players: self.config.max_players,
            is_lobby: self.config.is_lobby,
            players: self.players.len(),
            status: self.status,
        }
    }

    pub fn drain_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::radius_for_mass;

    fn arena() -> Room {
        Room::with_rng(RoomConfig::arena("1", 5.0, 10), 0.1, StdRng::seed_from_u64(7))
    }

    fn lobby() -> Room {
        Room::with_rng(RoomConfig::lobby("0", 50), 0.1, StdRng::seed_from_u64(11))
    }

    fn named(name: &str) -> PlayerData {
        PlayerData {
            name: Some(name.to_string()),
            wallet_address: None,
        }
    }

    fn with_wallet(name: &str, wallet: &str) -> PlayerData {
        PlayerData {
            name: Some(name.to_string()),
            wallet_address: Some(wallet.to_string()),
        }
    }

    /// Collapses a player to one still fragment at `position`, aiming at itself.
    fn place(room: &mut Room, id: SessionId, position: Vector2, mass: f64) {
        let player = room.players.get_mut(&id).unwrap();
        player.fragments.truncate(1);
        let fragment = &mut player.fragments[0];
        fragment.position = position;
        fragment.velocity = Vector2::ZERO;
        fragment.set_mass(mass);
        player.target = position;
        player.refresh();
    }

    fn activate(room: &mut Room) {
        for _ in 0..COUNTDOWN_SECONDS {
            room.on_second();
        }
        assert_eq!(room.status(), RoomStatus::Active);
    }

    fn assert_consistent(room: &Room) {
        for player in room.players.values() {
            assert!(player.fragments.len() <= MAX_FRAGMENTS);
            let sum: f64 = player.fragments.iter().map(|f| f.mass).sum();
            assert_approx_eq!(player.total_mass, sum, 1e-9);
            for fragment in &player.fragments {
                assert!(fragment.mass >= 0.0);
                assert_approx_eq!(fragment.radius, radius_for_mass(fragment.mass), 1e-9);
                assert!(fragment.position.in_map());
            }
        }
    }

    #[test]
    fn test_new_room_has_initial_population() {
        let room = arena();
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.food.len(), FOOD_COUNT);
        assert_eq!(room.viruses.len(), VIRUS_COUNT);
        assert!(room.ejected.is_empty());
        assert_eq!(lobby().status(), RoomStatus::Active);
    }

    #[test]
    fn test_join_spawns_inside_inset() {
        let mut room = arena();
        let view = room.add_player(1, &named("Ann")).unwrap();
        assert_eq!(view.name, "Ann");
        assert_eq!(view.fragments.len(), 1);
        assert_eq!(view.total_mass, SPAWN_MASS);

        let fragment = &room.player(1).unwrap().fragments[0];
        assert!(fragment.position.x >= SPAWN_INSET && fragment.position.x <= MAP_WIDTH - SPAWN_INSET);
        assert!(fragment.position.y >= SPAWN_INSET && fragment.position.y <= MAP_HEIGHT - SPAWN_INSET);
        assert_eq!(room.player(1).unwrap().target, map_centre());
    }

    #[test]
    fn test_second_player_starts_countdown_and_leaving_aborts_it() {
        let mut room = arena();
        room.add_player(1, &named("A")).unwrap();
        assert_eq!(room.status(), RoomStatus::Waiting);

        room.add_player(2, &named("B")).unwrap();
        assert_eq!(room.status(), RoomStatus::Starting);
        assert_eq!(room.countdown(), 10);

        room.on_second();
        assert_eq!(room.countdown(), 9);

        room.remove_player(2);
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.countdown(), 0);
    }

    #[test]
    fn test_countdown_reaches_active() {
        let mut room = arena();
        room.add_player(1, &named("A")).unwrap();
        room.add_player(2, &named("B")).unwrap();
        for _ in 0..COUNTDOWN_SECONDS - 1 {
            room.on_second();
            assert_eq!(room.status(), RoomStatus::Starting);
        }
        room.on_second();
        assert_eq!(room.status(), RoomStatus::Active);
    }

    #[test]
    fn test_single_seat_room_never_starts() {
        let mut room = Room::with_rng(RoomConfig::arena("s", 1.0, 1), 0.1, StdRng::seed_from_u64(3));
        room.add_player(1, &named("Solo")).unwrap();
        assert_eq!(room.status(), RoomStatus::Starting);
        room.on_second();
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.add_player(2, &named("X")), Err(JoinError::RoomFull));
    }

    #[test]
    fn test_room_full() {
        let mut room = Room::with_rng(RoomConfig::arena("2", 1.0, 2), 0.1, StdRng::seed_from_u64(1));
        room.add_player(1, &named("A")).unwrap();
        room.add_player(2, &named("B")).unwrap();
        assert_eq!(room.add_player(3, &named("C")), Err(JoinError::RoomFull));
        assert_eq!(JoinError::RoomFull.code(), ErrorCode::RoomFull);
    }

    #[test]
    fn test_hot_join_policy() {
        let mut room = arena();
        room.add_player(1, &named("A")).unwrap();
        room.add_player(2, &named("B")).unwrap();
        activate(&mut room);
        assert!(room.add_player(3, &named("Late")).is_ok());

        let mut config = RoomConfig::arena("3", 1.0, 10);
        config.allow_hot_join = false;
        let mut strict = Room::with_rng(config, 0.1, StdRng::seed_from_u64(5));
        strict.add_player(1, &named("A")).unwrap();
        strict.add_player(2, &named("B")).unwrap();
        assert!(strict.add_player(3, &named("Early")).is_ok());
        activate(&mut strict);
        assert_eq!(
            strict.add_player(4, &named("Late")),
            Err(JoinError::MatchInProgress)
        );
    }

    #[test]
    fn test_no_physics_outside_active() {
        let mut room = arena();
        room.add_player(1, &named("A")).unwrap();
        let before = room.player(1).unwrap().fragments[0].position;
        room.set_target(1, 0.0, 0.0);
        room.tick();
        assert_eq!(room.player(1).unwrap().fragments[0].position, before);
        assert_eq!(room.clock(), 0);
    }

    #[test]
    fn test_target_is_clamped_and_non_finite_ignored() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();

        room.set_target(1, MAP_WIDTH + 1000.0, -5.0);
        assert_eq!(room.player(1).unwrap().target, Vector2::new(MAP_WIDTH, 0.0));

        room.set_target(1, f64::NAN, 10.0);
        room.set_target(1, 10.0, f64::INFINITY);
        assert_eq!(room.player(1).unwrap().target, Vector2::new(MAP_WIDTH, 0.0));
    }

    #[test]
    fn test_steering_moves_toward_target() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1000.0, 1000.0), 10.0);
        room.set_target(1, 2000.0, 1000.0);

        room.tick();
        let fragment = &room.player(1).unwrap().fragments[0];
        assert_approx_eq!(fragment.position.x, 1000.0 + speed_for_mass(10.0), 1e-9);
        assert_approx_eq!(fragment.position.y, 1000.0, 1e-9);
    }

    #[test]
    fn test_split_below_minimum_is_noop() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        place(&mut room, 1, Vector2::new(500.0, 500.0), 19.9);

        room.split(1);
        let player = room.player(1).unwrap();
        assert_eq!(player.fragments.len(), 1);
        assert_approx_eq!(player.total_mass, 19.9, 1e-12);
    }

    #[test]
    fn test_split_halves_and_launches() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        place(&mut room, 1, Vector2::new(500.0, 500.0), 100.0);
        room.set_target(1, 500.0, 900.0);

        room.split(1);
        let player = room.player(1).unwrap();
        assert_eq!(player.fragments.len(), 2);
        assert_approx_eq!(player.total_mass, 100.0, 1e-12);
        assert_approx_eq!(player.fragments[0].mass, 50.0, 1e-12);
        assert_eq!(player.fragments[0].velocity, Vector2::ZERO);
        assert_eq!(player.fragments[1].position, Vector2::new(500.0, 500.0));
        assert_approx_eq!(player.fragments[1].velocity.y, SPLIT_SPEED, 1e-9);
        assert_approx_eq!(player.fragments[1].velocity.x, 0.0, 1e-9);
        assert_consistent(&room);
    }

    #[test]
    fn test_split_respects_fragment_cap() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        place(&mut room, 1, Vector2::new(500.0, 500.0), 40.0);
        {
            let player = room.players.get_mut(&1).unwrap();
            for n in 0..9 {
                player
                    .fragments
                    .push(Fragment::new(1000 + n, Vector2::new(600.0, 600.0), 40.0, 0));
            }
            player.refresh();
        }

        room.split(1);
        assert_eq!(room.player(1).unwrap().fragments.len(), MAX_FRAGMENTS);
        room.split(1);
        assert_eq!(room.player(1).unwrap().fragments.len(), MAX_FRAGMENTS);
        assert_approx_eq!(room.player(1).unwrap().total_mass, 400.0, 1e-9);
        assert_consistent(&room);
    }

    #[test]
    fn test_split_and_eject_ignored_outside_active() {
        let mut room = arena();
        room.add_player(1, &named("A")).unwrap();
        place(&mut room, 1, Vector2::new(500.0, 500.0), 100.0);
        room.split(1);
        room.eject(1);
        let player = room.player(1).unwrap();
        assert_eq!(player.fragments.len(), 1);
        assert_eq!(player.total_mass, 100.0);
        assert!(room.ejected.is_empty());
    }

    #[test]
    fn test_eject_spawns_blob_outside_fragment() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        place(&mut room, 1, Vector2::new(1000.0, 1000.0), 100.0);
        room.set_target(1, 2000.0, 1000.0);
        let radius_before = room.player(1).unwrap().fragments[0].radius;

        room.eject(1);
        let player = room.player(1).unwrap();
        assert_approx_eq!(player.total_mass, 100.0 - EJECT_COST, 1e-12);
        assert_eq!(room.ejected.len(), 1);

        let blob = room.ejected.values().next().unwrap();
        assert_approx_eq!(blob.position.x, 1000.0 + radius_before + EJECT_SPAWN_GAP, 1e-9);
        assert_approx_eq!(blob.velocity.x, EJECT_SPEED, 1e-9);
        assert_eq!(blob.color, player.color);
    }

    #[test]
    fn test_eject_requires_minimum_mass() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        place(&mut room, 1, Vector2::new(1000.0, 1000.0), 25.0);
        room.eject(1);
        assert!(room.ejected.is_empty());
        assert_eq!(room.player(1).unwrap().total_mass, 25.0);
    }

    #[test]
    fn test_ejected_mass_drifts_and_leaves_map() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(2900.0, 1000.0), 100.0);
        room.set_target(1, MAP_WIDTH, 1000.0);
        room.eject(1);
        let start = room.ejected.values().next().unwrap().position;

        room.tick();
        if let Some(blob) = room.ejected.values().next() {
            assert_approx_eq!(blob.position.x, start.x + EJECT_SPEED, 1e-9);
            assert_approx_eq!(blob.velocity.x, EJECT_SPEED * EJECTED_FRICTION, 1e-9);
        }
        for _ in 0..10 {
            room.tick();
        }
        assert!(room.ejected.is_empty());
    }

    #[test]
    fn test_settled_ejected_mass_is_absorbed() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1000.0, 1000.0), 15.0);
        room.ejected.insert(
            999,
            EjectedMass {
                id: 999,
                position: Vector2::new(1002.0, 1000.0),
                velocity: Vector2::ZERO,
                color: "red".to_string(),
            },
        );

        room.tick();
        assert!(room.ejected.is_empty());
        assert_approx_eq!(
            room.player(1).unwrap().total_mass,
            (15.0 + EJECTED_MASS) * (1.0 - DECAY_RATE),
            1e-9
        );
    }

    #[test]
    fn test_food_is_eaten_and_respawned() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1500.0, 1500.0), 10.0);
        room.food.retain(|_, f| f.position.distance(&Vector2::new(1500.0, 1500.0)) > 200.0);
        let population = room.food.len();
        room.food.insert(
            5000,
            Food {
                id: 5000,
                position: Vector2::new(1501.0, 1500.0),
                color: "green".to_string(),
            },
        );

        room.tick();
        assert!(!room.food.contains_key(&5000));
        assert_eq!(room.food.len(), population + 1);
        assert_approx_eq!(room.player(1).unwrap().total_mass, 11.0, 1e-12);
        assert_consistent(&room);
    }

    #[test]
    fn test_merge_waits_for_cooldown() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1500.0, 1500.0), 100.0);
        room.split(1);
        assert_eq!(room.player(1).unwrap().fragments.len(), 2);

        let overlap = |room: &mut Room| {
            let player = room.players.get_mut(&1).unwrap();
            player.target = Vector2::new(1500.0, 1500.0);
            for fragment in &mut player.fragments {
                fragment.position = Vector2::new(1500.0, 1500.0);
                fragment.velocity = Vector2::ZERO;
            }
        };

        for _ in 0..MERGE_COOLDOWN_TICKS - 1 {
            overlap(&mut room);
            room.tick();
            assert_eq!(room.player(1).unwrap().fragments.len(), 2);
        }

        overlap(&mut room);
        room.tick();
        let player = room.player(1).unwrap();
        assert_eq!(player.fragments.len(), 1);
        assert_approx_eq!(player.fragments[0].mass, player.total_mass, 1e-12);
        assert_consistent(&room);
    }

    #[test]
    fn test_overlapping_siblings_are_pushed_apart() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1500.0, 1500.0), 100.0);
        room.split(1);
        {
            let player = room.players.get_mut(&1).unwrap();
            for fragment in &mut player.fragments {
                fragment.velocity = Vector2::ZERO;
            }
        }

        room.tick();
        let player = room.player(1).unwrap();
        assert_eq!(player.fragments.len(), 2);
        let gap = player.fragments[0]
            .position
            .distance(&player.fragments[1].position);
        assert!(gap > 0.0);
        assert_consistent(&room);
    }

    #[test]
    fn test_explode_conserves_mass() {
        let mut room = lobby();
        let mut player = Player::new(1, "A".to_string(), None, "red".to_string());
        player
            .fragments
            .push(Fragment::new(1, Vector2::new(800.0, 800.0), 200.0, 0));
        player.refresh();

        room.explode(&mut player, 0);
        assert_eq!(player.fragments.len(), EXPLODE_PIECES);
        assert_approx_eq!(player.total_mass, 200.0, 1e-9);
        for fragment in &player.fragments[1..] {
            assert_approx_eq!(fragment.velocity.magnitude(), EXPLODE_SPEED, 1e-9);
            assert_eq!(fragment.position, Vector2::new(800.0, 800.0));
        }
    }

    #[test]
    fn test_explode_near_cap_makes_fewer_pieces() {
        let mut room = lobby();
        let mut player = Player::new(1, "A".to_string(), None, "red".to_string());
        for n in 0..13 {
            player
                .fragments
                .push(Fragment::new(n, Vector2::new(800.0, 800.0), 150.0, 0));
        }
        player.refresh();

        room.explode(&mut player, 0);
        assert_eq!(player.fragments.len(), MAX_FRAGMENTS);
        assert_approx_eq!(player.total_mass, 13.0 * 150.0, 1e-9);

        room.explode(&mut player, 1);
        assert_eq!(player.fragments.len(), MAX_FRAGMENTS);
    }

    #[test]
    fn test_virus_collision_explodes_fragment() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        let virus_at = room.viruses.values().next().unwrap().position;
        let virus_ids: Vec<u64> = room.viruses.keys().copied().collect();
        room.viruses.retain(|id, _| *id == virus_ids[0]);
        place(&mut room, 1, virus_at, 200.0);

        room.tick();
        let player = room.player(1).unwrap();
        assert_eq!(player.fragments.len(), EXPLODE_PIECES);
        // Each 25-mass piece decays once at the end of the tick
        assert_approx_eq!(player.total_mass, 200.0 * (1.0 - DECAY_RATE), 1e-9);
        assert_eq!(room.viruses.len(), 1);
        assert!(!room.viruses.contains_key(&virus_ids[0]));
    }

    #[test]
    fn test_small_fragment_passes_over_virus() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.food.clear();
        let virus_at = room.viruses.values().next().unwrap().position;
        place(&mut room, 1, virus_at, 120.0);

        room.tick();
        assert_eq!(room.player(1).unwrap().fragments.len(), 1);
        assert_eq!(room.viruses.len(), VIRUS_COUNT);
    }

    #[test]
    fn test_predation_ends_arena_match() {
        let mut room = arena();
        room.add_player(1, &with_wallet("Big", "w-big")).unwrap();
        room.add_player(2, &with_wallet("Small", "w-small")).unwrap();
        activate(&mut room);
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1000.0, 1000.0), 100.0);
        place(&mut room, 2, Vector2::new(1005.0, 1000.0), 10.0);

        room.tick();
        assert!(room.player(2).is_none());
        assert_eq!(room.status(), RoomStatus::Ended);
        assert_eq!(room.winner_name(), Some("Big"));
        assert_approx_eq!(room.player(1).unwrap().total_mass, 110.0 * (1.0 - DECAY_RATE), 1e-9);

        let pot = room.pot();
        let events = room.drain_events();
        assert_eq!(
            events,
            vec![
                RoomEvent::Eliminated {
                    victim: 2,
                    killer: Some("Big".to_string()),
                    is_lobby: false,
                },
                RoomEvent::Stats(StatsDelta::loss("w-small")),
                RoomEvent::Victory { winner: 1, pot },
                RoomEvent::Stats(StatsDelta::win("w-big", pot)),
            ]
        );
        assert!(room.drain_events().is_empty());
    }

    #[test]
    fn test_eat_ratio_protects_similar_sizes() {
        let mut room = lobby();
        room.add_player(1, &named("A")).unwrap();
        room.add_player(2, &named("B")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(1000.0, 1000.0), 114.0);
        place(&mut room, 2, Vector2::new(1001.0, 1000.0), 100.0);
        room.tick();
        assert!(room.player(2).unwrap().is_alive());
        assert!(room.drain_events().is_empty());
    }

    #[test]
    fn test_lobby_elimination_respawns() {
        let mut room = lobby();
        room.add_player(1, &named("Big")).unwrap();
        room.add_player(2, &with_wallet("Small", "w")).unwrap();
        room.food.clear();
        room.viruses.clear();
        place(&mut room, 1, Vector2::new(0.0, 0.0), 100.0);
        place(&mut room, 2, Vector2::new(3.0, 0.0), 10.0);

        room.tick();
        let eliminated_at = room.clock();
        let victim = room.player(2).unwrap();
        assert!(!victim.is_alive());
        assert_eq!(victim.respawn_at, Some(eliminated_at + LOBBY_RESPAWN_TICKS));
        assert_eq!(room.status(), RoomStatus::Active);
        assert_eq!(
            room.drain_events()[0],
            RoomEvent::Eliminated {
                victim: 2,
                killer: Some("Big".to_string()),
                is_lobby: true,
            }
        );

        for _ in 0..LOBBY_RESPAWN_TICKS - 1 {
            room.tick();
        }
        assert!(!room.player(2).unwrap().is_alive());
        room.tick();
        let victim = room.player(2).unwrap();
        assert_eq!(victim.fragments.len(), 1);
        assert_eq!(victim.total_mass, SPAWN_MASS);
        assert!(victim.respawn_at.is_none());
    }

    #[test]
    fn test_last_player_after_leave_wins_and_room_resets() {
        let mut room = arena();
        room.add_player(1, &named("Stays")).unwrap();
        room.add_player(2, &named("Quits")).unwrap();
        activate(&mut room);

        room.remove_player(2);
        assert_eq!(room.status(), RoomStatus::Ended);
        assert_eq!(room.winner_name(), Some("Stays"));
        assert_eq!(room.snapshot().winner_name.as_deref(), Some("Stays"));
        assert_eq!(
            room.add_player(3, &named("Late")),
            Err(JoinError::MatchEnded)
        );

        for _ in 0..END_RESET_SECONDS - 1 {
            room.on_second();
            assert_eq!(room.status(), RoomStatus::Ended);
        }
        room.on_second();
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.player_count(), 0);
        assert_eq!(room.food.len(), FOOD_COUNT);
        assert_eq!(room.viruses.len(), VIRUS_COUNT);
        assert!(room.winner_name().is_none());
    }

    #[test]
    fn test_remove_unknown_player_is_ignored() {
        let mut room = arena();
        room.add_player(1, &named("A")).unwrap();
        room.add_player(2, &named("B")).unwrap();
        assert!(room.remove_player(42).is_none());
        assert_eq!(room.status(), RoomStatus::Starting);
    }

    #[test]
    fn test_state_stays_consistent_in_busy_lobby() {
        let mut room = lobby();
        let mut rng = StdRng::seed_from_u64(99);
        for id in 1..=6 {
            room.add_player(id, &named("Bot")).unwrap();
            let player = room.players.get_mut(&id).unwrap();
            player.fragments[0].set_mass(150.0);
            player.refresh();
        }

        for tick in 0..300 {
            for id in 1..=6 {
                let x = rng.gen::<f64>() * 4000.0 - 500.0;
                let y = rng.gen::<f64>() * 4000.0 - 500.0;
                room.set_target(id, x, y);
                if tick % 40 == 0 {
                    room.split(id);
                }
                if tick % 25 == 0 {
                    room.eject(id);
                }
            }
            room.tick();
            assert_consistent(&room);
            for blob in room.ejected.values() {
                assert!(blob.position.in_map());
            }
        }
        assert_eq!(room.food.len(), FOOD_COUNT);
        assert_eq!(room.viruses.len(), VIRUS_COUNT);
    }

    #[test]
    fn test_snapshot_and_summary() {
        let mut room = arena();
        room.add_player(4, &with_wallet("Ann", "secret")).unwrap();
        let snapshot = room.snapshot();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.food.len(), FOOD_COUNT);
        assert_eq!(snapshot.status, RoomStatus::Waiting);
        assert!(!serde_json::to_string(&snapshot).unwrap().contains("secret"));

        let summary = room.summary();
        assert_eq!(summary.id, "1");
        assert_eq!(summary.name, "5 USDC");
        assert_eq!(summary.players, 1);
        assert!(!summary.is_lobby);
        assert_approx_eq!(room.pot(), 45.0, 1e-9);
    }
}
