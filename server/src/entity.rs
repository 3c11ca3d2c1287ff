//! Entity records owned by a room.
//!
//! Radius is always derived from mass through [`Fragment::set_mass`], and a
//! player's total mass through [`Player::refresh`]. Nothing else writes
//! either field.

use rand::Rng;
use shared::{
    radius_for_mass, EjectedMassView, FoodView, FragmentView, PlayerView, SessionId, Vector2,
    VirusView, DEFAULT_PLAYER_NAME, EJECTED_RADIUS, EJECTED_SETTLE_SPEED, FOOD_RADIUS,
    MAX_NAME_CHARS, VIRUS_MASS, VIRUS_RADIUS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: u64,
    pub position: Vector2,
    /// Residual launch impulse, decays every tick.
    pub velocity: Vector2,
    pub mass: f64,
    pub radius: f64,
    /// Tick of the split or spawn that started this fragment's merge cooldown.
    pub split_tick: u64,
}

impl Fragment {
    pub fn new(id: u64, position: Vector2, mass: f64, split_tick: u64) -> Self {
        Self {
            id,
            position,
            velocity: Vector2::ZERO,
            mass,
            radius: radius_for_mass(mass),
            split_tick,
        }
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass.max(0.0);
        self.radius = radius_for_mass(self.mass);
    }

    pub fn gain(&mut self, amount: f64) {
        self.set_mass(self.mass + amount);
    }

    pub fn to_view(&self) -> FragmentView {
        FragmentView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            radius: self.radius,
            mass: self.mass,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: SessionId,
    pub name: String,
    pub wallet: Option<String>,
    pub color: String,
    pub fragments: Vec<Fragment>,
    pub target: Vector2,
    pub total_mass: f64,
    /// Lobby only: tick at which an eliminated player comes back.
    pub respawn_at: Option<u64>,
}

impl Player {
    pub fn new(id: SessionId, name: String, wallet: Option<String>, color: String) -> Self {
        Self {
            id,
            name,
            wallet,
            color,
            fragments: Vec::new(),
            target: Vector2::ZERO,
            total_mass: 0.0,
            respawn_at: None,
        }
    }

    /// Recomputes every derived field after a mass change.
    pub fn refresh(&mut self) {
        for fragment in &mut self.fragments {
            fragment.radius = radius_for_mass(fragment.mass);
        }
        self.total_mass = self.fragments.iter().map(|f| f.mass).sum();
    }

    pub fn is_alive(&self) -> bool {
        !self.fragments.is_empty()
    }

    pub fn to_view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            fragments: self.fragments.iter().map(Fragment::to_view).collect(),
            total_mass: self.total_mass,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Food {
    pub id: u64,
    pub position: Vector2,
    pub color: String,
}

impl Food {
    pub fn to_view(&self) -> FoodView {
        FoodView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            radius: FOOD_RADIUS,
            color: self.color.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Virus {
    pub id: u64,
    pub position: Vector2,
}

impl Virus {
    pub fn to_view(&self) -> VirusView {
        VirusView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            radius: VIRUS_RADIUS,
            mass: VIRUS_MASS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EjectedMass {
    pub id: u64,
    pub position: Vector2,
    pub velocity: Vector2,
    pub color: String,
}

impl EjectedMass {
    pub fn is_settled(&self) -> bool {
        self.velocity.magnitude() < EJECTED_SETTLE_SPEED
    }

    pub fn to_view(&self) -> EjectedMassView {
        EjectedMassView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            radius: EJECTED_RADIUS,
            color: self.color.clone(),
        }
    }
}

pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("hsl({}, 100%, 50%)", rng.gen_range(0..360))
}

/// Trims and truncates a requested display name, falling back to the default.
pub fn sanitize_name(name: Option<&str>) -> String {
    let trimmed: String = name
        .unwrap_or("")
        .trim()
        .chars()
        .take(MAX_NAME_CHARS)
        .collect();
    let trimmed = trimmed.trim_end().to_string();
    if trimmed.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        trimmed
    }
}
