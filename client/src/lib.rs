//! # Arena Client Library
//!
//! This library provides the client side of the mass arena: it connects to the
//! authoritative server, mirrors one room's state, and renders it smoothly
//! between the discrete snapshots the server broadcasts.
//!
//! ## Architecture Overview
//!
//! The client never simulates the arena. Every tick the server sends a full
//! room snapshot; the client keeps the last two and blends between them.
//!
//! ### Snapshot Interpolation
//! Each render frame computes `t = clamp(elapsed / tick_interval, 0, 1)` since
//! the newest snapshot arrived and linearly blends fragment positions from the
//! previous snapshot toward it. Fragments are matched by index; a fragment with
//! no counterpart in the previous snapshot is drawn where the newest one says.
//! Mass, radius, status and countdown always come from the newest snapshot.
//!
//! ### Camera
//! The camera eases toward the local player's fragment centroid and zooms out
//! as the largest fragment grows. Snapshots never carry camera data.
//!
//! ### Input
//! Pointer position is translated into a world-space steering target and sent
//! at most every 33 ms. Space splits and W ejects.
//!
//! ## Module Organization
//!
//! - `mirror`: snapshot buffer and interpolation
//! - `camera`: follow and zoom smoothing, screen/world conversion
//! - `game`: session state machine applying server notifications
//! - `input`: pointer and key sampling, throttled steering intents
//! - `network`: WebSocket session on a background runtime
//! - `rendering`: macroquad drawing of the mirrored room and HUD
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::GameClient;
//! use client::network::{ClientEvent, NetworkClient};
//! use shared::PlayerData;
//! use std::time::Instant;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut network = NetworkClient::connect("ws://127.0.0.1:8080", 0)?;
//! let mut game = GameClient::new("0".to_string(), PlayerData::default(), false);
//!
//! loop {
//!     let now = Instant::now();
//!     for event in network.poll() {
//!         if let ClientEvent::Message(message) = event {
//!             // Welcome is answered with the join intent
//!             if let Some(reply) = game.apply(message, now) {
//!                 network.send(reply);
//!             }
//!         }
//!     }
//!     if let Some(view) = game.frame(now) {
//!         println!("{} players visible", view.players.len());
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod game;
pub mod input;
pub mod mirror;
pub mod network;
pub mod rendering;
