//! # Arena Server Library
//!
//! This library provides the authoritative server for the multi-room mass
//! arena. It owns every room's simulation, validates client intents, and
//! broadcasts one snapshot per room per tick to the sessions watching it.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Each room runs the definitive version of the arena: steering, fragment
//! merging, food and virus consumption, predation, and the match lifecycle.
//! Clients only send intents and render whatever the server broadcasts.
//!
//! ### Session Management
//! Handles the lifecycle of every WebSocket connection:
//! - Welcome and session id assignment
//! - Joining rooms as a player or a spectator
//! - Join limiting per connection and per source address
//! - Throttling of steering, split and eject intents
//! - Disconnection cleanup and notifying the remaining room members
//!
//! ### Match Lifecycle
//! Paid arenas move through WAITING, STARTING, ACTIVE and ENDED. The lobby is
//! permanently ACTIVE and respawns eliminated players after a short delay.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All room state is mutated from one task. Connection tasks parse frames and
//! forward intents over a channel; the loop interleaves them with the tick
//! timer and the one-second lifecycle timer. Rooms never block on I/O.
//!
//! ### Fault Isolation
//! A room whose step panics is logged and reset. The other rooms keep ticking.
//!
//! ### External Stats
//! Eliminations and victories emit stats deltas that are applied by a
//! background task, so a slow store cannot hold up a tick.
//!
//! ## Module Organization
//!
//! - `config`: room table and house fee, loaded from JSON or defaulted
//! - `entity`: fragments, players, food, viruses and ejected mass
//! - `room`: one room's simulation and lifecycle state machine
//! - `registry`: the fixed set of rooms and the per-tick fan-out
//! - `rate_limit`: join limiters and action throttles
//! - `session`: per-connection state and intent dispatch
//! - `stats`: boundary to the player stats store
//! - `network`: WebSocket accept loop and the main event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ArenaConfig;
//! use server::network::Server;
//! use server::stats::{LogStatsSink, StatsReporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stats = StatsReporter::spawn(LogStatsSink);
//!     let server = Server::bind("127.0.0.1:8080", &ArenaConfig::default(), stats).await?;
//!
//!     // Runs until the process is stopped:
//!     // - Accepts WebSocket sessions and parses their intents
//!     // - Ticks every room at the fixed rate and broadcasts snapshots
//!     // - Drives countdowns and post-match resets once per second
//!     if let Err(e) = server.run().await {
//!         eprintln!("Server stopped: {}", e);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod network;
pub mod rate_limit;
pub mod registry;
pub mod room;
pub mod session;
pub mod stats;
