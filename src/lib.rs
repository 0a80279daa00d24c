//! # Bomber Game Server
//!
//! Authoritative server for a grid-based multiplayer bomber game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BOMBER SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seeded Xorshift PRNG, round seeds         │
//! │                                                              │
//! │  game/           - Rules (pure, no I/O)                      │
//! │  ├── state.rs    - Map, players, bombs, explosions           │
//! │  ├── map.rs      - Map generation                            │
//! │  ├── player.rs   - Movement, damage, power-ups, respawn      │
//! │  ├── bomb.rs     - Placement and blast resolution            │
//! │  ├── lobby.rs    - Timers, start barrier, round lifecycle    │
//! │  ├── schedule.rs - Deadline queue for timed game events      │
//! │  ├── tick.rs     - Fuse and explosion ageing                 │
//! │  ├── chat.rs     - Bounded chat history                      │
//! │  └── events.rs   - Events emitted by the rules               │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server and dispatcher           │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── registry.rs - Sessions and connection handles           │
//! │  └── session.rs  - Routing and broadcast                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Every mutation of the game state goes through one dispatcher task,
//! so client frames, ticks and timers are applied one at a time in
//! arrival order. The `game/` modules never read the wall clock: the
//! dispatcher hands them a millisecond clock, and all randomness comes
//! from a per-round seeded generator.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{GameConfig, ServerConfig};
pub use core::rng::DeterministicRng;
pub use game::state::{GameState, GameStatus, PlayerId};
pub use network::{GameServer, GameServerError, GameSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fuse/explosion loop rate (Hz)
pub const TICK_RATE: u32 = 60;
