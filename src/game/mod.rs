//! Game Logic Module
//!
//! Pure game rules over a single [`GameState`]. Nothing in here touches the
//! network; every visible change is reported as a [`GameEvent`].
//!
//! ## Module Structure
//!
//! - `state`: Map, players, bombs, explosions, round status
//! - `map`: Arena generation
//! - `player`: Movement, power-ups, life loss
//! - `bomb`: Placement and detonation
//! - `lobby`: Round lifecycle, timers, start barrier, end check
//! - `tick`: Fuse/explosion aging and scheduled effects
//! - `schedule`: Deferred effect queue
//! - `chat`: Chat history
//! - `events`: Game events

pub mod state;
pub mod map;
pub mod player;
pub mod bomb;
pub mod lobby;
pub mod tick;
pub mod schedule;
pub mod chat;
pub mod events;

// Re-export key types
pub use state::{GameState, GameStatus, GameMap, Player, PlayerId, ConnectionId, GridPos, Direction, Tile};
pub use lobby::{JoinError, LobbySeat};
pub use tick::TickResult;
pub use events::{GameEvent, GameEventData};
pub use chat::{ChatEntry, ChatLog};
