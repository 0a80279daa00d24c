//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! All game rules live in `game/`; this layer routes frames in and
//! broadcasts out.

pub mod protocol;
pub mod registry;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ProtocolError, LobbyUpdate, GameSnapshot};
pub use registry::{ConnectionRegistry, ConnectionState};
pub use session::GameSession;
pub use server::{GameServer, GameServerError};
