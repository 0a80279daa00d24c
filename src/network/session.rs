//! Game Session
//!
//! The single owner of all mutable server state: the game, the connection
//! registry and the chat log. Every inbound frame, tick and timer runs as
//! one serialized call on this type; the dispatcher task in `server`
//! guarantees nothing else touches it.
//!
//! Game modules report changes as events. After each call the session
//! drains them and broadcasts the matching protocol messages, so clients
//! see changes in the order they happened.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::GameConfig;
use crate::game::bomb::place_bomb;
use crate::game::chat::ChatLog;
use crate::game::events::GameEventData;
use crate::game::lobby::{self, AckOutcome, JoinError};
use crate::game::player::{self, move_player};
use crate::game::state::{ConnectionId, Direction, GameState, GameStatus, PlayerId};
use crate::game::tick::{self, TickResult};
use crate::network::protocol::{
    ClientMessage, ExplosionReport, GameSnapshot, LobbyUpdate, ServerError, ServerMessage,
};
use crate::network::registry::ConnectionRegistry;

/// Serialized owner of the game, the sessions and the chat.
#[derive(Debug)]
pub struct GameSession {
    state: GameState,
    registry: ConnectionRegistry,
    chat: ChatLog,
}

impl GameSession {
    /// Create a session with an empty lobby.
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let registry = ConnectionRegistry::new(config.reconnect_grace_ms);
        let chat = ChatLog::new(config.chat_history_cap);
        Self {
            state: GameState::new(config, seed),
            registry,
            chat,
        }
    }

    /// Game state (read-only).
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Chat log (read-only).
    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// A transport opened.
    pub fn connect(&mut self, conn: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.registry.attach(conn, sender);
        debug!(connection = %conn, "Connection attached");
    }

    /// A transport closed. Its sessions enter the reconnect grace window.
    pub fn disconnect(&mut self, conn: ConnectionId, now_ms: u64) {
        self.state.set_clock(now_ms);
        let orphaned = self.registry.detach(conn, self.state.now_ms);
        for id in &orphaned {
            info!(session = %id, connection = %conn, "Session disconnected, grace window started");
        }
    }

    /// Handle one inbound text frame.
    pub fn handle_text(&mut self, conn: ConnectionId, text: &str, now_ms: u64) {
        self.state.set_clock(now_ms);

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(connection = %conn, frame = %text, "Inbound frame");

        match ClientMessage::parse(text) {
            Ok(msg) => self.route(conn, msg),
            Err(e) => {
                debug!(connection = %conn, error = %e, "Rejected inbound frame");
                self.send_error(conn, ServerError::new(e.client_message()));
            }
        }

        self.flush_events();
    }

    /// Advance fuses and explosions by `dt`.
    pub fn tick(&mut self, dt: Duration, now_ms: u64) -> TickResult {
        self.state.set_clock(now_ms);
        let result = tick::tick(&mut self.state, dt);
        self.flush_events();
        result
    }

    /// Fire scheduled effects and expired grace windows due at `now_ms`.
    pub fn fire_due(&mut self, now_ms: u64) -> usize {
        self.state.set_clock(now_ms);

        let seats = self.registry.seats();
        let mut fired = tick::fire_due_timers(&mut self.state, &seats);
        self.flush_events();

        for id in self.registry.expired(self.state.now_ms) {
            info!(session = %id, "Reconnect grace expired");
            self.teardown(id);
            fired += 1;
        }
        self.flush_events();

        fired
    }

    /// Earliest logical time at which `fire_due` has work.
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.state.timers.next_due(), self.registry.next_grace_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    fn route(&mut self, conn: ConnectionId, msg: ClientMessage) {
        let msg = match msg {
            ClientMessage::Join { nickname, id } => {
                self.on_join(conn, nickname.as_deref(), id.as_deref());
                return;
            }
            ClientMessage::GameStart { id: None } => {
                match self.registry.session_for(conn) {
                    Some(id) => self.on_game_start(conn, id),
                    None => self.send_error(conn, ServerError::new("Missing playerID")),
                }
                return;
            }
            other => other,
        };

        let Some(raw_id) = msg.session_id() else {
            self.send_error(conn, ServerError::new("Missing playerID"));
            return;
        };
        let Some(id) = PlayerId::from_uuid_str(raw_id).filter(|id| self.registry.contains(id)) else {
            debug!(connection = %conn, kind = msg.kind(), "Unknown session id");
            self.registry.send_to(conn, ServerMessage::Reset);
            return;
        };

        match msg {
            ClientMessage::Lobby { .. } => self.on_lobby(conn, id),
            ClientMessage::Chat { message, .. } => self.on_chat(id, &message),
            ClientMessage::GameStart { .. } => self.on_game_start(conn, id),
            ClientMessage::Move { direction, .. } => self.on_move(id, direction),
            ClientMessage::PlaceBomb { .. } => self.on_place_bomb(id),
            ClientMessage::LeaveGame { .. } => {
                info!(session = %id, "Session left the game");
                self.teardown(id);
            }
            ClientMessage::PageReload { page, .. } => self.on_page_reload(conn, id, page.as_deref()),
            ClientMessage::Join { .. } => {}
        }
    }

    fn on_join(&mut self, conn: ConnectionId, nickname: Option<&str>, known_id: Option<&str>) {
        if let Some(id) = known_id.and_then(PlayerId::from_uuid_str) {
            if let Some(session) = self.registry.get(&id) {
                let nickname = session.nickname.clone();
                self.registry.remap_handle(&id, conn);
                self.registry.send_to(conn, ServerMessage::PlayerExists { id, nickname });
                if matches!(self.state.status, GameStatus::Running | GameStatus::Ended) {
                    self.registry.send_to(conn, ServerMessage::GameStarted(self.snapshot()));
                }
                return;
            }
        }

        let seats = self.registry.seats();
        let nickname = match lobby::validate_join(&self.state, &seats, nickname) {
            Ok(nickname) => nickname,
            Err(e) => {
                debug!(connection = %conn, error = %e, "Join refused");
                let game_full = e == JoinError::GameFull;
                self.send_error(conn, ServerError { message: e.to_string(), game_full });
                return;
            }
        };

        let id = PlayerId::new_v4();
        self.registry.register(id, conn, nickname.clone());
        info!(session = %id, nickname = %nickname, sessions = self.registry.len(), "Session joined");
        self.registry.send_to(conn, ServerMessage::PlayerJoined { id, nickname });

        let seats = self.registry.seats();
        lobby::on_session_joined(&mut self.state, &seats);
    }

    fn on_lobby(&mut self, conn: ConnectionId, id: PlayerId) {
        let in_round = self.state.get_player(&id).map_or(false, |p| p.alive);

        match self.state.status {
            GameStatus::Running | GameStatus::Countdown if in_round => {
                self.registry.send_to(conn, ServerMessage::ForceGameRedirect);
            }
            GameStatus::Running | GameStatus::Ended => {
                self.registry.send_to(conn, ServerMessage::GameStarted(self.snapshot()));
            }
            _ => {
                self.registry.broadcast(&ServerMessage::LobbyUpdate(self.lobby_update()), None);
            }
        }
    }

    fn on_chat(&mut self, id: PlayerId, text: &str) {
        let Some(nickname) = self.registry.get(&id).map(|s| s.nickname.clone()) else {
            return;
        };
        if let Some(entry) = self.chat.post(&nickname, text) {
            self.registry.broadcast(&ServerMessage::Chat(entry), None);
        }
    }

    fn on_game_start(&mut self, conn: ConnectionId, id: PlayerId) {
        match lobby::acknowledge_start(&mut self.state, id) {
            AckOutcome::AlreadyRunning => {
                self.registry.send_to(conn, ServerMessage::GameStarted(self.snapshot()));
            }
            AckOutcome::Waiting { acked, needed } => {
                debug!(session = %id, acked, needed, "Start acknowledged");
            }
            AckOutcome::Started => {}
            AckOutcome::Ignored => {
                debug!(session = %id, status = ?self.state.status, "Start acknowledgement ignored");
            }
        }
    }

    fn on_move(&mut self, id: PlayerId, direction: Direction) {
        if let Err(e) = move_player(&mut self.state, id, direction) {
            debug!(player = %id, ?direction, reason = %e, "Move rejected");
        }
    }

    fn on_place_bomb(&mut self, id: PlayerId) {
        if let Err(e) = place_bomb(&mut self.state, id) {
            debug!(player = %id, reason = %e, "Bomb rejected");
        }
    }

    fn on_page_reload(&mut self, conn: ConnectionId, id: PlayerId, page: Option<&str>) {
        self.registry.remap_handle(&id, conn);
        debug!(session = %id, connection = %conn, page = page.unwrap_or("-"), "Session reconnected");

        let msg = match self.state.status {
            GameStatus::Running | GameStatus::Ended => ServerMessage::GameStarted(self.snapshot()),
            GameStatus::Waiting | GameStatus::Countdown => ServerMessage::LobbyUpdate(self.lobby_update()),
        };
        self.registry.send_to(conn, msg);
    }

    /// Drop a session for good: explicit leave or expired grace window.
    fn teardown(&mut self, id: PlayerId) {
        let Some(session) = self.registry.unregister(&id) else {
            return;
        };
        info!(session = %id, nickname = %session.nickname, sessions = self.registry.len(), "Session removed");

        if player::deactivate_player(&mut self.state, id) {
            lobby::check_round_end(&mut self.state);
        }
        let seats = self.registry.seats();
        lobby::on_session_left(&mut self.state, &seats);
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    fn send_error(&self, conn: ConnectionId, error: ServerError) {
        self.registry.send_to(conn, ServerMessage::Error(error));
    }

    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            map: self.state.map.clone(),
            players: self.state.players_by_slot(),
            chat_history: self.chat.history(),
        }
    }

    fn lobby_update(&self) -> LobbyUpdate {
        let players: Vec<String> = self.registry.seats().into_iter().map(|s| s.nickname).collect();
        LobbyUpdate {
            count: players.len(),
            game_full: players.len() >= self.state.config.max_players,
            players,
            chat_history: self.chat.history(),
        }
    }

    /// Turn pending game events into broadcasts.
    fn flush_events(&mut self) {
        for event in self.state.take_events() {
            let msg = match event.data {
                GameEventData::PlayerMoved { player_id, position, previous } => ServerMessage::PlayerMoved {
                    id: player_id,
                    position,
                    old_position: previous,
                },
                GameEventData::BombPlaced { bomb } => ServerMessage::BombPlaced { bomb },
                GameEventData::BombExploded { bomb_id, explosion, map, affected } => {
                    ServerMessage::Explosion(ExplosionReport {
                        bomb_id,
                        explosion,
                        updated_map: map,
                        players: affected,
                    })
                }
                GameEventData::PlayerUpdated { player } => ServerMessage::PlayerUpdate { player },
                GameEventData::PlayerEliminated { player_id, nickname } => {
                    ServerMessage::PlayerEliminated { id: player_id, nickname }
                }
                GameEventData::PowerUpCollected { power_up_id } => ServerMessage::PowerUpPickup { power_up_id },
                GameEventData::WaitingTimer { seconds_left } => ServerMessage::WaitingTimer { time_left: seconds_left },
                GameEventData::ReadyTimer { countdown } => ServerMessage::ReadyTimer { countdown },
                GameEventData::StartBarrier => ServerMessage::StartBarrier,
                GameEventData::RoundStarted => ServerMessage::GameStarted(self.snapshot()),
                GameEventData::RoundEnded { winner } => ServerMessage::GameEnded { winner },
                GameEventData::LobbyChanged => ServerMessage::LobbyUpdate(self.lobby_update()),
                GameEventData::RoundReset => {
                    self.chat.clear();
                    self.registry.broadcast(&ServerMessage::Reset, None);
                    let dropped = self.registry.unregister_all();
                    info!(sessions = dropped, "All sessions cleared after round");
                    continue;
                }
            };

            let delivered = self.registry.broadcast(&msg, None);
            trace!(tick = event.tick, delivered, "Broadcast");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
