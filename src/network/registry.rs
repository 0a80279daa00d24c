//! Connection Registry
//!
//! Maps durable session ids to live transport handles. Each connection
//! owns a bounded outbound queue drained by its writer task; sends never
//! wait on a slow consumer.
//!
//! A session whose transport closes stays registered for a grace window
//! so a reconnect with the same id can pick it up again.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::lobby::LobbySeat;
use crate::game::state::{ConnectionId, PlayerId};
use crate::network::protocol::ServerMessage;

/// Connection state for reconnection support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Bound to a live connection.
    Connected(ConnectionId),
    /// Transport closed, waiting for a reconnect.
    Disconnected {
        /// When the transport closed (logical ms).
        since_ms: u64,
        /// The connection that closed.
        last: ConnectionId,
    },
}

/// A registered session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Durable id.
    pub id: PlayerId,
    /// Display name.
    pub nickname: String,
    /// Transport binding.
    pub connection: ConnectionState,
    /// Registration order.
    joined_seq: u64,
}

impl Session {
    /// Check if the session has a live handle.
    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected(_))
    }
}

/// Sessions and their transport handles.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    sessions: BTreeMap<PlayerId, Session>,
    next_seq: u64,
    grace_ms: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry with the given reconnect grace window.
    pub fn new(grace_ms: u64) -> Self {
        Self {
            connections: BTreeMap::new(),
            sessions: BTreeMap::new(),
            next_seq: 0,
            grace_ms,
        }
    }

    // =========================================================================
    // TRANSPORT
    // =========================================================================

    /// Track a freshly opened connection.
    pub fn attach(&mut self, conn: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.connections.insert(conn, sender);
    }

    /// Forget a closed connection. Sessions bound to it enter their grace
    /// window; their ids are returned.
    pub fn detach(&mut self, conn: ConnectionId, now_ms: u64) -> Vec<PlayerId> {
        self.connections.remove(&conn);

        let mut orphaned = Vec::new();
        for session in self.sessions.values_mut() {
            if session.connection == ConnectionState::Connected(conn) {
                session.connection = ConnectionState::Disconnected { since_ms: now_ms, last: conn };
                orphaned.push(session.id);
            }
        }
        orphaned
    }

    /// Check if a connection is attached and its writer still runs.
    pub fn is_open(&self, conn: ConnectionId) -> bool {
        self.connections.get(&conn).map_or(false, |tx| !tx.is_closed())
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Register a new session on `conn`.
    pub fn register(&mut self, id: PlayerId, conn: ConnectionId, nickname: String) {
        let joined_seq = self.next_seq;
        self.next_seq += 1;
        self.sessions.insert(id, Session {
            id,
            nickname,
            connection: ConnectionState::Connected(conn),
            joined_seq,
        });
    }

    /// Remove a session.
    pub fn unregister(&mut self, id: &PlayerId) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Remove every session.
    pub fn unregister_all(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    /// Bind a session to a new connection. The old handle gets nothing further.
    pub fn remap_handle(&mut self, id: &PlayerId, conn: ConnectionId) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if session.connection != ConnectionState::Connected(conn) {
            debug!(session = %id, connection = %conn, "Session handle remapped");
        }
        session.connection = ConnectionState::Connected(conn);
        true
    }

    /// Look up a session.
    pub fn get(&self, id: &PlayerId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Check if a session is registered.
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Earliest-joined session bound to `conn`.
    pub fn session_for(&self, conn: ConnectionId) -> Option<PlayerId> {
        self.sessions
            .values()
            .filter(|s| s.connection == ConnectionState::Connected(conn))
            .min_by_key(|s| s.joined_seq)
            .map(|s| s.id)
    }

    /// Sessions in join order.
    pub fn seats(&self) -> Vec<LobbySeat> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.joined_seq);
        sessions
            .into_iter()
            .map(|s| LobbySeat { id: s.id, nickname: s.nickname.clone() })
            .collect()
    }

    /// Sessions whose grace window has run out at `now_ms`.
    pub fn expired(&self, now_ms: u64) -> Vec<PlayerId> {
        self.sessions
            .values()
            .filter(|s| match s.connection {
                ConnectionState::Disconnected { since_ms, .. } => now_ms.saturating_sub(since_ms) >= self.grace_ms,
                ConnectionState::Connected(_) => false,
            })
            .map(|s| s.id)
            .collect()
    }

    /// Earliest grace deadline among disconnected sessions.
    pub fn next_grace_deadline(&self) -> Option<u64> {
        self.sessions
            .values()
            .filter_map(|s| match s.connection {
                ConnectionState::Disconnected { since_ms, .. } => Some(since_ms + self.grace_ms),
                ConnectionState::Connected(_) => None,
            })
            .min()
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Queue a message on one connection. Returns false if it was not queued.
    pub fn send_to(&self, conn: ConnectionId, msg: ServerMessage) -> bool {
        let Some(tx) = self.connections.get(&conn) else {
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %conn, "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a message for every session with an open handle, once per
    /// connection. Returns how many connections it was queued on.
    pub fn broadcast(&self, msg: &ServerMessage, exclude: Option<ConnectionId>) -> usize {
        let targets: BTreeSet<ConnectionId> = self
            .sessions
            .values()
            .filter_map(|s| match s.connection {
                ConnectionState::Connected(conn) if Some(conn) != exclude => Some(conn),
                _ => None,
            })
            .collect();

        targets
            .into_iter()
            .filter(|conn| self.is_open(*conn))
            .filter(|conn| self.send_to(*conn, msg.clone()))
            .count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
