//! Game Events
//!
//! Events generated by the game modules. The session drains them after
//! every operation and turns them into protocol broadcasts, in emission order.

use uuid::Uuid;

use crate::game::state::{Bomb, Explosion, GameMap, GridPos, Player, PlayerId};

/// Game event data.
#[derive(Clone, Debug, PartialEq)]
pub enum GameEventData {
    /// A player stepped to a new tile.
    PlayerMoved {
        player_id: PlayerId,
        position: GridPos,
        previous: GridPos,
    },

    /// A bomb was placed.
    BombPlaced {
        bomb: Bomb,
    },

    /// A bomb detonated. Carries snapshots taken after the map mutation.
    BombExploded {
        bomb_id: Uuid,
        explosion: Explosion,
        map: GameMap,
        affected: Vec<Player>,
    },

    /// A player's visible stats changed (lives, immunity, position, power-ups).
    PlayerUpdated {
        player: Player,
    },

    /// A player ran out of lives or left the round.
    PlayerEliminated {
        player_id: PlayerId,
        nickname: String,
    },

    /// A player picked up a power-up.
    PowerUpCollected {
        power_up_id: Uuid,
    },

    /// Waiting timer ticked.
    WaitingTimer {
        seconds_left: u32,
    },

    /// Countdown ticked. `None` means the countdown was cancelled.
    ReadyTimer {
        countdown: Option<u32>,
    },

    /// Countdown finished; clients must acknowledge before play begins.
    StartBarrier,

    /// Every player acknowledged; the round is running.
    RoundStarted,

    /// Round finished.
    RoundEnded {
        winner: Option<String>,
    },

    /// State was wiped after a finished round.
    RoundReset,

    /// Lobby membership or timers changed.
    LobbyChanged,
}

/// A game event with its tick.
#[derive(Clone, Debug, PartialEq)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_keeps_tick() {
        let id = PlayerId::from_bytes([4; 16]);
        let event = GameEvent::new(
            9,
            GameEventData::PlayerEliminated { player_id: id, nickname: "bo".into() },
        );
        assert_eq!(event.tick, 9);
        assert!(matches!(event.data, GameEventData::PlayerEliminated { player_id, .. } if player_id == id));
    }
}
