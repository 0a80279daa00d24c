//! Player Rules
//!
//! Admission at round start, grid movement with a speed-scaled cooldown,
//! power-up pickup, life loss with respawn/immunity and elimination.

use thiserror::Error;
use tracing::{debug, info};

use crate::game::events::GameEventData;
use crate::game::lobby::{self, LobbySeat};
use crate::game::schedule::TimerKind;
use crate::game::state::{Direction, GameState, GameStatus, GridPos, Player, PlayerId, PowerUpKind, Tile};

/// Why a move request was dropped. Rejections are silent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    /// Round is not running.
    #[error("round is not running")]
    NotRunning,
    /// No such player.
    #[error("unknown player")]
    UnknownPlayer,
    /// Player is eliminated.
    #[error("player is not alive")]
    NotAlive,
    /// Previous move was too recent.
    #[error("move cooldown active")]
    Cooldown,
    /// Target is outside the grid.
    #[error("target out of bounds")]
    OutOfBounds,
    /// Target holds a wall or a bomb.
    #[error("target blocked")]
    Blocked,
}

/// Result of applying damage to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeOutcome {
    /// Immune, eliminated or unknown; nothing changed.
    Ignored,
    /// Lost a life, respawn and immunity timers scheduled.
    Hit {
        /// Lives left.
        lives: u8,
    },
    /// Lost the last life.
    Eliminated,
}

// =============================================================================
// ADMISSION
// =============================================================================

/// Create a player record for each seat, in seat order, at its spawn corner.
pub fn admit_players(state: &mut GameState, seats: &[LobbySeat]) {
    state.players.clear();

    for (slot, seat) in seats.iter().enumerate().take(state.config.max_players) {
        let Some(spawn) = state.spawn_points.get(slot).copied() else {
            break;
        };
        let player = Player::new(seat.id, seat.nickname.clone(), slot, spawn, &state.config);
        state.players.insert(seat.id, player);
    }

    info!(players = state.players.len(), "Players admitted to round");
}

// =============================================================================
// MOVEMENT
// =============================================================================

/// Check if a player may stand on `pos`: in bounds, empty tile, no bomb.
pub fn is_walkable(state: &GameState, pos: GridPos) -> bool {
    state.map.tile(pos) == Some(Tile::Empty) && !state.bomb_at(pos)
}

/// Move one tile. On success returns the new position.
pub fn move_player(state: &mut GameState, id: PlayerId, direction: Direction) -> Result<GridPos, MoveRejection> {
    if state.status != GameStatus::Running {
        return Err(MoveRejection::NotRunning);
    }

    let now = state.now_ms;
    let base_cooldown = state.config.base_move_cooldown_ms;
    let player = state.players.get(&id).ok_or(MoveRejection::UnknownPlayer)?;
    let current = match (player.alive, player.position) {
        (true, Some(pos)) => pos,
        _ => return Err(MoveRejection::NotAlive),
    };

    if let Some(last) = player.last_move_ms {
        let elapsed = now.saturating_sub(last) as f64;
        if elapsed < player.move_cooldown_ms(base_cooldown) {
            return Err(MoveRejection::Cooldown);
        }
    }

    let target = current.step(direction);
    if !state.map.in_bounds(target) {
        return Err(MoveRejection::OutOfBounds);
    }
    if !is_walkable(state, target) {
        return Err(MoveRejection::Blocked);
    }

    if let Some(player) = state.players.get_mut(&id) {
        player.position = Some(target);
        player.last_move_ms = Some(now);
    }
    state.push_event(GameEventData::PlayerMoved { player_id: id, position: target, previous: current });

    if state.explosion_covers(target) {
        lose_life(state, id);
    }
    collect_power_up(state, id, target);

    Ok(target)
}

/// Apply the power-up lying on `pos`, if any, and remove it from the map.
fn collect_power_up(state: &mut GameState, id: PlayerId, pos: GridPos) {
    let Some(index) = state.map.power_up_at(pos) else {
        return;
    };
    let Some(player) = state.players.get_mut(&id) else {
        return;
    };
    if !player.alive {
        return;
    }

    let power_up = state.map.power_ups.remove(index);
    match power_up.kind {
        PowerUpKind::Bomb => player.bomb_count += 1,
        PowerUpKind::Flame => player.bomb_range += 1,
        PowerUpKind::Speed => player.speed = (player.speed * 1.25 * 100.0).round() / 100.0,
    }
    let snapshot = player.clone();

    debug!(player = %id, kind = ?power_up.kind, "Power-up collected");
    state.push_event(GameEventData::PowerUpCollected { power_up_id: power_up.id });
    state.push_event(GameEventData::PlayerUpdated { player: snapshot });
}

// =============================================================================
// DAMAGE
// =============================================================================

/// Take one life without running the end-of-round check.
///
/// Callers that damage several players at once check the round afterwards.
pub fn apply_life_loss(state: &mut GameState, id: PlayerId) -> LifeOutcome {
    let Some(player) = state.players.get_mut(&id) else {
        return LifeOutcome::Ignored;
    };
    if !player.alive || player.immune {
        return LifeOutcome::Ignored;
    }

    player.lives = player.lives.saturating_sub(1);
    player.immune = true;

    if player.lives == 0 {
        deactivate_player(state, id);
        return LifeOutcome::Eliminated;
    }

    let lives = player.lives;
    let snapshot = player.clone();
    state.push_event(GameEventData::PlayerUpdated { player: snapshot });

    let respawn_delay = state.config.respawn_delay_ms;
    let immunity = state.config.immunity_ms;
    state.schedule_in(respawn_delay, TimerKind::Respawn { player: id });
    state.schedule_in(immunity, TimerKind::ImmunityClear { player: id });

    debug!(player = %id, lives, "Player hit");
    LifeOutcome::Hit { lives }
}

/// Take one life; runs the end-of-round check on elimination.
pub fn lose_life(state: &mut GameState, id: PlayerId) -> LifeOutcome {
    let outcome = apply_life_loss(state, id);
    if outcome == LifeOutcome::Eliminated {
        lobby::check_round_end(state);
    }
    outcome
}

/// Remove a player from play, ignoring immunity. Returns false if already out.
///
/// Does not run the end-of-round check.
pub fn deactivate_player(state: &mut GameState, id: PlayerId) -> bool {
    let Some(player) = state.players.get_mut(&id) else {
        return false;
    };
    if !player.alive {
        return false;
    }

    player.alive = false;
    player.lives = 0;
    player.immune = false;
    player.position = None;
    let nickname = player.nickname.clone();

    info!(player = %id, nickname = %nickname, "Player eliminated");
    state.push_event(GameEventData::PlayerEliminated { player_id: id, nickname });
    true
}

/// Return a hit player to their spawn corner. No-op if eliminated meanwhile.
pub fn respawn_player(state: &mut GameState, id: PlayerId) {
    let Some(player) = state.players.get(&id) else {
        return;
    };
    if !player.alive {
        return;
    }
    let Some(spawn) = state.spawn_points.get(player.slot).copied() else {
        return;
    };

    if let Some(player) = state.players.get_mut(&id) {
        player.position = Some(spawn);
        let snapshot = player.clone();
        state.push_event(GameEventData::PlayerUpdated { player: snapshot });
    }
}

/// End the immunity window.
pub fn clear_immunity(state: &mut GameState, id: PlayerId) {
    let Some(player) = state.players.get_mut(&id) else {
        return;
    };
    if !player.alive || !player.immune {
        return;
    }
    player.immune = false;
    let snapshot = player.clone();
    state.push_event(GameEventData::PlayerUpdated { player: snapshot });
}

// =============================================================================
// TESTS
// =============================================================================
