//! Bomb Resolution
//!
//! Placement validation and detonation: the four-way blast walk,
//! destructible wall removal, power-up drops and player damage.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::game::events::GameEventData;
use crate::game::lobby;
use crate::game::player::apply_life_loss;
use crate::game::state::{
    Bomb, Direction, Explosion, ExplosionTile, GameMap, GameState, GameStatus, GridPos, PlayerId, PowerUp, Tile,
};

/// Why a bomb request was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BombRejection {
    /// Round is not running.
    #[error("round is not running")]
    NotRunning,
    /// No such player.
    #[error("unknown player")]
    UnknownPlayer,
    /// Player is eliminated.
    #[error("player is not alive")]
    NotAlive,
    /// Player already has `bomb_count` live bombs.
    #[error("bomb limit reached")]
    LimitReached,
    /// A bomb already sits on this tile.
    #[error("tile already holds a bomb")]
    Occupied,
}

// =============================================================================
// PLACEMENT
// =============================================================================

/// Place a bomb on the player's tile with the player's current range.
pub fn place_bomb(state: &mut GameState, id: PlayerId) -> Result<Uuid, BombRejection> {
    if state.status != GameStatus::Running {
        return Err(BombRejection::NotRunning);
    }

    let player = state.players.get(&id).ok_or(BombRejection::UnknownPlayer)?;
    let position = match (player.alive, player.position) {
        (true, Some(pos)) => pos,
        _ => return Err(BombRejection::NotAlive),
    };
    if state.bombs_owned_by(&id) >= player.bomb_count as usize {
        return Err(BombRejection::LimitReached);
    }
    if state.bomb_at(position) {
        return Err(BombRejection::Occupied);
    }

    let fuse = state.config.bomb_fuse_ms;
    let bomb = Bomb {
        id: Uuid::new_v4(),
        owner_id: id,
        position,
        timer: fuse,
        range: player.bomb_range,
        fuse_remaining: Duration::from_millis(fuse),
    };
    let bomb_id = bomb.id;

    debug!(player = %id, bomb = %bomb_id, x = position.x, y = position.y, "Bomb placed");
    state.bombs.push(bomb.clone());
    state.push_event(GameEventData::BombPlaced { bomb });

    Ok(bomb_id)
}

// =============================================================================
// DETONATION
// =============================================================================

/// Tiles covered by a blast of `range` from `origin`, center first.
///
/// Walks right, left, down, up. Walls stop the walk and are excluded;
/// destructible walls are included and stop the walk. Reads `map` only.
pub fn blast_tiles(map: &GameMap, origin: GridPos, range: u32) -> Vec<ExplosionTile> {
    let mut tiles = vec![ExplosionTile { x: origin.x, y: origin.y, dx: 0, dy: 0, distance: 0 }];

    for direction in Direction::ALL {
        let (dx, dy) = direction.delta();
        for distance in 1..=range {
            let pos = origin.offset(dx, dy, distance as i32);
            match map.tile(pos) {
                None | Some(Tile::Wall) => break,
                Some(tile) => {
                    tiles.push(ExplosionTile { x: pos.x, y: pos.y, dx, dy, distance });
                    if tile == Tile::Destructible {
                        break;
                    }
                }
            }
        }
    }

    tiles
}

/// Detonate a live bomb. Returns the explosion id, or `None` if the bomb
/// is already gone.
pub fn detonate(state: &mut GameState, bomb_id: Uuid) -> Option<Uuid> {
    let index = state.bombs.iter().position(|b| b.id == bomb_id)?;
    let bomb = state.bombs.remove(index);

    let tiles = blast_tiles(&state.map, bomb.position, bomb.range);

    for tile in &tiles {
        let pos = tile.position();
        if state.map.tile(pos) == Some(Tile::Destructible) {
            state.map.set_tile(pos, Tile::Empty);
            maybe_drop_power_up(state, pos);
        }
    }

    let explosion = Explosion {
        id: Uuid::new_v4(),
        tiles,
        ttl_remaining: Duration::from_millis(state.config.explosion_ttl_ms),
    };
    let explosion_id = explosion.id;

    let hit: BTreeSet<PlayerId> = state
        .alive_players()
        .filter(|p| p.position.map_or(false, |pos| explosion.covers(pos)))
        .map(|p| p.id)
        .collect();
    for id in &hit {
        apply_life_loss(state, *id);
    }

    let affected = hit.iter().filter_map(|id| state.get_player(id).cloned()).collect();
    debug!(bomb = %bomb_id, tiles = explosion.tiles.len(), hit = hit.len(), "Bomb detonated");

    state.explosions.push(explosion.clone());
    state.push_event(GameEventData::BombExploded {
        bomb_id,
        explosion,
        map: state.map.clone(),
        affected,
    });

    lobby::check_round_end(state);
    Some(explosion_id)
}

/// Roll for a power-up on a freshly cleared tile.
fn maybe_drop_power_up(state: &mut GameState, pos: GridPos) {
    let available = state.power_up_budget.available();
    if available.is_empty() {
        return;
    }
    if !state.rng.chance_percent(state.config.power_up_drop_percent) {
        return;
    }
    let Some(kind) = state.rng.choose(&available).copied() else {
        return;
    };
    if !state.power_up_budget.take(kind) {
        return;
    }

    trace!(?kind, x = pos.x, y = pos.y, "Power-up dropped");
    state.map.power_ups.push(PowerUp { id: Uuid::new_v4(), kind, x: pos.x, y: pos.y });
}

// =============================================================================
// TESTS
// =============================================================================
