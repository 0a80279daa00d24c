//! Time-Driven Effects
//!
//! The fixed-rate tick ages bomb fuses and explosion lifetimes; it is the
//! only place that does. Independent delays (lobby timers, respawn,
//! immunity, reset) come from the scheduler and are fired separately.

use std::time::Duration;

use tracing::trace;
use uuid::Uuid;

use crate::game::bomb::detonate;
use crate::game::lobby::{self, LobbySeat};
use crate::game::player::{clear_immunity, respawn_player};
use crate::game::schedule::TimerKind;
use crate::game::state::{GameState, GameStatus};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Bombs detonated this tick
    pub detonated: Vec<Uuid>,
    /// Explosions pruned this tick
    pub expired_explosions: usize,
    /// Whether the round ended this tick
    pub round_ended: bool,
}

/// Run one tick covering `dt` of elapsed time.
///
/// Does nothing outside `running`/`ended`.
pub fn tick(state: &mut GameState, dt: Duration) -> TickResult {
    let mut result = TickResult::default();

    if !matches!(state.status, GameStatus::Running | GameStatus::Ended) {
        return result;
    }

    // 1. Age explosions (before detonations so fresh blasts keep their full ttl)
    let before = state.explosions.len();
    for explosion in &mut state.explosions {
        explosion.ttl_remaining = explosion.ttl_remaining.saturating_sub(dt);
    }
    state.explosions.retain(|e| !e.ttl_remaining.is_zero());
    result.expired_explosions = before - state.explosions.len();

    // 2. Age fuses, collect due bombs in placement order
    let mut due = Vec::new();
    for bomb in &mut state.bombs {
        bomb.fuse_remaining = bomb.fuse_remaining.saturating_sub(dt);
        if bomb.fuse_remaining.is_zero() {
            due.push(bomb.id);
        }
    }

    // 3. Detonate
    for bomb_id in due {
        if detonate(state, bomb_id).is_some() {
            result.detonated.push(bomb_id);
        }
    }

    // 4. Advance tick
    state.tick += 1;

    // 5. End check
    let was_running = state.status == GameStatus::Running;
    lobby::check_round_end(state);
    result.round_ended = was_running && state.status == GameStatus::Ended;

    result
}

/// Fire every scheduled effect due at the state's clock.
///
/// Entries from an earlier round epoch are dropped. Returns how many fired.
pub fn fire_due_timers(state: &mut GameState, seats: &[LobbySeat]) -> usize {
    let mut fired = 0;

    while let Some(event) = state.timers.pop_due(state.now_ms) {
        if event.epoch != state.round {
            trace!(kind = ?event.kind, epoch = event.epoch, "Dropping stale timer");
            continue;
        }

        match event.kind {
            TimerKind::WaitingTick => lobby::on_waiting_tick(state, seats),
            TimerKind::CountdownTick => lobby::on_countdown_tick(state, seats),
            TimerKind::Respawn { player } => respawn_player(state, player),
            TimerKind::ImmunityClear { player } => clear_immunity(state, player),
            TimerKind::RoundReset => lobby::reset_round(state),
        }
        fired += 1;
    }

    fired
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::bomb::place_bomb;
    use crate::game::events::GameEventData;
    use crate::game::player::{admit_players, apply_life_loss};
    use crate::game::state::{GameMap, GridPos, PlayerId, Tile};

    const FRAME: Duration = Duration::from_micros(16_667);

    fn seats() -> Vec<LobbySeat> {
        vec![
            LobbySeat { id: PlayerId::from_bytes([1; 16]), nickname: "ann".into() },
            LobbySeat { id: PlayerId::from_bytes([2; 16]), nickname: "bob".into() },
        ]
    }

    fn running_state() -> GameState {
        let mut state = GameState::new(GameConfig::default(), 3);
        let mut map = GameMap::blank(15, 13);
        for x in 0..15 {
            map.set_tile(GridPos::new(x, 0), Tile::Wall);
            map.set_tile(GridPos::new(x, 12), Tile::Wall);
        }
        state.map = map;
        state.spawn_points = vec![GridPos::new(3, 3), GridPos::new(11, 9)];
        admit_players(&mut state, &seats());
        state.status = GameStatus::Running;
        state
    }

    #[test]
    fn test_tick_idle_outside_round() {
        let mut state = GameState::new(GameConfig::default(), 3);
        let result = tick(&mut state, FRAME);
        assert!(result.detonated.is_empty());
        assert_eq!(state.tick, 0);
    }

    #[test]
    fn test_fuse_runs_out_after_three_seconds() {
        let mut state = running_state();
        let ann = seats()[0].id;
        let bomb_id = place_bomb(&mut state, ann).unwrap();

        let mut detonated_at = None;
        for i in 1..=200 {
            let result = tick(&mut state, FRAME);
            if result.detonated.contains(&bomb_id) {
                detonated_at = Some(i);
                break;
            }
        }

        // 3000 ms at ~16.667 ms per frame
        assert_eq!(detonated_at, Some(180));
        assert!(state.bombs.is_empty());
        assert_eq!(state.explosions.len(), 1);
    }

    #[test]
    fn test_explosion_pruned_after_ttl() {
        let mut state = running_state();
        let ann = seats()[0].id;
        let bomb_id = place_bomb(&mut state, ann).unwrap();
        tick(&mut state, Duration::from_millis(3_000));
        assert_eq!(state.explosions.len(), 1);
        assert!(!state.bombs.iter().any(|b| b.id == bomb_id));

        tick(&mut state, Duration::from_millis(699));
        assert_eq!(state.explosions.len(), 1);
        let result = tick(&mut state, Duration::from_millis(1));
        assert_eq!(result.expired_explosions, 1);
        assert!(state.explosions.is_empty());
    }

    #[test]
    fn test_respawn_and_immunity_timers() {
        let mut state = running_state();
        let ann = seats()[0].id;
        state.get_player_mut(&ann).unwrap().position = Some(GridPos::new(5, 5));
        state.set_clock(1_000);
        apply_life_loss(&mut state, ann);

        state.set_clock(1_999);
        assert_eq!(fire_due_timers(&mut state, &seats()), 0);

        state.set_clock(2_000);
        assert_eq!(fire_due_timers(&mut state, &seats()), 1);
        let player = state.get_player(&ann).unwrap();
        assert_eq!(player.position, Some(GridPos::new(3, 3)));
        assert!(player.immune);

        state.set_clock(3_000);
        assert_eq!(fire_due_timers(&mut state, &seats()), 1);
        assert!(!state.get_player(&ann).unwrap().immune);
    }

    #[test]
    fn test_stale_timers_are_dropped_after_reset() {
        let mut state = running_state();
        let ann = seats()[0].id;
        apply_life_loss(&mut state, ann);
        let stale_epoch = state.round;

        state.status = GameStatus::Ended;
        lobby::reset_round(&mut state);
        // a late entry from the old round sneaks back in
        state.timers.schedule_at(0, stale_epoch, TimerKind::Respawn { player: ann });
        state.set_clock(10_000);

        assert_eq!(fire_due_timers(&mut state, &seats()), 0);
        assert!(state.players.is_empty());
    }

    #[test]
    fn test_reset_timer_wipes_round() {
        let mut state = running_state();
        let bob = seats()[1].id;
        crate::game::player::deactivate_player(&mut state, bob);

        let result = tick(&mut state, FRAME);
        assert!(result.round_ended);
        state.take_events();

        state.set_clock(state.now_ms + 5_000);
        fire_due_timers(&mut state, &seats());

        assert_eq!(state.status, GameStatus::Waiting);
        let events: Vec<_> = state.take_events().into_iter().map(|e| e.data).collect();
        assert_eq!(events, vec![GameEventData::RoundReset]);
    }
}
