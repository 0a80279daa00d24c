//! Lobby Coordinator
//!
//! Round lifecycle: `waiting -> countdown -> running -> ended -> waiting`.
//!
//! - The waiting timer starts with the second session and counts down
//!   once per second.
//! - The countdown generates the round's map and, at zero, admits the
//!   players and raises the start barrier.
//! - The round runs once every alive player has acknowledged the barrier.
//! - The end-of-round check announces the winner and schedules the reset.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::rng::{derive_round_seed, DeterministicRng};
use crate::game::events::GameEventData;
use crate::game::map::{generate_map, spawn_corners};
use crate::game::player::admit_players;
use crate::game::schedule::TimerKind;
use crate::game::state::{GameMap, GameState, GameStatus, PlayerId};

/// A registered session as seen by the lobby, in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySeat {
    /// Durable session id.
    pub id: PlayerId,
    /// Display name.
    pub nickname: String,
}

/// Lobby timers and the start barrier.
#[derive(Debug, Clone, Default)]
pub struct LobbyState {
    /// Seconds left on the waiting timer, when running.
    pub waiting_left: Option<u32>,
    /// Seconds left on the countdown, when running.
    pub countdown_left: Option<u32>,
    /// Players that acknowledged the start barrier.
    pub ready: BTreeSet<PlayerId>,
    /// Seed of the current round's map.
    pub round_seed: Option<u64>,
}

/// Why a join was refused. The message is what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Round already under way.
    #[error("Game has already started")]
    GameInProgress,
    /// Lobby is at capacity.
    #[error("Game is full")]
    GameFull,
    /// No usable nickname given.
    #[error("Nickname missing")]
    NicknameMissing,
    /// Another session uses this nickname (case-insensitive).
    #[error("Nickname already taken")]
    NicknameTaken,
}

/// Result of a start acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Not in the barrier phase or not a player.
    Ignored,
    /// Recorded, more acknowledgements needed.
    Waiting {
        /// Acknowledged so far.
        acked: usize,
        /// Needed to start.
        needed: usize,
    },
    /// This acknowledgement started the round.
    Started,
    /// Round already running; the sender needs a fresh snapshot.
    AlreadyRunning,
}

// =============================================================================
// ADMISSION
// =============================================================================

/// Validate a join request. Returns the trimmed nickname.
pub fn validate_join(state: &GameState, seats: &[LobbySeat], nickname: Option<&str>) -> Result<String, JoinError> {
    if state.status != GameStatus::Waiting {
        return Err(JoinError::GameInProgress);
    }
    if seats.len() >= state.config.max_players {
        return Err(JoinError::GameFull);
    }

    let nickname = nickname.map(str::trim).unwrap_or_default();
    if nickname.is_empty() {
        return Err(JoinError::NicknameMissing);
    }

    let wanted = nickname.to_lowercase();
    if seats.iter().any(|s| s.nickname.trim().to_lowercase() == wanted) {
        return Err(JoinError::NicknameTaken);
    }

    Ok(nickname.to_string())
}

/// React to a new session. `seats` already includes it.
pub fn on_session_joined(state: &mut GameState, seats: &[LobbySeat]) {
    state.push_event(GameEventData::LobbyChanged);

    if state.status != GameStatus::Waiting {
        return;
    }

    if seats.len() >= state.config.max_players {
        enter_countdown(state, seats);
    } else if seats.len() >= state.config.min_players && state.lobby.waiting_left.is_none() {
        let secs = state.config.waiting_secs;
        state.lobby.waiting_left = Some(secs);
        state.push_event(GameEventData::WaitingTimer { seconds_left: secs });
        state.schedule_in(1_000, TimerKind::WaitingTick);
        debug!(sessions = seats.len(), "Waiting timer started");
    }
}

/// React to a session leaving. `seats` no longer includes it.
pub fn on_session_left(state: &mut GameState, seats: &[LobbySeat]) {
    match state.status {
        GameStatus::Waiting => {
            if seats.len() < state.config.min_players {
                cancel_waiting(state);
            }
            state.push_event(GameEventData::LobbyChanged);
        }
        GameStatus::Countdown => {
            if state.lobby.countdown_left.is_some() {
                if seats.len() < state.config.min_players {
                    cancel_countdown(state);
                }
                state.push_event(GameEventData::LobbyChanged);
            } else {
                // barrier phase: the leaver may have been the last one missing
                try_complete_barrier(state);
            }
        }
        GameStatus::Running | GameStatus::Ended => {}
    }
}

// =============================================================================
// TIMERS
// =============================================================================

/// One second of the waiting timer elapsed.
pub fn on_waiting_tick(state: &mut GameState, seats: &[LobbySeat]) {
    let Some(left) = state.lobby.waiting_left else {
        return;
    };
    if state.status != GameStatus::Waiting {
        return;
    }
    if seats.len() < state.config.min_players {
        cancel_waiting(state);
        return;
    }

    let left = left.saturating_sub(1);
    if left == 0 || seats.len() >= state.config.max_players {
        enter_countdown(state, seats);
        return;
    }

    state.lobby.waiting_left = Some(left);
    state.push_event(GameEventData::WaitingTimer { seconds_left: left });
    state.schedule_in(1_000, TimerKind::WaitingTick);
}

/// One second of the countdown elapsed.
pub fn on_countdown_tick(state: &mut GameState, seats: &[LobbySeat]) {
    let Some(left) = state.lobby.countdown_left else {
        return;
    };
    if state.status != GameStatus::Countdown {
        return;
    }
    if seats.len() < state.config.min_players {
        cancel_countdown(state);
        return;
    }

    let left = left.saturating_sub(1);
    state.push_event(GameEventData::ReadyTimer { countdown: Some(left) });

    if left > 0 {
        state.lobby.countdown_left = Some(left);
        state.schedule_in(1_000, TimerKind::CountdownTick);
        return;
    }

    state.lobby.countdown_left = None;
    admit_players(state, seats);
    state.push_event(GameEventData::StartBarrier);
    info!(round = state.round, players = state.players.len(), "Countdown finished, waiting for clients");
}

fn cancel_waiting(state: &mut GameState) {
    if state.lobby.waiting_left.take().is_some() {
        state.timers.cancel(|k| *k == TimerKind::WaitingTick);
        debug!("Waiting timer cancelled");
    }
}

fn enter_countdown(state: &mut GameState, seats: &[LobbySeat]) {
    cancel_waiting(state);

    let mut ids: Vec<[u8; 16]> = seats.iter().map(|s| *s.id.as_bytes()).collect();
    ids.sort_unstable();
    let seed = derive_round_seed(state.server_seed, state.round, &ids);
    state.rng = DeterministicRng::new(seed);
    state.lobby.round_seed = Some(seed);

    state.status = GameStatus::Countdown;
    state.map = generate_map(&state.config, &mut state.rng);
    state.spawn_points = spawn_corners(state.config.map_width, state.config.map_height).to_vec();
    state.power_up_budget = state.config.power_up_supply;
    state.lobby.ready.clear();

    let secs = state.config.countdown_secs;
    state.lobby.countdown_left = Some(secs);
    state.push_event(GameEventData::ReadyTimer { countdown: Some(secs) });
    state.schedule_in(1_000, TimerKind::CountdownTick);

    info!(
        round = state.round,
        sessions = seats.len(),
        seed = %hex::encode(seed.to_be_bytes()),
        "Countdown started"
    );
}

fn cancel_countdown(state: &mut GameState) {
    state.timers.cancel(|k| *k == TimerKind::CountdownTick);
    state.status = GameStatus::Waiting;
    state.lobby = Default::default();
    state.players.clear();
    state.map = GameMap::default();
    state.spawn_points.clear();

    state.push_event(GameEventData::ReadyTimer { countdown: None });
    info!(round = state.round, "Countdown cancelled, back to waiting");
}

// =============================================================================
// START BARRIER
// =============================================================================

/// Record a start acknowledgement.
pub fn acknowledge_start(state: &mut GameState, id: PlayerId) -> AckOutcome {
    match state.status {
        GameStatus::Running => return AckOutcome::AlreadyRunning,
        GameStatus::Countdown if state.lobby.countdown_left.is_none() => {}
        _ => return AckOutcome::Ignored,
    }
    if !state.get_player(&id).map_or(false, |p| p.alive) {
        return AckOutcome::Ignored;
    }

    state.lobby.ready.insert(id);
    if try_complete_barrier(state) {
        return AckOutcome::Started;
    }

    AckOutcome::Waiting {
        acked: state.lobby.ready.len(),
        needed: state.alive_count(),
    }
}

/// Start the round if every alive player has acknowledged.
fn try_complete_barrier(state: &mut GameState) -> bool {
    if state.status != GameStatus::Countdown || state.lobby.countdown_left.is_some() || state.players.is_empty() {
        return false;
    }
    let ready = &state.lobby.ready;
    if !state.alive_players().all(|p| ready.contains(&p.id)) {
        return false;
    }

    state.status = GameStatus::Running;
    state.push_event(GameEventData::RoundStarted);
    info!(round = state.round, players = state.alive_count(), "Round started");

    check_round_end(state);
    true
}

// =============================================================================
// END OF ROUND
// =============================================================================

/// End the round if at most one player is alive. Only acts while running.
pub fn check_round_end(state: &mut GameState) -> bool {
    if state.status != GameStatus::Running {
        return false;
    }

    let (first, more) = {
        let mut alive = state.alive_players();
        (alive.next().map(|p| p.nickname.clone()), alive.next().is_some())
    };
    if more {
        return false;
    }

    state.status = GameStatus::Ended;
    info!(round = state.round, winner = ?first, "Round ended");
    state.push_event(GameEventData::RoundEnded { winner: first });

    let delay = state.config.reset_delay_ms;
    state.schedule_in(delay, TimerKind::RoundReset);
    true
}

/// Wipe the finished round and return to waiting.
pub fn reset_round(state: &mut GameState) {
    if state.status != GameStatus::Ended {
        return;
    }
    state.reset();
    state.push_event(GameEventData::RoundReset);
    info!(round = state.round, "Round reset");
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn seats(n: u8) -> Vec<LobbySeat> {
        (1..=n)
            .map(|i| LobbySeat { id: PlayerId::from_bytes([i; 16]), nickname: format!("p{}", i) })
            .collect()
    }

    fn data(state: &mut GameState) -> Vec<GameEventData> {
        state.take_events().into_iter().map(|e| e.data).collect()
    }

    #[test]
    fn test_validate_join() {
        let mut state = GameState::new(GameConfig::default(), 1);
        let current = seats(2);

        assert_eq!(validate_join(&state, &current, Some("  zed ")), Ok("zed".to_string()));
        assert_eq!(validate_join(&state, &current, None), Err(JoinError::NicknameMissing));
        assert_eq!(validate_join(&state, &current, Some("   ")), Err(JoinError::NicknameMissing));
        assert_eq!(validate_join(&state, &current, Some("P1")), Err(JoinError::NicknameTaken));
        assert_eq!(validate_join(&state, &seats(4), Some("zed")), Err(JoinError::GameFull));

        state.status = GameStatus::Running;
        assert_eq!(validate_join(&state, &current, Some("zed")), Err(JoinError::GameInProgress));
    }

    #[test]
    fn test_join_error_text() {
        assert_eq!(JoinError::GameFull.to_string(), "Game is full");
        assert_eq!(JoinError::NicknameTaken.to_string(), "Nickname already taken");
    }

    #[test]
    fn test_second_join_starts_waiting_timer() {
        let mut state = GameState::new(GameConfig::default(), 1);

        on_session_joined(&mut state, &seats(1));
        assert!(state.lobby.waiting_left.is_none());

        on_session_joined(&mut state, &seats(2));
        assert_eq!(state.lobby.waiting_left, Some(20));
        assert!(data(&mut state).contains(&GameEventData::WaitingTimer { seconds_left: 20 }));
        assert_eq!(state.timers.next_due(), Some(1_000));
    }

    #[test]
    fn test_waiting_timer_cancelled_below_minimum() {
        let mut state = GameState::new(GameConfig::default(), 1);
        on_session_joined(&mut state, &seats(2));

        on_session_left(&mut state, &seats(1));

        assert!(state.lobby.waiting_left.is_none());
        assert!(state.timers.is_empty());
        assert_eq!(state.status, GameStatus::Waiting);
    }

    #[test]
    fn test_waiting_timer_runs_out_into_countdown() {
        let mut state = GameState::new(GameConfig::default(), 1);
        let two = seats(2);
        on_session_joined(&mut state, &two);

        for _ in 0..19 {
            on_waiting_tick(&mut state, &two);
        }
        assert_eq!(state.lobby.waiting_left, Some(1));
        assert_eq!(state.status, GameStatus::Waiting);

        on_waiting_tick(&mut state, &two);
        assert_eq!(state.status, GameStatus::Countdown);
        assert_eq!(state.lobby.countdown_left, Some(10));
        assert_eq!((state.map.width, state.map.height), (15, 13));
    }

    #[test]
    fn test_fourth_join_skips_waiting() {
        let mut state = GameState::new(GameConfig::default(), 1);
        for n in 1..=4 {
            on_session_joined(&mut state, &seats(n));
        }

        assert_eq!(state.status, GameStatus::Countdown);
        assert!(state.lobby.waiting_left.is_none());
        assert!(!state.timers.contains(|k| *k == TimerKind::WaitingTick));
        assert!(data(&mut state).contains(&GameEventData::ReadyTimer { countdown: Some(10) }));
    }

    #[test]
    fn test_countdown_to_barrier_to_running() {
        let mut state = GameState::new(GameConfig::default(), 1);
        let two = seats(2);
        on_session_joined(&mut state, &two);
        state.lobby.waiting_left = Some(1);
        on_waiting_tick(&mut state, &two);
        state.take_events();

        for _ in 0..10 {
            on_countdown_tick(&mut state, &two);
        }

        let events = data(&mut state);
        assert_eq!(events.first(), Some(&GameEventData::ReadyTimer { countdown: Some(9) }));
        assert!(events.contains(&GameEventData::ReadyTimer { countdown: Some(0) }));
        assert_eq!(events.last(), Some(&GameEventData::StartBarrier));
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.status, GameStatus::Countdown);

        assert_eq!(acknowledge_start(&mut state, two[0].id), AckOutcome::Waiting { acked: 1, needed: 2 });
        assert_eq!(acknowledge_start(&mut state, two[0].id), AckOutcome::Waiting { acked: 1, needed: 2 });
        assert_eq!(acknowledge_start(&mut state, two[1].id), AckOutcome::Started);
        assert_eq!(state.status, GameStatus::Running);
        assert_eq!(acknowledge_start(&mut state, two[1].id), AckOutcome::AlreadyRunning);
    }

    #[test]
    fn test_countdown_cancelled_when_sessions_drop() {
        let mut state = GameState::new(GameConfig::default(), 1);
        let two = seats(2);
        on_session_joined(&mut state, &two);
        state.lobby.waiting_left = Some(1);
        on_waiting_tick(&mut state, &two);
        state.take_events();

        on_countdown_tick(&mut state, &seats(1));

        assert_eq!(state.status, GameStatus::Waiting);
        assert!(state.players.is_empty());
        assert!(data(&mut state).contains(&GameEventData::ReadyTimer { countdown: None }));
        assert!(!state.timers.contains(|k| *k == TimerKind::CountdownTick));
    }

    #[test]
    fn test_round_seed_varies_by_round() {
        let mut state = GameState::new(GameConfig::default(), 42);
        on_session_joined(&mut state, &seats(4));
        let first = state.lobby.round_seed;

        state.status = GameStatus::Ended;
        reset_round(&mut state);
        on_session_joined(&mut state, &seats(4));

        assert!(first.is_some());
        assert_ne!(first, state.lobby.round_seed);
    }

    #[test]
    fn test_end_check_only_while_running() {
        let mut state = GameState::new(GameConfig::default(), 1);
        assert!(!check_round_end(&mut state));
        assert_eq!(state.status, GameStatus::Waiting);
    }

    #[test]
    fn test_round_end_schedules_reset() {
        let mut state = GameState::new(GameConfig::default(), 1);
        let two = seats(2);
        on_session_joined(&mut state, &two);
        state.lobby.waiting_left = Some(1);
        on_waiting_tick(&mut state, &two);
        state.lobby.countdown_left = Some(1);
        on_countdown_tick(&mut state, &two);
        acknowledge_start(&mut state, two[0].id);
        acknowledge_start(&mut state, two[1].id);
        state.set_clock(10_000);

        crate::game::player::deactivate_player(&mut state, two[1].id);
        assert!(check_round_end(&mut state));
        assert_eq!(state.status, GameStatus::Ended);
        assert!(data(&mut state).contains(&GameEventData::RoundEnded { winner: Some("p1".into()) }));
        assert!(state.timers.contains(|k| *k == TimerKind::RoundReset));

        reset_round(&mut state);
        assert_eq!(state.status, GameStatus::Waiting);
        assert!(state.players.is_empty());
        assert_eq!(data(&mut state).last(), Some(&GameEventData::RoundReset));
    }
}
