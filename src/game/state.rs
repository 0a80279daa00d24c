//! Game State Definitions
//!
//! All state types for a round: the tile map, players, bombs,
//! explosions, power-ups and the round status.
//! Players live in a BTreeMap so iteration order is stable.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::core::rng::DeterministicRng;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::lobby::LobbyState;
use crate::game::schedule::{Scheduler, TimerKind};

// =============================================================================
// IDS
// =============================================================================

/// Durable session/player identifier (UUID).
///
/// The same id names the lobby session and, once a round starts,
/// the player record. It survives reconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Generate a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// =============================================================================
// GRID
// =============================================================================

/// A tile coordinate. `x` grows right, `y` grows down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset by a direction vector and distance.
    pub fn offset(self, dx: i32, dy: i32, distance: i32) -> Self {
        Self::new(self.x + dx * distance, self.y + dy * distance)
    }

    /// Neighbouring tile in `direction`.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy, 1)
    }
}

/// Movement direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// y - 1
    Up,
    /// y + 1
    Down,
    /// x - 1
    Left,
    /// x + 1
    Right,
}

impl Direction {
    /// All four cardinal directions, in blast walk order.
    pub const ALL: [Direction; 4] = [Direction::Right, Direction::Left, Direction::Down, Direction::Up];

    /// Unit vector for this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Map tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tile {
    /// Walkable floor.
    #[serde(rename = "empty")]
    Empty,
    /// Indestructible wall. Never mutated.
    #[serde(rename = "wall")]
    Wall,
    /// Destructible wall. Becomes `Empty` when caught in a blast.
    #[serde(rename = "destructible-wall")]
    Destructible,
}

// =============================================================================
// POWER-UPS
// =============================================================================

/// Power-up type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUpKind {
    /// +1 simultaneous bomb.
    Bomb,
    /// +1 blast range.
    Flame,
    /// Speed x1.25.
    Speed,
}

/// A power-up lying on the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerUp {
    /// Unique id.
    pub id: Uuid,
    /// What it grants.
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl PowerUp {
    /// Tile this power-up occupies.
    pub fn position(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

/// Remaining global supply per power-up type. Only ever decreases within a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUpBudget {
    /// Bomb power-ups left.
    pub bomb: u32,
    /// Flame power-ups left.
    pub flame: u32,
    /// Speed power-ups left.
    pub speed: u32,
}

impl Default for PowerUpBudget {
    fn default() -> Self {
        Self { bomb: 4, flame: 4, speed: 2 }
    }
}

impl PowerUpBudget {
    /// Types with supply left, in a fixed order.
    pub fn available(&self) -> Vec<PowerUpKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.bomb > 0 {
            kinds.push(PowerUpKind::Bomb);
        }
        if self.flame > 0 {
            kinds.push(PowerUpKind::Flame);
        }
        if self.speed > 0 {
            kinds.push(PowerUpKind::Speed);
        }
        kinds
    }

    /// Consume one unit of `kind`. Returns false if none was left.
    pub fn take(&mut self, kind: PowerUpKind) -> bool {
        let slot = match kind {
            PowerUpKind::Bomb => &mut self.bomb,
            PowerUpKind::Flame => &mut self.flame,
            PowerUpKind::Speed => &mut self.speed,
        };
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    /// Total units left across all types.
    pub fn total(&self) -> u32 {
        self.bomb + self.flame + self.speed
    }
}

// =============================================================================
// MAP
// =============================================================================

/// Tile grid plus the power-ups lying on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
    /// Rows of tiles, indexed `tiles[y][x]`.
    pub tiles: Vec<Vec<Tile>>,
    /// Power-ups currently on the map.
    #[serde(rename = "powerUps")]
    pub power_ups: Vec<PowerUp>,
}

impl Default for GameMap {
    fn default() -> Self {
        Self::blank(0, 0)
    }
}

impl GameMap {
    /// A map of the given size with every tile empty.
    pub fn blank(width: i32, height: i32) -> Self {
        let row = vec![Tile::Empty; width.max(0) as usize];
        Self {
            width,
            height,
            tiles: vec![row; height.max(0) as usize],
            power_ups: Vec::new(),
        }
    }

    /// Check if a position lies on the grid.
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    /// Tile at a position, `None` when out of bounds.
    pub fn tile(&self, pos: GridPos) -> Option<Tile> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.tiles
            .get(pos.y as usize)
            .and_then(|row| row.get(pos.x as usize))
            .copied()
    }

    /// Overwrite a tile. Out-of-bounds writes are ignored.
    pub fn set_tile(&mut self, pos: GridPos, tile: Tile) {
        if !self.in_bounds(pos) {
            return;
        }
        if let Some(cell) = self.tiles.get_mut(pos.y as usize).and_then(|row| row.get_mut(pos.x as usize)) {
            *cell = tile;
        }
    }

    /// Index of the power-up lying on `pos`, if any.
    pub fn power_up_at(&self, pos: GridPos) -> Option<usize> {
        self.power_ups.iter().position(|p| p.position() == pos)
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player in the round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Durable id (same as the session id).
    pub id: PlayerId,
    /// Display name.
    pub nickname: String,
    /// Avatar name, derived from the spawn slot ("player1".."player4").
    pub avatar: String,
    /// Spawn slot (0..4). Decides the respawn corner.
    #[serde(skip)]
    pub slot: usize,
    /// Remaining lives, 0..=3.
    pub lives: u8,
    /// Still in the round?
    pub alive: bool,
    /// Life loss suspended while true.
    pub immune: bool,
    /// Current tile. `None` once eliminated.
    pub position: Option<GridPos>,
    /// Movement speed multiplier.
    pub speed: f64,
    /// Simultaneous bombs allowed.
    pub bomb_count: u32,
    /// Blast range of placed bombs.
    pub bomb_range: u32,
    /// Logical time of the last accepted move.
    #[serde(skip)]
    pub last_move_ms: Option<u64>,
}

impl Player {
    /// Create a new player at a spawn position.
    pub fn new(id: PlayerId, nickname: String, slot: usize, position: GridPos, config: &GameConfig) -> Self {
        Self {
            id,
            nickname,
            avatar: format!("player{}", slot + 1),
            slot,
            lives: config.starting_lives,
            alive: true,
            immune: false,
            position: Some(position),
            speed: config.starting_speed,
            bomb_count: config.starting_bomb_count,
            bomb_range: config.starting_bomb_range,
            last_move_ms: None,
        }
    }

    /// Movement cooldown at the current speed.
    pub fn move_cooldown_ms(&self, base_cooldown_ms: f64) -> f64 {
        if self.speed <= 0.0 {
            return f64::INFINITY;
        }
        base_cooldown_ms / self.speed
    }
}

// =============================================================================
// BOMBS AND EXPLOSIONS
// =============================================================================

/// A live bomb.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bomb {
    /// Unique id.
    pub id: Uuid,
    /// Player who placed it.
    pub owner_id: PlayerId,
    /// Tile it sits on.
    pub position: GridPos,
    /// Fuse length at placement (ms).
    pub timer: u64,
    /// Blast range.
    pub range: u32,
    /// Fuse left. Aged only by the tick loop.
    #[serde(skip)]
    pub fuse_remaining: Duration,
}

/// One tile covered by an explosion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplosionTile {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Walk direction x component (0 for the center).
    pub dx: i32,
    /// Walk direction y component (0 for the center).
    pub dy: i32,
    /// Distance from the bomb.
    pub distance: u32,
}

impl ExplosionTile {
    /// Tile position.
    pub fn position(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

/// A live explosion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    /// Unique id.
    pub id: Uuid,
    /// Covered tiles, center first.
    pub tiles: Vec<ExplosionTile>,
    /// Lifetime left. Aged only by the tick loop.
    #[serde(skip)]
    pub ttl_remaining: Duration,
}

impl Explosion {
    /// Check if the explosion covers a tile.
    pub fn covers(&self, pos: GridPos) -> bool {
        self.tiles.iter().any(|t| t.position() == pos)
    }
}

// =============================================================================
// ROUND STATUS
// =============================================================================

/// Round status. Cycles `waiting -> countdown -> running -> ended -> waiting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Lobby open.
    #[default]
    Waiting,
    /// Map generated, countdown and start barrier in progress.
    Countdown,
    /// Active gameplay.
    Running,
    /// Winner announced, reset pending.
    Ended,
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Complete state of the server's single game.
///
/// Mutated only by the game modules, under the session's serialized access.
#[derive(Debug)]
pub struct GameState {
    /// Rules in force.
    pub config: GameConfig,
    /// Current status.
    pub status: GameStatus,
    /// Tile map and power-ups.
    pub map: GameMap,
    /// Players keyed by id.
    pub players: BTreeMap<PlayerId, Player>,
    /// Live bombs, in placement order.
    pub bombs: Vec<Bomb>,
    /// Live explosions.
    pub explosions: Vec<Explosion>,
    /// Remaining power-up supply.
    pub power_up_budget: PowerUpBudget,
    /// Tick counter (advanced by the tick loop).
    pub tick: u64,
    /// Round epoch. Bumped on every reset; stale timers compare against it.
    pub round: u64,
    /// Logical clock (ms).
    pub now_ms: u64,
    /// Server seed, mixed into each round's seed.
    pub server_seed: u64,
    /// Round randomness.
    pub rng: DeterministicRng,
    /// Deferred effects.
    pub timers: Scheduler,
    /// Lobby timers and start barrier.
    pub lobby: LobbyState,
    /// Spawn corners for this round, by slot.
    pub spawn_points: Vec<GridPos>,
    /// Events generated since the last drain.
    pending_events: Vec<GameEvent>,
}

impl GameState {
    /// Create a fresh waiting state.
    pub fn new(config: GameConfig, server_seed: u64) -> Self {
        let power_up_budget = config.power_up_supply;
        Self {
            config,
            status: GameStatus::Waiting,
            map: GameMap::default(),
            players: BTreeMap::new(),
            bombs: Vec::new(),
            explosions: Vec::new(),
            power_up_budget,
            tick: 0,
            round: 0,
            now_ms: 0,
            server_seed,
            rng: DeterministicRng::new(server_seed),
            timers: Scheduler::new(),
            lobby: LobbyState::default(),
            spawn_points: Vec::new(),
            pending_events: Vec::new(),
        }
    }

    /// Advance the logical clock. Never moves backwards.
    pub fn set_clock(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Clear everything round-related and return to `waiting`.
    ///
    /// Bumps the round epoch and drops every round-bound timer.
    pub fn reset(&mut self) {
        self.status = GameStatus::Waiting;
        self.map = GameMap::default();
        self.players.clear();
        self.bombs.clear();
        self.explosions.clear();
        self.power_up_budget = self.config.power_up_supply;
        self.lobby = LobbyState::default();
        self.spawn_points.clear();
        self.round += 1;
        self.timers.cancel(|_| true);
    }

    /// Schedule a round-bound effect `delay_ms` from now.
    pub fn schedule_in(&mut self, delay_ms: u64, kind: TimerKind) {
        let due = self.now_ms.saturating_add(delay_ms);
        self.timers.schedule_at(due, self.round, kind);
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Players still alive, in id order.
    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.alive)
    }

    /// Number of players still alive.
    pub fn alive_count(&self) -> usize {
        self.alive_players().count()
    }

    /// Players ordered by spawn slot.
    pub fn players_by_slot(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.slot);
        players
    }

    /// Live bombs owned by a player.
    pub fn bombs_owned_by(&self, id: &PlayerId) -> usize {
        self.bombs.iter().filter(|b| b.owner_id == *id).count()
    }

    /// Check if a bomb sits on `pos`.
    pub fn bomb_at(&self, pos: GridPos) -> bool {
        self.bombs.iter().any(|b| b.position == pos)
    }

    /// Check if any live explosion covers `pos`.
    pub fn explosion_covers(&self, pos: GridPos) -> bool {
        self.explosions.iter().any(|e| e.covers(pos))
    }

    /// Push a game event.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.tick, data));
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_ordering() {
        let id1 = PlayerId::from_bytes([0; 16]);
        let id2 = PlayerId::from_bytes([1; 16]);
        assert!(id1 < id2);
    }

    #[test]
    fn test_player_id_string_roundtrip() {
        let id = PlayerId::new_v4();
        assert_eq!(PlayerId::from_uuid_str(&id.to_string()), Some(id));
        assert_eq!(PlayerId::from_uuid_str("not-a-uuid"), None);
    }

    #[test]
    fn test_map_bounds_and_tiles() {
        let mut map = GameMap::blank(5, 4);
        assert!(map.in_bounds(GridPos::new(4, 3)));
        assert!(!map.in_bounds(GridPos::new(5, 0)));
        assert!(!map.in_bounds(GridPos::new(0, -1)));
        assert_eq!(map.tile(GridPos::new(9, 9)), None);

        map.set_tile(GridPos::new(2, 1), Tile::Wall);
        assert_eq!(map.tile(GridPos::new(2, 1)), Some(Tile::Wall));
        assert_eq!(map.tiles[1][2], Tile::Wall);
    }

    #[test]
    fn test_budget_take_and_available() {
        let mut budget = PowerUpBudget { bomb: 1, flame: 0, speed: 1 };
        assert_eq!(budget.available(), vec![PowerUpKind::Bomb, PowerUpKind::Speed]);

        assert!(budget.take(PowerUpKind::Bomb));
        assert!(!budget.take(PowerUpKind::Bomb));
        assert!(!budget.take(PowerUpKind::Flame));
        assert_eq!(budget.available(), vec![PowerUpKind::Speed]);
        assert_eq!(budget.total(), 1);
    }

    #[test]
    fn test_tile_wire_names() {
        let json = serde_json::to_string(&vec![Tile::Empty, Tile::Wall, Tile::Destructible]).unwrap();
        assert_eq!(json, r#"["empty","wall","destructible-wall"]"#);
    }

    #[test]
    fn test_player_wire_shape() {
        let config = GameConfig::default();
        let player = Player::new(PlayerId::from_bytes([7; 16]), "ann".into(), 1, GridPos::new(13, 1), &config);
        let value = serde_json::to_value(&player).unwrap();

        assert_eq!(value["avatar"], "player2");
        assert_eq!(value["lives"], 3);
        assert_eq!(value["bombCount"], 1);
        assert_eq!(value["bombRange"], 1);
        assert_eq!(value["position"]["x"], 13);
        assert!(value.get("slot").is_none());
    }

    #[test]
    fn test_move_cooldown_scales_with_speed() {
        let config = GameConfig::default();
        let mut player = Player::new(PlayerId::new_v4(), "a".into(), 0, GridPos::new(1, 1), &config);
        assert_eq!(player.move_cooldown_ms(100.0), 200.0);
        player.speed = 1.0;
        assert_eq!(player.move_cooldown_ms(100.0), 100.0);
    }

    #[test]
    fn test_reset_bumps_round_and_clears() {
        let mut state = GameState::new(GameConfig::default(), 1);
        state.status = GameStatus::Ended;
        state.power_up_budget.bomb = 0;
        state.schedule_in(100, TimerKind::RoundReset);

        state.reset();

        assert_eq!(state.status, GameStatus::Waiting);
        assert_eq!(state.round, 1);
        assert_eq!(state.power_up_budget, PowerUpBudget::default());
        assert!(state.timers.is_empty());
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let mut state = GameState::new(GameConfig::default(), 1);
        state.set_clock(500);
        state.set_clock(100);
        assert_eq!(state.now_ms, 500);
    }
}
