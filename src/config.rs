//! Server and game configuration.

use std::net::SocketAddr;

use crate::game::state::PowerUpBudget;

/// Timing and balance constants for a round.
///
/// All durations are milliseconds on the session's logical clock.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Map width in tiles.
    pub map_width: i32,
    /// Map height in tiles.
    pub map_height: i32,
    /// Maximum sessions admitted to the lobby.
    pub max_players: usize,
    /// Sessions needed to start the waiting timer.
    pub min_players: usize,
    /// Chance (percent) that an open cell becomes a destructible wall.
    pub destructible_percent: u32,
    /// Chance (percent) that a destroyed wall drops a power-up.
    pub power_up_drop_percent: u32,
    /// Global power-up supply per round.
    pub power_up_supply: PowerUpBudget,
    /// Waiting timer length (seconds).
    pub waiting_secs: u32,
    /// Countdown timer length (seconds).
    pub countdown_secs: u32,
    /// Bomb fuse.
    pub bomb_fuse_ms: u64,
    /// Explosion time-to-live.
    pub explosion_ttl_ms: u64,
    /// Immunity window after a life loss.
    pub immunity_ms: u64,
    /// Delay before a hit player returns to their corner.
    pub respawn_delay_ms: u64,
    /// Delay between round end and state reset.
    pub reset_delay_ms: u64,
    /// Reconnect grace window after a transport closes.
    pub reconnect_grace_ms: u64,
    /// Base movement cooldown, divided by player speed.
    pub base_move_cooldown_ms: f64,
    /// Lives a player starts with.
    pub starting_lives: u8,
    /// Speed a player starts with.
    pub starting_speed: f64,
    /// Simultaneous bombs a player starts with.
    pub starting_bomb_count: u32,
    /// Blast range a player starts with.
    pub starting_bomb_range: u32,
    /// Chat history capacity.
    pub chat_history_cap: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map_width: 15,
            map_height: 13,
            max_players: 4,
            min_players: 2,
            destructible_percent: 50,
            power_up_drop_percent: 30,
            power_up_supply: PowerUpBudget::default(),
            waiting_secs: 20,
            countdown_secs: 10,
            bomb_fuse_ms: 3000,
            explosion_ttl_ms: 700,
            immunity_ms: 2000,
            respawn_delay_ms: 1000,
            reset_delay_ms: 5000,
            reconnect_grace_ms: 2000,
            base_move_cooldown_ms: 100.0,
            starting_lives: 3,
            starting_speed: 0.5,
            starting_bomb_count: 1,
            starting_bomb_range: 1,
            chat_history_cap: 100,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Tick rate for the fuse/explosion loop (Hz).
    pub tick_rate: u32,
    /// Seed for round randomness.
    pub seed: u64,
    /// Outbound queue depth per connection.
    pub outbound_queue: usize,
    /// Game rules.
    pub game: GameConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            tick_rate: crate::TICK_RATE,
            seed: 0,
            outbound_queue: 64,
            game: GameConfig::default(),
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Apply `BOMBER_BIND_ADDR` and `BOMBER_SEED` overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BOMBER_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        config.seed = match std::env::var("BOMBER_SEED") {
            Ok(seed) => seed.parse()?,
            Err(_) => {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                nanos as u64
            }
        };

        Ok(config)
    }
}
