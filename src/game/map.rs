//! Arena Map Generation
//!
//! Classic bomber layout: solid outer ring, indestructible pillars on
//! every even/even cell, and a random scatter of destructible walls.
//! The four spawn corners and their two inward neighbours are always
//! left open so every player can move and escape their first bomb.

use crate::config::GameConfig;
use crate::core::rng::DeterministicRng;
use crate::game::state::{GameMap, GridPos, Tile};

/// Spawn corners, indexed by slot: top-left, top-right, bottom-left, bottom-right.
pub fn spawn_corners(width: i32, height: i32) -> [GridPos; 4] {
    [
        GridPos::new(1, 1),
        GridPos::new(width - 2, 1),
        GridPos::new(1, height - 2),
        GridPos::new(width - 2, height - 2),
    ]
}

/// Check if a cell is a spawn corner or one of its two inward neighbours.
pub fn in_spawn_pocket(pos: GridPos, width: i32, height: i32) -> bool {
    spawn_corners(width, height).iter().any(|corner| {
        let inward_x = if corner.x == 1 { 1 } else { -1 };
        let inward_y = if corner.y == 1 { 1 } else { -1 };
        pos == *corner
            || pos == corner.offset(inward_x, 0, 1)
            || pos == corner.offset(0, inward_y, 1)
    })
}

/// Classify a cell by the fixed layout rules. `None` means "open, roll for a crate".
fn fixed_tile(pos: GridPos, width: i32, height: i32) -> Option<Tile> {
    let on_border = pos.x == 0 || pos.y == 0 || pos.x == width - 1 || pos.y == height - 1;
    if on_border {
        return Some(Tile::Wall);
    }
    if pos.x % 2 == 0 && pos.y % 2 == 0 {
        return Some(Tile::Wall);
    }
    if in_spawn_pocket(pos, width, height) {
        return Some(Tile::Empty);
    }
    None
}

/// Generate a fresh map. Power-up list starts empty.
pub fn generate_map(config: &GameConfig, rng: &mut DeterministicRng) -> GameMap {
    let (width, height) = (config.map_width, config.map_height);
    let mut map = GameMap::blank(width, height);

    for y in 0..height {
        for x in 0..width {
            let pos = GridPos::new(x, y);
            let tile = match fixed_tile(pos, width, height) {
                Some(tile) => tile,
                None if rng.chance_percent(config.destructible_percent) => Tile::Destructible,
                None => Tile::Empty,
            };
            map.set_tile(pos, tile);
        }
    }

    map
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn default_map(seed: u64) -> GameMap {
        let config = GameConfig::default();
        let mut rng = DeterministicRng::new(seed);
        generate_map(&config, &mut rng)
    }

    #[test]
    fn test_dimensions_and_border() {
        let map = default_map(1);
        assert_eq!((map.width, map.height), (15, 13));
        assert_eq!(map.tiles.len(), 13);
        assert!(map.tiles.iter().all(|row| row.len() == 15));

        for x in 0..15 {
            assert_eq!(map.tile(GridPos::new(x, 0)), Some(Tile::Wall));
            assert_eq!(map.tile(GridPos::new(x, 12)), Some(Tile::Wall));
        }
        for y in 0..13 {
            assert_eq!(map.tile(GridPos::new(0, y)), Some(Tile::Wall));
            assert_eq!(map.tile(GridPos::new(14, y)), Some(Tile::Wall));
        }
        assert!(map.power_ups.is_empty());
    }

    #[test]
    fn test_pillars_on_even_cells() {
        let map = default_map(2);
        for y in (2..12).step_by(2) {
            for x in (2..14).step_by(2) {
                assert_eq!(map.tile(GridPos::new(x, y)), Some(Tile::Wall));
            }
        }
    }

    #[test]
    fn test_spawn_pockets() {
        let corners = spawn_corners(15, 13);
        assert_eq!(corners[1], GridPos::new(13, 1));
        assert_eq!(corners[3], GridPos::new(13, 11));

        assert!(in_spawn_pocket(GridPos::new(12, 11), 15, 13));
        assert!(in_spawn_pocket(GridPos::new(13, 10), 15, 13));
        assert!(in_spawn_pocket(GridPos::new(2, 1), 15, 13));
        assert!(!in_spawn_pocket(GridPos::new(3, 1), 15, 13));
        assert!(!in_spawn_pocket(GridPos::new(7, 5), 15, 13));
    }

    #[test]
    fn test_same_seed_same_layout() {
        assert_eq!(default_map(99), default_map(99));
    }

    proptest! {
        #[test]
        fn prop_spawn_pockets_always_open(seed in any::<u64>()) {
            let map = default_map(seed);
            for y in 0..map.height {
                for x in 0..map.width {
                    let pos = GridPos::new(x, y);
                    if in_spawn_pocket(pos, map.width, map.height) {
                        prop_assert_eq!(map.tile(pos), Some(Tile::Empty));
                    }
                }
            }
        }

        #[test]
        fn prop_crates_only_on_open_cells(seed in any::<u64>()) {
            let map = default_map(seed);
            for y in 0..map.height {
                for x in 0..map.width {
                    let pos = GridPos::new(x, y);
                    if map.tile(pos) == Some(Tile::Destructible) {
                        prop_assert!(fixed_tile(pos, map.width, map.height).is_none());
                    }
                }
            }
        }
    }
}
