//! Core primitives shared by the game layer.

pub mod rng;

pub use rng::{DeterministicRng, derive_round_seed};
