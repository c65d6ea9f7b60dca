//! Core deterministic primitives.
//!
//! Vector math, state hashing and the two randomness sources shared by the
//! simulation and session layers.

pub mod vec3;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec3::Vec3;
pub use rng::{det_roll, DeterministicRng};
pub use hash::{StateHash, StateHasher};
