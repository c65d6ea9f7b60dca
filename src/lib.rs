//! # Autobattle Match Server
//!
//! Authoritative server for a 1v1 autobattler: players shop for abilities
//! and place units during prep, then a deterministic combat resolver plays
//! the round out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AUTOBATTLE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── vec3.rs      - Ground-plane vector math                 │
//! │  ├── rng.rs       - Hash roll and seeded PRNG                │
//! │  └── hash.rs      - Combat state hashing                     │
//! │                                                              │
//! │  game/            - Combat and economy (deterministic)       │
//! │  ├── catalog.rs   - Ability and archetype tables             │
//! │  ├── state.rs     - Units, modifiers, projectiles            │
//! │  ├── cast.rs      - Ability handlers and procs               │
//! │  ├── tick.rs      - Combat resolver                          │
//! │  ├── compose.rs   - Round setup and synergies                │
//! │  └── player.rs    - Shop, gold and roster                    │
//! │                                                              │
//! │  network/         - Networking (non-deterministic)           │
//! │  ├── protocol.rs  - Binary frames and messages               │
//! │  ├── session.rs   - 1v1 match sessions                       │
//! │  └── server.rs    - TCP server and tick loop                 │
//! │                                                              │
//! │  store/           - Persistence                              │
//! │  ├── leaderboard.rs - Global leaderboard (JSON)              │
//! │  └── tags.rs      - Physical tag registry (JSON)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `game::tick::combat_tick` uses no clocks and no entropy: procs and
//! evasion come from a hash of the two unit slots and a health value
//! already in state, and iteration is always in slot order. Identical rosters produce identical state hashes
//! on every run. Shop rolls and lobby codes use the seeded PRNG in
//! `core::rng`, which only the session layer touches.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use core::vec3::Vec3;
pub use game::state::{CombatState, Team, Unit};
pub use game::tick::{combat_tick, Outcome};
pub use network::server::{GameServer, ServerConfig};
pub use store::Stores;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Session tick rate (Hz)
pub const TICK_RATE: u32 = 60;
