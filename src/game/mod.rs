//! Game Logic Module
//!
//! All combat and economy code. Deterministic: no clocks, no I/O, no logging.
//!
//! ## Module Structure
//!
//! - `catalog`: Static ability, archetype and balance tables
//! - `pool`: Fixed-capacity slot pools with stable indices
//! - `state`: Units, modifiers, projectiles, fissures
//! - `modifiers`: Modifier application, dedup and ticking
//! - `projectile`: Homing projectile phase
//! - `fissure`: Fissure obstacles and collision
//! - `cast`: Ability handlers, passives and on-hit procs
//! - `tick`: Authoritative combat resolver
//! - `compose`: Round setup from rosters or PVE waves, synergies
//! - `player`: Per-player prep economy
//! - `events`: Combat events for logging and clients

pub mod catalog;
pub mod pool;
pub mod state;
pub mod modifiers;
pub mod projectile;
pub mod fissure;
pub mod cast;
pub mod tick;
pub mod compose;
pub mod player;
pub mod events;

// Re-export key types
pub use catalog::{AbilityId, AbilityDef, UnitStats};
pub use state::{CombatState, Unit, Team, ModifierKind};
pub use tick::{combat_tick, Outcome, TickResult};
pub use player::PlayerState;
pub use events::CombatEvent;
