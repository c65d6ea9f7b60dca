//! Combat Events
//!
//! Notable moments of a combat tick, collected for logging and clients.
//! Events never feed back into the simulation.

use serde::{Serialize, Deserialize};
use crate::core::vec3::Vec3;
use crate::game::catalog::AbilityId;
use crate::game::state::Team;

/// Maximum events recorded per tick; extra events are dropped.
pub const MAX_COMBAT_EVENTS: usize = 64;

/// Something that happened during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A unit cast (or a passive fired for) an ability.
    AbilityCast {
        unit: usize,
        ability: AbilityId,
        position: Vec3,
    },

    /// An impact strong enough to shake the camera.
    Shake {
        unit: usize,
        position: Vec3,
        intensity: f32,
        duration: f32,
    },

    /// A unit dropped out of the fight this tick.
    Defeated {
        unit: usize,
        team: Team,
    },
}

/// Bounded per-tick event list.
#[derive(Clone, Debug, Default)]
pub struct EventBuffer {
    events: Vec<CombatEvent>,
}

impl EventBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self { events: Vec::with_capacity(MAX_COMBAT_EVENTS) }
    }

    /// Record an event unless the buffer is full.
    pub fn push(&mut self, event: CombatEvent) {
        if self.events.len() < MAX_COMBAT_EVENTS {
            self.events.push(event);
        }
    }

    /// Record an ability cast.
    pub fn cast(&mut self, unit: usize, ability: AbilityId, position: Vec3) {
        self.push(CombatEvent::AbilityCast { unit, ability, position });
    }

    /// Record a shake.
    pub fn shake(&mut self, unit: usize, position: Vec3, intensity: f32, duration: f32) {
        self.push(CombatEvent::Shake { unit, position, intensity, duration });
    }

    /// Record a defeat.
    pub fn defeated(&mut self, unit: usize, team: Team) {
        self.push(CombatEvent::Defeated { unit, team });
    }

    /// Recorded events.
    pub fn as_slice(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take the events out.
    pub fn into_vec(self) -> Vec<CombatEvent> {
        self.events
    }
}
