//! Combat State Definitions
//!
//! The four entity containers one combat round runs on: units, modifiers,
//! projectiles and fissures. All cross-references are slot indices into
//! these containers.

use serde::{Serialize, Deserialize};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::vec3::Vec3;
use crate::game::catalog::{unit_stats, AbilityId, UnitStats, MAX_ABILITIES_PER_UNIT};
use crate::game::pool::{Pool, Pooled};

/// Unit container capacity.
pub const MAX_UNITS: usize = 64;

/// Modifier pool capacity.
pub const MAX_MODIFIERS: usize = 128;

/// Projectile pool capacity.
pub const MAX_PROJECTILES: usize = 32;

/// Fissure pool capacity.
pub const MAX_FISSURES: usize = 8;

/// Roster cap per player (blue side during placement).
pub const BLUE_TEAM_MAX_SIZE: usize = 4;

// =============================================================================
// TEAM
// =============================================================================

/// One of the two sides in a combat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Team {
    /// Near side.
    #[default]
    Blue = 0,
    /// Far side.
    Red = 1,
}

impl Team {
    /// Decode from a wire byte; anything non-zero is Red.
    pub fn from_u8(v: u8) -> Self {
        if v == 0 { Team::Blue } else { Team::Red }
    }

    /// The other team.
    pub fn opponent(self) -> Self {
        match self {
            Team::Blue => Team::Red,
            Team::Red => Team::Blue,
        }
    }
}

// =============================================================================
// UNIT
// =============================================================================

/// One ability slot on a unit.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct AbilitySlot {
    /// Ability in this slot, if any.
    pub ability: Option<AbilityId>,
    /// 0-based level.
    pub level: u8,
    /// Seconds until the ability is ready.
    pub cooldown: f32,
    /// One-shot passive already fired this life.
    pub triggered: bool,
}

impl AbilitySlot {
    /// A ready slot holding `ability` at `level`.
    pub fn new(ability: AbilityId, level: u8) -> Self {
        Self { ability: Some(ability), level, cooldown: 0.0, triggered: false }
    }

    /// True if no ability is assigned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ability.is_none()
    }
}

/// A combatant.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    /// Archetype id (selects base stats).
    pub archetype: u8,
    /// Side.
    pub team: Team,
    /// Cosmetic rarity carried through from the roster.
    pub rarity: u8,
    /// Position; Y is cosmetic.
    pub position: Vec3,
    /// Current health.
    pub health: f32,
    /// Alive and participating.
    pub active: bool,
    /// Facing angle in degrees about Y.
    pub facing: f32,
    /// Ability slots.
    pub abilities: [AbilitySlot; MAX_ABILITIES_PER_UNIT],
    /// Max health multiplier.
    pub hp_multiplier: f32,
    /// Attack damage multiplier.
    pub dmg_multiplier: f32,
    /// Move speed multiplier.
    pub speed_multiplier: f32,
    /// Seconds until the next basic attack.
    pub attack_cooldown: f32,
    /// Current target.
    pub target: Option<usize>,
    /// Shield points absorbed before health.
    pub shield: f32,
    /// Primal Charge destination.
    pub charge_target: Option<usize>,
    /// Lockout after a successful cast.
    pub cast_delay: f32,
    /// Stone Gaze exposure.
    pub gaze_accum: f32,
    /// Rotating cursor into the activation order.
    pub next_slot: usize,
}

impl Default for Unit {
    fn default() -> Self {
        Self {
            archetype: 0,
            team: Team::Blue,
            rarity: 0,
            position: Vec3::ZERO,
            health: 0.0,
            active: false,
            facing: 0.0,
            abilities: [AbilitySlot::default(); MAX_ABILITIES_PER_UNIT],
            hp_multiplier: 1.0,
            dmg_multiplier: 1.0,
            speed_multiplier: 1.0,
            attack_cooldown: 0.0,
            target: None,
            shield: 0.0,
            charge_target: None,
            cast_delay: 0.0,
            gaze_accum: 0.0,
            next_slot: 0,
        }
    }
}

impl Unit {
    /// Create a live unit at full health with default facing for its team.
    pub fn new(archetype: u8, team: Team) -> Self {
        Self {
            archetype,
            team,
            health: unit_stats(archetype).health,
            active: true,
            facing: if team == Team::Blue { 180.0 } else { 0.0 },
            ..Default::default()
        }
    }

    /// Builder: set position on the ground plane.
    pub fn at(mut self, x: f32, z: f32) -> Self {
        self.position = Vec3::xz(x, z);
        self
    }

    /// Builder: put `ability` at `level` into `slot`.
    pub fn with_ability(mut self, slot: usize, ability: AbilityId, level: u8) -> Self {
        if let Some(s) = self.abilities.get_mut(slot) {
            *s = AbilitySlot::new(ability, level);
        }
        self
    }

    /// Base stats for this unit's archetype.
    #[inline]
    pub fn stats(&self) -> &'static UnitStats {
        unit_stats(self.archetype)
    }

    /// Maximum health including the multiplier.
    #[inline]
    pub fn max_health(&self) -> f32 {
        self.stats().health * self.hp_multiplier
    }

    /// Level of the first slot holding `ability`.
    pub fn ability_level(&self, ability: AbilityId) -> Option<u8> {
        self.abilities
            .iter()
            .find(|s| s.ability == Some(ability))
            .map(|s| s.level)
    }

    /// Reset transient combat fields and restore base health.
    pub fn reset_for_combat(&mut self) {
        self.health = self.stats().health;
        self.target = None;
        self.attack_cooldown = 0.0;
        self.next_slot = 0;
        self.shield = 0.0;
        self.charge_target = None;
        self.cast_delay = 0.0;
        self.gaze_accum = 0.0;
        for slot in &mut self.abilities {
            slot.cooldown = 0.0;
            slot.triggered = false;
        }
    }

    /// Shield absorbs first; returns the damage left for health.
    pub fn absorb_with_shield(&mut self, damage: f32) -> f32 {
        if self.shield <= 0.0 {
            return damage;
        }
        if damage <= self.shield {
            self.shield -= damage;
            0.0
        } else {
            let rest = damage - self.shield;
            self.shield = 0.0;
            rest
        }
    }

    /// Deactivate at or below zero health.
    #[inline]
    pub fn check_death(&mut self) {
        if self.health <= 0.0 {
            self.active = false;
        }
    }

    /// Clamp health to max.
    #[inline]
    pub fn clamp_health(&mut self) {
        let max = self.max_health();
        if self.health > max {
            self.health = max;
        }
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.archetype);
        hasher.update_u8(self.team as u8);
        hasher.update_vec3(self.position);
        hasher.update_f32(self.health);
        hasher.update_bool(self.active);
        hasher.update_f32(self.facing);
        for slot in &self.abilities {
            hasher.update_i32(AbilityId::to_wire(slot.ability) as i32);
            hasher.update_u8(slot.level);
            hasher.update_f32(slot.cooldown);
            hasher.update_bool(slot.triggered);
        }
        hasher.update_f32(self.hp_multiplier);
        hasher.update_f32(self.dmg_multiplier);
        hasher.update_f32(self.speed_multiplier);
        hasher.update_f32(self.attack_cooldown);
        hasher.update_index(self.target);
        hasher.update_f32(self.shield);
        hasher.update_index(self.charge_target);
        hasher.update_f32(self.cast_delay);
        hasher.update_f32(self.gaze_accum);
        hasher.update_u32(self.next_slot as u32);
    }
}

// =============================================================================
// MODIFIERS
// =============================================================================

/// Buff/debuff kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ModifierKind {
    /// Cannot act.
    #[default]
    Stun = 0,
    /// Ignores damage and stuns from attacks and projectiles.
    Invulnerable = 1,
    /// Heals a fraction of attack damage dealt.
    Lifesteal = 2,
    /// Multiplies move speed.
    SpeedMult = 3,
    /// Flat damage reduction on basic attacks.
    Armor = 4,
    /// Heal-over-time; the unit is busy while it runs.
    DigHeal = 5,
    /// Tracks shield lifetime; expiry clears shield points.
    Shield = 6,
    /// Blocks new stuns.
    SpellProtect = 7,
    /// Retaliation stun chance.
    CraggyArmor = 8,
    /// Gaze threshold; marks the unit as a gazer.
    StoneGaze = 9,
    /// Aura source marker.
    VladAura = 10,
    /// On-hit proc chance.
    Maelstrom = 11,
    /// Charge speed.
    Charging = 12,
}

/// A timed effect on one unit.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Modifier {
    /// Effect kind.
    pub kind: ModifierKind,
    /// Unit this modifier is attached to.
    pub unit: usize,
    /// Seconds remaining; `<= 0` never counts down.
    pub duration: f32,
    /// Kind-specific magnitude.
    pub value: f32,
    /// Slot in use.
    pub active: bool,
}

impl Pooled for Modifier {
    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// PROJECTILES
// =============================================================================

/// Projectile behaviors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProjectileKind {
    /// Damage is a fraction of target max health; stuns.
    #[default]
    MagicMissile = 0,
    /// Flat damage, bounces.
    ChainFrost = 1,
    /// Pulls the target to the source; damage scales with distance.
    Hook = 2,
    /// Flat damage, bounces; spawned by on-hit procs.
    Maelstrom = 3,
}

/// A homing projectile.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Projectile {
    /// Behavior.
    pub kind: ProjectileKind,
    /// Current position.
    pub position: Vec3,
    /// Target unit.
    pub target: usize,
    /// Unit that fired it.
    pub source: usize,
    /// Team that fired it.
    pub source_team: Team,
    /// Units per second.
    pub speed: f32,
    /// Damage; meaning depends on `kind`.
    pub damage: f32,
    /// Stun applied on hit when positive.
    pub stun_duration: f32,
    /// Bounces left.
    pub bounces: u32,
    /// Search radius for the next bounce.
    pub bounce_range: f32,
    /// Unit hit last, excluded from the next bounce.
    pub last_hit: Option<usize>,
    /// Source ability level.
    pub level: u8,
    /// Slot in use.
    pub active: bool,
}

impl Pooled for Projectile {
    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// FISSURES
// =============================================================================

/// A rectangular obstacle on the ground plane.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Fissure {
    /// Rectangle center.
    pub center: Vec3,
    /// Heading of the long axis in degrees (0 = +Z).
    pub rotation: f32,
    /// Extent along the long axis.
    pub length: f32,
    /// Extent across.
    pub width: f32,
    /// Seconds remaining.
    pub duration: f32,
    /// Team that raised it.
    pub team: Team,
    /// Unit that raised it.
    pub owner: usize,
    /// Slot in use.
    pub active: bool,
}

impl Pooled for Fissure {
    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// COMBAT STATE
// =============================================================================

/// All mutable state for one combat round.
#[derive(Clone, Debug, PartialEq)]
pub struct CombatState {
    /// Units; indices stay stable for the whole round.
    pub units: Vec<Unit>,
    /// Modifier pool.
    pub modifiers: Pool<Modifier>,
    /// Projectile pool.
    pub projectiles: Pool<Projectile>,
    /// Fissure pool.
    pub fissures: Pool<Fissure>,
}

impl Default for CombatState {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatState {
    /// Empty containers at full capacity.
    pub fn new() -> Self {
        Self {
            units: Vec::with_capacity(MAX_UNITS),
            modifiers: Pool::with_capacity(MAX_MODIFIERS),
            projectiles: Pool::with_capacity(MAX_PROJECTILES),
            fissures: Pool::with_capacity(MAX_FISSURES),
        }
    }

    /// Drop all units and deactivate every pooled entity.
    pub fn clear(&mut self) {
        self.units.clear();
        self.modifiers.clear();
        self.projectiles.clear();
        self.fissures.clear();
    }

    /// Append a unit. Returns `None` when the container is full.
    pub fn spawn_unit(&mut self, unit: Unit) -> Option<usize> {
        if self.units.len() >= MAX_UNITS {
            return None;
        }
        self.units.push(unit);
        Some(self.units.len() - 1)
    }

    /// True if `idx` names an active unit.
    #[inline]
    pub fn is_live(&self, idx: usize) -> bool {
        self.units.get(idx).is_some_and(|u| u.active)
    }

    /// Active units not on `team`, with index.
    fn enemies_of(&self, team: Team) -> impl Iterator<Item = (usize, &Unit)> {
        self.units
            .iter()
            .enumerate()
            .filter(move |(_, u)| u.active && u.team != team)
    }

    /// Active allies of `self_idx`, excluding itself.
    fn allies_of(&self, self_idx: usize) -> impl Iterator<Item = (usize, &Unit)> {
        let team = self.units[self_idx].team;
        self.units
            .iter()
            .enumerate()
            .filter(move |(j, u)| *j != self_idx && u.active && u.team == team)
    }

    /// Closest active enemy on the XZ plane. Ties keep the lower index.
    pub fn closest_enemy(&self, self_idx: usize) -> Option<usize> {
        let me = &self.units[self_idx];
        let mut best: Option<(usize, f32)> = None;
        for (j, u) in self.enemies_of(me.team) {
            let d = me.position.dist_xz(u.position);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
        best.map(|(j, _)| j)
    }

    /// Furthest active enemy on the XZ plane. Ties keep the lower index.
    pub fn furthest_enemy(&self, self_idx: usize) -> Option<usize> {
        let me = &self.units[self_idx];
        let mut best: Option<(usize, f32)> = None;
        for (j, u) in self.enemies_of(me.team) {
            let d = me.position.dist_xz(u.position);
            if best.map_or(true, |(_, bd)| d > bd) {
                best = Some((j, d));
            }
        }
        best.map(|(j, _)| j)
    }

    /// Ally (not self) with the lowest current health.
    pub fn lowest_hp_ally(&self, self_idx: usize) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (j, u) in self.allies_of(self_idx) {
            if best.map_or(true, |(_, bh)| u.health < bh) {
                best = Some((j, u.health));
            }
        }
        best.map(|(j, _)| j)
    }

    /// Ally (not self) with the highest current health.
    pub fn highest_hp_ally(&self, self_idx: usize) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (j, u) in self.allies_of(self_idx) {
            if best.map_or(true, |(_, bh)| u.health > bh) {
                best = Some((j, u.health));
            }
        }
        best.map(|(j, _)| j)
    }

    /// Nearest enemy of `source_team` within `range` of `from`, skipping `exclude`.
    pub fn bounce_target(
        &self,
        from: Vec3,
        source_team: Team,
        exclude: Option<usize>,
        range: f32,
    ) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (j, u) in self.enemies_of(source_team) {
            if Some(j) == exclude {
                continue;
            }
            let d = u.position.dist_xz(from);
            if d <= range && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
        best.map(|(j, _)| j)
    }

    /// Active unit counts as `(blue, red)`.
    pub fn count_teams(&self) -> (usize, usize) {
        self.units.iter().filter(|u| u.active).fold((0, 0), |(b, r), u| match u.team {
            Team::Blue => (b + 1, r),
            Team::Red => (b, r + 1),
        })
    }

    /// Active units on `team`.
    pub fn count_team(&self, team: Team) -> usize {
        self.units.iter().filter(|u| u.active && u.team == team).count()
    }

    /// Hash every container, active or not.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_combat_state();

        hasher.update_u32(self.units.len() as u32);
        for unit in &self.units {
            unit.hash_into(&mut hasher);
        }

        for m in self.modifiers.slots() {
            hasher.update_u8(m.kind as u8);
            hasher.update_u32(m.unit as u32);
            hasher.update_f32(m.duration);
            hasher.update_f32(m.value);
            hasher.update_bool(m.active);
        }

        for p in self.projectiles.slots() {
            hasher.update_u8(p.kind as u8);
            hasher.update_vec3(p.position);
            hasher.update_u32(p.target as u32);
            hasher.update_u32(p.source as u32);
            hasher.update_u8(p.source_team as u8);
            hasher.update_f32(p.speed);
            hasher.update_f32(p.damage);
            hasher.update_f32(p.stun_duration);
            hasher.update_u32(p.bounces);
            hasher.update_f32(p.bounce_range);
            hasher.update_index(p.last_hit);
            hasher.update_u8(p.level);
            hasher.update_bool(p.active);
        }

        for f in self.fissures.slots() {
            hasher.update_vec3(f.center);
            hasher.update_f32(f.rotation);
            hasher.update_f32(f.length);
            hasher.update_f32(f.width);
            hasher.update_f32(f.duration);
            hasher.update_u8(f.team as u8);
            hasher.update_u32(f.owner as u32);
            hasher.update_bool(f.active);
        }

        hasher.finalize()
    }
}
