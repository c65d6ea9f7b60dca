//! Wave and Synergy Composer
//!
//! Builds the combat containers for a round from player rosters or a
//! scripted PVE wave, and applies team synergies.

use crate::game::catalog::{AbilityId, ARCHETYPE_COUNT};
use crate::game::state::{CombatState, Team, Unit};

// =============================================================================
// SYNERGIES
// =============================================================================

/// One tier of a synergy.
#[derive(Debug, Clone, Copy)]
pub struct SynergyTier {
    /// Units needed to reach this tier.
    pub min_units: usize,
    /// Move speed multiplier.
    pub speed_mult: f32,
    /// Max health multiplier.
    pub hp_mult: f32,
    /// Attack damage multiplier.
    pub dmg_mult: f32,
}

/// Static definition of a team synergy.
#[derive(Debug)]
pub struct SynergyDef {
    /// Display name.
    pub name: &'static str,
    /// Badge label.
    pub abbrev: &'static str,
    /// Archetypes that count toward the synergy.
    pub required_types: &'static [u8],
    /// Archetype that receives the buff; `None` buffs every counted type.
    pub target_type: Option<u8>,
    /// Every required type must be present at least once.
    pub require_all_types: bool,
    /// Tiers in ascending order.
    pub tiers: &'static [SynergyTier],
}

impl SynergyDef {
    fn counts(&self, archetype: u8) -> bool {
        self.required_types.contains(&archetype)
    }

    fn buffs(&self, archetype: u8) -> bool {
        match self.target_type {
            Some(t) => t == archetype,
            None => self.counts(archetype),
        }
    }
}

const fn tier(min_units: usize, speed_mult: f32, hp_mult: f32, dmg_mult: f32) -> SynergyTier {
    SynergyTier { min_units, speed_mult, hp_mult, dmg_mult }
}

/// The synergy table.
pub static SYNERGY_DEFS: [SynergyDef; 5] = [
    SynergyDef {
        name: "Goblin Swarm", abbrev: "GS",
        required_types: &[1], target_type: Some(1), require_all_types: false,
        tiers: &[tier(2, 1.15, 1.0, 1.0), tier(3, 1.30, 1.0, 1.0), tier(4, 1.50, 1.0, 1.0)],
    },
    SynergyDef {
        name: "Mushroom Fort", abbrev: "MF",
        required_types: &[0], target_type: Some(0), require_all_types: false,
        tiers: &[tier(2, 1.0, 1.20, 1.0), tier(3, 1.0, 1.40, 1.0), tier(4, 1.0, 1.60, 1.10)],
    },
    SynergyDef {
        name: "Reptile Fury", abbrev: "RF",
        required_types: &[5], target_type: Some(5), require_all_types: false,
        tiers: &[tier(2, 1.0, 1.0, 1.20), tier(3, 1.10, 1.0, 1.40)],
    },
    SynergyDef {
        name: "Wild Alliance", abbrev: "WA",
        required_types: &[0, 1, 5], target_type: None, require_all_types: true,
        tiers: &[tier(3, 1.05, 1.0, 1.10)],
    },
    SynergyDef {
        name: "Devil Pact", abbrev: "DP",
        required_types: &[2], target_type: Some(2), require_all_types: false,
        tiers: &[tier(2, 1.0, 1.10, 1.15), tier(3, 1.0, 1.20, 1.30)],
    },
];

/// Highest tier of `def` reached by `team`, if any.
pub fn synergy_tier(units: &[Unit], team: Team, def: &SynergyDef) -> Option<usize> {
    let mut per_type = [0usize; ARCHETYPE_COUNT];
    for u in units.iter().filter(|u| u.active && u.team == team) {
        if def.counts(u.archetype) {
            if let Some(n) = per_type.get_mut(u.archetype as usize) {
                *n += 1;
            }
        }
    }

    if def.require_all_types
        && def.required_types.iter().any(|&t| per_type.get(t as usize).map_or(true, |&n| n == 0))
    {
        return None;
    }

    let total: usize = per_type.iter().sum();
    def.tiers.iter().rposition(|t| total >= t.min_units)
}

/// Apply every reached synergy tier to both teams.
///
/// Multipliers stack multiplicatively across synergies; affected units are
/// healed to their new maximum.
pub fn apply_synergies(units: &mut [Unit]) {
    for team in [Team::Blue, Team::Red] {
        for def in &SYNERGY_DEFS {
            let Some(level) = synergy_tier(units, team, def) else { continue };
            let t = def.tiers[level];
            for u in units.iter_mut() {
                if !u.active || u.team != team || !def.buffs(u.archetype) {
                    continue;
                }
                u.speed_multiplier *= t.speed_mult;
                u.hp_multiplier *= t.hp_mult;
                u.dmg_multiplier *= t.dmg_mult;
                u.health = u.max_health();
            }
        }
    }
}

// =============================================================================
// PVE WAVES
// =============================================================================

/// One scripted enemy.
#[derive(Debug)]
pub struct WaveUnit {
    /// Archetype id.
    pub archetype: u8,
    /// Spawn X.
    pub x: f32,
    /// Spawn Z.
    pub z: f32,
    /// Abilities in slot order with 0-based level.
    pub abilities: &'static [(AbilityId, u8)],
}

/// Scripted waves, indexed by [`pve_wave_index`].
pub static PVE_WAVES: [&[WaveUnit]; 3] = [
    &[
        WaveUnit { archetype: 1, x: -15.0, z: -30.0, abilities: &[(AbilityId::MagicMissile, 0)] },
        WaveUnit { archetype: 1, x: 15.0, z: -30.0, abilities: &[(AbilityId::BloodRage, 0)] },
    ],
    &[
        WaveUnit {
            archetype: 0, x: -10.0, z: -25.0,
            abilities: &[(AbilityId::Dig, 0), (AbilityId::Vacuum, 0)],
        },
        WaveUnit {
            archetype: 0, x: 10.0, z: -25.0,
            abilities: &[(AbilityId::ChainFrost, 0), (AbilityId::BloodRage, 0)],
        },
    ],
    &[
        WaveUnit {
            archetype: 1, x: -20.0, z: -35.0,
            abilities: &[(AbilityId::MagicMissile, 1), (AbilityId::BloodRage, 0)],
        },
        WaveUnit {
            archetype: 1, x: 0.0, z: -30.0,
            abilities: &[(AbilityId::ChainFrost, 0), (AbilityId::Vacuum, 0)],
        },
        WaveUnit {
            archetype: 1, x: 20.0, z: -35.0,
            abilities: &[(AbilityId::MagicMissile, 0), (AbilityId::Dig, 0)],
        },
    ],
];

/// Rounds (0-based) fought against a scripted wave.
///
/// Used by single-player composition; networked matches are all PVP.
#[inline]
pub fn is_pve_round(round: u32) -> bool {
    matches!(round, 0 | 1 | 3)
}

/// Wave used for a PVE round; non-PVE rounds map to the first wave.
#[inline]
pub fn pve_wave_index(round: u32) -> usize {
    match round {
        1 => 1,
        3 => 2,
        _ => 0,
    }
}

// =============================================================================
// COMPOSITION
// =============================================================================

/// Copy a roster unit into combat on `team`, reset for a fresh round.
fn combat_copy(src: &Unit, team: Team) -> Unit {
    let mut unit = src.clone();
    unit.team = team;
    unit.hp_multiplier = 1.0;
    unit.dmg_multiplier = 1.0;
    unit.speed_multiplier = 1.0;
    unit.reset_for_combat();
    unit
}

/// Fill `state` with `blue` as Blue and `red` mirrored across z = 0 as Red.
///
/// Inactive roster units are skipped; units beyond capacity are dropped.
/// Each player's view is composed with that player as `blue`.
pub fn compose_pvp(state: &mut CombatState, blue: &[Unit], red: &[Unit]) {
    state.clear();
    for u in blue.iter().filter(|u| u.active) {
        state.spawn_unit(combat_copy(u, Team::Blue));
    }
    for u in red.iter().filter(|u| u.active) {
        let mut unit = combat_copy(u, Team::Red);
        unit.position.z = -unit.position.z;
        unit.facing = 180.0 - unit.facing;
        state.spawn_unit(unit);
    }
    apply_synergies(&mut state.units);
}

/// Fill `state` with `roster` as Blue against scripted wave `wave`.
///
/// Single-player composition; the match server only uses [`compose_pvp`].
pub fn compose_pve(state: &mut CombatState, roster: &[Unit], wave: usize) {
    state.clear();
    for u in roster.iter().filter(|u| u.active) {
        state.spawn_unit(combat_copy(u, Team::Blue));
    }
    for w in PVE_WAVES.get(wave).copied().unwrap_or_default() {
        let mut unit = Unit::new(w.archetype, Team::Red).at(w.x, w.z);
        for (slot, &(id, level)) in w.abilities.iter().enumerate() {
            unit = unit.with_ability(slot, id, level);
        }
        state.spawn_unit(unit);
    }
    apply_synergies(&mut state.units);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::MAX_UNITS;

    fn team_of(archetypes: &[u8], team: Team) -> Vec<Unit> {
        archetypes.iter().map(|&a| Unit::new(a, team)).collect()
    }

    #[test]
    fn test_synergy_tiers() {
        let goblin_swarm = &SYNERGY_DEFS[0];
        assert_eq!(synergy_tier(&team_of(&[1], Team::Blue), Team::Blue, goblin_swarm), None);
        assert_eq!(synergy_tier(&team_of(&[1, 1], Team::Blue), Team::Blue, goblin_swarm), Some(0));
        assert_eq!(synergy_tier(&team_of(&[1, 1, 1, 1], Team::Blue), Team::Blue, goblin_swarm), Some(2));
        // Other team's goblins don't count
        assert_eq!(synergy_tier(&team_of(&[1, 1], Team::Red), Team::Blue, goblin_swarm), None);
    }

    #[test]
    fn test_wild_alliance_needs_every_type() {
        let wild = &SYNERGY_DEFS[3];
        assert_eq!(synergy_tier(&team_of(&[0, 0, 1], Team::Blue), Team::Blue, wild), None);
        assert_eq!(synergy_tier(&team_of(&[0, 1, 5], Team::Blue), Team::Blue, wild), Some(0));
    }

    #[test]
    fn test_apply_synergies_heals_to_new_max() {
        let mut units = team_of(&[0, 0, 0, 0], Team::Blue);
        units[0].health = 1.0;
        apply_synergies(&mut units);
        for u in &units {
            assert!((u.hp_multiplier - 1.6).abs() < 1e-6);
            assert!((u.dmg_multiplier - 1.1).abs() < 1e-6);
            assert_eq!(u.health, u.max_health());
        }
    }

    #[test]
    fn test_synergies_stack() {
        // Two goblins trigger both Goblin Swarm and, with a mushroom and a reptile, Wild Alliance
        let mut units = team_of(&[1, 1, 0, 5], Team::Blue);
        apply_synergies(&mut units);
        assert!((units[0].speed_multiplier - 1.15 * 1.05).abs() < 1e-5);
        assert!((units[2].dmg_multiplier - 1.10).abs() < 1e-5);
        assert!((units[2].speed_multiplier - 1.05).abs() < 1e-5);
    }

    #[test]
    fn test_compose_pvp_mirrors_red() {
        let mut p0 = Unit::new(0, Team::Blue).at(5.0, 20.0);
        p0.health = 3.0;
        p0.abilities[0].cooldown = 4.0;
        let mut p1 = Unit::new(1, Team::Blue).at(-5.0, 30.0);
        p1.facing = 30.0;
        let mut dead = Unit::new(2, Team::Blue);
        dead.active = false;

        let mut state = CombatState::new();
        compose_pvp(&mut state, &[p0, dead], &[p1]);

        assert_eq!(state.units.len(), 2);
        assert_eq!(state.units[0].team, Team::Blue);
        assert_eq!(state.units[0].health, 40.0);
        assert_eq!(state.units[0].abilities[0].cooldown, 0.0);
        assert_eq!(state.units[1].team, Team::Red);
        assert_eq!(state.units[1].position.z, -30.0);
        assert_eq!(state.units[1].position.x, -5.0);
        assert_eq!(state.units[1].facing, 150.0);
    }

    #[test]
    fn test_compose_does_not_alias_roster() {
        let roster = vec![Unit::new(0, Team::Blue).at(0.0, 10.0)];
        let mut state = CombatState::new();
        compose_pvp(&mut state, &roster, &roster);
        state.units[0].health = 1.0;
        state.units[0].position.x = 99.0;
        assert_eq!(roster[0].health, 40.0);
        assert_eq!(roster[0].position.x, 0.0);
    }

    #[test]
    fn test_compose_respects_capacity() {
        let roster = team_of(&[0; 40], Team::Blue);
        let mut state = CombatState::new();
        compose_pvp(&mut state, &roster, &roster);
        assert_eq!(state.units.len(), MAX_UNITS);
    }

    #[test]
    fn test_compose_pve_wave() {
        let roster = team_of(&[0], Team::Blue);
        let mut state = CombatState::new();
        compose_pve(&mut state, &roster, 2);
        assert_eq!(state.count_teams(), (1, 3));
        assert_eq!(state.units[1].abilities[0].ability, Some(AbilityId::MagicMissile));
        assert_eq!(state.units[1].abilities[0].level, 1);
        // Three goblins reach Goblin Swarm tier 2
        assert!((state.units[1].speed_multiplier - 1.30).abs() < 1e-6);
    }

    #[test]
    fn test_pve_round_schedule() {
        let pve: Vec<u32> = (0..6).filter(|&r| is_pve_round(r)).collect();
        assert_eq!(pve, vec![0, 1, 3]);
        assert_eq!(pve_wave_index(0), 0);
        assert_eq!(pve_wave_index(1), 1);
        assert_eq!(pve_wave_index(3), 2);
    }
}
