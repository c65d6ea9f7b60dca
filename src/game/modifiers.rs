//! Modifier Application and Ticking
//!
//! At most one active modifier exists per (unit, kind). Re-applying a kind
//! refreshes the existing instance to the larger duration and value.

use crate::game::pool::Pool;
use crate::game::state::{CombatState, Modifier, ModifierKind};

/// Index of the active modifier of `kind` on `unit`.
pub fn find_modifier(mods: &Pool<Modifier>, unit: usize, kind: ModifierKind) -> Option<usize> {
    mods.iter_active()
        .find(|(_, m)| m.unit == unit && m.kind == kind)
        .map(|(i, _)| i)
}

/// True if `unit` carries an active modifier of `kind`.
#[inline]
pub fn has_modifier(mods: &Pool<Modifier>, unit: usize, kind: ModifierKind) -> bool {
    find_modifier(mods, unit, kind).is_some()
}

/// Largest value among active modifiers of `kind` on `unit`, or 0.
pub fn modifier_value(mods: &Pool<Modifier>, unit: usize, kind: ModifierKind) -> f32 {
    mods.iter_active()
        .filter(|(_, m)| m.unit == unit && m.kind == kind)
        .fold(0.0, |best, (_, m)| if m.value > best { m.value } else { best })
}

/// Apply a modifier.
///
/// Stuns are refused outright on a unit with SpellProtect. A duplicate
/// (unit, kind) keeps the max of old and new duration and value. Returns
/// false when refused or the pool is full.
pub fn add_modifier(
    mods: &mut Pool<Modifier>,
    unit: usize,
    kind: ModifierKind,
    duration: f32,
    value: f32,
) -> bool {
    if kind == ModifierKind::Stun && has_modifier(mods, unit, ModifierKind::SpellProtect) {
        return false;
    }

    if let Some(idx) = find_modifier(mods, unit, kind) {
        let m = &mut mods[idx];
        m.duration = m.duration.max(duration);
        m.value = m.value.max(value);
        return true;
    }

    mods.spawn(Modifier { kind, unit, duration, value, active: true }).is_some()
}

/// Deactivate every modifier of `kind` on `unit`.
pub fn remove_modifier(mods: &mut Pool<Modifier>, unit: usize, kind: ModifierKind) {
    for m in mods.slots_mut() {
        if m.active && m.unit == unit && m.kind == kind {
            m.active = false;
        }
    }
}

/// Phase 1 of the combat tick.
///
/// Drops modifiers whose unit is gone, counts down timed ones (an expiring
/// Shield also zeroes shield points) and applies DigHeal healing.
pub fn tick_modifiers(state: &mut CombatState, dt: f32) {
    let CombatState { units, modifiers, .. } = state;

    for m in modifiers.slots_mut() {
        if !m.active {
            continue;
        }
        let Some(unit) = units.get_mut(m.unit).filter(|u| u.active) else {
            m.active = false;
            continue;
        };

        if m.duration > 0.0 {
            m.duration -= dt;
            if m.duration <= 0.0 {
                if m.kind == ModifierKind::Shield {
                    unit.shield = 0.0;
                }
                m.active = false;
                continue;
            }
        }

        if m.kind == ModifierKind::DigHeal {
            unit.health += m.value * dt;
            unit.clamp_health();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Team, Unit, MAX_MODIFIERS};
    use proptest::prelude::*;

    fn pool() -> Pool<Modifier> {
        Pool::with_capacity(MAX_MODIFIERS)
    }

    fn count(mods: &Pool<Modifier>, unit: usize, kind: ModifierKind) -> usize {
        mods.iter_active().filter(|(_, m)| m.unit == unit && m.kind == kind).count()
    }

    #[test]
    fn test_dedup_keeps_max() {
        let mut mods = pool();
        add_modifier(&mut mods, 0, ModifierKind::Armor, 5.0, 1.0);
        add_modifier(&mut mods, 0, ModifierKind::Armor, 2.0, 3.0);
        assert_eq!(count(&mods, 0, ModifierKind::Armor), 1);
        let idx = find_modifier(&mods, 0, ModifierKind::Armor).unwrap();
        assert_eq!(mods[idx].duration, 5.0);
        assert_eq!(mods[idx].value, 3.0);
    }

    #[test]
    fn test_different_units_not_merged() {
        let mut mods = pool();
        add_modifier(&mut mods, 0, ModifierKind::Stun, 1.0, 0.0);
        add_modifier(&mut mods, 1, ModifierKind::Stun, 1.0, 0.0);
        assert_eq!(mods.active_count(), 2);
    }

    #[test]
    fn test_spell_protect_blocks_stun() {
        let mut mods = pool();
        add_modifier(&mut mods, 0, ModifierKind::SpellProtect, 4.0, 0.0);
        assert!(!add_modifier(&mut mods, 0, ModifierKind::Stun, 2.0, 0.0));
        assert!(!has_modifier(&mods, 0, ModifierKind::Stun));
        // Other kinds still apply
        assert!(add_modifier(&mut mods, 0, ModifierKind::Armor, 2.0, 1.0));
        // And other units are unaffected
        assert!(add_modifier(&mut mods, 1, ModifierKind::Stun, 2.0, 0.0));
    }

    #[test]
    fn test_modifier_value_defaults_zero() {
        let mods = pool();
        assert_eq!(modifier_value(&mods, 3, ModifierKind::Lifesteal), 0.0);
    }

    #[test]
    fn test_remove_modifier() {
        let mut mods = pool();
        add_modifier(&mut mods, 2, ModifierKind::Charging, 10.0, 80.0);
        remove_modifier(&mut mods, 2, ModifierKind::Charging);
        assert!(!has_modifier(&mods, 2, ModifierKind::Charging));
    }

    #[test]
    fn test_tick_expires_and_clears_shield() {
        let mut state = CombatState::new();
        let mut u = Unit::new(0, Team::Blue);
        u.shield = 10.0;
        state.spawn_unit(u);
        add_modifier(&mut state.modifiers, 0, ModifierKind::Shield, 0.1, 10.0);

        tick_modifiers(&mut state, 0.05);
        assert_eq!(state.units[0].shield, 10.0);
        tick_modifiers(&mut state, 0.06);
        assert_eq!(state.units[0].shield, 0.0);
        assert_eq!(state.modifiers.active_count(), 0);
    }

    #[test]
    fn test_tick_drops_modifiers_of_dead_units() {
        let mut state = CombatState::new();
        state.spawn_unit(Unit::new(0, Team::Blue));
        add_modifier(&mut state.modifiers, 0, ModifierKind::Armor, 5.0, 1.0);
        add_modifier(&mut state.modifiers, 7, ModifierKind::Armor, 5.0, 1.0);
        state.units[0].active = false;
        tick_modifiers(&mut state, 0.016);
        assert_eq!(state.modifiers.active_count(), 0);
    }

    #[test]
    fn test_permanent_modifier_does_not_expire() {
        let mut state = CombatState::new();
        state.spawn_unit(Unit::new(0, Team::Blue));
        add_modifier(&mut state.modifiers, 0, ModifierKind::SpeedMult, 0.0, 1.5);
        for _ in 0..100 {
            tick_modifiers(&mut state, 0.1);
        }
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::SpeedMult));
    }

    #[test]
    fn test_dig_heal_clamps_to_max() {
        let mut state = CombatState::new();
        let mut u = Unit::new(0, Team::Blue);
        u.health = 39.0;
        state.spawn_unit(u);
        add_modifier(&mut state.modifiers, 0, ModifierKind::DigHeal, 4.0, 10.0);
        tick_modifiers(&mut state, 0.5);
        assert_eq!(state.units[0].health, 40.0);
    }

    proptest! {
        #[test]
        fn prop_dedup_duration_is_max(d1 in 0.01f32..100.0, d2 in 0.01f32..100.0, flip in any::<bool>()) {
            let mut mods = pool();
            let (a, b) = if flip { (d2, d1) } else { (d1, d2) };
            add_modifier(&mut mods, 4, ModifierKind::Lifesteal, a, 0.2);
            add_modifier(&mut mods, 4, ModifierKind::Lifesteal, b, 0.2);
            prop_assert_eq!(count(&mods, 4, ModifierKind::Lifesteal), 1);
            let idx = find_modifier(&mods, 4, ModifierKind::Lifesteal).unwrap();
            prop_assert_eq!(mods[idx].duration, d1.max(d2));
        }
    }
}
