//! Ability Cast Engine
//!
//! One handler per [`AbilityId`], dispatched through a table indexed by the
//! id. [`cast_ability`] owns the shared rules (empty slot, cooldown, passive,
//! range gate, setting the cooldown); handlers only apply effects and report
//! whether the cast happened.
//!
//! Also holds the ability-driven behavior that runs outside a proactive cast:
//! health-threshold passives, Primal Charge movement and on-hit procs.

use crate::core::rng::det_roll;
use crate::game::catalog::{
    key, AbilityId, ABILITY_COUNT, CHARGE_DURATION, DEFAULT_CHARGE_SPEED,
    DEFAULT_CRAGGY_STUN, ATTACK_RANGE,
};
use crate::game::events::EventBuffer;
use crate::game::fissure::{fissure_strike, spawn_fissure};
use crate::game::modifiers::{add_modifier, has_modifier, modifier_value, remove_modifier};
use crate::game::projectile::launch;
use crate::game::state::{CombatState, ModifierKind, Projectile, ProjectileKind};

/// Inputs shared by every handler.
#[derive(Debug, Clone, Copy)]
pub struct CastContext {
    /// Casting unit.
    pub caster: usize,
    /// 0-based level of the slot being cast.
    pub level: u8,
    /// Resolved target (closest enemy), if any.
    pub target: Option<usize>,
}

/// Handler signature. Returns true if the ability took effect.
pub type CastFn = fn(&mut CombatState, &CastContext, &mut EventBuffer) -> bool;

/// Handler table indexed by [`AbilityId`].
static CAST_HANDLERS: [CastFn; ABILITY_COUNT] = [
    cast_magic_missile,
    cast_passive, // Dig
    cast_vacuum,
    cast_chain_frost,
    cast_blood_rage,
    cast_earthquake,
    cast_spell_protect,
    cast_craggy_armor,
    cast_stone_gaze,
    cast_fissure,
    cast_vlad_aura,
    cast_maelstrom,
    cast_swap,
    cast_aphotic_shield,
    cast_hook,
    cast_primal_charge,
    cast_passive, // Sunder
];

/// Try to cast the ability in `slot` of `caster`.
///
/// Does nothing and returns false for an empty slot, a passive, a slot still
/// cooling down, or a ranged ability whose target is missing or out of range.
/// On success the slot's cooldown is set and an event is recorded.
pub fn cast_ability(
    state: &mut CombatState,
    caster: usize,
    slot: usize,
    target: Option<usize>,
    events: &mut EventBuffer,
) -> bool {
    let Some(ability_slot) = state.units.get(caster).and_then(|u| u.abilities.get(slot)).copied() else {
        return false;
    };
    let Some(ability) = ability_slot.ability else {
        return false;
    };
    if ability_slot.cooldown > 0.0 {
        return false;
    }

    let def = ability.def();
    if def.passive {
        return false;
    }

    let range = def.range_at(ability_slot.level);
    if range > 0.0 {
        let Some(t) = target else {
            return false;
        };
        let d = state.units[caster].position.dist_xz(state.units[t].position);
        if d > range {
            return false;
        }
    }

    let ctx = CastContext { caster, level: ability_slot.level, target };
    if !CAST_HANDLERS[ability.index()](state, &ctx, events) {
        return false;
    }

    let unit = &mut state.units[caster];
    unit.abilities[slot].cooldown = def.cooldown_at(ability_slot.level);
    events.cast(caster, ability, unit.position);
    true
}

// =============================================================================
// HANDLERS
// =============================================================================

fn cast_passive(_: &mut CombatState, _: &CastContext, _: &mut EventBuffer) -> bool {
    false
}

fn cast_magic_missile(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let Some(target) = ctx.target else { return false };
    let def = AbilityId::MagicMissile.def();
    let caster = &state.units[ctx.caster];
    let proj = Projectile {
        kind: ProjectileKind::MagicMissile,
        position: caster.position,
        target,
        source: ctx.caster,
        source_team: caster.team,
        speed: def.value(ctx.level, key::MM_PROJ_SPEED),
        damage: def.value(ctx.level, key::MM_DAMAGE),
        stun_duration: def.value(ctx.level, key::MM_STUN_DUR),
        level: ctx.level,
        ..Default::default()
    };
    launch(&mut state.projectiles, proj);
    true
}

fn cast_vacuum(state: &mut CombatState, ctx: &CastContext, events: &mut EventBuffer) -> bool {
    let def = AbilityId::Vacuum.def();
    let radius = def.value(ctx.level, key::VAC_RADIUS);
    let stun = def.value(ctx.level, key::VAC_STUN_DUR);
    let center = state.units[ctx.caster].position;
    let team = state.units[ctx.caster].team;

    let mut hit_any = false;
    for j in 0..state.units.len() {
        let u = &state.units[j];
        if !u.active || u.team == team {
            continue;
        }
        if has_modifier(&state.modifiers, j, ModifierKind::Invulnerable) {
            continue;
        }
        if center.dist_xz(u.position) <= radius {
            state.units[j].position.set_xz(center);
            add_modifier(&mut state.modifiers, j, ModifierKind::Stun, stun, 0.0);
            events.shake(j, state.units[j].position, 5.0, 0.25);
            hit_any = true;
        }
    }
    hit_any
}

fn cast_chain_frost(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let Some(target) = ctx.target else { return false };
    let def = AbilityId::ChainFrost.def();
    let caster = &state.units[ctx.caster];
    let proj = Projectile {
        kind: ProjectileKind::ChainFrost,
        position: caster.position,
        target,
        source: ctx.caster,
        source_team: caster.team,
        speed: def.value(ctx.level, key::CF_PROJ_SPEED),
        damage: def.value(ctx.level, key::CF_DAMAGE),
        bounces: def.value(ctx.level, key::CF_BOUNCES) as u32,
        bounce_range: def.value(ctx.level, key::CF_BOUNCE_RANGE),
        level: ctx.level,
        ..Default::default()
    };
    launch(&mut state.projectiles, proj);
    true
}

fn cast_blood_rage(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let def = AbilityId::BloodRage.def();
    add_modifier(
        &mut state.modifiers,
        ctx.caster,
        ModifierKind::Lifesteal,
        def.value(ctx.level, key::BR_DURATION),
        def.value(ctx.level, key::BR_LIFESTEAL),
    );
    true
}

fn cast_earthquake(state: &mut CombatState, ctx: &CastContext, events: &mut EventBuffer) -> bool {
    let def = AbilityId::Earthquake.def();
    let radius = def.value(ctx.level, key::EQ_RADIUS);
    let damage = def.value(ctx.level, key::EQ_DAMAGE);
    let center = state.units[ctx.caster].position;

    // Hits allies too.
    for j in 0..state.units.len() {
        if j == ctx.caster || !state.units[j].active {
            continue;
        }
        if has_modifier(&state.modifiers, j, ModifierKind::Invulnerable) {
            continue;
        }
        let u = &mut state.units[j];
        if center.dist_xz(u.position) <= radius {
            u.health -= damage;
            u.check_death();
        }
    }
    events.shake(ctx.caster, center, 10.0, 0.5);
    true
}

fn cast_spell_protect(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let dur = AbilityId::SpellProtect.def().value(ctx.level, key::SP_DURATION);
    add_modifier(&mut state.modifiers, ctx.caster, ModifierKind::SpellProtect, dur, 0.0);
    true
}

fn cast_craggy_armor(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let def = AbilityId::CraggyArmor.def();
    let dur = def.value(ctx.level, key::CA_DURATION);
    add_modifier(&mut state.modifiers, ctx.caster, ModifierKind::Armor, dur, def.value(ctx.level, key::CA_ARMOR));
    add_modifier(
        &mut state.modifiers,
        ctx.caster,
        ModifierKind::CraggyArmor,
        dur,
        def.value(ctx.level, key::CA_STUN_CHANCE),
    );
    true
}

fn cast_stone_gaze(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let def = AbilityId::StoneGaze.def();
    add_modifier(
        &mut state.modifiers,
        ctx.caster,
        ModifierKind::StoneGaze,
        def.value(ctx.level, key::SG_DURATION),
        def.value(ctx.level, key::SG_GAZE_THRESH),
    );
    true
}

fn cast_fissure(state: &mut CombatState, ctx: &CastContext, events: &mut EventBuffer) -> bool {
    let Some(target) = ctx.target else { return false };
    let def = AbilityId::Fissure.def();
    let length = def.value(ctx.level, key::FI_LENGTH);
    let width = def.value(ctx.level, key::FI_WIDTH);
    let caster = &state.units[ctx.caster];
    let (from, team) = (caster.position, caster.team);

    spawn_fissure(
        &mut state.fissures,
        from,
        state.units[target].position,
        length,
        width,
        def.value(ctx.level, key::FI_DURATION),
        team,
        ctx.caster,
    );
    fissure_strike(state, ctx.caster, target, length, width, def.value(ctx.level, key::FI_DAMAGE));
    events.shake(ctx.caster, from, 6.0, 0.3);
    true
}

fn cast_vlad_aura(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let def = AbilityId::VladAura.def();
    let ls = def.value(ctx.level, key::VA_LIFESTEAL);
    let dur = def.value(ctx.level, key::VA_DURATION);
    let team = state.units[ctx.caster].team;

    for j in 0..state.units.len() {
        if state.units[j].active && state.units[j].team == team {
            add_modifier(&mut state.modifiers, j, ModifierKind::Lifesteal, dur, ls);
        }
    }
    add_modifier(&mut state.modifiers, ctx.caster, ModifierKind::VladAura, dur, ls);
    true
}

fn cast_maelstrom(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let def = AbilityId::Maelstrom.def();
    add_modifier(
        &mut state.modifiers,
        ctx.caster,
        ModifierKind::Maelstrom,
        def.value(ctx.level, key::ML_DURATION),
        def.value(ctx.level, key::ML_PROC_CHANCE),
    );
    true
}

fn cast_swap(state: &mut CombatState, ctx: &CastContext, events: &mut EventBuffer) -> bool {
    let Some(other) = state.furthest_enemy(ctx.caster) else { return false };
    let def = AbilityId::Swap.def();

    let mine = state.units[ctx.caster].position;
    let theirs = state.units[other].position;
    state.units[ctx.caster].position.set_xz(theirs);
    state.units[other].position.set_xz(mine);

    let shield = def.value(ctx.level, key::SW_SHIELD);
    state.units[ctx.caster].shield = shield;
    add_modifier(
        &mut state.modifiers,
        ctx.caster,
        ModifierKind::Shield,
        def.value(ctx.level, key::SW_SHIELD_DUR),
        shield,
    );
    events.shake(ctx.caster, state.units[ctx.caster].position, 4.0, 0.2);
    true
}

fn cast_aphotic_shield(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let ally = state.lowest_hp_ally(ctx.caster).unwrap_or(ctx.caster);
    let def = AbilityId::AphoticShield.def();

    remove_modifier(&mut state.modifiers, ally, ModifierKind::Stun);
    remove_modifier(&mut state.modifiers, ally, ModifierKind::StoneGaze);

    let shield = def.value(ctx.level, key::AS_SHIELD);
    state.units[ally].shield = shield;
    add_modifier(
        &mut state.modifiers,
        ally,
        ModifierKind::Shield,
        def.value(ctx.level, key::AS_DURATION),
        shield,
    );
    true
}

fn cast_hook(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let def = AbilityId::Hook.def();
    let reach = def.value(ctx.level, key::HK_RANGE);
    let from = state.units[ctx.caster].position;
    let in_reach = |state: &CombatState, t: usize| from.dist_xz(state.units[t].position) <= reach;

    // Prefer the furthest enemy, fall back to the closest.
    let Some(mut target) = state.furthest_enemy(ctx.caster) else { return false };
    if !in_reach(state, target) {
        match state.closest_enemy(ctx.caster) {
            Some(t) if in_reach(state, t) => target = t,
            _ => return false,
        }
    }

    let proj = Projectile {
        kind: ProjectileKind::Hook,
        position: from,
        target,
        source: ctx.caster,
        source_team: state.units[ctx.caster].team,
        speed: def.value(ctx.level, key::HK_SPEED),
        damage: def.value(ctx.level, key::HK_DMG_PER_DIST),
        bounce_range: reach,
        level: ctx.level,
        ..Default::default()
    };
    launch(&mut state.projectiles, proj);
    true
}

fn cast_primal_charge(state: &mut CombatState, ctx: &CastContext, _: &mut EventBuffer) -> bool {
    let Some(target) = state.furthest_enemy(ctx.caster) else { return false };
    let speed = AbilityId::PrimalCharge.def().value(ctx.level, key::PC_CHARGE_SPEED);
    state.units[ctx.caster].charge_target = Some(target);
    add_modifier(&mut state.modifiers, ctx.caster, ModifierKind::Charging, CHARGE_DURATION, speed);
    true
}

// =============================================================================
// PASSIVES
// =============================================================================

/// Evaluate health-threshold passives (Dig, Sunder) for unit `i`.
///
/// Each fires at most once per life and then starts its own cooldown.
/// Callers skip this while the unit is stunned.
pub fn trigger_passives(state: &mut CombatState, i: usize, events: &mut EventBuffer) {
    for a in 0..state.units[i].abilities.len() {
        let slot = state.units[i].abilities[a];
        let Some(ability) = slot.ability else { continue };
        if slot.triggered || slot.cooldown > 0.0 {
            continue;
        }
        let def = ability.def();
        let max_hp = state.units[i].max_health();
        let health = state.units[i].health;

        match ability {
            AbilityId::Dig => {
                let threshold = def.value(slot.level, key::DIG_HP_THRESH);
                if health <= 0.0 || health > max_hp * threshold {
                    continue;
                }
                let heal_dur = def.value(slot.level, key::DIG_HEAL_DUR);
                let s = &mut state.units[i].abilities[a];
                s.triggered = true;
                s.cooldown = def.cooldown_at(slot.level);
                add_modifier(&mut state.modifiers, i, ModifierKind::Invulnerable, heal_dur, 0.0);
                add_modifier(&mut state.modifiers, i, ModifierKind::DigHeal, heal_dur, max_hp / heal_dur);
            }
            AbilityId::Sunder => {
                let threshold = def.value(slot.level, key::SU_HP_THRESH);
                if health <= 0.0 || health > max_hp * threshold {
                    continue;
                }
                let Some(ally) = state.highest_hp_ally(i) else { continue };
                let ally_hp = state.units[ally].health;
                state.units[i].health = ally_hp;
                state.units[ally].health = health;
                state.units[i].clamp_health();
                state.units[ally].clamp_health();

                let s = &mut state.units[i].abilities[a];
                s.triggered = true;
                s.cooldown = def.cooldown_at(slot.level);
                events.cast(i, AbilityId::Sunder, state.units[i].position);
            }
            _ => {}
        }
    }
}

// =============================================================================
// PRIMAL CHARGE MOVEMENT
// =============================================================================

/// Advance a Primal Charge for unit `i`.
///
/// Returns true while the charge owns the unit's movement this tick. A lost
/// charge target clears the charge and returns false.
pub fn charge_step(state: &mut CombatState, i: usize, dt: f32, events: &mut EventBuffer) -> bool {
    let Some(ct) = state.units[i].charge_target else { return false };
    if !state.is_live(ct) {
        state.units[i].charge_target = None;
        return false;
    }

    let me = state.units[i].position;
    let dest = state.units[ct].position;
    let mut speed = modifier_value(&state.modifiers, i, ModifierKind::Charging);
    if speed <= 0.0 {
        speed = DEFAULT_CHARGE_SPEED;
    }

    let dist = me.dist_xz(dest);
    if dist > ATTACK_RANGE {
        let pos = &mut state.units[i].position;
        pos.x += ((dest.x - me.x) / dist) * speed * dt;
        pos.z += ((dest.z - me.z) / dist) * speed * dt;
        return true;
    }

    // Impact
    let level = state.units[i].ability_level(AbilityId::PrimalCharge).unwrap_or(0);
    let def = AbilityId::PrimalCharge.def();
    let damage = def.value(level, key::PC_DAMAGE);
    let knockback = def.value(level, key::PC_KNOCKBACK);
    let radius = def.value(level, key::PC_AOE_RADIUS);
    let team = state.units[i].team;

    for j in 0..state.units.len() {
        if !state.units[j].active || state.units[j].team == team {
            continue;
        }
        if has_modifier(&state.modifiers, j, ModifierKind::Invulnerable) {
            continue;
        }
        let u = &mut state.units[j];
        if dest.dist_xz(u.position) > radius {
            continue;
        }
        let dmg = u.absorb_with_shield(damage);
        u.health -= dmg;
        u.check_death();

        let kx = u.position.x - dest.x;
        let kz = u.position.z - dest.z;
        let klen = (kx * kx + kz * kz).sqrt();
        if klen > 0.001 {
            u.position.x += (kx / klen) * knockback;
            u.position.z += (kz / klen) * knockback;
        }
    }

    events.shake(i, me, 8.0, 0.4);
    state.units[i].charge_target = None;
    remove_modifier(&mut state.modifiers, i, ModifierKind::Charging);
    true
}

// =============================================================================
// ON-HIT PROCS
// =============================================================================

/// Procs after `attacker` lands a basic attack on `target`.
///
/// Craggy Armor on the target may stun the attacker; Maelstrom on the
/// attacker may release a bouncing bolt from the target. Both rolls use
/// [`det_roll`] over current state.
pub fn on_attack_hit(state: &mut CombatState, attacker: usize, target: usize, events: &mut EventBuffer) {
    if has_modifier(&state.modifiers, target, ModifierKind::CraggyArmor) {
        let chance = modifier_value(&state.modifiers, target, ModifierKind::CraggyArmor);
        let roll = det_roll(attacker, target, state.units[attacker].health);
        if roll < chance {
            let stun = state.units[target]
                .ability_level(AbilityId::CraggyArmor)
                .map_or(DEFAULT_CRAGGY_STUN, |lvl| {
                    AbilityId::CraggyArmor.def().value(lvl, key::CA_STUN_DUR)
                });
            add_modifier(&mut state.modifiers, attacker, ModifierKind::Stun, stun, 0.0);
            events.shake(attacker, state.units[attacker].position, 3.0, 0.15);
        }
    }

    if has_modifier(&state.modifiers, attacker, ModifierKind::Maelstrom) {
        let chance = modifier_value(&state.modifiers, attacker, ModifierKind::Maelstrom);
        let roll = det_roll(attacker, target, state.units[target].health);
        if roll < chance {
            let level = state.units[attacker].ability_level(AbilityId::Maelstrom).unwrap_or(0);
            let def = AbilityId::Maelstrom.def();
            let proj = Projectile {
                kind: ProjectileKind::Maelstrom,
                position: state.units[target].position,
                target,
                source: attacker,
                source_team: state.units[attacker].team,
                speed: def.value(level, key::ML_SPEED),
                damage: def.value(level, key::ML_DAMAGE),
                bounces: def.value(level, key::ML_BOUNCES) as u32,
                bounce_range: def.value(level, key::ML_BOUNCE_RANGE),
                level,
                ..Default::default()
            };
            launch(&mut state.projectiles, proj);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Team, Unit};

    fn duel(caster: Unit, enemy: Unit) -> CombatState {
        let mut state = CombatState::new();
        state.spawn_unit(caster);
        state.spawn_unit(enemy);
        state
    }

    #[test]
    fn test_cast_sets_cooldown() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::MagicMissile, 0),
            Unit::new(0, Team::Red).at(0.0, 20.0),
        );
        let mut events = EventBuffer::new();
        assert!(cast_ability(&mut state, 0, 0, Some(1), &mut events));
        assert_eq!(state.units[0].abilities[0].cooldown, 10.0);
        assert_eq!(state.projectiles.active_count(), 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_cooling_down_slot_is_untouched() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::MagicMissile, 0),
            Unit::new(0, Team::Red).at(0.0, 20.0),
        );
        state.units[0].abilities[0].cooldown = 3.5;
        let before = state.compute_hash();
        assert!(!cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.compute_hash(), before);
        assert_eq!(state.units[0].abilities[0].cooldown, 3.5);
    }

    #[test]
    fn test_range_gate() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::ChainFrost, 0),
            Unit::new(0, Team::Red).at(0.0, 51.0),
        );
        assert!(!cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert!(!cast_ability(&mut state, 0, 0, None, &mut EventBuffer::new()));
        state.units[1].position.z = 49.0;
        assert!(cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
    }

    #[test]
    fn test_passive_never_cast() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Dig, 0),
            Unit::new(0, Team::Red),
        );
        assert!(!cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.units[0].abilities[0].cooldown, 0.0);
    }

    #[test]
    fn test_vacuum_fails_without_hits() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Vacuum, 0),
            Unit::new(0, Team::Red).at(0.0, 31.0),
        );
        assert!(!cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.units[0].abilities[0].cooldown, 0.0);

        state.units[1].position.z = 29.0;
        assert!(cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.units[1].position.z, 0.0);
        assert!(has_modifier(&state.modifiers, 1, ModifierKind::Stun));
        assert_eq!(state.units[0].abilities[0].cooldown, 22.0);
    }

    #[test]
    fn test_earthquake_hits_allies() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Earthquake, 0),
            Unit::new(0, Team::Red).at(0.0, 10.0),
        );
        state.spawn_unit(Unit::new(0, Team::Blue).at(5.0, 0.0));
        assert!(cast_ability(&mut state, 0, 0, None, &mut EventBuffer::new()));
        assert_eq!(state.units[0].health, 40.0);
        assert_eq!(state.units[1].health, 32.0);
        assert_eq!(state.units[2].health, 32.0);
    }

    #[test]
    fn test_swap_trades_positions_and_shields() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Swap, 0),
            Unit::new(0, Team::Red).at(0.0, 10.0),
        );
        state.spawn_unit(Unit::new(0, Team::Red).at(0.0, 40.0));
        assert!(cast_ability(&mut state, 0, 0, None, &mut EventBuffer::new()));
        assert_eq!(state.units[0].position.z, 40.0);
        assert_eq!(state.units[2].position.z, 0.0);
        assert_eq!(state.units[0].shield, 10.0);
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::Shield));
    }

    #[test]
    fn test_aphotic_shield_cleanses_weakest_ally() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::AphoticShield, 0),
            Unit::new(0, Team::Blue),
        );
        state.units[1].health = 5.0;
        add_modifier(&mut state.modifiers, 1, ModifierKind::Stun, 3.0, 0.0);
        assert!(cast_ability(&mut state, 0, 0, None, &mut EventBuffer::new()));
        assert!(!has_modifier(&state.modifiers, 1, ModifierKind::Stun));
        assert_eq!(state.units[1].shield, 8.0);
    }

    #[test]
    fn test_hook_prefers_furthest_in_reach() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Hook, 0),
            Unit::new(0, Team::Red).at(0.0, 20.0),
        );
        state.spawn_unit(Unit::new(0, Team::Red).at(0.0, 40.0));
        assert!(cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.projectiles[0].target, 2);

        // Furthest out of reach falls back to the closest
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Hook, 0),
            Unit::new(0, Team::Red).at(0.0, 20.0),
        );
        state.spawn_unit(Unit::new(0, Team::Red).at(0.0, 90.0));
        assert!(cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.projectiles[0].target, 1);

        // Nothing in reach
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::Hook, 0),
            Unit::new(0, Team::Red).at(0.0, 90.0),
        );
        assert!(!cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
    }

    #[test]
    fn test_dig_triggers_once_below_threshold() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(2, AbilityId::Dig, 0),
            Unit::new(0, Team::Red),
        );
        state.units[0].health = 10.0; // exactly 25% of 40
        let mut events = EventBuffer::new();
        trigger_passives(&mut state, 0, &mut events);

        assert!(state.units[0].abilities[2].triggered);
        assert_eq!(state.units[0].abilities[2].cooldown, 30.0);
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::Invulnerable));
        assert_eq!(modifier_value(&state.modifiers, 0, ModifierKind::DigHeal), 10.0);

        let active = state.modifiers.active_count();
        state.units[0].abilities[2].cooldown = 0.0;
        trigger_passives(&mut state, 0, &mut events);
        assert_eq!(state.modifiers.active_count(), active);
    }

    #[test]
    fn test_sunder_swaps_with_healthiest_ally() {
        let mut state = duel(
            Unit::new(1, Team::Blue).with_ability(0, AbilityId::Sunder, 0),
            Unit::new(0, Team::Blue),
        );
        state.units[0].health = 4.0; // 20% of 20
        let mut events = EventBuffer::new();
        trigger_passives(&mut state, 0, &mut events);
        // Goblin max is 20, ally had 40
        assert_eq!(state.units[0].health, 20.0);
        assert_eq!(state.units[1].health, 4.0);
        assert!(state.units[0].abilities[0].triggered);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_charge_moves_then_impacts() {
        let mut state = duel(
            Unit::new(0, Team::Blue).with_ability(0, AbilityId::PrimalCharge, 0),
            Unit::new(0, Team::Red).at(0.0, 20.0),
        );
        assert!(cast_ability(&mut state, 0, 0, Some(1), &mut EventBuffer::new()));
        assert_eq!(state.units[0].charge_target, Some(1));

        state.spawn_unit(Unit::new(0, Team::Red).at(0.0, 25.0));
        let mut events = EventBuffer::new();
        assert!(charge_step(&mut state, 0, 0.1, &mut events));
        assert!((state.units[0].position.z - 8.0).abs() < 1e-4);
        assert!(charge_step(&mut state, 0, 0.1, &mut events));
        assert!((state.units[0].position.z - 16.0).abs() < 1e-4);

        // Within attack range: impact
        assert!(charge_step(&mut state, 0, 0.1, &mut events));
        assert_eq!(state.units[0].charge_target, None);
        assert_eq!(state.units[1].health, 32.0);
        assert_eq!(state.units[2].health, 32.0);
        // Knocked away from the impact point
        assert!((state.units[2].position.z - 31.0).abs() < 1e-4);
        assert!(!has_modifier(&state.modifiers, 0, ModifierKind::Charging));
    }
}
