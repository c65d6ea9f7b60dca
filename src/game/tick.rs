//! Combat Resolver
//!
//! One fixed step of a combat round. Must be 100% deterministic: the same
//! containers and the same `dt` always produce the same result.
//!
//! Phase order is part of the contract:
//! 1. modifiers, 2. fissures, 3. projectiles, 4. units (index order),
//! 5. stone gaze, 6. termination.

use crate::game::cast::{cast_ability, charge_step, on_attack_hit, trigger_passives};
use crate::game::catalog::{
    key, AbilityId, ABILITY_CAST_DELAY, ACTIVATION_ORDER, ATTACK_RANGE, DEFAULT_GAZE_CONE,
    FISSURE_UNIT_RADIUS, MAX_ABILITIES_PER_UNIT, TURN_RATE, UNIT_COLLISION_RADIUS,
};
use crate::game::events::{CombatEvent, EventBuffer};
use crate::game::fissure::{resolve_fissure_collision, tick_fissures};
use crate::game::modifiers::{add_modifier, has_modifier, modifier_value, tick_modifiers};
use crate::game::projectile::tick_projectiles;
use crate::game::state::{CombatState, ModifierKind};

/// Round status after a tick. Discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Outcome {
    /// Both teams still have units.
    #[default]
    Fighting = 0,
    /// Red has no active units.
    BlueWins = 1,
    /// Blue has no active units.
    RedWins = 2,
    /// Nobody is left.
    Draw = 3,
}

impl Outcome {
    /// Numeric code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True once the round is decided.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != Outcome::Fighting
    }
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<CombatEvent>,
    /// Round status after this tick
    pub outcome: Outcome,
}

/// Advance the combat by `dt` seconds.
///
/// # Determinism
///
/// - Units are processed in index order
/// - Pools are scanned in slot order
/// - On-hit chances use `det_roll`, never an RNG
/// - No system calls, no clock reads
pub fn combat_tick(state: &mut CombatState, dt: f32) -> TickResult {
    let mut events = EventBuffer::new();
    let alive_before: Vec<bool> = state.units.iter().map(|u| u.active).collect();

    // 1. Modifiers
    tick_modifiers(state, dt);

    // 2. Fissures
    tick_fissures(&mut state.fissures, dt);

    // 3. Projectiles
    tick_projectiles(state, dt, &mut events);

    // 4. Units
    for i in 0..state.units.len() {
        process_unit(state, i, dt, &mut events);
    }

    // 5. Stone Gaze
    process_gaze(state, dt, &mut events);

    for (i, was_alive) in alive_before.into_iter().enumerate() {
        if was_alive && !state.units[i].active {
            events.defeated(i, state.units[i].team);
        }
    }

    // 6. Termination
    TickResult {
        events: events.into_vec(),
        outcome: check_outcome(state),
    }
}

/// Run ticks until the round is decided or `max_ticks` pass.
///
/// A round that hits the cap is a draw. Returns the outcome and the number
/// of ticks run.
pub fn run_to_completion(state: &mut CombatState, dt: f32, max_ticks: u32) -> (Outcome, u32) {
    for t in 0..max_ticks {
        let result = combat_tick(state, dt);
        if result.outcome.is_terminal() {
            return (result.outcome, t + 1);
        }
    }
    (Outcome::Draw, max_ticks)
}

fn check_outcome(state: &CombatState) -> Outcome {
    match state.count_teams() {
        (0, 0) => Outcome::Draw,
        (_, 0) => Outcome::BlueWins,
        (0, _) => Outcome::RedWins,
        _ => Outcome::Fighting,
    }
}

// =============================================================================
// PER-UNIT PHASE
// =============================================================================

fn process_unit(state: &mut CombatState, i: usize, dt: f32, events: &mut EventBuffer) {
    if !state.units[i].active {
        return;
    }
    let stunned = has_modifier(&state.modifiers, i, ModifierKind::Stun);

    for slot in &mut state.units[i].abilities {
        if slot.ability.is_some() && slot.cooldown > 0.0 {
            slot.cooldown -= dt;
        }
    }

    if !stunned {
        trigger_passives(state, i, events);
    }
    if stunned || has_modifier(&state.modifiers, i, ModifierKind::DigHeal) {
        return;
    }

    let target = state.closest_enemy(i);
    state.units[i].target = target;
    if let Some(t) = target {
        turn_toward(state, i, t, dt);
    }

    let unit = &mut state.units[i];
    if unit.cast_delay > 0.0 {
        unit.cast_delay -= dt;
    }
    if unit.cast_delay <= 0.0 {
        try_cast(state, i, target, events);
    }

    if charge_step(state, i, dt, events) {
        return;
    }

    let Some(t) = target.filter(|&t| state.is_live(t)) else {
        return;
    };
    let dist = state.units[i].position.dist_xz(state.units[t].position);
    if dist > ATTACK_RANGE {
        move_toward(state, i, t, dt);
    } else {
        basic_attack(state, i, t, dt, events);
    }
}

/// Rotate facing toward `t` at [`TURN_RATE`], snapping when close.
fn turn_toward(state: &mut CombatState, i: usize, t: usize, dt: f32) {
    let goal = state.units[i].position.heading_to(state.units[t].position);
    let unit = &mut state.units[i];
    let mut diff = goal - unit.facing;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }

    let step = TURN_RATE * dt;
    if diff.abs() < step {
        unit.facing = goal;
    } else {
        unit.facing += diff.signum() * step;
    }
}

/// At most one cast per tick, scanning slots from the rotating cursor.
///
/// The cursor advances on every attempt, successful or not.
fn try_cast(state: &mut CombatState, i: usize, target: Option<usize>, events: &mut EventBuffer) {
    for _ in 0..MAX_ABILITIES_PER_UNIT {
        let unit = &mut state.units[i];
        let slot = ACTIVATION_ORDER[unit.next_slot];
        unit.next_slot = (unit.next_slot + 1) % MAX_ABILITIES_PER_UNIT;

        if cast_ability(state, i, slot, target, events) {
            state.units[i].cast_delay = ABILITY_CAST_DELAY;
            return;
        }
    }
}

fn move_toward(state: &mut CombatState, i: usize, t: usize, dt: f32) {
    let mut speed = state.units[i].stats().move_speed * state.units[i].speed_multiplier;
    let speed_mult = modifier_value(&state.modifiers, i, ModifierKind::SpeedMult);
    if speed_mult > 0.0 {
        speed *= speed_mult;
    }

    let dest = state.units[t].position;
    let old = state.units[i].position;
    let dx = dest.x - old.x;
    let dz = dest.z - old.z;
    let len = (dx * dx + dz * dz).sqrt();

    let mut pos = old;
    if len > 0.001 {
        pos.x += (dx / len) * speed * dt;
        pos.z += (dz / len) * speed * dt;
    }
    state.units[i].position = resolve_fissure_collision(&state.fissures, pos, old, FISSURE_UNIT_RADIUS);

    separate(state, i);
}

/// Push `i` and every overlapping active unit apart, half the overlap each.
fn separate(state: &mut CombatState, i: usize) {
    let min_dist = UNIT_COLLISION_RADIUS * 2.0;
    for j in 0..state.units.len() {
        if j == i || !state.units[j].active {
            continue;
        }
        let a = state.units[i].position;
        let b = state.units[j].position;
        let d = a.dist_xz(b);
        if d >= min_dist || d <= 0.001 {
            continue;
        }

        let half = (min_dist - d) * 0.5;
        let push_x = (a.x - b.x) / d * half;
        let push_z = (a.z - b.z) / d * half;
        state.units[i].position.x += push_x;
        state.units[i].position.z += push_z;
        state.units[j].position.x -= push_x;
        state.units[j].position.z -= push_z;
    }
}

fn basic_attack(state: &mut CombatState, i: usize, t: usize, dt: f32, events: &mut EventBuffer) {
    state.units[i].attack_cooldown -= dt;
    if state.units[i].attack_cooldown > 0.0 {
        return;
    }

    if !has_modifier(&state.modifiers, t, ModifierKind::Invulnerable) {
        let armor = modifier_value(&state.modifiers, t, ModifierKind::Armor);
        let attacker = &state.units[i];
        let raw = (attacker.stats().attack_damage * attacker.dmg_multiplier - armor).max(0.0);

        let target = &mut state.units[t];
        let dmg = target.absorb_with_shield(raw);
        target.health -= dmg;

        let lifesteal = modifier_value(&state.modifiers, i, ModifierKind::Lifesteal);
        if lifesteal > 0.0 {
            let attacker = &mut state.units[i];
            attacker.health += dmg * lifesteal;
            attacker.clamp_health();
        }

        on_attack_hit(state, i, t, events);
        state.units[t].check_death();
    }

    state.units[i].attack_cooldown = state.units[i].stats().attack_speed;
}

// =============================================================================
// STONE GAZE PHASE
// =============================================================================

fn process_gaze(state: &mut CombatState, dt: f32, events: &mut EventBuffer) {
    for i in 0..state.units.len() {
        if !state.units[i].active {
            continue;
        }
        let gazed = match find_gazer(state, i) {
            Some(g) => {
                state.units[i].gaze_accum += dt;
                petrify_if_due(state, i, g, events);
                true
            }
            None => false,
        };

        let unit = &mut state.units[i];
        if !gazed && unit.gaze_accum > 0.0 {
            unit.gaze_accum = (unit.gaze_accum - dt * 2.0).max(0.0);
        }
    }
}

/// First enemy gazer inside unit `i`'s facing cone.
fn find_gazer(state: &CombatState, i: usize) -> Option<usize> {
    let me = &state.units[i];
    let facing = me.facing.to_radians();
    let (face_x, face_z) = (facing.sin(), facing.cos());

    (0..state.units.len()).find(|&g| {
        let gazer = &state.units[g];
        if !gazer.active || gazer.team == me.team {
            return false;
        }
        if !has_modifier(&state.modifiers, g, ModifierKind::StoneGaze) {
            return false;
        }
        let dx = gazer.position.x - me.position.x;
        let dz = gazer.position.z - me.position.z;
        let d = (dx * dx + dz * dz).sqrt();
        if d < 0.1 {
            return false;
        }

        let cone = gazer
            .ability_level(AbilityId::StoneGaze)
            .map_or(DEFAULT_GAZE_CONE, |lvl| AbilityId::StoneGaze.def().value(lvl, key::SG_CONE_ANGLE));
        let dot = (dx / d) * face_x + (dz / d) * face_z;
        dot >= cone.to_radians().cos()
    })
}

fn petrify_if_due(state: &mut CombatState, i: usize, gazer: usize, events: &mut EventBuffer) {
    let Some(level) = state.units[gazer].ability_level(AbilityId::StoneGaze) else {
        return;
    };
    let def = AbilityId::StoneGaze.def();
    if state.units[i].gaze_accum < def.value(level, key::SG_GAZE_THRESH) {
        return;
    }

    add_modifier(&mut state.modifiers, i, ModifierKind::Stun, def.value(level, key::SG_STUN_DUR), 0.0);
    state.units[i].gaze_accum = 0.0;
    let pos = state.units[i].position;
    events.shake(i, pos, 3.0, 0.2);
    events.cast(i, AbilityId::StoneGaze, pos);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::ABILITY_COUNT;
    use crate::game::state::{Team, Unit};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const DT: f32 = 1.0 / 60.0;

    fn state_with(units: Vec<Unit>) -> CombatState {
        let mut s = CombatState::new();
        for u in units {
            s.spawn_unit(u);
        }
        s
    }

    fn random_state(rng: &mut StdRng) -> CombatState {
        let mut state = CombatState::new();
        for team in [Team::Blue, Team::Red] {
            let side = if team == Team::Blue { 1.0 } else { -1.0 };
            for _ in 0..rng.gen_range(1..=4) {
                let mut unit = Unit::new(rng.gen_range(0..6), team)
                    .at(rng.gen_range(-40.0..40.0), side * rng.gen_range(10.0..60.0));
                for slot in 0..MAX_ABILITIES_PER_UNIT {
                    if rng.gen_bool(0.7) {
                        let id = AbilityId::ALL[rng.gen_range(0..ABILITY_COUNT)];
                        unit = unit.with_ability(slot, id, rng.gen_range(0..3));
                    }
                }
                state.spawn_unit(unit);
            }
        }
        state
    }

    #[test]
    fn test_attack_kills_same_tick() {
        let mut attacker = Unit::new(0, Team::Blue);
        attacker.dmg_multiplier = 5.0; // 3 * 5 = 15
        let mut victim = Unit::new(0, Team::Red).at(0.0, 5.0);
        victim.health = 10.0;
        let mut state = state_with(vec![attacker, victim]);

        let result = combat_tick(&mut state, DT);
        assert!(!state.units[1].active);
        assert_eq!(result.outcome, Outcome::BlueWins);
        assert_eq!(result.outcome.code(), 1);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e, CombatEvent::Defeated { unit: 1, team: Team::Red })));
    }

    #[test]
    fn test_outcome_codes() {
        let mut state = state_with(vec![Unit::new(0, Team::Blue).at(0.0, -100.0), Unit::new(0, Team::Red).at(0.0, 100.0)]);
        assert_eq!(combat_tick(&mut state, DT).outcome, Outcome::Fighting);

        state.units[0].active = false;
        assert_eq!(combat_tick(&mut state, DT).outcome, Outcome::RedWins);

        state.units[1].active = false;
        assert_eq!(combat_tick(&mut state, DT).outcome, Outcome::Draw);
    }

    #[test]
    fn test_dig_heals_without_exceeding_max() {
        let mut digger = Unit::new(0, Team::Blue).with_ability(0, AbilityId::Dig, 0);
        digger.health = 10.0;
        let mut state = state_with(vec![digger, Unit::new(0, Team::Red).at(0.0, 500.0)]);

        combat_tick(&mut state, DT);
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::Invulnerable));
        assert_eq!(modifier_value(&state.modifiers, 0, ModifierKind::DigHeal), 40.0 / 4.0);

        for _ in 0..600 {
            combat_tick(&mut state, DT);
            assert!(state.units[0].health <= state.units[0].max_health());
        }
        assert_eq!(state.units[0].health, 40.0);
    }

    #[test]
    fn test_digging_unit_does_not_move() {
        let mut digger = Unit::new(0, Team::Blue).with_ability(0, AbilityId::Dig, 0);
        digger.health = 5.0;
        let mut state = state_with(vec![digger, Unit::new(0, Team::Red).at(0.0, 100.0)]);
        combat_tick(&mut state, DT);
        combat_tick(&mut state, DT);
        assert_eq!(state.units[0].position, crate::core::vec3::Vec3::ZERO);
    }

    #[test]
    fn test_cooldown_slot_skipped_by_scan() {
        let caster = Unit::new(0, Team::Blue).with_ability(0, AbilityId::MagicMissile, 0);
        let mut state = state_with(vec![caster, Unit::new(0, Team::Red).at(0.0, 30.0)]);
        state.units[0].abilities[0].cooldown = 5.0;

        combat_tick(&mut state, DT);
        assert_eq!(state.projectiles.active_count(), 0);
        assert!((state.units[0].abilities[0].cooldown - (5.0 - DT)).abs() < 1e-5);
        // The cursor still went around once
        assert_eq!(state.units[0].next_slot, 0);
    }

    #[test]
    fn test_one_cast_per_tick_then_delay() {
        let caster = Unit::new(0, Team::Blue)
            .with_ability(0, AbilityId::BloodRage, 0)
            .with_ability(1, AbilityId::SpellProtect, 0);
        let mut state = state_with(vec![caster, Unit::new(0, Team::Red).at(0.0, 100.0)]);

        combat_tick(&mut state, DT);
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::Lifesteal));
        assert!(!has_modifier(&state.modifiers, 0, ModifierKind::SpellProtect));
        assert_eq!(state.units[0].cast_delay, ABILITY_CAST_DELAY);
        assert_eq!(state.units[0].next_slot, 1);

        // Delay blocks the second slot until it runs out
        combat_tick(&mut state, DT);
        assert!(!has_modifier(&state.modifiers, 0, ModifierKind::SpellProtect));
        for _ in 0..60 {
            combat_tick(&mut state, DT);
        }
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::SpellProtect));
    }

    #[test]
    fn test_out_of_range_target_skips_targeted_cast() {
        let caster = Unit::new(0, Team::Blue).with_ability(0, AbilityId::MagicMissile, 0);
        let mut state = state_with(vec![caster, Unit::new(0, Team::Red).at(0.0, 200.0)]);
        combat_tick(&mut state, DT);
        assert_eq!(state.projectiles.active_count(), 0);
        assert_eq!(state.units[0].abilities[0].cooldown, 0.0);
    }

    #[test]
    fn test_facing_turns_at_rate() {
        // Blue faces 180; enemy straight along +X means goal 90
        let mut state = state_with(vec![Unit::new(0, Team::Blue), Unit::new(0, Team::Red).at(100.0, 0.0)]);
        combat_tick(&mut state, 0.1);
        assert!((state.units[0].facing - 144.0).abs() < 1e-3);
        for _ in 0..5 {
            combat_tick(&mut state, 0.1);
        }
        assert!((state.units[0].facing - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_separation_is_symmetric() {
        let mut state = state_with(vec![
            Unit::new(0, Team::Blue).at(0.0, 0.0),
            Unit::new(0, Team::Blue).at(1.0, 0.0),
        ]);
        separate(&mut state, 0);
        // Overlap of 2 split evenly
        assert!((state.units[0].position.x + 1.0).abs() < 1e-5);
        assert!((state.units[1].position.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_armor_and_shield_reduce_attack() {
        let attacker = Unit::new(2, Team::Blue); // 4 damage
        let mut defender = Unit::new(0, Team::Red).at(0.0, 4.0);
        defender.shield = 1.0;
        let mut state = state_with(vec![attacker, defender]);
        add_modifier(&mut state.modifiers, 1, ModifierKind::Armor, 0.0, 2.0);

        basic_attack(&mut state, 0, 1, DT, &mut EventBuffer::new());
        assert_eq!(state.units[1].shield, 0.0);
        assert_eq!(state.units[1].health, 39.0);
        assert_eq!(state.units[0].attack_cooldown, 1.0);
    }

    #[test]
    fn test_invulnerable_target_resets_cooldown() {
        let mut state = state_with(vec![Unit::new(0, Team::Blue), Unit::new(0, Team::Red).at(0.0, 4.0)]);
        add_modifier(&mut state.modifiers, 1, ModifierKind::Invulnerable, 5.0, 0.0);
        basic_attack(&mut state, 0, 1, DT, &mut EventBuffer::new());
        assert_eq!(state.units[1].health, 40.0);
        assert_eq!(state.units[0].attack_cooldown, 1.2);
    }

    #[test]
    fn test_gaze_stuns_after_threshold() {
        let gazer = Unit::new(0, Team::Red).at(0.0, -20.0).with_ability(0, AbilityId::StoneGaze, 0);
        let mut state = state_with(vec![Unit::new(0, Team::Blue), gazer]);
        add_modifier(&mut state.modifiers, 1, ModifierKind::StoneGaze, 5.0, 1.5);

        let mut events = EventBuffer::new();
        process_gaze(&mut state, 0.5, &mut events);
        process_gaze(&mut state, 0.5, &mut events);
        assert_eq!(state.units[0].gaze_accum, 1.0);
        assert!(!has_modifier(&state.modifiers, 0, ModifierKind::Stun));

        process_gaze(&mut state, 0.5, &mut events);
        assert!(has_modifier(&state.modifiers, 0, ModifierKind::Stun));
        assert_eq!(state.units[0].gaze_accum, 0.0);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_gaze_decays_when_looking_away() {
        let gazer = Unit::new(0, Team::Red).at(0.0, -20.0).with_ability(0, AbilityId::StoneGaze, 0);
        let mut state = state_with(vec![Unit::new(0, Team::Blue), gazer]);
        add_modifier(&mut state.modifiers, 1, ModifierKind::StoneGaze, 5.0, 1.5);

        process_gaze(&mut state, 0.5, &mut EventBuffer::new());
        state.units[0].facing = 0.0;
        process_gaze(&mut state, 0.1, &mut EventBuffer::new());
        assert!((state.units[0].gaze_accum - 0.3).abs() < 1e-5);
        process_gaze(&mut state, 1.0, &mut EventBuffer::new());
        assert_eq!(state.units[0].gaze_accum, 0.0);
    }

    #[test]
    fn test_tick_determinism() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..8 {
            let mut a = random_state(&mut rng);
            let mut b = a.clone();
            for _ in 0..1200 {
                let ra = combat_tick(&mut a, DT);
                let rb = combat_tick(&mut b, DT);
                assert_eq!(ra.outcome, rb.outcome);
                assert_eq!(ra.events, rb.events);
                if ra.outcome.is_terminal() {
                    break;
                }
            }
            assert_eq!(a.compute_hash(), b.compute_hash());
        }
    }

    #[test]
    fn test_conservation() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            let mut state = random_state(&mut rng);
            let initial = state.units.len();
            for _ in 0..1200 {
                let result = combat_tick(&mut state, DT);
                let (blue, red) = state.count_teams();
                assert!(blue + red <= initial);
                assert_eq!(result.outcome.is_terminal(), blue == 0 || red == 0);
                for u in &state.units {
                    if u.active {
                        assert!(u.health <= u.max_health() + 1e-3);
                    }
                }
                if result.outcome.is_terminal() {
                    break;
                }
            }
        }
    }

    #[test]
    fn test_run_to_completion_caps_as_draw() {
        let mut state = state_with(vec![Unit::new(0, Team::Blue).at(0.0, -1000.0), Unit::new(0, Team::Red).at(0.0, 1000.0)]);
        let (outcome, ticks) = run_to_completion(&mut state, DT, 10);
        assert_eq!(outcome, Outcome::Draw);
        assert_eq!(ticks, 10);
    }
}
