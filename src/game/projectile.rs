//! Projectiles
//!
//! Homing projectiles and the projectile phase of the combat tick.

use crate::game::catalog::PROJECTILE_HEIGHT;
use crate::game::events::EventBuffer;
use crate::game::modifiers::{add_modifier, has_modifier};
use crate::game::pool::Pool;
use crate::game::state::{CombatState, ModifierKind, Projectile, ProjectileKind};

/// Launch `proj` from its position raised to flight height.
///
/// Returns `None` (and drops the projectile) if the pool is full.
pub fn launch(projectiles: &mut Pool<Projectile>, mut proj: Projectile) -> Option<usize> {
    proj.position = proj.position.lifted(PROJECTILE_HEIGHT);
    proj.last_hit = None;
    proj.active = true;
    projectiles.spawn(proj)
}

#[inline]
fn bounces_on_loss(kind: ProjectileKind) -> bool {
    matches!(kind, ProjectileKind::ChainFrost | ProjectileKind::Maelstrom)
}

/// Phase 3 of the combat tick: retarget, move and resolve hits.
pub fn tick_projectiles(state: &mut CombatState, dt: f32, events: &mut EventBuffer) {
    for p in 0..state.projectiles.capacity() {
        let proj = state.projectiles[p];
        if !proj.active {
            continue;
        }

        let ti = proj.target;
        if !state.is_live(ti) {
            if bounces_on_loss(proj.kind) && proj.bounces > 0 {
                let next = state.bounce_target(
                    proj.position,
                    proj.source_team,
                    proj.last_hit,
                    proj.bounce_range,
                );
                if let Some(next) = next {
                    state.projectiles[p].target = next;
                    continue;
                }
            }
            state.projectiles[p].active = false;
            continue;
        }

        let aim = state.units[ti].position.lifted(PROJECTILE_HEIGHT);
        let delta = aim - proj.position;
        let dist = delta.length();
        let step = proj.speed * dt;

        if dist > step {
            let pos = &mut state.projectiles[p].position;
            pos.x += (delta.x / dist) * step;
            pos.y += (delta.y / dist) * step;
            pos.z += (delta.z / dist) * step;
            continue;
        }

        match proj.kind {
            ProjectileKind::Hook => {
                hook_hit(state, &proj, events);
                state.projectiles[p].active = false;
            }
            ProjectileKind::Maelstrom => {
                if !has_modifier(&state.modifiers, ti, ModifierKind::Invulnerable) {
                    let target = &mut state.units[ti];
                    let dmg = target.absorb_with_shield(proj.damage);
                    target.health -= dmg;
                    target.check_death();
                }
                bounce_or_expire(state, p, ti);
            }
            ProjectileKind::MagicMissile | ProjectileKind::ChainFrost => {
                if !has_modifier(&state.modifiers, ti, ModifierKind::Invulnerable) {
                    let target = &mut state.units[ti];
                    let mut dmg = proj.damage;
                    if proj.kind == ProjectileKind::MagicMissile {
                        dmg *= target.max_health();
                    }
                    let dmg = target.absorb_with_shield(dmg);
                    target.health -= dmg;
                    let position = target.position;

                    if proj.stun_duration > 0.0 {
                        add_modifier(&mut state.modifiers, ti, ModifierKind::Stun, proj.stun_duration, 0.0);
                        events.shake(ti, position, 5.0, 0.25);
                    }
                    state.units[ti].check_death();
                }
                if proj.kind == ProjectileKind::ChainFrost {
                    bounce_or_expire(state, p, ti);
                } else {
                    state.projectiles[p].active = false;
                }
            }
        }
    }
}

/// Hook impact: damage by pull distance, then drag the target to the source.
fn hook_hit(state: &mut CombatState, proj: &Projectile, events: &mut EventBuffer) {
    let ti = proj.target;
    if has_modifier(&state.modifiers, ti, ModifierKind::Invulnerable) {
        return;
    }
    let Some(source_pos) = state.units.get(proj.source).map(|u| u.position) else {
        return;
    };

    let target = &mut state.units[ti];
    let pull = target.position.dist_xz(source_pos);
    let dmg = target.absorb_with_shield(pull * proj.damage);
    target.health -= dmg;
    target.position.set_xz(source_pos);
    events.shake(ti, target.position, 6.0, 0.3);
    target.check_death();
}

/// After a hit on `hit`: spend a bounce and seek the next target, or expire.
fn bounce_or_expire(state: &mut CombatState, p: usize, hit: usize) {
    if state.projectiles[p].bounces == 0 {
        state.projectiles[p].active = false;
        return;
    }

    let hit_pos = state.units[hit].position;
    let (team, range) = {
        let proj = &state.projectiles[p];
        (proj.source_team, proj.bounce_range)
    };
    let next = state.bounce_target(hit_pos, team, Some(hit), range);

    let proj = &mut state.projectiles[p];
    proj.bounces -= 1;
    proj.last_hit = Some(hit);
    proj.position = hit_pos.lifted(PROJECTILE_HEIGHT);
    match next {
        Some(next) => proj.target = next,
        None => proj.active = false,
    }
}
