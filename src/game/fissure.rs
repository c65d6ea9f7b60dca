//! Fissures
//!
//! Rectangular obstacles raised along a caster-to-target line. They deal
//! damage once when raised, then block movement until they expire.

use crate::core::vec3::Vec3;
use crate::game::catalog::FISSURE_HIT_PADDING;
use crate::game::modifiers::has_modifier;
use crate::game::pool::Pool;
use crate::game::state::{CombatState, Fissure, ModifierKind, Team};

/// Raise a fissure starting at `from` and running `length` toward `toward`.
///
/// The rectangle is centered half a length along the line.
#[allow(clippy::too_many_arguments)]
pub fn spawn_fissure(
    fissures: &mut Pool<Fissure>,
    from: Vec3,
    toward: Vec3,
    length: f32,
    width: f32,
    duration: f32,
    team: Team,
    owner: usize,
) -> Option<usize> {
    let dx = toward.x - from.x;
    let dz = toward.z - from.z;
    let d = (dx * dx + dz * dz).sqrt();
    let (nx, nz) = if d > 0.001 { (dx / d, dz / d) } else { (0.0, 1.0) };

    fissures.spawn(Fissure {
        center: Vec3::xz(from.x + nx * length * 0.5, from.z + nz * length * 0.5),
        rotation: nx.atan2(nz).to_degrees(),
        length,
        width,
        duration,
        team,
        owner,
        active: true,
    })
}

/// Phase 2 of the combat tick: count down and expire.
pub fn tick_fissures(fissures: &mut Pool<Fissure>, dt: f32) {
    for f in fissures.slots_mut() {
        if !f.active {
            continue;
        }
        f.duration -= dt;
        if f.duration <= 0.0 {
            f.active = false;
        }
    }
}

/// Push `pos` out of every active fissure it overlaps.
///
/// The unit leaves along the axis with the shallower penetration, on the
/// side it came from (`prev`) when it sits exactly on the center line.
pub fn resolve_fissure_collision(fissures: &Pool<Fissure>, pos: Vec3, prev: Vec3, radius: f32) -> Vec3 {
    let mut out = pos;
    for (_, f) in fissures.iter_active() {
        let rad = f.rotation.to_radians();
        let (along_x, along_z) = (rad.sin(), rad.cos());
        let (across_x, across_z) = (along_z, -along_x);

        let rx = out.x - f.center.x;
        let rz = out.z - f.center.z;
        let mut la = rx * along_x + rz * along_z;
        let mut lc = rx * across_x + rz * across_z;

        let half_len = f.length * 0.5 + radius;
        let half_w = f.width * 0.5 + radius;
        if la.abs() >= half_len || lc.abs() >= half_w {
            continue;
        }

        let px = prev.x - f.center.x;
        let pz = prev.z - f.center.z;
        let pen_len = half_len - la.abs();
        let pen_w = half_w - lc.abs();
        if pen_w <= pen_len {
            let prev_lc = px * across_x + pz * across_z;
            lc = side(lc, prev_lc) * half_w;
        } else {
            let prev_la = px * along_x + pz * along_z;
            la = side(la, prev_la) * half_len;
        }

        out.x = f.center.x + along_x * la + across_x * lc;
        out.z = f.center.z + along_z * la + across_z * lc;
    }
    out
}

#[inline]
fn side(local: f32, prev_local: f32) -> f32 {
    let v = if local != 0.0 { local } else { prev_local };
    if v < 0.0 { -1.0 } else { 1.0 }
}

/// One-time damage along the caster-to-target line when a fissure is raised.
///
/// The projection onto the line is kept unnormalized: it is measured in
/// multiples of the caster-to-target distance and compared against `length`,
/// and the perpendicular offset is taken from a point `proj` world units out.
/// In practice only units within `width` plus padding of the caster are hit;
/// a target further down the line escapes. Invulnerable units and the caster
/// are skipped.
pub fn fissure_strike(state: &mut CombatState, caster: usize, target: usize, length: f32, width: f32, damage: f32) {
    let origin = state.units[caster].position;
    let aim = state.units[target].position;
    let dx = aim.x - origin.x;
    let dz = aim.z - origin.z;
    let dist = (dx * dx + dz * dz).sqrt();
    let norm = if dist > 0.001 { 1.0 / dist } else { 0.0 };

    for j in 0..state.units.len() {
        if j == caster || !state.units[j].active {
            continue;
        }
        if has_modifier(&state.modifiers, j, ModifierKind::Invulnerable) {
            continue;
        }
        let unit = &mut state.units[j];
        let ux = unit.position.x - origin.x;
        let uz = unit.position.z - origin.z;
        let proj = (ux * dx + uz * dz) * norm * norm;
        if proj < 0.0 || proj > length {
            continue;
        }
        let perp_x = ux - dx * norm * proj;
        let perp_z = uz - dz * norm * proj;
        if (perp_x * perp_x + perp_z * perp_z).sqrt() <= width + FISSURE_HIT_PADDING {
            unit.health -= damage;
            unit.check_death();
        }
    }
}
