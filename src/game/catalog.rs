//! Ability and Archetype Catalog
//!
//! Static balance tables. Every per-level number an ability uses lives here
//! and is looked up by named value index; handlers never hardcode values.

use serde::{Serialize, Deserialize};

/// Ability slots per unit.
pub const MAX_ABILITIES_PER_UNIT: usize = 4;

/// Number of ability levels (stored 0-based, displayed 1-based).
pub const ABILITY_MAX_LEVELS: usize = 3;

/// Width of a per-level value row.
pub const ABILITY_MAX_VALUES: usize = 10;

/// Number of abilities in the catalog.
pub const ABILITY_COUNT: usize = 17;

/// Number of unit archetypes.
pub const ARCHETYPE_COUNT: usize = 6;

/// Clockwise slot activation order: top-left, top-right, bottom-right, bottom-left.
pub const ACTIVATION_ORDER: [usize; MAX_ABILITIES_PER_UNIT] = [0, 1, 3, 2];

/// Distance at which a unit stops moving and attacks.
pub const ATTACK_RANGE: f32 = 8.0;

/// Radius used for unit-unit separation.
pub const UNIT_COLLISION_RADIUS: f32 = 1.5;

/// Radius used when pushing units out of fissures.
pub const FISSURE_UNIT_RADIUS: f32 = 2.0;

/// Lockout after a successful cast before the next cast attempt.
pub const ABILITY_CAST_DELAY: f32 = 0.75;

/// Facing turn rate in degrees per second.
pub const TURN_RATE: f32 = 360.0;

/// Projectiles fly this far above the ground.
pub const PROJECTILE_HEIGHT: f32 = 3.0;

/// Lifetime of the Charging modifier.
pub const CHARGE_DURATION: f32 = 10.0;

/// Charge speed used if the Charging modifier carries no value.
pub const DEFAULT_CHARGE_SPEED: f32 = 80.0;

/// Retaliation stun when the defender has no Craggy Armor slot.
pub const DEFAULT_CRAGGY_STUN: f32 = 1.0;

/// Gaze cone half-angle when the gazer has no Stone Gaze slot.
pub const DEFAULT_GAZE_CONE: f32 = 45.0;

/// Extra lateral reach of Fissure's on-cast damage.
pub const FISSURE_HIT_PADDING: f32 = 3.0;

/// Named indices into [`AbilityDef::values`] rows.
pub mod key {
    #![allow(missing_docs)]

    pub const MM_DAMAGE: usize = 0;
    pub const MM_STUN_DUR: usize = 1;
    pub const MM_PROJ_SPEED: usize = 2;

    pub const DIG_HP_THRESH: usize = 0;
    pub const DIG_HEAL_DUR: usize = 1;

    pub const VAC_RADIUS: usize = 0;
    pub const VAC_STUN_DUR: usize = 1;
    pub const VAC_PULL_DUR: usize = 2;

    pub const CF_DAMAGE: usize = 0;
    pub const CF_BOUNCES: usize = 1;
    pub const CF_PROJ_SPEED: usize = 2;
    pub const CF_BOUNCE_RANGE: usize = 3;

    pub const BR_LIFESTEAL: usize = 0;
    pub const BR_DURATION: usize = 1;

    pub const EQ_RADIUS: usize = 0;
    pub const EQ_DAMAGE: usize = 1;

    pub const SP_DURATION: usize = 0;

    pub const CA_ARMOR: usize = 0;
    pub const CA_STUN_CHANCE: usize = 1;
    pub const CA_DURATION: usize = 2;
    pub const CA_STUN_DUR: usize = 3;

    pub const SG_DURATION: usize = 0;
    pub const SG_GAZE_THRESH: usize = 1;
    pub const SG_STUN_DUR: usize = 2;
    pub const SG_CONE_ANGLE: usize = 3;

    pub const FI_RANGE: usize = 0;
    pub const FI_LENGTH: usize = 1;
    pub const FI_WIDTH: usize = 2;
    pub const FI_DURATION: usize = 3;
    pub const FI_DAMAGE: usize = 4;

    pub const VA_LIFESTEAL: usize = 0;
    pub const VA_DURATION: usize = 1;

    pub const ML_PROC_CHANCE: usize = 0;
    pub const ML_DURATION: usize = 1;
    pub const ML_SPEED: usize = 2;
    pub const ML_DAMAGE: usize = 3;
    pub const ML_BOUNCES: usize = 4;
    pub const ML_BOUNCE_RANGE: usize = 5;

    pub const SW_SHIELD: usize = 0;
    pub const SW_SHIELD_DUR: usize = 1;

    pub const AS_SHIELD: usize = 0;
    pub const AS_DURATION: usize = 1;

    pub const HK_RANGE: usize = 0;
    pub const HK_SPEED: usize = 1;
    pub const HK_DMG_PER_DIST: usize = 2;

    pub const PC_CHARGE_SPEED: usize = 0;
    pub const PC_DAMAGE: usize = 1;
    pub const PC_KNOCKBACK: usize = 2;
    pub const PC_AOE_RADIUS: usize = 3;

    pub const SU_HP_THRESH: usize = 0;
}

/// Ability identifiers. Discriminants are the wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AbilityId {
    /// Ranged stun bolt dealing a fraction of max health.
    MagicMissile = 0,
    /// Passive: invulnerable heal-over-time at low health.
    Dig = 1,
    /// Pull and stun all enemies in a radius.
    Vacuum = 2,
    /// Bouncing damage projectile.
    ChainFrost = 3,
    /// Self lifesteal buff.
    BloodRage = 4,
    /// Damage everyone around the caster.
    Earthquake = 5,
    /// Immunity to new stuns.
    SpellProtect = 6,
    /// Armor plus stun retaliation.
    CraggyArmor = 7,
    /// Stuns enemies that keep looking at the caster.
    StoneGaze = 8,
    /// Line obstacle with on-cast damage.
    Fissure = 9,
    /// Team-wide lifesteal.
    VladAura = 10,
    /// On-hit chance to release a bouncing bolt.
    Maelstrom = 11,
    /// Trade places with the furthest enemy and gain a shield.
    Swap = 12,
    /// Shield and cleanse the weakest ally.
    AphoticShield = 13,
    /// Pull an enemy in, damage scales with distance.
    Hook = 14,
    /// Charge the furthest enemy and knock back on impact.
    PrimalCharge = 15,
    /// Passive: swap health with the healthiest ally at low health.
    Sunder = 16,
}

impl AbilityId {
    /// All abilities in id order.
    pub const ALL: [AbilityId; ABILITY_COUNT] = [
        AbilityId::MagicMissile,
        AbilityId::Dig,
        AbilityId::Vacuum,
        AbilityId::ChainFrost,
        AbilityId::BloodRage,
        AbilityId::Earthquake,
        AbilityId::SpellProtect,
        AbilityId::CraggyArmor,
        AbilityId::StoneGaze,
        AbilityId::Fissure,
        AbilityId::VladAura,
        AbilityId::Maelstrom,
        AbilityId::Swap,
        AbilityId::AphoticShield,
        AbilityId::Hook,
        AbilityId::PrimalCharge,
        AbilityId::Sunder,
    ];

    /// Look up by numeric id.
    pub fn from_u8(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Decode a signed wire id; negative means empty.
    pub fn from_wire(id: i8) -> Option<Self> {
        if id < 0 {
            None
        } else {
            Self::from_u8(id as u8)
        }
    }

    /// Encode an optional ability as a signed wire id (-1 = empty).
    pub fn to_wire(id: Option<Self>) -> i8 {
        id.map_or(-1, |a| a as i8)
    }

    /// Table index.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Static definition.
    #[inline]
    pub fn def(self) -> &'static AbilityDef {
        &ABILITY_DEFS[self.index()]
    }

    /// Two-letter code used by leaderboard unit codes.
    #[inline]
    pub fn abbrev(self) -> &'static str {
        self.def().abbrev
    }

    /// Reverse lookup from a two-letter code.
    pub fn from_abbrev(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.abbrev() == code)
    }
}

/// How an ability picks what it affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Passive or self-cast.
    None,
    /// Auto-targets the closest enemy; subject to the range gate.
    ClosestEnemy,
    /// Area centered on the caster.
    SelfAoe,
}

/// Static definition of one ability.
#[derive(Debug)]
pub struct AbilityDef {
    /// Display name.
    pub name: &'static str,
    /// Two-letter code.
    pub abbrev: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Targeting rule.
    pub target: TargetKind,
    /// Passives trigger on their own and are never proactively cast.
    pub passive: bool,
    /// Shop price.
    pub gold_cost: u32,
    /// Cast range per level; 0 disables the range gate.
    pub range: [f32; ABILITY_MAX_LEVELS],
    /// Cooldown per level, seconds.
    pub cooldown: [f32; ABILITY_MAX_LEVELS],
    /// Per-level value rows, indexed by [`key`] constants.
    pub values: [[f32; ABILITY_MAX_VALUES]; ABILITY_MAX_LEVELS],
}

impl AbilityDef {
    /// Value for `level` (clamped to the last level).
    #[inline]
    pub fn value(&self, level: u8, key: usize) -> f32 {
        self.values[clamp_level(level)][key]
    }

    /// Cast range for `level`.
    #[inline]
    pub fn range_at(&self, level: u8) -> f32 {
        self.range[clamp_level(level)]
    }

    /// Cooldown for `level`.
    #[inline]
    pub fn cooldown_at(&self, level: u8) -> f32 {
        self.cooldown[clamp_level(level)]
    }
}

#[inline]
fn clamp_level(level: u8) -> usize {
    (level as usize).min(ABILITY_MAX_LEVELS - 1)
}

/// Pad a short row out to [`ABILITY_MAX_VALUES`].
const fn row<const N: usize>(v: [f32; N]) -> [f32; ABILITY_MAX_VALUES] {
    let mut out = [0.0; ABILITY_MAX_VALUES];
    let mut i = 0;
    while i < N {
        out[i] = v[i];
        i += 1;
    }
    out
}

/// The ability table, indexed by [`AbilityId`].
pub static ABILITY_DEFS: [AbilityDef; ABILITY_COUNT] = [
    AbilityDef {
        name: "Magic Missile", abbrev: "MM", description: "Ranged stun projectile",
        target: TargetKind::ClosestEnemy, passive: false, gold_cost: 3,
        range: [50.0, 58.0, 66.0],
        cooldown: [10.0, 9.0, 8.0],
        // damage (fraction of max hp), stun, projectile speed
        values: [row([0.30, 1.5, 60.0]), row([0.40, 1.75, 60.0]), row([0.50, 2.0, 60.0])],
    },
    AbilityDef {
        name: "Dig", abbrev: "DG", description: "Invuln + heal at low HP",
        target: TargetKind::None, passive: true, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [30.0, 25.0, 20.0],
        values: [row([0.25, 4.0]), row([0.25, 3.5]), row([0.25, 3.0])],
    },
    AbilityDef {
        name: "Vacuum", abbrev: "VC", description: "Pull + stun enemies in AoE",
        target: TargetKind::SelfAoe, passive: false, gold_cost: 5,
        range: [0.0; 3],
        cooldown: [22.0, 18.0, 14.0],
        values: [row([30.0, 1.0, 0.5]), row([38.0, 1.5, 0.5]), row([46.0, 2.0, 0.5])],
    },
    AbilityDef {
        name: "Chain Frost", abbrev: "CF", description: "Bouncing damage projectile",
        target: TargetKind::ClosestEnemy, passive: false, gold_cost: 5,
        range: [50.0, 58.0, 66.0],
        cooldown: [20.0, 17.0, 14.0],
        // damage, bounces, projectile speed, bounce range
        values: [
            row([100.0, 5.0, 50.0, 40.0]),
            row([150.0, 7.0, 50.0, 40.0]),
            row([200.0, 10.0, 50.0, 40.0]),
        ],
    },
    AbilityDef {
        name: "Blood Rage", abbrev: "BR", description: "Grants lifesteal on attacks",
        target: TargetKind::None, passive: false, gold_cost: 3,
        range: [0.0; 3],
        cooldown: [18.0, 15.0, 12.0],
        values: [row([0.20, 5.0]), row([0.35, 6.0]), row([0.50, 7.0])],
    },
    AbilityDef {
        name: "Earthquake", abbrev: "EQ", description: "Damages everything nearby",
        target: TargetKind::SelfAoe, passive: false, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [16.0, 14.0, 12.0],
        values: [row([25.0, 8.0]), row([30.0, 12.0]), row([35.0, 16.0])],
    },
    AbilityDef {
        name: "Spell Protect", abbrev: "SP", description: "Blocks incoming stuns",
        target: TargetKind::None, passive: false, gold_cost: 3,
        range: [0.0; 3],
        cooldown: [20.0, 17.0, 14.0],
        values: [row([4.0]), row([5.0]), row([6.0])],
    },
    AbilityDef {
        name: "Craggy Armor", abbrev: "CA", description: "Armor, stuns attackers",
        target: TargetKind::None, passive: false, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [20.0, 18.0, 16.0],
        // armor, stun chance, duration, stun duration
        values: [
            row([1.0, 0.15, 6.0, 1.0]),
            row([2.0, 0.20, 7.0, 1.25]),
            row([3.0, 0.25, 8.0, 1.5]),
        ],
    },
    AbilityDef {
        name: "Stone Gaze", abbrev: "SG", description: "Stuns enemies facing the caster",
        target: TargetKind::None, passive: false, gold_cost: 5,
        range: [0.0; 3],
        cooldown: [24.0, 20.0, 16.0],
        // duration, gaze threshold, stun duration, cone half-angle
        values: [
            row([5.0, 1.5, 1.5, 45.0]),
            row([6.0, 1.25, 1.75, 50.0]),
            row([7.0, 1.0, 2.0, 55.0]),
        ],
    },
    AbilityDef {
        name: "Fissure", abbrev: "FI", description: "Raises an impassable wall",
        target: TargetKind::ClosestEnemy, passive: false, gold_cost: 5,
        range: [40.0, 45.0, 50.0],
        cooldown: [18.0, 16.0, 14.0],
        // range, length, width, duration, damage
        values: [
            row([40.0, 30.0, 3.0, 5.0, 6.0]),
            row([45.0, 35.0, 3.5, 6.0, 9.0]),
            row([50.0, 40.0, 4.0, 7.0, 12.0]),
        ],
    },
    AbilityDef {
        name: "Vladmir's Aura", abbrev: "VA", description: "Lifesteal for the whole team",
        target: TargetKind::None, passive: false, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [20.0, 17.0, 14.0],
        values: [row([0.10, 6.0]), row([0.15, 7.0]), row([0.20, 8.0])],
    },
    AbilityDef {
        name: "Maelstrom", abbrev: "ML", description: "Attacks may release lightning",
        target: TargetKind::None, passive: false, gold_cost: 5,
        range: [0.0; 3],
        cooldown: [25.0, 22.0, 19.0],
        // proc chance, duration, speed, damage, bounces, bounce range
        values: [
            row([0.20, 8.0, 70.0, 4.0, 2.0, 30.0]),
            row([0.25, 9.0, 70.0, 6.0, 3.0, 30.0]),
            row([0.30, 10.0, 70.0, 8.0, 4.0, 30.0]),
        ],
    },
    AbilityDef {
        name: "Swap", abbrev: "SW", description: "Trade places with the furthest enemy",
        target: TargetKind::None, passive: false, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [22.0, 19.0, 16.0],
        values: [row([10.0, 4.0]), row([15.0, 5.0]), row([20.0, 6.0])],
    },
    AbilityDef {
        name: "Aphotic Shield", abbrev: "AS", description: "Shields and cleanses an ally",
        target: TargetKind::None, passive: false, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [16.0, 14.0, 12.0],
        values: [row([8.0, 5.0]), row([12.0, 5.0]), row([16.0, 5.0])],
    },
    AbilityDef {
        name: "Hook", abbrev: "HK", description: "Drags an enemy to the caster",
        target: TargetKind::None, passive: false, gold_cost: 5,
        // range gate disabled; the handler applies its own reach
        range: [0.0; 3],
        cooldown: [18.0, 16.0, 14.0],
        // reach, speed, damage per unit of distance
        values: [row([45.0, 80.0, 0.2]), row([50.0, 80.0, 0.3]), row([55.0, 80.0, 0.4])],
    },
    AbilityDef {
        name: "Primal Charge", abbrev: "PC", description: "Charges the furthest enemy",
        target: TargetKind::None, passive: false, gold_cost: 5,
        range: [0.0; 3],
        cooldown: [20.0, 17.0, 14.0],
        // charge speed, damage, knockback, impact radius
        values: [
            row([80.0, 8.0, 6.0, 12.0]),
            row([90.0, 12.0, 8.0, 14.0]),
            row([100.0, 16.0, 10.0, 16.0]),
        ],
    },
    AbilityDef {
        name: "Sunder", abbrev: "SU", description: "Swap HP with the healthiest ally",
        target: TargetKind::None, passive: true, gold_cost: 4,
        range: [0.0; 3],
        cooldown: [40.0, 35.0, 30.0],
        values: [row([0.30]), row([0.30]), row([0.30])],
    },
];

/// Base stats for a unit archetype.
#[derive(Debug, Clone, Copy)]
pub struct UnitStats {
    /// Display name.
    pub name: &'static str,
    /// Base maximum health.
    pub health: f32,
    /// World units per second.
    pub move_speed: f32,
    /// Damage per basic attack.
    pub attack_damage: f32,
    /// Seconds between basic attacks.
    pub attack_speed: f32,
}

/// Archetype table, indexed by archetype id.
pub static UNIT_STATS: [UnitStats; ARCHETYPE_COUNT] = [
    UnitStats { name: "Mushroom", health: 40.0, move_speed: 12.0, attack_damage: 3.0, attack_speed: 1.2 },
    UnitStats { name: "Goblin", health: 20.0, move_speed: 20.0, attack_damage: 2.0, attack_speed: 0.5 },
    UnitStats { name: "Devil", health: 30.0, move_speed: 15.0, attack_damage: 4.0, attack_speed: 1.0 },
    UnitStats { name: "Cat", health: 25.0, move_speed: 18.0, attack_damage: 3.0, attack_speed: 0.8 },
    UnitStats { name: "Fish", health: 28.0, move_speed: 14.0, attack_damage: 2.5, attack_speed: 0.9 },
    UnitStats { name: "Reptile", health: 35.0, move_speed: 13.0, attack_damage: 3.5, attack_speed: 1.1 },
];

/// Stats for an archetype id; out-of-range ids fall back to archetype 0.
#[inline]
pub fn unit_stats(archetype: u8) -> &'static UnitStats {
    UNIT_STATS.get(archetype as usize).unwrap_or(&UNIT_STATS[0])
}

/// True if `archetype` names a known archetype.
#[inline]
pub fn is_valid_archetype(archetype: u8) -> bool {
    (archetype as usize) < ARCHETYPE_COUNT
}
