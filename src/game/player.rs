//! Player Economy
//!
//! Per-player prep-phase state: gold, shop offers, ability inventory and the
//! roster that gets copied into combat each round.

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{is_valid_archetype, AbilityId, ABILITY_COUNT, ABILITY_MAX_LEVELS};
use crate::game::state::{AbilitySlot, Team, Unit, BLUE_TEAM_MAX_SIZE, MAX_UNITS};

/// Offers shown per shop roll.
pub const MAX_SHOP_SLOTS: usize = 3;

/// Unassigned ability storage.
pub const MAX_INVENTORY_SLOTS: usize = 6;

/// An ability at a 0-based level, or an empty slot.
pub type Offer = Option<(AbilityId, u8)>;

/// One player's prep state.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Display name (max 15 chars).
    pub name: String,
    /// Units carried between rounds; removed units stay as inactive entries.
    pub roster: Vec<Unit>,
    /// Gold on hand.
    pub gold: u32,
    /// Current shop offers.
    pub shop: [Offer; MAX_SHOP_SLOTS],
    /// Owned, unassigned abilities.
    pub inventory: [Offer; MAX_INVENTORY_SLOTS],
    /// Locked in for this round.
    pub ready: bool,
}

impl PlayerState {
    /// Fresh player with `gold` and nothing else.
    pub fn new(name: impl Into<String>, gold: u32) -> Self {
        Self {
            name: name.into(),
            roster: Vec::new(),
            gold,
            shop: [None; MAX_SHOP_SLOTS],
            inventory: [None; MAX_INVENTORY_SLOTS],
            ready: false,
        }
    }

    /// Active roster units.
    pub fn active_units(&self) -> usize {
        self.roster.iter().filter(|u| u.active).count()
    }

    /// Replace every offer with a random level-0 ability, paying `cost`.
    ///
    /// Returns false (and changes nothing) if the player cannot pay.
    pub fn roll_shop(&mut self, rng: &mut DeterministicRng, cost: u32) -> bool {
        if self.gold < cost {
            return false;
        }
        self.gold -= cost;
        for offer in &mut self.shop {
            *offer = AbilityId::from_u8(rng.next_int(ABILITY_COUNT as u32) as u8).map(|id| (id, 0));
        }
        true
    }

    /// Buy the offer in `slot`.
    ///
    /// An owned copy below max level (on a roster unit first, then in the
    /// inventory) is upgraded instead of adding a duplicate. Otherwise the
    /// ability goes to the first empty inventory slot. Returns false when
    /// the slot is empty, gold is short or there is no room.
    pub fn buy(&mut self, slot: usize) -> bool {
        let Some((id, level)) = self.shop.get(slot).copied().flatten() else {
            return false;
        };
        let cost = id.def().gold_cost;
        if self.gold < cost {
            return false;
        }

        let max_level = (ABILITY_MAX_LEVELS - 1) as u8;
        let upgraded = self
            .roster
            .iter_mut()
            .filter(|u| u.active && u.team == Team::Blue)
            .flat_map(|u| u.abilities.iter_mut())
            .find(|s| s.ability == Some(id) && s.level < max_level)
            .map(|s| s.level += 1)
            .or_else(|| {
                self.inventory
                    .iter_mut()
                    .flatten()
                    .find(|(held, lvl)| *held == id && *lvl < max_level)
                    .map(|(_, lvl)| *lvl += 1)
            })
            .is_some();

        if !upgraded {
            let Some(empty) = self.inventory.iter_mut().find(|s| s.is_none()) else {
                return false;
            };
            *empty = Some((id, level));
        }

        self.gold -= cost;
        self.shop[slot] = None;
        true
    }

    /// Add a unit of `archetype` at (x, z) to the roster.
    pub fn place_unit(&mut self, archetype: u8, x: f32, z: f32) -> bool {
        if !is_valid_archetype(archetype)
            || self.active_units() >= BLUE_TEAM_MAX_SIZE
            || self.roster.len() >= MAX_UNITS
        {
            return false;
        }
        self.roster.push(Unit::new(archetype, Team::Blue).at(x, z));
        true
    }

    /// Deactivate roster unit `idx`, moving its abilities into free
    /// inventory slots. Abilities that do not fit are lost.
    pub fn remove_unit(&mut self, idx: usize) -> bool {
        let Some(unit) = self.roster.get_mut(idx).filter(|u| u.active) else {
            return false;
        };
        for slot in &mut unit.abilities {
            let Some(id) = slot.ability else { continue };
            if let Some(free) = self.inventory.iter_mut().find(|s| s.is_none()) {
                *free = Some((id, slot.level));
            }
            *slot = AbilitySlot::default();
        }
        unit.active = false;
        true
    }

    /// Swap inventory slot `inv` with ability slot `slot` of roster unit `unit`.
    ///
    /// The inventory side must hold an ability; the unit side may be empty.
    pub fn assign_ability(&mut self, inv: usize, unit: usize, slot: usize) -> bool {
        let Some(Some((id, level))) = self.inventory.get(inv).copied() else {
            return false;
        };
        let Some(target) = self.roster.get_mut(unit).and_then(|u| u.abilities.get_mut(slot)) else {
            return false;
        };

        let old = target.ability.map(|a| (a, target.level));
        *target = AbilitySlot::new(id, level);
        self.inventory[inv] = old;
        true
    }

    /// Replace the roster with the units sent on READY. An empty list keeps
    /// the current roster.
    pub fn set_roster(&mut self, units: Vec<Unit>) {
        if units.is_empty() {
            return;
        }
        self.roster = units;
        self.roster.truncate(MAX_UNITS);
    }
}
