//! Fixed-Capacity Entity Pools
//!
//! Arena storage with stable slot indices. Entities are never moved or
//! removed; they are deactivated in place and their slot is reused by the
//! next spawn. Back-references (a projectile's target, a modifier's owner)
//! stay valid for as long as the slot is not reused.

/// Entities stored in a [`Pool`] expose an active flag.
pub trait Pooled: Default + Clone {
    /// True while the slot holds a live entity.
    fn is_active(&self) -> bool;
}

/// Fixed-length pool of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool<T> {
    slots: Vec<T>,
}

impl<T: Pooled> Pool<T> {
    /// Create a pool with `capacity` inactive slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity],
        }
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Place `item` into the first inactive slot.
    ///
    /// Returns `None` when every slot is active; the item is dropped.
    pub fn spawn(&mut self, item: T) -> Option<usize> {
        let idx = self.slots.iter().position(|s| !s.is_active())?;
        self.slots[idx] = item;
        Some(idx)
    }

    /// Reset every slot to inactive.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = T::default();
        }
    }

    /// Number of active entities.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Iterate active entities with their slot index.
    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter(|(_, s)| s.is_active())
    }

    /// All slots, active or not.
    #[inline]
    pub fn slots(&self) -> &[T] {
        &self.slots
    }

    /// Mutable access to all slots.
    #[inline]
    pub fn slots_mut(&mut self) -> &mut [T] {
        &mut self.slots
    }

    /// Slot by index.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx)
    }

    /// Mutable slot by index.
    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx)
    }
}

impl<T> std::ops::Index<usize> for Pool<T> {
    type Output = T;
    #[inline]
    fn index(&self, idx: usize) -> &T {
        &self.slots[idx]
    }
}

impl<T> std::ops::IndexMut<usize> for Pool<T> {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut T {
        &mut self.slots[idx]
    }
}
