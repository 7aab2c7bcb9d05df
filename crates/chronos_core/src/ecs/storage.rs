//! # Entity Storage
//!
//! Generation-tagged slot table.
//!
//! Deallocation is deferred: a freed slot first goes on a "prepared" list
//! and becomes reusable only after [`EntityStorage::apply_dead`]. Slot ids
//! therefore cannot be recycled while a filtered system is still iterating
//! a snapshot of entities.

use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// Generation-tagged entity slots.
///
/// # Example
///
/// ```rust,ignore
/// let mut storage = EntityStorage::with_capacity(1024);
///
/// let entity = storage.alloc();
/// assert!(storage.is_alive(entity));
///
/// storage.dealloc(entity);
/// storage.increment_generation(entity);
/// storage.apply_dead();
/// ```
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStorage {
    /// Current generation per slot. Starts at 1.
    generations: Vec<u16>,
    /// Alive flag per slot.
    alive: Vec<bool>,
    /// Slots ready for reuse.
    dead: Vec<u32>,
    /// Slots freed since the last `apply_dead`.
    dead_prepared: Vec<u32>,
    /// Number of alive entities.
    alive_count: usize,
}

impl EntityStorage {
    /// Creates an empty storage with room for `capacity` slots.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of slots reserved up front
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut storage = Self::default();
        storage.reserve(capacity);
        storage
    }

    /// Reserves room so that `capacity` slots fit without reallocating.
    pub fn reserve(&mut self, capacity: usize) {
        let additional = capacity.saturating_sub(self.generations.len());
        self.generations.reserve(additional);
        self.alive.reserve(additional);
        self.dead.reserve(additional);
        self.dead_prepared.reserve(additional);
    }

    /// Number of slots ever allocated.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Number of alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Allocates a slot, reusing a dead one when available.
    pub fn alloc(&mut self) -> Entity {
        self.alive_count += 1;

        if let Some(id) = self.dead.pop() {
            let index = id as usize;
            self.alive[index] = true;
            return Entity::new(id, self.generations[index]);
        }

        let id = u32::try_from(self.generations.len()).unwrap_or(u32::MAX);
        self.generations.push(1);
        self.alive.push(true);
        Entity::new(id, 1)
    }

    /// Marks the entity dead. The slot becomes reusable after `apply_dead`.
    ///
    /// # Returns
    ///
    /// `false` if the handle was not alive.
    pub fn dealloc(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }

        self.alive[entity.index()] = false;
        self.alive_count -= 1;
        self.dead_prepared.push(entity.id);
        true
    }

    /// Bumps the slot generation, invalidating every handle to it.
    ///
    /// A slot whose generation is exhausted at `u16::MAX` is retired
    /// instead: it never re-enters the free list, so generations of a slot
    /// only ever grow and no stale handle can become valid again.
    pub fn increment_generation(&mut self, entity: Entity) {
        let Some(generation) = self.generations.get_mut(entity.index()) else {
            return;
        };
        match generation.checked_add(1) {
            Some(next) => *generation = next,
            None => self.retire(entity.id),
        }
    }

    fn retire(&mut self, id: u32) {
        self.dead_prepared.retain(|dead| *dead != id);
        self.dead.retain(|dead| *dead != id);
        tracing::debug!(id, "entity slot retired");
    }

    /// Makes slots freed since the last call available for reuse.
    pub fn apply_dead(&mut self) {
        self.dead.append(&mut self.dead_prepared);
    }

    /// Returns `true` if the handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index();
        index < self.generations.len()
            && self.alive[index]
            && self.generations[index] == entity.generation
    }

    /// Returns the live handle for slot `id`, if that slot is alive.
    #[must_use]
    pub fn entity_by_id(&self, id: u32) -> Option<Entity> {
        let index = id as usize;
        if *self.alive.get(index)? {
            Some(Entity::new(id, self.generations[index]))
        } else {
            None
        }
    }

    /// Current generation of slot `id`.
    #[must_use]
    pub fn generation_of(&self, id: u32) -> Option<u16> {
        self.generations.get(id as usize).copied()
    }

    /// Iterates alive entities in ascending id order.
    pub fn alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .zip(self.generations.iter())
            .enumerate()
            .filter(|(_, (alive, _))| **alive)
            .map(|(index, (_, generation))| Entity::new(index as u32, *generation))
    }

    /// Replaces `out` with every alive entity, ascending id order.
    pub fn for_each(&self, out: &mut Vec<Entity>) {
        out.clear();
        out.extend(self.alive());
    }
}
