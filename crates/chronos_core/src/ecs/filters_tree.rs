//! # Filter Index
//!
//! Maps every component bit to the ids of the filters that require it
//! (`contains` side) or forbid it (`not_contains` side).
//!
//! When an entity gains or loses a component, only the filters listed at
//! that bit need re-evaluation.
//!
//! ## Layout
//!
//! ```text
//! contains[bit]     -> [filter ids in registration order]
//! not_contains[bit] -> [filter ids in registration order]
//! ```
//!
//! Both outer arrays and every per-bit list are pooled. Slots only grow;
//! there is no per-filter removal, only [`FiltersTree::dispose`].

use std::sync::Arc;

use super::component::{Component, ComponentBit, ComponentRegistry};
use super::filter::{Filter, FilterId};
use crate::error::CoreResult;
use crate::memory::{ArrayArena, ArrayPool, BufferArray};

type IdList = BufferArray<FilterId>;

/// Per-bit filter id index.
pub struct FiltersTree {
    registry: Arc<ComponentRegistry>,
    contains: BufferArray<IdList>,
    not_contains: BufferArray<IdList>,
    ids: Arc<ArrayPool<FilterId>>,
    slots: Arc<ArrayPool<IdList>>,
}

impl FiltersTree {
    /// Creates an empty index drawing arrays from `arena`.
    #[must_use]
    pub fn new(arena: &ArrayArena, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            contains: BufferArray::empty(),
            not_contains: BufferArray::empty(),
            ids: arena.pool::<FilterId>(),
            slots: arena.pool::<IdList>(),
        }
    }

    /// Indexes `filter` under each of its `contains` and `not_contains` bits.
    ///
    /// # Errors
    ///
    /// Propagates arena errors.
    pub fn add(&mut self, filter: &Filter) -> CoreResult<()> {
        let id = filter.id();
        for bit in filter.contains().bits() {
            Self::append(&self.ids, &self.slots, &mut self.contains, bit, id)?;
        }
        for bit in filter.not_contains().bits() {
            Self::append(&self.ids, &self.slots, &mut self.not_contains, bit, id)?;
        }
        Ok(())
    }

    /// Filters requiring component `T`. Empty if `T` is unknown.
    #[must_use]
    pub fn query_contains<T: Component>(&self) -> &[FilterId] {
        self.registry
            .bit_of::<T>()
            .map(|bit| self.query_contains_bit(bit))
            .unwrap_or_default()
    }

    /// Filters forbidding component `T`. Empty if `T` is unknown.
    #[must_use]
    pub fn query_not_contains<T: Component>(&self) -> &[FilterId] {
        self.registry
            .bit_of::<T>()
            .map(|bit| self.query_not_contains_bit(bit))
            .unwrap_or_default()
    }

    /// Filters requiring `bit`. Empty outside the populated range.
    #[inline]
    #[must_use]
    pub fn query_contains_bit(&self, bit: ComponentBit) -> &[FilterId] {
        self.contains
            .get(bit.index())
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
    }

    /// Filters forbidding `bit`. Empty outside the populated range.
    #[inline]
    #[must_use]
    pub fn query_not_contains_bit(&self, bit: ComponentBit) -> &[FilterId] {
        self.not_contains
            .get(bit.index())
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
    }

    /// Releases every list and both outer arrays to the arena.
    ///
    /// # Errors
    ///
    /// Propagates arena errors. Remaining arrays are still released.
    pub fn dispose(&mut self) -> CoreResult<()> {
        let contains = Self::release_side(&self.ids, &self.slots, &mut self.contains);
        let not_contains = Self::release_side(&self.ids, &self.slots, &mut self.not_contains);
        contains.and(not_contains)
    }

    fn append(
        ids: &ArrayPool<FilterId>,
        slots: &ArrayPool<IdList>,
        side: &mut BufferArray<IdList>,
        bit: ComponentBit,
        id: FilterId,
    ) -> CoreResult<()> {
        let index = bit.index();
        slots.resize(side, index, true)?;

        let list = &mut side[index];
        if let Err(id) = list.try_push(id) {
            let last = list.len();
            ids.resize(list, last, false)?;
            list[last] = id;
        }
        Ok(())
    }

    fn release_side(
        ids: &ArrayPool<FilterId>,
        slots: &ArrayPool<IdList>,
        side: &mut BufferArray<IdList>,
    ) -> CoreResult<()> {
        let mut result = Ok(());
        for list in side.iter_mut() {
            let list = std::mem::take(list);
            if list.is_created() {
                result = result.and(ids.recycle(list));
            }
        }
        let side = std::mem::take(side);
        if side.is_created() {
            result = result.and(slots.recycle(side));
        }
        result
    }
}

impl Drop for FiltersTree {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!(%err, "filter index dispose failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::archetype::Archetype;
    use crate::ecs::filter::FiltersStorage;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct Position;
    impl Component for Position {}

    #[derive(Clone, Serialize, Deserialize)]
    struct Velocity;
    impl Component for Velocity {}

    #[derive(Clone, Serialize, Deserialize)]
    struct Frozen;
    impl Component for Frozen {}

    #[derive(Clone, Serialize, Deserialize)]
    struct Unused;
    impl Component for Unused {}

    #[test]
    fn test_query_lists_every_filter_per_bit() {
        let arena = ArrayArena::new();
        let registry = Arc::new(ComponentRegistry::new());
        let mut tree = FiltersTree::new(&arena, Arc::clone(&registry));
        let mut filters = FiltersStorage::default();

        let mut contains = Archetype::EMPTY;
        contains.set(registry.register::<Position>().unwrap());
        contains.set(registry.register::<Velocity>().unwrap());
        let mut not_contains = Archetype::EMPTY;
        not_contains.set(registry.register::<Frozen>().unwrap());
        let movers = filters.register("movers", contains, not_contains);

        let mut positioned = Archetype::EMPTY;
        positioned.set(registry.register::<Position>().unwrap());
        let placed = filters.register("placed", positioned, Archetype::EMPTY);

        tree.add(filters.get(movers).unwrap()).unwrap();
        tree.add(filters.get(placed).unwrap()).unwrap();

        assert_eq!(tree.query_contains::<Position>(), &[movers, placed]);
        assert_eq!(tree.query_contains::<Velocity>(), &[movers]);
        assert_eq!(tree.query_not_contains::<Frozen>(), &[movers]);
        assert!(tree.query_contains::<Frozen>().is_empty());
        assert!(tree.query_contains::<Unused>().is_empty());
        assert!(tree.query_contains_bit(ComponentBit::from_index(200)).is_empty());
    }

    #[test]
    fn test_many_filters_on_one_bit() {
        let arena = ArrayArena::new();
        let registry = Arc::new(ComponentRegistry::new());
        let mut tree = FiltersTree::new(&arena, Arc::clone(&registry));
        let mut filters = FiltersStorage::default();

        let mut contains = Archetype::EMPTY;
        contains.set(registry.register::<Position>().unwrap());
        let ids: Vec<FilterId> = (0..20)
            .map(|_| filters.register("f", contains, Archetype::EMPTY))
            .collect();
        for id in &ids {
            tree.add(filters.get(*id).unwrap()).unwrap();
        }

        assert_eq!(tree.query_contains::<Position>(), ids.as_slice());
    }

    #[test]
    fn test_dispose_returns_arrays() {
        let arena = ArrayArena::new();
        let registry = Arc::new(ComponentRegistry::new());
        let mut tree = FiltersTree::new(&arena, Arc::clone(&registry));
        let mut filters = FiltersStorage::default();

        let mut contains = Archetype::EMPTY;
        contains.set(registry.register::<Position>().unwrap());
        let id = filters.register("f", contains, Archetype::EMPTY);
        tree.add(filters.get(id).unwrap()).unwrap();

        tree.dispose().unwrap();
        assert!(tree.query_contains::<Position>().is_empty());
        assert_eq!(arena.pool::<FilterId>().pooled_count(0), 1);
    }
}
