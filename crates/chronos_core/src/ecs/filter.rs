//! # Filters
//!
//! A filter is a standing query: entities that carry every `contains` bit
//! and none of the `not_contains` bits. Membership is maintained
//! incrementally as components change, so iterating a filter never scans
//! the whole entity table.
//!
//! ## Buffered Requests
//!
//! While a filter-bound system runs, membership changes are queued with
//! [`Filter::push_request`] instead of applied. The scheduler flushes them
//! with [`Filter::apply_all_requests`] once the system returns.

use serde::{Deserialize, Serialize};

use super::archetype::Archetype;
use super::component::{Component, ComponentBit, ComponentRegistry};
use super::components::Components;
use super::entity::Entity;
use super::storage::EntityStorage;
use crate::error::CoreResult;

/// Stable positive filter id. `0` is the "no filter" default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterId(u32);

impl FilterId {
    /// Wraps a raw id. Returns `None` for 0.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Zero-based index, used by per-world bitmaps.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0.saturating_sub(1) as usize
    }
}

/// A registered standing query and its current members.
#[derive(Clone, Debug)]
pub struct Filter {
    id: FilterId,
    name: &'static str,
    contains: Archetype,
    not_contains: Archetype,
    /// Membership flag per entity id.
    members: Vec<bool>,
    count: usize,
    /// Lowest and highest member id. Conservative: not shrunk on removal.
    bounds: (u32, u32),
    /// Entities whose membership must be re-evaluated.
    requests: Vec<Entity>,
}

impl Filter {
    fn new(id: FilterId, name: &'static str, contains: Archetype, not_contains: Archetype) -> Self {
        Self {
            id,
            name,
            contains,
            not_contains,
            members: Vec::new(),
            count: 0,
            bounds: (u32::MAX, 0),
            requests: Vec::new(),
        }
    }

    /// Filter id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> FilterId {
        self.id
    }

    /// Debug name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Required bits.
    #[inline]
    #[must_use]
    pub const fn contains(&self) -> &Archetype {
        &self.contains
    }

    /// Forbidden bits.
    #[inline]
    #[must_use]
    pub const fn not_contains(&self) -> &Archetype {
        &self.not_contains
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` if there are no members.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inclusive id range that holds every member, if any.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> Option<(u32, u32)> {
        if self.count == 0 {
            None
        } else {
            Some(self.bounds)
        }
    }

    /// Returns `true` if `archetype` satisfies this filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        archetype.contains_all(&self.contains) && !archetype.intersects(&self.not_contains)
    }

    /// Returns `true` if the entity id is currently a member.
    #[inline]
    #[must_use]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.members.get(entity.index()).copied().unwrap_or(false)
    }

    /// Reserves membership slots for `capacity` entities.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.members.len() {
            self.members.resize(capacity, false);
        }
    }

    /// Sets membership to whether `archetype` matches.
    ///
    /// # Returns
    ///
    /// `true` if membership changed.
    pub fn evaluate(&mut self, entity: Entity, archetype: &Archetype) -> bool {
        if self.matches(archetype) {
            self.insert(entity)
        } else {
            self.remove_entity(entity)
        }
    }

    /// Drops the entity from the members.
    ///
    /// # Returns
    ///
    /// `true` if it was a member.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.members.get_mut(entity.index()) else {
            return false;
        };
        if !*slot {
            return false;
        }
        *slot = false;
        self.count -= 1;
        if self.count == 0 {
            self.bounds = (u32::MAX, 0);
        }
        true
    }

    /// Queues the entity for re-evaluation at the next flush.
    #[inline]
    pub fn push_request(&mut self, entity: Entity) {
        self.requests.push(entity);
    }

    /// Returns `true` if requests are queued.
    #[inline]
    #[must_use]
    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Re-evaluates every queued entity against its current archetype.
    /// Dead entities are dropped from the members.
    ///
    /// # Returns
    ///
    /// Number of membership changes.
    pub fn apply_all_requests(&mut self, storage: &EntityStorage, components: &Components) -> usize {
        let mut requests = std::mem::take(&mut self.requests);
        let mut changed = 0;
        for entity in requests.drain(..) {
            let updated = if storage.is_alive(entity) {
                self.evaluate(entity, &components.archetype(entity))
            } else {
                self.remove_entity(entity)
            };
            changed += usize::from(updated);
        }
        self.requests = requests;
        changed
    }

    /// Iterates members in ascending id order.
    pub fn entities<'a>(&'a self, storage: &'a EntityStorage) -> impl Iterator<Item = Entity> + 'a {
        let (low, high) = self.bounds().unwrap_or((1, 0));
        (low..=high)
            .filter(|id| self.members.get(*id as usize).copied().unwrap_or(false))
            .filter_map(|id| storage.entity_by_id(id))
    }

    /// Drops every member and pending request.
    pub fn clear_members(&mut self) {
        for slot in &mut self.members {
            *slot = false;
        }
        self.count = 0;
        self.bounds = (u32::MAX, 0);
        self.requests.clear();
    }

    fn insert(&mut self, entity: Entity) -> bool {
        let index = entity.index();
        if index >= self.members.len() {
            self.members.resize(index + 1, false);
        }
        if self.members[index] {
            return false;
        }
        self.members[index] = true;
        self.count += 1;
        self.bounds = (self.bounds.0.min(entity.id), self.bounds.1.max(entity.id));
        true
    }
}

type BitResolver = fn(&ComponentRegistry) -> CoreResult<ComponentBit>;

/// Describes a filter before registration.
///
/// Component types are resolved to bits only when the filter is registered,
/// so a builder can be created before its component types are known to the
/// registry.
///
/// # Example
///
/// ```rust,ignore
/// let builder = FilterBuilder::new("movers")
///     .with::<Position>()
///     .with::<Velocity>()
///     .without::<Frozen>();
/// ```
#[derive(Clone)]
pub struct FilterBuilder {
    name: &'static str,
    with: Vec<BitResolver>,
    without: Vec<BitResolver>,
}

impl FilterBuilder {
    /// Starts an empty filter description.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            with: Vec::new(),
            without: Vec::new(),
        }
    }

    /// Requires component `T`.
    #[must_use]
    pub fn with<T: Component>(mut self) -> Self {
        self.with.push(ComponentRegistry::register::<T>);
        self
    }

    /// Forbids component `T`.
    #[must_use]
    pub fn without<T: Component>(mut self) -> Self {
        self.without.push(ComponentRegistry::register::<T>);
        self
    }

    /// Debug name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Resolves the `(contains, not_contains)` masks.
    ///
    /// # Errors
    ///
    /// Propagates registry errors.
    pub fn resolve(&self, registry: &ComponentRegistry) -> CoreResult<(Archetype, Archetype)> {
        let mut contains = Archetype::EMPTY;
        for resolve in &self.with {
            contains.set(resolve(registry)?);
        }
        let mut not_contains = Archetype::EMPTY;
        for resolve in &self.without {
            not_contains.set(resolve(registry)?);
        }
        Ok((contains, not_contains))
    }
}

impl std::fmt::Debug for FilterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterBuilder")
            .field("name", &self.name)
            .field("with", &self.with.len())
            .field("without", &self.without.len())
            .finish()
    }
}

/// Registry of every filter of a state, indexed by id.
#[derive(Clone, Debug, Default)]
pub struct FiltersStorage {
    filters: Vec<Filter>,
}

impl FiltersStorage {
    /// The id the next registration will receive.
    #[must_use]
    pub fn next_id(&self) -> FilterId {
        FilterId(self.filters.len() as u32 + 1)
    }

    /// Registers a filter and returns its id.
    pub fn register(&mut self, name: &'static str, contains: Archetype, not_contains: Archetype) -> FilterId {
        let id = self.next_id();
        self.filters.push(Filter::new(id, name, contains, not_contains));
        id
    }

    /// Returns the id of a filter with exactly these masks.
    #[must_use]
    pub fn get_filter_equals(&self, contains: &Archetype, not_contains: &Archetype) -> Option<FilterId> {
        self.filters
            .iter()
            .find(|filter| filter.contains == *contains && filter.not_contains == *not_contains)
            .map(Filter::id)
    }

    /// Looks up a filter.
    #[inline]
    #[must_use]
    pub fn get(&self, id: FilterId) -> Option<&Filter> {
        self.filters.get(id.index()).filter(|filter| filter.id == id)
    }

    /// Looks up a filter mutably.
    #[inline]
    pub fn get_mut(&mut self, id: FilterId) -> Option<&mut Filter> {
        self.filters.get_mut(id.index()).filter(|filter| filter.id == id)
    }

    /// Number of filters.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filter is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Iterates filters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Iterates filters mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Filter> {
        self.filters.iter_mut()
    }

    /// Reserves membership slots in every filter.
    pub fn reserve(&mut self, capacity: usize) {
        for filter in &mut self.filters {
            filter.reserve(capacity);
        }
    }

    /// Clears membership of every filter, keeping definitions.
    pub fn clear_members(&mut self) {
        for filter in &mut self.filters {
            filter.clear_members();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Clone, Serialize, Deserialize)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Clone, Serialize, Deserialize)]
    struct Frozen;
    impl Component for Frozen {}

    fn setup() -> (Arc<ComponentRegistry>, Filter) {
        let registry = Arc::new(ComponentRegistry::new());
        let builder = FilterBuilder::new("movers").with::<Position>().without::<Frozen>();
        let (contains, not_contains) = builder.resolve(&registry).unwrap();
        let mut filters = FiltersStorage::default();
        let id = filters.register(builder.name(), contains, not_contains);
        let filter = filters.get(id).unwrap().clone();
        (registry, filter)
    }

    #[test]
    fn test_filter_ids_are_positive() {
        let mut filters = FiltersStorage::default();
        let first = filters.register("a", Archetype::EMPTY, Archetype::EMPTY);
        let second = filters.register("b", Archetype::EMPTY, Archetype::EMPTY);
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert!(FilterId::new(0).is_none());
        assert_eq!(filters.get(second).unwrap().name(), "b");
    }

    #[test]
    fn test_evaluate_membership() {
        let (registry, mut filter) = setup();
        let mut components = Components::new(registry);
        let entity = Entity::new(2, 1);

        components.set(entity, Position(1)).unwrap();
        assert!(filter.evaluate(entity, &components.archetype(entity)));
        assert!(filter.contains_entity(entity));
        assert_eq!(filter.bounds(), Some((2, 2)));

        components.set(entity, Frozen).unwrap();
        assert!(filter.evaluate(entity, &components.archetype(entity)));
        assert!(!filter.contains_entity(entity));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_requests_apply_on_flush() {
        let (registry, mut filter) = setup();
        let mut components = Components::new(registry);
        let mut storage = EntityStorage::default();
        let entity = storage.alloc();

        components.set(entity, Position(3)).unwrap();
        filter.push_request(entity);
        assert!(!filter.contains_entity(entity));

        assert_eq!(filter.apply_all_requests(&storage, &components), 1);
        assert!(filter.contains_entity(entity));
        assert!(!filter.has_requests());
    }

    #[test]
    fn test_entities_ascending() {
        let (registry, mut filter) = setup();
        let mut components = Components::new(registry);
        let mut storage = EntityStorage::default();
        let entities: Vec<Entity> = (0..4).map(|_| storage.alloc()).collect();

        for entity in entities.iter().rev() {
            components.set(*entity, Position(0)).unwrap();
            filter.evaluate(*entity, &components.archetype(*entity));
        }
        let visited: Vec<Entity> = filter.entities(&storage).collect();
        assert_eq!(visited, entities);
    }

    #[test]
    fn test_get_filter_equals() {
        let mut filters = FiltersStorage::default();
        let mut contains = Archetype::EMPTY;
        contains.set(ComponentBit::from_index(1));
        let id = filters.register("a", contains, Archetype::EMPTY);
        assert_eq!(filters.get_filter_equals(&contains, &Archetype::EMPTY), Some(id));
        assert_eq!(filters.get_filter_equals(&Archetype::EMPTY, &Archetype::EMPTY), None);
    }
}
