//! # World Context
//!
//! The part of a world that modules, systems and plugins may touch while
//! the scheduler runs: simulation state, filter index, pending events and
//! markers. Every structural change (entity created or removed, component
//! added or removed) updates filter membership right here, through the
//! per-bit filter index.
//!
//! While a filter-bound system runs, membership changes are buffered as
//! filter requests and flushed when the system returns.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use chronos_core::{
    Archetype, ArrayArena, ArrayPool, BufferArray, Component, ComponentBit, ComponentLifetime,
    ComponentRegistry, Entity, Filter, FilterBuilder, FilterId, FiltersStorage, FiltersTree,
    RandomState, State, Tick,
};

use crate::error::{WorldError, WorldResult};
use crate::events::{GlobalEvent, GlobalEventType, PendingEvents};
use crate::plugin::WorldPlugin;
use crate::step::WorldStep;

/// Mutable view of a world handed to scheduled units.
pub struct WorldContext {
    pub(crate) state: State,
    pub(crate) tree: FiltersTree,
    /// Filter ids registered in this world.
    pub(crate) exists: BufferArray<bool>,
    /// Filters whose membership changed during the running filtered system.
    pub(crate) touched: BufferArray<bool>,
    pub(crate) bools: Arc<ArrayPool<bool>>,
    pub(crate) buffering: bool,
    pub(crate) step: WorldStep,
    pub(crate) plugins: Vec<Box<dyn WorldPlugin>>,
    pub(crate) logic_events: PendingEvents,
    pub(crate) visual_events: PendingEvents,
    pub(crate) markers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    pub(crate) lifetime_systems: Vec<(Entity, ComponentBit)>,
    pub(crate) lifetime_modules: Vec<(Entity, ComponentBit)>,
    pub(crate) strict: bool,
    pub(crate) tick_time: f32,
}

impl WorldContext {
    pub(crate) fn new(arena: &ArrayArena, registry: Arc<ComponentRegistry>, strict: bool, tick_time: f32) -> Self {
        Self {
            state: State::new(Arc::clone(&registry)),
            tree: FiltersTree::new(arena, registry),
            exists: BufferArray::empty(),
            touched: BufferArray::empty(),
            bools: arena.pool::<bool>(),
            buffering: false,
            step: WorldStep::NONE,
            plugins: Vec::new(),
            logic_events: PendingEvents::default(),
            visual_events: PendingEvents::default(),
            markers: HashMap::new(),
            lifetime_systems: Vec::new(),
            lifetime_modules: Vec::new(),
            strict,
            tick_time,
        }
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Current simulation state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Tick being simulated, or the last simulated tick between updates.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    /// Fixed duration of one tick, in seconds.
    #[inline]
    #[must_use]
    pub fn tick_time(&self) -> f32 {
        self.tick_time
    }

    /// Phase the scheduler is currently in.
    #[inline]
    #[must_use]
    pub fn step(&self) -> WorldStep {
        self.step
    }

    /// Deterministic random stream of the current state.
    #[inline]
    pub fn random(&mut self) -> &mut RandomState {
        &mut self.state.random
    }

    /// The component type registry shared with the world.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        self.state.components.registry()
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Allocates an entity.
    ///
    /// Plugins see the entity first, so components they attach are part of
    /// the archetype that filters evaluate right after.
    ///
    /// # Errors
    ///
    /// Propagates plugin failures.
    pub fn add_entity(&mut self) -> WorldResult<Entity> {
        let entity = self.state.storage.alloc();

        for plugin in &mut self.plugins {
            plugin.on_create_entity(&mut self.state, entity)?;
        }

        self.seed_membership(entity);
        Ok(entity)
    }

    /// Removes an entity and invalidates every handle to its slot.
    ///
    /// The entity leaves its filters before plugins see the removal and
    /// before its components are dropped.
    ///
    /// # Returns
    ///
    /// `false` if the handle was stale and strict checks are off.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotAlive`] for a stale handle in strict mode, or
    /// a plugin failure.
    pub fn remove_entity(&mut self, entity: Entity) -> WorldResult<bool> {
        if !self.ensure_alive(entity)? {
            return Ok(false);
        }

        self.state.storage.dealloc(entity);
        for filter in self.state.filters.iter_mut() {
            if !filter.contains_entity(entity) {
                continue;
            }
            if self.buffering {
                filter.push_request(entity);
                mark(&mut self.touched, filter.id());
            } else {
                filter.remove_entity(entity);
            }
        }

        for plugin in &mut self.plugins {
            plugin.on_destroy_entity(&mut self.state, entity)?;
        }

        self.state.components.remove_all(entity);
        self.state.storage.increment_generation(entity);
        Ok(true)
    }

    /// Returns `true` if the handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.state.storage.is_alive(entity)
    }

    /// Live entity currently occupying slot `id`.
    #[must_use]
    pub fn entity_by_id(&self, id: u32) -> Option<Entity> {
        self.state.storage.entity_by_id(id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entities_count(&self) -> usize {
        self.state.storage.alive_count()
    }

    /// Replaces every component of `to` with copies of `from`'s.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotAlive`] in strict mode.
    pub fn copy_entity(&mut self, from: Entity, to: Entity) -> WorldResult<()> {
        if !self.ensure_alive(from)? || !self.ensure_alive(to)? {
            return Ok(());
        }
        self.state.components.copy_entity(from, to);

        let archetype = self.state.components.archetype(to);
        for filter in self.state.filters.iter_mut() {
            update_filter(filter, &mut self.touched, self.buffering, to, &archetype);
        }
        Ok(())
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Sets a component, updating filter membership if it was newly added.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotAlive`] in strict mode, or a registry error.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> WorldResult<()> {
        self.set_with_lifetime(entity, value, ComponentLifetime::Infinite)
    }

    /// Sets a component that is removed automatically.
    ///
    /// `NotifyAllSystemsBelow` is removed at the end of the current tick,
    /// `NotifyAllModulesBelow` after the whole simulated range.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_with_lifetime<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
        lifetime: ComponentLifetime,
    ) -> WorldResult<()> {
        if !self.ensure_alive(entity)? {
            return Ok(());
        }

        let (bit, added) = self.state.components.set(entity, value)?;
        if added {
            self.on_bit_changed(entity, bit);
        }

        match lifetime {
            ComponentLifetime::Infinite => {}
            ComponentLifetime::NotifyAllSystemsBelow => self.lifetime_systems.push((entity, bit)),
            ComponentLifetime::NotifyAllModulesBelow => self.lifetime_modules.push((entity, bit)),
        }
        Ok(())
    }

    /// Component value, if the entity is alive and carries it.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.state.storage.is_alive(entity) {
            return None;
        }
        self.state.components.get(entity)
    }

    /// Component value mutably. Does not change membership.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.state.storage.is_alive(entity) {
            return None;
        }
        self.state.components.get_mut(entity)
    }

    /// Returns `true` if the entity is alive and carries `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.state.storage.is_alive(entity) && self.state.components.has::<T>(entity)
    }

    /// Removes `T` from the entity.
    ///
    /// # Returns
    ///
    /// `true` if the entity carried `T`.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotAlive`] in strict mode.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> WorldResult<bool> {
        if !self.ensure_alive(entity)? {
            return Ok(false);
        }
        match self.state.components.remove::<T>(entity) {
            Some(bit) => {
                self.on_bit_changed(entity, bit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Current archetype of the entity.
    #[must_use]
    pub fn archetype(&self, entity: Entity) -> Archetype {
        self.state.components.archetype(entity)
    }

    // =========================================================================
    // Filters
    // =========================================================================

    /// Registers a filter, or returns the id of an identical one.
    ///
    /// Membership is replayed over every live entity, so this belongs in
    /// construction hooks rather than in the tick loop.
    ///
    /// # Errors
    ///
    /// Registry or arena errors.
    pub fn register_filter(&mut self, builder: &FilterBuilder) -> WorldResult<FilterId> {
        let (contains, not_contains) = builder.resolve(self.state.components.registry())?;
        if let Some(id) = self.state.filters.get_filter_equals(&contains, &not_contains) {
            return Ok(id);
        }
        if self.step.intersects(WorldStep::LOGIC_TICK) {
            tracing::warn!(filter = builder.name(), "filter registered inside the tick loop");
        }

        let id = self.state.filters.register(builder.name(), contains, not_contains);
        self.bools.resize(&mut self.exists, id.index(), false)?;
        self.bools.resize(&mut self.touched, id.index(), false)?;
        self.exists[id.index()] = true;

        let capacity = self.state.storage.capacity();
        let storage = &self.state.storage;
        let components = &self.state.components;
        if let Some(filter) = self.state.filters.get_mut(id) {
            filter.reserve(capacity);
            for entity in storage.alive() {
                filter.evaluate(entity, &components.archetype(entity));
            }
            self.tree.add(filter)?;
            tracing::debug!(filter = filter.name(), id = id.get(), members = filter.count(), "filter registered");
        }
        Ok(id)
    }

    /// Returns `true` if `id` was registered in this world.
    #[must_use]
    pub fn has_filter(&self, id: FilterId) -> bool {
        self.exists.get(id.index()).copied().unwrap_or(false)
    }

    /// Registered filter by id.
    #[must_use]
    pub fn filter(&self, id: FilterId) -> Option<&Filter> {
        self.state.filters.get(id)
    }

    /// Members of a filter in ascending id order. Empty for unknown ids.
    pub fn filter_entities(&self, id: FilterId) -> impl Iterator<Item = Entity> + '_ {
        self.state
            .filters
            .get(id)
            .into_iter()
            .flat_map(|filter| filter.entities(&self.state.storage))
    }

    /// The per-bit filter index.
    #[inline]
    #[must_use]
    pub fn filters_tree(&self) -> &FiltersTree {
        &self.tree
    }

    // =========================================================================
    // Global events
    // =========================================================================

    /// Queues `event` for `entity`. Duplicates collapse into one delivery.
    ///
    /// # Returns
    ///
    /// `false` if the same delivery was already queued.
    pub fn register_global_event(&mut self, event: &Arc<GlobalEvent>, entity: Entity, kind: GlobalEventType) -> bool {
        self.pending_mut(kind).register(event, entity)
    }

    /// Drops a queued delivery.
    pub fn cancel_global_event(&mut self, event: &Arc<GlobalEvent>, entity: Entity, kind: GlobalEventType) -> bool {
        self.pending_mut(kind).cancel(event, entity)
    }

    /// Number of deliveries queued for `kind`.
    #[must_use]
    pub fn pending_events(&self, kind: GlobalEventType) -> usize {
        match kind {
            GlobalEventType::Logic => self.logic_events.len(),
            GlobalEventType::Visual => self.visual_events.len(),
        }
    }

    fn pending_mut(&mut self, kind: GlobalEventType) -> &mut PendingEvents {
        match kind {
            GlobalEventType::Logic => &mut self.logic_events,
            GlobalEventType::Visual => &mut self.visual_events,
        }
    }

    // =========================================================================
    // Markers
    // =========================================================================

    /// Stores a visual-only marker, replacing any previous one of type `T`.
    /// Markers are swept at the end of late update.
    pub fn add_marker<T: Any + Send + Sync>(&mut self, marker: T) {
        self.markers.insert(TypeId::of::<T>(), Box::new(marker));
    }

    /// Marker of type `T`, if set this frame.
    #[must_use]
    pub fn get_marker<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.markers.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Returns `true` if a marker of type `T` is set.
    #[must_use]
    pub fn has_marker<T: Any + Send + Sync>(&self) -> bool {
        self.markers.contains_key(&TypeId::of::<T>())
    }

    /// Removes the marker of type `T`.
    pub fn remove_marker<T: Any + Send + Sync>(&mut self) -> bool {
        self.markers.remove(&TypeId::of::<T>()).is_some()
    }

    // =========================================================================
    // Scheduler internals
    // =========================================================================

    fn ensure_alive(&self, entity: Entity) -> WorldResult<bool> {
        if self.state.storage.is_alive(entity) {
            return Ok(true);
        }
        if self.strict {
            return Err(WorldError::EntityNotAlive(entity));
        }
        tracing::error!(%entity, "entity is not alive");
        Ok(false)
    }

    /// Evaluates a new entity against filters that accept an empty
    /// archetype and those indexed under bits plugins attached.
    fn seed_membership(&mut self, entity: Entity) {
        let archetype = self.state.components.archetype(entity);
        for filter in self.state.filters.iter_mut() {
            if filter.contains().is_empty() {
                update_filter(filter, &mut self.touched, self.buffering, entity, &archetype);
            }
        }
        for bit in archetype.bits() {
            self.on_bit_changed(entity, bit);
        }
    }

    fn on_bit_changed(&mut self, entity: Entity, bit: ComponentBit) {
        let archetype = self.state.components.archetype(entity);
        let ids = self
            .tree
            .query_contains_bit(bit)
            .iter()
            .chain(self.tree.query_not_contains_bit(bit));
        for &id in ids {
            if let Some(filter) = self.state.filters.get_mut(id) {
                update_filter(filter, &mut self.touched, self.buffering, entity, &archetype);
            }
        }
    }

    /// Starts buffering membership changes for a filtered system.
    pub(crate) fn begin_buffering(&mut self) {
        self.touched.clear();
        self.buffering = true;
    }

    /// Applies buffered requests of touched filters and deferred
    /// deallocations.
    pub(crate) fn end_buffering(&mut self) {
        self.buffering = false;
        for (index, touched) in self.touched.iter_mut().enumerate() {
            if !std::mem::take(touched) {
                continue;
            }
            let filter = u32::try_from(index + 1)
                .ok()
                .and_then(FilterId::new)
                .and_then(|id| self.state.filters.get_mut(id));
            if let Some(filter) = filter {
                filter.apply_all_requests(&self.state.storage, &self.state.components);
            }
        }
        self.state.storage.apply_dead();
    }

    /// Removes components whose lifetime ended.
    pub(crate) fn sweep_lifetimes(&mut self, lifetime: ComponentLifetime) {
        let mut expired = match lifetime {
            ComponentLifetime::Infinite => return,
            ComponentLifetime::NotifyAllSystemsBelow => std::mem::take(&mut self.lifetime_systems),
            ComponentLifetime::NotifyAllModulesBelow => std::mem::take(&mut self.lifetime_modules),
        };

        for (entity, bit) in expired.drain(..) {
            if self.state.storage.is_alive(entity) && self.state.components.remove_by_bit(entity, bit) {
                self.on_bit_changed(entity, bit);
            }
        }

        match lifetime {
            ComponentLifetime::NotifyAllSystemsBelow => self.lifetime_systems = expired,
            _ => self.lifetime_modules = expired,
        }
    }

    /// Recomputes every filter's membership from the live entities.
    pub(crate) fn replay_filters(&mut self) {
        let storage = &self.state.storage;
        let components = &self.state.components;
        for filter in self.state.filters.iter_mut() {
            filter.clear_members();
            for entity in storage.alive() {
                filter.evaluate(entity, &components.archetype(entity));
            }
        }
    }

    /// Runs plugin construction hooks for every live entity.
    pub(crate) fn replay_plugin_entities(&mut self) -> WorldResult<()> {
        if self.plugins.is_empty() {
            return Ok(());
        }
        let mut alive = Vec::with_capacity(self.state.storage.alive_count());
        self.state.storage.for_each(&mut alive);
        for entity in alive {
            for plugin in &mut self.plugins {
                plugin.on_create_entity(&mut self.state, entity)?;
            }
        }
        Ok(())
    }

    /// Runs `hook` for every plugin, in registration order, with the plugin
    /// list detached from the context.
    pub(crate) fn run_plugins(
        &mut self,
        mut hook: impl FnMut(&mut Box<dyn WorldPlugin>, &mut Self) -> WorldResult<()>,
    ) -> WorldResult<()> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let result = plugins.iter_mut().try_for_each(|plugin| hook(plugin, self));
        self.plugins = plugins;
        result
    }

    /// Swaps filter definitions so a foreign state keeps this world's
    /// filters.
    pub(crate) fn take_filters(&mut self) -> FiltersStorage {
        std::mem::take(&mut self.state.filters)
    }

    pub(crate) fn begin_restore(&mut self) -> WorldResult<()> {
        for plugin in &mut self.plugins {
            plugin.on_begin_restore(&mut self.state)?;
        }
        Ok(())
    }

    pub(crate) fn end_restore(&mut self) -> WorldResult<()> {
        for plugin in &mut self.plugins {
            plugin.on_end_restore(&mut self.state)?;
        }
        Ok(())
    }

    /// Drops queued lifetimes, events and markers. They hold handles into
    /// the current state and must not outlive it.
    pub(crate) fn drop_pending(&mut self) {
        self.logic_events.clear();
        self.visual_events.clear();
        self.markers.clear();
        self.lifetime_systems.clear();
        self.lifetime_modules.clear();
    }

    /// Tears down every live entity, releases pooled arrays and resets
    /// transient fields.
    ///
    /// The next session starts from a fresh component registry, so bit
    /// assignment depends only on that session's registration order.
    pub(crate) fn clear(&mut self, arena: &ArrayArena) -> WorldResult<()> {
        let mut alive = Vec::with_capacity(self.state.storage.alive_count());
        self.state.storage.for_each(&mut alive);
        for entity in alive {
            self.remove_entity(entity)?;
        }
        self.state.storage.apply_dead();

        self.tree.dispose()?;
        self.bools.recycle(std::mem::take(&mut self.touched))?;
        self.bools.recycle(std::mem::take(&mut self.exists))?;

        let registry = Arc::new(ComponentRegistry::new());
        self.tree = FiltersTree::new(arena, Arc::clone(&registry));
        self.state = State::new(registry);
        self.buffering = false;
        self.step = WorldStep::NONE;
        self.plugins.clear();
        self.drop_pending();
        Ok(())
    }
}

/// Re-evaluates one filter for `entity`, or buffers the request.
fn update_filter(filter: &mut Filter, touched: &mut BufferArray<bool>, buffering: bool, entity: Entity, archetype: &Archetype) {
    if buffering {
        filter.push_request(entity);
        mark(touched, filter.id());
    } else {
        filter.evaluate(entity, archetype);
    }
}

#[inline]
fn mark(touched: &mut BufferArray<bool>, id: FilterId) {
    if let Some(flag) = touched.get_mut(id.index()) {
        *flag = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Health(i32);
    impl Component for Health {}

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Frozen;
    impl Component for Frozen {}

    fn context(arena: &ArrayArena) -> WorldContext {
        let mut ctx = WorldContext::new(arena, Arc::new(ComponentRegistry::new()), true, 0.033);
        ctx.state.initialize(16);
        ctx
    }

    #[test]
    fn test_membership_follows_components() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        let id = ctx
            .register_filter(&FilterBuilder::new("alive").with::<Health>().without::<Frozen>())
            .unwrap();

        let entity = ctx.add_entity().unwrap();
        assert!(!ctx.filter(id).unwrap().contains_entity(entity));

        ctx.set(entity, Health(10)).unwrap();
        assert!(ctx.filter(id).unwrap().contains_entity(entity));

        ctx.set(entity, Frozen).unwrap();
        assert!(!ctx.filter(id).unwrap().contains_entity(entity));

        ctx.remove::<Frozen>(entity).unwrap();
        assert!(ctx.filter(id).unwrap().contains_entity(entity));
    }

    #[test]
    fn test_registration_replays_alive_entities() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        for value in 0..3 {
            let entity = ctx.add_entity().unwrap();
            ctx.set(entity, Health(value)).unwrap();
        }

        let id = ctx.register_filter(&FilterBuilder::new("health").with::<Health>()).unwrap();
        assert_eq!(ctx.filter(id).unwrap().count(), 3);

        let same = ctx.register_filter(&FilterBuilder::new("again").with::<Health>()).unwrap();
        assert_eq!(same, id);
        assert!(ctx.has_filter(id));
        assert!(!ctx.has_filter(FilterId::new(9).unwrap()));
    }

    #[test]
    fn test_empty_contains_filter_sees_new_entities() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        let id = ctx.register_filter(&FilterBuilder::new("not_frozen").without::<Frozen>()).unwrap();

        let entity = ctx.add_entity().unwrap();
        assert!(ctx.filter(id).unwrap().contains_entity(entity));
    }

    #[test]
    fn test_remove_entity_leaves_filters() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        let id = ctx.register_filter(&FilterBuilder::new("health").with::<Health>()).unwrap();

        let entity = ctx.add_entity().unwrap();
        ctx.set(entity, Health(1)).unwrap();
        assert!(ctx.remove_entity(entity).unwrap());

        assert!(!ctx.is_alive(entity));
        assert_eq!(ctx.filter(id).unwrap().count(), 0);
        assert!(matches!(ctx.remove_entity(entity), Err(WorldError::EntityNotAlive(_))));
    }

    #[test]
    fn test_lenient_mode_logs_stale_handles() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        ctx.strict = false;

        let entity = ctx.add_entity().unwrap();
        ctx.remove_entity(entity).unwrap();
        assert!(!ctx.remove_entity(entity).unwrap());
        ctx.set(entity, Health(1)).unwrap();
        assert!(ctx.get::<Health>(entity).is_none());
    }

    #[test]
    fn test_buffered_changes_apply_on_flush() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        let id = ctx.register_filter(&FilterBuilder::new("health").with::<Health>()).unwrap();
        let entity = ctx.add_entity().unwrap();

        ctx.begin_buffering();
        ctx.set(entity, Health(5)).unwrap();
        assert!(!ctx.filter(id).unwrap().contains_entity(entity));
        ctx.end_buffering();
        assert!(ctx.filter(id).unwrap().contains_entity(entity));
    }

    #[test]
    fn test_lifetime_sweep() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        let entity = ctx.add_entity().unwrap();
        ctx.set_with_lifetime(entity, Health(1), ComponentLifetime::NotifyAllSystemsBelow)
            .unwrap();

        ctx.sweep_lifetimes(ComponentLifetime::NotifyAllModulesBelow);
        assert!(ctx.has::<Health>(entity));
        ctx.sweep_lifetimes(ComponentLifetime::NotifyAllSystemsBelow);
        assert!(!ctx.has::<Health>(entity));
    }

    #[test]
    fn test_markers() {
        let arena = ArrayArena::new();
        let mut ctx = context(&arena);
        ctx.add_marker(7_u32);
        assert_eq!(ctx.get_marker::<u32>(), Some(&7));
        assert!(ctx.remove_marker::<u32>());
        assert!(!ctx.has_marker::<u32>());
    }
}
