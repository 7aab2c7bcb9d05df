//! # World
//!
//! Owns modules, system groups, features and plugins, and drives the
//! fixed-step tick loop.
//!
//! ## Frame Phases
//!
//! An external driver calls, once per frame:
//!
//! 1. [`World::pre_update`] - module visual hooks
//! 2. [`World::update`] - logic: simulates the pending tick range
//! 3. [`World::late_update`] - visual systems, visual events, marker sweep
//!
//! ## Tick Order
//!
//! For each tick in `[from, to)`: modules, plugins, pre systems, main
//! systems, post systems, end-of-tick lifetime sweep, logic events. After
//! the range: range plugins, then the end-of-modules lifetime sweep.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use chronos_core::{
    ArrayArena, ArrayPool, ComponentLifetime, ComponentRegistry, Entity, Filter, FilterBuilder,
    FilterId, ObjectPool, State, Tick,
};
use rayon::prelude::*;

use crate::checkpoint::{report, CheckpointCollector};
use crate::config::WorldSettings;
use crate::context::WorldContext;
use crate::error::{WorldError, WorldResult};
use crate::feature::{Feature, FeatureEntry};
use crate::module::{runs_on, Module, ModuleEntry};
use crate::plugin::WorldPlugin;
use crate::snapshot::{HistoryEvent, StatesHistory, WorldSerializer, WorldStateCapsule};
use crate::step::{ModuleState, WorldStep};
use crate::system::{LoadProgress, MainTick, System, SystemEntry, SystemGroup};

/// Idle instances kept per module type.
const MODULE_POOL_CAPACITY: usize = 4;

/// A deterministic simulation world.
///
/// # Example
///
/// ```rust,ignore
/// let arena = Arc::new(ArrayArena::new());
/// let mut world = World::new(1, arena, WorldSettings::default())?;
///
/// world.add_module::<Spawner>()?;
/// world.add_system_group(SystemGroup::new("movement").with(ApplyVelocity))?;
///
/// loop {
///     world.pre_update(dt)?;
///     world.update(dt)?;
///     world.late_update(dt)?;
/// }
/// ```
pub struct World {
    id: u32,
    settings: WorldSettings,
    arena: Arc<ArrayArena>,
    ctx: WorldContext,
    modules: Vec<ModuleEntry>,
    module_pool: HashMap<TypeId, ObjectPool<Box<dyn Module>>>,
    features: Vec<FeatureEntry>,
    groups: Vec<SystemGroup>,
    reset_state: Option<State>,
    checkpoint: Option<Box<dyn CheckpointCollector>>,
    load: Option<LoadProgress>,
    time_since_start: f64,
    /// Range supplied by an external driver for the next logic update.
    range: Option<(Tick, Tick)>,
    cpf: Tick,
    /// Filter member snapshots for filter-bound systems.
    entities: Arc<ArrayPool<Entity>>,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

/// Worker grid parameters for one parallel system run.
#[derive(Clone, Copy)]
struct Grid<'a> {
    pool: Option<&'a rayon::ThreadPool>,
    batch: usize,
}

impl World {
    /// Creates a world drawing pooled arrays from `arena`.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] for invalid settings or
    /// [`WorldError::WorkerPool`] if the worker grid cannot be built.
    pub fn new(id: u32, arena: Arc<ArrayArena>, settings: WorldSettings) -> WorldResult<Self> {
        settings.validate()?;
        let registry = Arc::new(ComponentRegistry::new());
        let mut ctx = WorldContext::new(
            &arena,
            registry,
            settings.strict_entity_checks,
            settings.tick_time,
        );
        ctx.state.initialize(settings.entities_capacity);

        Ok(Self {
            id,
            thread_pool: build_thread_pool(&settings)?,
            entities: arena.pool::<Entity>(),
            settings,
            arena,
            ctx,
            modules: Vec::new(),
            module_pool: HashMap::new(),
            features: Vec::new(),
            groups: Vec::new(),
            reset_state: None,
            checkpoint: None,
            load: None,
            time_since_start: 0.0,
            range: None,
            cpf: 0,
        })
    }

    /// World id assigned by its pool.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Active settings.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    /// The arena this world draws pooled arrays from.
    #[must_use]
    pub fn arena(&self) -> &Arc<ArrayArena> {
        &self.arena
    }

    /// Scheduler context.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &WorldContext {
        &self.ctx
    }

    /// Scheduler context, mutably. Entity and component edits go here.
    #[inline]
    pub fn context_mut(&mut self) -> &mut WorldContext {
        &mut self.ctx
    }

    /// Current simulation state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &State {
        &self.ctx.state
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Adds a module of type `M`, reusing a pooled instance if one exists.
    ///
    /// # Returns
    ///
    /// `false` if the module rejected itself through
    /// [`Module::could_be_added`]; the instance goes back to the pool.
    ///
    /// # Errors
    ///
    /// Propagates the construction hook's error.
    pub fn add_module<M: Module + Default>(&mut self) -> WorldResult<bool> {
        let module: Box<dyn Module> = match self.module_pool.get(&TypeId::of::<M>()) {
            Some(pool) => pool.spawn(|| Box::new(M::default()) as Box<dyn Module>),
            None => Box::new(M::default()),
        };
        self.install_module::<M>(module)
    }

    /// Adds a module instance.
    ///
    /// # Errors
    ///
    /// Propagates the construction hook's error.
    pub fn add_module_with<M: Module>(&mut self, module: M) -> WorldResult<bool> {
        self.install_module::<M>(Box::new(module))
    }

    fn install_module<M: Module>(&mut self, module: Box<dyn Module>) -> WorldResult<bool> {
        if !module.could_be_added(&self.ctx) {
            tracing::debug!(module = std::any::type_name::<M>(), "module rejected");
            self.recycle_module(TypeId::of::<M>(), module);
            return Ok(false);
        }

        let mut entry = ModuleEntry::new::<M>(module);
        entry.module.on_construct(&mut self.ctx)?;
        self.modules.push(entry);
        Ok(true)
    }

    /// Removes every module of type `M`.
    ///
    /// # Returns
    ///
    /// Number of modules removed.
    ///
    /// # Errors
    ///
    /// Propagates the deconstruction hook's error.
    pub fn remove_modules<M: Module>(&mut self) -> WorldResult<usize> {
        let mut removed = 0;
        while let Some(index) = self.module_position(TypeId::of::<M>()) {
            let mut entry = self.modules.remove(index);
            entry.module.on_deconstruct(&mut self.ctx)?;
            self.recycle_module(entry.type_id, entry.module);
            removed += 1;
        }
        Ok(removed)
    }

    /// First module of type `M`.
    #[must_use]
    pub fn get_module<M: Module>(&self) -> Option<&M> {
        self.modules.iter().find_map(ModuleEntry::downcast_ref::<M>)
    }

    /// First module of type `M`, mutably.
    pub fn get_module_mut<M: Module>(&mut self) -> Option<&mut M> {
        self.modules.iter_mut().find_map(ModuleEntry::downcast_mut::<M>)
    }

    /// Returns `true` if a module of type `M` is registered.
    #[must_use]
    pub fn has_module<M: Module>(&self) -> bool {
        self.module_position(TypeId::of::<M>()).is_some()
    }

    /// Number of registered modules.
    #[must_use]
    pub fn modules_count(&self) -> usize {
        self.modules.len()
    }

    /// Sets the activity flags of every module of type `M`.
    pub fn set_module_state<M: Module>(&mut self, state: ModuleState) -> bool {
        let mut found = false;
        for entry in &mut self.modules {
            if entry.type_id == TypeId::of::<M>() {
                entry.state = state;
                found = true;
            }
        }
        found
    }

    /// Activity flags of the first module of type `M`. `ALL_ACTIVE` if absent.
    #[must_use]
    pub fn module_state<M: Module>(&self) -> ModuleState {
        self.module_position(TypeId::of::<M>())
            .map_or(ModuleState::ALL_ACTIVE, |index| self.modules[index].state)
    }

    fn module_position(&self, type_id: TypeId) -> Option<usize> {
        self.modules.iter().position(|entry| entry.type_id == type_id)
    }

    fn recycle_module(&mut self, type_id: TypeId, module: Box<dyn Module>) {
        self.module_pool
            .entry(type_id)
            .or_insert_with(|| ObjectPool::new(MODULE_POOL_CAPACITY))
            .recycle(module);
    }

    // =========================================================================
    // Features
    // =========================================================================

    /// Adds a feature and lets it install its modules and systems.
    ///
    /// # Returns
    ///
    /// `false` if the feature rejected itself.
    ///
    /// # Errors
    ///
    /// Propagates the construction hook's error.
    pub fn add_feature<F: Feature>(&mut self, feature: F) -> WorldResult<bool> {
        if !feature.could_be_added(self) {
            tracing::debug!(feature = std::any::type_name::<F>(), "feature rejected");
            return Ok(false);
        }

        let mut feature: Box<dyn Feature> = Box::new(feature);
        feature.on_construct(self)?;
        self.features.push(FeatureEntry {
            feature,
            state: ModuleState::ALL_ACTIVE,
            type_id: TypeId::of::<F>(),
            name: std::any::type_name::<F>(),
        });
        Ok(true)
    }

    /// Removes the feature of type `F`.
    ///
    /// # Errors
    ///
    /// Propagates the deconstruction hook's error.
    pub fn remove_feature<F: Feature>(&mut self) -> WorldResult<bool> {
        let Some(index) = self.feature_position(TypeId::of::<F>()) else {
            return Ok(false);
        };
        let mut entry = self.features.remove(index);
        tracing::debug!(feature = entry.name, "feature removed");
        entry.feature.on_deconstruct(self)?;
        Ok(true)
    }

    /// Feature of type `F`.
    #[must_use]
    pub fn get_feature<F: Feature>(&self) -> Option<&F> {
        self.features.iter().find_map(FeatureEntry::downcast_ref::<F>)
    }

    /// Returns `true` if a feature of type `F` is registered.
    #[must_use]
    pub fn has_feature<F: Feature>(&self) -> bool {
        self.feature_position(TypeId::of::<F>()).is_some()
    }

    /// Sets the activity flags of the feature of type `F`.
    pub fn set_feature_state<F: Feature>(&mut self, state: ModuleState) -> bool {
        match self.feature_position(TypeId::of::<F>()) {
            Some(index) => {
                self.features[index].state = state;
                true
            }
            None => false,
        }
    }

    /// Activity flags of the feature of type `F`. `ALL_ACTIVE` if absent.
    #[must_use]
    pub fn feature_state<F: Feature>(&self) -> ModuleState {
        self.feature_position(TypeId::of::<F>())
            .map_or(ModuleState::ALL_ACTIVE, |index| self.features[index].state)
    }

    fn feature_position(&self, type_id: TypeId) -> Option<usize> {
        self.features.iter().position(|entry| entry.type_id == type_id)
    }

    // =========================================================================
    // Systems
    // =========================================================================

    /// Registers a system group and constructs its systems.
    ///
    /// Filter-bound systems get their filters registered here.
    ///
    /// # Returns
    ///
    /// Index for [`update_group`](Self::update_group).
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] if a filter-bound system declares no
    /// filter, or a construction hook's error.
    pub fn add_system_group(&mut self, mut group: SystemGroup) -> WorldResult<usize> {
        self.construct_group(&mut group)?;
        tracing::debug!(group = group.name(), systems = group.len(), "system group added");
        self.groups.push(group);
        Ok(self.groups.len() - 1)
    }

    /// Replaces the group at `index`, deconstructing the old systems.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] for an unknown index, or hook errors.
    pub fn update_group(&mut self, index: usize, mut group: SystemGroup) -> WorldResult<()> {
        if index >= self.groups.len() {
            return Err(WorldError::InvalidConfig(format!("no system group at index {index}")));
        }
        for entry in &mut self.groups[index].systems {
            entry.system.on_deconstruct(&mut self.ctx)?;
        }
        self.construct_group(&mut group)?;
        self.groups[index] = group;
        Ok(())
    }

    fn construct_group(&mut self, group: &mut SystemGroup) -> WorldResult<()> {
        for entry in &mut group.systems {
            if let Some(MainTick::Filtered { .. }) = entry.capabilities.main {
                let builder = entry.system.filter().ok_or_else(|| {
                    WorldError::InvalidConfig(format!("{} is filter-bound but declares no filter", entry.name))
                })?;
                entry.filter = Some(self.ctx.register_filter(&builder)?);
            }
            entry.system.on_construct(&mut self.ctx)?;
        }
        Ok(())
    }

    /// System group at `index`.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&SystemGroup> {
        self.groups.get(index)
    }

    /// Number of system groups.
    #[must_use]
    pub fn groups_count(&self) -> usize {
        self.groups.len()
    }

    /// First system of type `S` in any group.
    #[must_use]
    pub fn get_system<S: System>(&self) -> Option<&S> {
        self.groups.iter().find_map(SystemGroup::get_system::<S>)
    }

    /// First system of type `S` in any group, mutably.
    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.groups.iter_mut().find_map(SystemGroup::get_system_mut::<S>)
    }

    /// Returns `true` if any group holds a system of type `S`.
    #[must_use]
    pub fn has_system<S: System>(&self) -> bool {
        self.groups.iter().any(SystemGroup::has_system::<S>)
    }

    /// Sets the activity flags of every system of type `S`.
    pub fn set_system_state<S: System>(&mut self, state: ModuleState) -> bool {
        let mut found = false;
        for group in &mut self.groups {
            found |= group.set_system_state::<S>(state);
        }
        found
    }

    /// Returns `true` if a system of type `S` exists and runs logic ticks.
    #[must_use]
    pub fn is_system_active<S: System>(&self) -> bool {
        self.groups
            .iter()
            .find(|group| group.has_system::<S>())
            .is_some_and(|group| group.system_state::<S>().allows(WorldStep::LOGIC_TICK))
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Starts loading every loadable system. `on_complete` runs once the
    /// last one reports completion, immediately if there are none.
    ///
    /// # Errors
    ///
    /// Propagates load hook errors.
    pub fn load(&mut self, on_complete: impl FnOnce() + Send + 'static) -> WorldResult<()> {
        let count = self.groups.iter().map(SystemGroup::loadable_count).sum();
        let progress = LoadProgress::new(count, Box::new(on_complete));
        self.load = Some(progress.clone());

        for group in &mut self.groups {
            for &index in &group.loadable {
                group.systems[index].system.load(&mut self.ctx, progress.completion())?;
            }
        }
        Ok(())
    }

    /// Returns `true` while a load is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.load.as_ref().is_some_and(|load| !load.is_loaded())
    }

    /// Returns `true` once every loadable system completed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.load.as_ref().is_some_and(LoadProgress::is_loaded)
    }

    // =========================================================================
    // Plugins, filters, entities
    // =========================================================================

    /// Appends a plugin. Plugins run in registration order.
    pub fn add_plugin(&mut self, plugin: impl WorldPlugin + 'static) {
        self.ctx.plugins.push(Box::new(plugin));
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn plugins_count(&self) -> usize {
        self.ctx.plugins.len()
    }

    /// Installs a profiling checkpoint sink.
    pub fn set_checkpoint_collector(&mut self, collector: Box<dyn CheckpointCollector>) {
        self.checkpoint = Some(collector);
    }

    /// Removes the checkpoint sink.
    pub fn take_checkpoint_collector(&mut self) -> Option<Box<dyn CheckpointCollector>> {
        self.checkpoint.take()
    }

    /// Registers a filter. See [`WorldContext::register_filter`].
    ///
    /// # Errors
    ///
    /// Registry or arena errors.
    pub fn register_filter(&mut self, builder: &FilterBuilder) -> WorldResult<FilterId> {
        self.ctx.register_filter(builder)
    }

    /// Registered filter by id.
    #[must_use]
    pub fn filter(&self, id: FilterId) -> Option<&Filter> {
        self.ctx.filter(id)
    }

    /// Allocates an entity. See [`WorldContext::add_entity`].
    ///
    /// # Errors
    ///
    /// Propagates plugin failures.
    pub fn add_entity(&mut self) -> WorldResult<Entity> {
        self.ctx.add_entity()
    }

    /// Removes an entity. See [`WorldContext::remove_entity`].
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotAlive`] in strict mode, or plugin failures.
    pub fn remove_entity(&mut self, entity: Entity) -> WorldResult<bool> {
        self.ctx.remove_entity(entity)
    }

    /// Replaces every component of `to` with copies of `from`'s.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotAlive`] in strict mode.
    pub fn copy_entity(&mut self, from: Entity, to: Entity) -> WorldResult<()> {
        self.ctx.copy_entity(from, to)
    }

    /// Live entity in slot `id`.
    #[must_use]
    pub fn entity_by_id(&self, id: u32) -> Option<Entity> {
        self.ctx.entity_by_id(id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entities_count(&self) -> usize {
        self.ctx.entities_count()
    }

    /// Grows every per-entity table to `capacity`.
    ///
    /// # Errors
    ///
    /// Propagates plugin failures.
    pub fn set_entities_capacity(&mut self, capacity: usize) -> WorldResult<()> {
        self.ctx.state.initialize(capacity);
        if let Some(reset) = self.reset_state.as_mut() {
            reset.initialize(capacity);
        }
        for plugin in &mut self.ctx.plugins {
            plugin.on_set_capacity(capacity)?;
        }
        self.settings.entities_capacity = capacity;
        Ok(())
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Copies the current state into the reset slot.
    pub fn save_reset_state(&mut self) {
        match self.reset_state.as_mut() {
            Some(reset) => reset.copy_from(&self.ctx.state),
            None => self.reset_state = Some(self.ctx.state.clone()),
        }
    }

    /// Returns `true` if a reset state was saved.
    #[must_use]
    pub fn has_reset_state(&self) -> bool {
        self.reset_state.is_some()
    }

    /// The saved reset state.
    #[must_use]
    pub fn get_reset_state(&self) -> Option<&State> {
        self.reset_state.as_ref()
    }

    /// Restores the saved reset state.
    ///
    /// # Returns
    ///
    /// `false` if none was saved.
    ///
    /// # Errors
    ///
    /// Propagates restore hook errors.
    pub fn reset_state(&mut self) -> WorldResult<bool> {
        let Some(reset) = self.reset_state.take() else {
            return Ok(false);
        };
        let result = self.set_state(&reset);
        self.reset_state = Some(reset);
        result.map(|()| true)
    }

    /// Drops the saved reset state.
    pub fn recycle_reset_state(&mut self) {
        self.reset_state = None;
    }

    /// Replaces the current state with a copy of `state`.
    ///
    /// This world keeps its own filter definitions; membership is rebuilt
    /// from the copied entities. Queued lifetimes, events and markers of
    /// the replaced state are dropped.
    ///
    /// # Errors
    ///
    /// Propagates restore hook errors.
    pub fn set_state(&mut self, state: &State) -> WorldResult<()> {
        self.ctx.begin_restore()?;
        self.ctx.drop_pending();
        let filters = self.ctx.take_filters();
        self.ctx.state.copy_from(state);
        self.ctx.state.filters = filters;
        self.ctx.replay_filters();
        self.ctx.end_restore()
    }

    /// Reseeds the random stream of the current and the reset state.
    pub fn set_seed(&mut self, seed: u64) {
        self.ctx.state.random.set_seed(seed);
        if let Some(reset) = self.reset_state.as_mut() {
            reset.random.set_seed(seed);
        }
    }

    /// Deterministic hash of the current state.
    ///
    /// # Errors
    ///
    /// Component encoding errors.
    pub fn state_hash(&self) -> WorldResult<u64> {
        Ok(self.ctx.state.hash()?)
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Fixed tick duration in seconds.
    #[must_use]
    pub fn tick_time(&self) -> f32 {
        self.ctx.tick_time
    }

    /// Sets the fixed tick duration.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] unless positive and finite.
    pub fn set_tick_time(&mut self, tick_time: f32) -> WorldResult<()> {
        if !(tick_time.is_finite() && tick_time > 0.0) {
            return Err(WorldError::InvalidConfig(format!("tick_time must be positive, got {tick_time}")));
        }
        self.ctx.tick_time = tick_time;
        self.settings.tick_time = tick_time;
        Ok(())
    }

    /// Seconds accumulated by [`update`](Self::update).
    #[must_use]
    pub fn time_since_start(&self) -> f64 {
        self.time_since_start
    }

    /// Ticks simulated by the last `simulate` call.
    #[must_use]
    pub fn cpf(&self) -> Tick {
        self.cpf
    }

    /// Current state tick.
    #[must_use]
    pub fn state_tick(&self) -> Tick {
        self.ctx.state.tick
    }

    /// Supplies the tick range for the next logic update.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidTickRange`] if `from > to`.
    pub fn set_from_to_ticks(&mut self, from: Tick, to: Tick) -> WorldResult<()> {
        if from > to {
            return Err(WorldError::InvalidTickRange { from, to });
        }
        self.range = Some((from, to));
        Ok(())
    }

    // =========================================================================
    // Frame phases
    // =========================================================================

    /// Visual-pre pass. A negative `dt` is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates module errors.
    pub fn pre_update(&mut self, dt: f32) -> WorldResult<()> {
        if dt < 0.0 {
            return Ok(());
        }
        let _span = tracing::trace_span!("pre_update", world = self.id).entered();

        let result = self.update_modules(dt);
        self.ctx.step = WorldStep::NONE;
        result
    }

    fn update_modules(&mut self, dt: f32) -> WorldResult<()> {
        let step = WorldStep::MODULES_VISUAL_TICK;
        self.ctx.step = step;
        for entry in &mut self.modules {
            if !entry.capabilities.visual_update || !entry.state.allows(step) {
                continue;
            }
            report(&mut self.checkpoint, entry.name, step);
            entry.module.update(&mut self.ctx, dt)?;
            report(&mut self.checkpoint, entry.name, step);
        }
        Ok(())
    }

    /// Logic pass. A negative `dt` is a no-op.
    ///
    /// With `threaded_tick` and a dedicated worker pool the whole logic pass
    /// runs as a single job on that pool.
    ///
    /// # Errors
    ///
    /// Propagates `simulate` errors.
    pub fn update(&mut self, dt: f32) -> WorldResult<()> {
        if dt < 0.0 {
            return Ok(());
        }
        if let Some(collector) = self.checkpoint.as_deref_mut() {
            collector.reset();
        }
        self.time_since_start += f64::from(dt);

        match self.thread_pool.clone() {
            Some(pool) if self.settings.threaded_tick => pool.install(|| self.update_logic()),
            _ => self.update_logic(),
        }
    }

    /// Simulates the externally supplied range, or the range derived from
    /// accumulated time when `auto_tick_range` is set.
    #[allow(clippy::cast_possible_truncation)]
    fn update_logic(&mut self) -> WorldResult<()> {
        let (from, to) = match self.range.take() {
            Some(range) => range,
            None if self.settings.auto_tick_range => {
                let target = (self.time_since_start / f64::from(self.ctx.tick_time)).floor() as Tick;
                (self.ctx.state.tick, target)
            }
            None => return Ok(()),
        };
        self.simulate(from, to)
    }

    /// Visual-post pass: visual systems, visual events, marker sweep.
    /// A negative `dt` is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates system errors.
    pub fn late_update(&mut self, dt: f32) -> WorldResult<()> {
        if dt < 0.0 {
            return Ok(());
        }
        let _span = tracing::trace_span!("late_update", world = self.id).entered();

        let result = self.update_systems(dt);
        self.ctx.visual_events.flush();
        self.ctx.markers.clear();
        self.ctx.step = WorldStep::NONE;
        result
    }

    fn update_systems(&mut self, dt: f32) -> WorldResult<()> {
        let step = WorldStep::SYSTEMS_VISUAL_TICK;
        self.ctx.step = step;
        for group in &mut self.groups {
            for &index in &group.visual {
                let entry = &mut group.systems[index];
                if !entry.state.allows(step) {
                    continue;
                }
                report(&mut self.checkpoint, entry.name, step);
                entry.system.update(&mut self.ctx, dt)?;
                report(&mut self.checkpoint, entry.name, step);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Tick loop
    // =========================================================================

    /// Runs every tick in `[from, to)`.
    ///
    /// `from` is clamped to zero and an empty range does nothing. A failure
    /// inside any unit aborts the call; the partially simulated tick is
    /// left as is and must not be committed as a snapshot.
    ///
    /// # Errors
    ///
    /// [`WorldError::SimulationRangeExceeded`] before any tick runs if the
    /// range is longer than `max_ticks_simulation_count`, otherwise the
    /// first error raised by a scheduled unit.
    pub fn simulate(&mut self, from: Tick, to: Tick) -> WorldResult<()> {
        let from = from.max(0);
        if from >= to {
            self.cpf = 0;
            return Ok(());
        }

        let max = self.settings.max_ticks_simulation_count;
        if max > 0 && to - from > i64::from(max) {
            tracing::error!(world = self.id, from, to, max, "simulation range exceeded");
            return Err(WorldError::SimulationRangeExceeded { from, to, max });
        }

        let _span = tracing::trace_span!("simulate", world = self.id, from, to).entered();
        report(&mut self.checkpoint, "simulate", WorldStep::SIMULATE);
        let result = self.run_ticks(from, to);
        self.ctx.step = WorldStep::NONE;
        self.ctx.buffering = false;
        report(&mut self.checkpoint, "simulate", WorldStep::SIMULATE);
        result?;

        self.ctx.state.tick = to;
        self.cpf = to - from;
        Ok(())
    }

    fn run_ticks(&mut self, from: Tick, to: Tick) -> WorldResult<()> {
        let dt = self.ctx.tick_time;
        for tick in from..to {
            self.ctx.state.tick = tick;
            self.advance_modules(tick, dt)?;
            self.advance_plugins(tick)?;
            self.advance_pre(tick, dt)?;
            self.advance_main(tick, dt)?;
            self.advance_post(tick, dt)?;

            self.ctx.sweep_lifetimes(ComponentLifetime::NotifyAllSystemsBelow);
            self.ctx.logic_events.flush();
            self.ctx.state.storage.apply_dead();
        }

        let step = WorldStep::PLUGINS_LOGIC_SIMULATE;
        self.ctx.step = step;
        let checkpoint = &mut self.checkpoint;
        self.ctx.run_plugins(|plugin, ctx| {
            report(checkpoint, plugin.name(), step);
            plugin.on_simulate(ctx, from, to)?;
            report(checkpoint, plugin.name(), step);
            Ok(())
        })?;
        self.ctx.sweep_lifetimes(ComponentLifetime::NotifyAllModulesBelow);
        Ok(())
    }

    fn advance_modules(&mut self, tick: Tick, dt: f32) -> WorldResult<()> {
        let step = WorldStep::MODULES_LOGIC_TICK;
        self.ctx.step = step;
        for entry in &mut self.modules {
            if !entry.capabilities.advance_tick || !entry.state.allows(step) || !runs_on(entry.capabilities.step, tick) {
                continue;
            }
            report(&mut self.checkpoint, entry.name, step);
            entry.module.advance_tick(&mut self.ctx, dt)?;
            report(&mut self.checkpoint, entry.name, step);
        }
        Ok(())
    }

    fn advance_plugins(&mut self, tick: Tick) -> WorldResult<()> {
        let step = WorldStep::PLUGINS_LOGIC_TICK;
        self.ctx.step = step;
        let checkpoint = &mut self.checkpoint;
        self.ctx.run_plugins(|plugin, ctx| {
            report(checkpoint, plugin.name(), step);
            plugin.on_tick(ctx, tick)?;
            report(checkpoint, plugin.name(), step);
            Ok(())
        })
    }

    fn advance_pre(&mut self, tick: Tick, dt: f32) -> WorldResult<()> {
        let step = WorldStep::SYSTEMS_LOGIC_TICK;
        self.ctx.step = step;
        for group in &mut self.groups {
            for &index in &group.pre {
                let entry = &mut group.systems[index];
                if !should_tick(entry, tick) {
                    continue;
                }
                report(&mut self.checkpoint, entry.name, step);
                entry.system.advance_tick_pre(&mut self.ctx, dt)?;
                report(&mut self.checkpoint, entry.name, step);
            }
        }
        Ok(())
    }

    fn advance_main(&mut self, tick: Tick, dt: f32) -> WorldResult<()> {
        let step = WorldStep::SYSTEMS_LOGIC_TICK;
        self.ctx.step = step;
        let batch = self.settings.jobs_batch_count.max(1);
        let jobs = self.settings.use_jobs_for_systems;

        for group in &mut self.groups {
            let parallel_group = group.is_parallel();
            for &index in &group.main {
                let entry = &mut group.systems[index];
                if !should_tick(entry, tick) {
                    continue;
                }
                report(&mut self.checkpoint, entry.name, step);
                match entry.capabilities.main {
                    Some(MainTick::Plain) => entry.system.advance_tick(&mut self.ctx, dt)?,
                    Some(MainTick::Filtered { parallel }) => {
                        let grid = (parallel && parallel_group && jobs).then_some(Grid {
                            pool: self.thread_pool.as_deref(),
                            batch,
                        });
                        run_filtered(entry, &mut self.ctx, &self.entities, parallel, grid, dt)?;
                    }
                    None => {}
                }
                report(&mut self.checkpoint, entry.name, step);
            }
        }
        Ok(())
    }

    fn advance_post(&mut self, tick: Tick, dt: f32) -> WorldResult<()> {
        let step = WorldStep::SYSTEMS_LOGIC_TICK;
        self.ctx.step = step;
        for group in &mut self.groups {
            for &index in &group.post {
                let entry = &mut group.systems[index];
                if !should_tick(entry, tick) {
                    continue;
                }
                report(&mut self.checkpoint, entry.name, step);
                entry.system.advance_tick_post(&mut self.ctx, dt)?;
                report(&mut self.checkpoint, entry.name, step);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Builds a capsule from the oldest retained state, the events since
    /// its tick and the current tick. Without retained states the current
    /// state is used.
    ///
    /// # Errors
    ///
    /// Encoding errors.
    pub fn serialize(&self, history: &dyn StatesHistory, serializer: &dyn WorldSerializer) -> WorldResult<Vec<u8>> {
        let (state_tick, state) = match history.oldest_state() {
            Some((tick, bytes)) => (tick, bytes.to_vec()),
            None => (self.ctx.state.tick, self.ctx.state.encode()?),
        };
        let capsule = WorldStateCapsule {
            state,
            events: history.events_since(state_tick),
            tick: self.ctx.state.tick,
        };
        serializer.serialize(&capsule)
    }

    /// Restores a capsule and re-simulates up to its tick.
    ///
    /// Plugin construction and filter membership are replayed for every
    /// restored entity before the simulation resumes.
    ///
    /// # Errors
    ///
    /// Decoding, restore hook or simulation errors.
    pub fn deserialize(
        &mut self,
        bytes: &[u8],
        events_while_connecting: &[HistoryEvent],
        history: &mut dyn StatesHistory,
        serializer: &dyn WorldSerializer,
    ) -> WorldResult<()> {
        let capsule = serializer.deserialize(bytes)?;

        self.ctx.begin_restore()?;
        self.ctx.drop_pending();
        self.ctx.state.restore(&capsule.state)?;
        self.ctx.replay_plugin_entities()?;
        self.ctx.replay_filters();
        self.ctx.end_restore()?;

        let from = self.ctx.state.tick;
        let to = capsule.tick;
        if from > to {
            return Err(WorldError::InvalidTickRange { from, to });
        }
        history.store_state(from, capsule.state);
        history.add_events(&capsule.events);
        history.add_events(events_while_connecting);

        tracing::info!(world = self.id, from, to, "world restored from capsule");
        self.range = None;
        self.simulate(from, to)
    }

    // =========================================================================
    // Pool lifecycle
    // =========================================================================

    /// Prepares a recycled world for a new session.
    pub(crate) fn on_spawn(&mut self, id: u32, settings: WorldSettings) -> WorldResult<()> {
        settings.validate()?;
        if settings.worker_threads != self.settings.worker_threads {
            self.thread_pool = build_thread_pool(&settings)?;
        }
        self.id = id;
        self.ctx.strict = settings.strict_entity_checks;
        self.ctx.tick_time = settings.tick_time;
        self.ctx.state.initialize(settings.entities_capacity);
        self.settings = settings;
        Ok(())
    }

    /// Tears down everything the session installed.
    ///
    /// Features, modules and systems are deconstructed, every entity is
    /// removed and pooled arrays go back to the arena.
    pub(crate) fn on_recycle(&mut self) -> WorldResult<()> {
        while let Some(mut entry) = self.features.pop() {
            entry.feature.on_deconstruct(self)?;
        }
        while let Some(mut entry) = self.modules.pop() {
            entry.module.on_deconstruct(&mut self.ctx)?;
            self.recycle_module(entry.type_id, entry.module);
        }
        for mut group in std::mem::take(&mut self.groups) {
            for entry in &mut group.systems {
                entry.system.on_deconstruct(&mut self.ctx)?;
            }
        }

        self.ctx.clear(&self.arena)?;
        self.reset_state = None;
        self.checkpoint = None;
        self.load = None;
        self.time_since_start = 0.0;
        self.range = None;
        self.cpf = 0;
        tracing::debug!(world = self.id, "world recycled");
        Ok(())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("tick", &self.ctx.state.tick)
            .field("entities", &self.ctx.entities_count())
            .field("modules", &self.modules.len())
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}

fn build_thread_pool(settings: &WorldSettings) -> WorldResult<Option<Arc<rayon::ThreadPool>>> {
    if settings.worker_threads == 0 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(settings.worker_threads)
        .thread_name(|index| format!("chronos-worker-{index}"))
        .build()
        .map(|pool| Some(Arc::new(pool)))
        .map_err(|err| WorldError::WorkerPool(err.to_string()))
}

#[inline]
fn should_tick(entry: &SystemEntry, tick: Tick) -> bool {
    entry.state.allows(WorldStep::LOGIC_TICK) && runs_on(entry.capabilities.step, tick)
}

/// Runs a filter-bound system over a snapshot of its filter's members.
///
/// A `parallel` system always goes through its parallel hook: on the worker
/// grid when one is given, otherwise sequentially in ascending id order.
/// Membership changes made by the system are buffered and flushed after
/// it returns, together with deferred deallocations.
fn run_filtered(
    entry: &mut SystemEntry,
    ctx: &mut WorldContext,
    entities: &ArrayPool<Entity>,
    parallel: bool,
    grid: Option<Grid<'_>>,
    dt: f32,
) -> WorldResult<()> {
    let Some(filter) = entry.filter.and_then(|id| ctx.state.filters.get(id)) else {
        return Ok(());
    };
    if filter.is_empty() {
        return Ok(());
    }

    let mut snapshot = entities.spawn(filter.count())?;
    let mut filled = 0;
    for (slot, entity) in snapshot.iter_mut().zip(filter.entities(&ctx.state.storage)) {
        *slot = entity;
        filled += 1;
    }
    snapshot.truncate(filled);

    ctx.begin_buffering();
    let result = match grid {
        Some(grid) => run_parallel(&*entry.system, ctx, &snapshot, grid, dt),
        None if parallel => snapshot.iter().try_for_each(|&entity| {
            if ctx.is_alive(entity) {
                entry.system.advance_tick_parallel(ctx, entity, dt)
            } else {
                Ok(())
            }
        }),
        None => snapshot.iter().try_for_each(|&entity| {
            if ctx.is_alive(entity) {
                entry.system.advance_tick_entity(ctx, entity, dt)
            } else {
                Ok(())
            }
        }),
    };
    ctx.end_buffering();

    entities.recycle(snapshot)?;
    result
}

fn run_parallel(system: &dyn System, ctx: &WorldContext, members: &[Entity], grid: Grid<'_>, dt: f32) -> WorldResult<()> {
    let run = || {
        members.par_chunks(grid.batch).try_for_each(|chunk| {
            chunk
                .iter()
                .try_for_each(|&entity| system.advance_tick_parallel(ctx, entity, dt))
        })
    };
    match grid.pool {
        Some(pool) => pool.install(run),
        None => run(),
    }
}
