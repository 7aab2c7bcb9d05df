//! # Systems
//!
//! Units of per-tick logic, grouped into [`SystemGroup`]s. Each system
//! declares its hooks once through [`SystemCapabilities`]; the group sorts
//! it into the matching categories when it is added.
//!
//! ## Main Tick
//!
//! A main-phase system is either plain (called once per tick) or bound to a
//! filter (called once per matching entity, ascending id). A filter-bound
//! system declared `parallel` is always driven through
//! [`System::advance_tick_parallel`]: on the worker grid when its group is
//! parallel and jobs are enabled, sequentially otherwise. Results must not
//! depend on how the entities are partitioned; that is the system's
//! obligation, the scheduler does not check it.

use std::any::TypeId;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chronos_core::{Entity, FilterBuilder, FilterId};
use parking_lot::Mutex;

use crate::context::WorldContext;
use crate::error::WorldResult;
use crate::module::AsAny;
use crate::step::ModuleState;

/// How a system takes part in the main logic phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainTick {
    /// [`System::advance_tick`] once per tick.
    Plain,
    /// Per member of [`System::filter`].
    Filtered {
        /// Use [`System::advance_tick_parallel`] instead of
        /// [`System::advance_tick_entity`].
        parallel: bool,
    },
}

/// Which system hooks the scheduler calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemCapabilities {
    /// Takes part in [`crate::World::load`].
    pub loadable: bool,
    /// Per-frame visual hook in late update.
    pub visual: bool,
    /// Logic hook before the main phase.
    pub pre: bool,
    /// Main-phase behavior.
    pub main: Option<MainTick>,
    /// Logic hook after the main phase.
    pub post: bool,
    /// Only run logic hooks on ticks divisible by this interval.
    pub step: Option<NonZeroU32>,
}

/// A unit of per-tick logic.
pub trait System: AsAny + Send + Sync {
    /// Hooks this system wants called. Read once when the system is added.
    fn capabilities(&self) -> SystemCapabilities;

    /// Filter a `MainTick::Filtered` system iterates.
    fn filter(&self) -> Option<FilterBuilder> {
        None
    }

    /// Called when the system's group is added to a world.
    fn on_construct(&mut self, _ctx: &mut WorldContext) -> WorldResult<()> {
        Ok(())
    }

    /// Called when the group is replaced or the world is recycled.
    fn on_deconstruct(&mut self, _ctx: &mut WorldContext) -> WorldResult<()> {
        Ok(())
    }

    /// Starts loading. Call `done.complete()` when ready, now or later.
    fn load(&mut self, _ctx: &mut WorldContext, done: LoadCompletion) -> WorldResult<()> {
        done.complete();
        Ok(())
    }

    /// Per-frame visual hook.
    fn update(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        Ok(())
    }

    /// Logic hook before the main phase.
    fn advance_tick_pre(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        Ok(())
    }

    /// Plain main-phase hook.
    fn advance_tick(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        Ok(())
    }

    /// Filter-bound main-phase hook, once per member.
    fn advance_tick_entity(&mut self, _ctx: &mut WorldContext, _entity: Entity, _dt: f32) -> WorldResult<()> {
        Ok(())
    }

    /// Filter-bound main-phase hook of a `parallel` system. Runs on the
    /// worker grid or sequentially, depending on the world's settings.
    ///
    /// Receives a shared context; writes go through the system's own
    /// synchronized state.
    fn advance_tick_parallel(&self, _ctx: &WorldContext, _entity: Entity, _dt: f32) -> WorldResult<()> {
        Ok(())
    }

    /// Logic hook after the main phase.
    fn advance_tick_post(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        Ok(())
    }
}

pub(crate) struct SystemEntry {
    pub(crate) system: Box<dyn System>,
    pub(crate) capabilities: SystemCapabilities,
    pub(crate) filter: Option<FilterId>,
    pub(crate) state: ModuleState,
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl SystemEntry {
    fn downcast_ref<S: System>(&self) -> Option<&S> {
        (*self.system).as_any().downcast_ref::<S>()
    }

    fn downcast_mut<S: System>(&mut self) -> Option<&mut S> {
        (*self.system).as_any_mut().downcast_mut::<S>()
    }
}

/// Ordered set of systems sorted into categories.
///
/// # Example
///
/// ```rust,ignore
/// let group = SystemGroup::new("movement")
///     .with_parallel(true)
///     .with(ApplyVelocity)
///     .with(ClampToBounds);
/// let index = world.add_system_group(group)?;
/// ```
pub struct SystemGroup {
    name: &'static str,
    parallel: bool,
    pub(crate) systems: Vec<SystemEntry>,
    pub(crate) loadable: Vec<usize>,
    pub(crate) visual: Vec<usize>,
    pub(crate) pre: Vec<usize>,
    pub(crate) main: Vec<usize>,
    pub(crate) post: Vec<usize>,
}

impl SystemGroup {
    /// Creates an empty sequential group.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parallel: false,
            systems: Vec::new(),
            loadable: Vec::new(),
            visual: Vec::new(),
            pre: Vec::new(),
            main: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Opts the group's filter-bound systems into the worker grid.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Appends a system, builder style.
    #[must_use]
    pub fn with<S: System>(mut self, system: S) -> Self {
        self.push(system);
        self
    }

    /// Appends a system.
    pub fn push<S: System>(&mut self, system: S) {
        let capabilities = system.capabilities();
        let index = self.systems.len();

        if capabilities.loadable {
            self.loadable.push(index);
        }
        if capabilities.visual {
            self.visual.push(index);
        }
        if capabilities.pre {
            self.pre.push(index);
        }
        if capabilities.main.is_some() {
            self.main.push(index);
        }
        if capabilities.post {
            self.post.push(index);
        }

        self.systems.push(SystemEntry {
            system: Box::new(system),
            capabilities,
            filter: None,
            state: ModuleState::ALL_ACTIVE,
            type_id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
        });
    }

    /// Group name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if filter-bound systems may use the worker grid.
    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if the group has no systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Number of systems taking part in load.
    #[must_use]
    pub fn loadable_count(&self) -> usize {
        self.loadable.len()
    }

    /// First system of type `S`.
    #[must_use]
    pub fn get_system<S: System>(&self) -> Option<&S> {
        self.systems.iter().find_map(SystemEntry::downcast_ref::<S>)
    }

    /// First system of type `S`, mutably.
    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems.iter_mut().find_map(SystemEntry::downcast_mut::<S>)
    }

    /// Returns `true` if the group holds a system of type `S`.
    #[must_use]
    pub fn has_system<S: System>(&self) -> bool {
        self.position::<S>().is_some()
    }

    /// Sets the activity flags of every system of type `S`.
    ///
    /// # Returns
    ///
    /// `true` if at least one system matched.
    pub fn set_system_state<S: System>(&mut self, state: ModuleState) -> bool {
        let mut found = false;
        for entry in &mut self.systems {
            if entry.type_id == TypeId::of::<S>() {
                entry.state = state;
                found = true;
            }
        }
        found
    }

    /// Activity flags of the first system of type `S`. `ALL_ACTIVE` if absent.
    #[must_use]
    pub fn system_state<S: System>(&self) -> ModuleState {
        self.position::<S>()
            .map_or(ModuleState::ALL_ACTIVE, |index| self.systems[index].state)
    }

    fn position<S: System>(&self) -> Option<usize> {
        self.systems
            .iter()
            .position(|entry| entry.type_id == TypeId::of::<S>())
    }
}

struct LoadTracker {
    remaining: AtomicUsize,
    loaded: AtomicBool,
    on_complete: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Handle a loadable system consumes to report readiness.
///
/// Dropping it without calling [`complete`](Self::complete) leaves the world
/// loading forever.
pub struct LoadCompletion {
    tracker: Arc<LoadTracker>,
}

impl LoadCompletion {
    /// Reports this system as loaded. The last report runs the world's
    /// completion callback.
    pub fn complete(self) {
        if self.tracker.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.finish();
        }
    }
}

impl LoadTracker {
    fn finish(&self) {
        self.loaded.store(true, Ordering::Release);
        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Progress of a [`crate::World::load`] call.
#[derive(Clone)]
pub(crate) struct LoadProgress {
    tracker: Arc<LoadTracker>,
}

impl LoadProgress {
    pub(crate) fn new(count: usize, on_complete: Box<dyn FnOnce() + Send>) -> Self {
        let progress = Self {
            tracker: Arc::new(LoadTracker {
                remaining: AtomicUsize::new(count),
                loaded: AtomicBool::new(false),
                on_complete: Mutex::new(Some(on_complete)),
            }),
        };
        if count == 0 {
            progress.tracker.finish();
        }
        progress
    }

    pub(crate) fn completion(&self) -> LoadCompletion {
        LoadCompletion {
            tracker: Arc::clone(&self.tracker),
        }
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.tracker.loaded.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mover;
    impl System for Mover {
        fn capabilities(&self) -> SystemCapabilities {
            SystemCapabilities {
                pre: true,
                main: Some(MainTick::Plain),
                ..SystemCapabilities::default()
            }
        }
    }

    struct Loader;
    impl System for Loader {
        fn capabilities(&self) -> SystemCapabilities {
            SystemCapabilities {
                loadable: true,
                visual: true,
                ..SystemCapabilities::default()
            }
        }
    }

    #[test]
    fn test_categories() {
        let group = SystemGroup::new("g").with(Mover).with(Loader);
        assert_eq!(group.len(), 2);
        assert_eq!(group.pre, vec![0]);
        assert_eq!(group.main, vec![0]);
        assert_eq!(group.visual, vec![1]);
        assert_eq!(group.loadable_count(), 1);
        assert!(group.post.is_empty());
        assert!(group.has_system::<Loader>());
        assert!(group.get_system::<Mover>().is_some());
    }

    #[test]
    fn test_system_state() {
        let mut group = SystemGroup::new("g").with(Mover);
        assert!(group.set_system_state::<Mover>(ModuleState::LOGIC_INACTIVE));
        assert_eq!(group.system_state::<Mover>(), ModuleState::LOGIC_INACTIVE);
        assert!(!group.set_system_state::<Loader>(ModuleState::INACTIVE));
        assert_eq!(group.system_state::<Loader>(), ModuleState::ALL_ACTIVE);
    }

    #[test]
    fn test_load_progress() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let progress = LoadProgress::new(2, Box::new(move || flag.store(true, Ordering::SeqCst)));

        progress.completion().complete();
        assert!(!progress.is_loaded());
        progress.completion().complete();
        assert!(progress.is_loaded());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_load_progress_empty() {
        let progress = LoadProgress::new(0, Box::new(|| {}));
        assert!(progress.is_loaded());
    }
}
