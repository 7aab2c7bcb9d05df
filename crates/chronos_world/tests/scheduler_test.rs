//! Integration tests for the tick loop: phase order, guards, determinism.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chronos_core::{ArrayArena, Component, Entity, FilterBuilder};
use chronos_world::{
    CheckpointCollector, MainTick, Module, ModuleCapabilities, ModuleState, System,
    SystemCapabilities, SystemGroup, World, WorldContext, WorldError, WorldPlugin, WorldResult,
    WorldSettings, WorldStep,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Position(i32);
impl Component for Position {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Velocity(i32);
impl Component for Velocity {}

fn world_with(settings: WorldSettings) -> World {
    World::new(1, Arc::new(ArrayArena::new()), settings).unwrap()
}

fn world() -> World {
    world_with(WorldSettings::default())
}

/// Spawns one moving entity per tick with a random velocity.
#[derive(Default)]
struct Spawner {
    ticks: Arc<AtomicUsize>,
}

impl Module for Spawner {
    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::NONE.with_advance_tick()
    }

    fn advance_tick(&mut self, ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let speed = ctx.random().range_i32(1, 10);
        let entity = ctx.add_entity()?;
        ctx.set(entity, Position(0))?;
        ctx.set(entity, Velocity(speed))
    }
}

/// Moves every entity with a velocity.
#[derive(Default)]
struct Mover {
    visits: Arc<AtomicUsize>,
}

impl System for Mover {
    fn capabilities(&self) -> SystemCapabilities {
        SystemCapabilities {
            main: Some(MainTick::Filtered { parallel: false }),
            ..SystemCapabilities::default()
        }
    }

    fn filter(&self) -> Option<FilterBuilder> {
        Some(FilterBuilder::new("moving").with::<Position>().with::<Velocity>())
    }

    fn advance_tick_entity(&mut self, ctx: &mut WorldContext, entity: Entity, _dt: f32) -> WorldResult<()> {
        self.visits.fetch_add(1, Ordering::Relaxed);
        let speed = ctx.get::<Velocity>(entity).map_or(0, |v| v.0);
        if let Some(position) = ctx.get_mut::<Position>(entity) {
            position.0 += speed;
        }
        Ok(())
    }
}

/// Removes entities that moved past a bound.
struct Despawner;

impl System for Despawner {
    fn capabilities(&self) -> SystemCapabilities {
        SystemCapabilities {
            main: Some(MainTick::Filtered { parallel: false }),
            ..SystemCapabilities::default()
        }
    }

    fn filter(&self) -> Option<FilterBuilder> {
        Some(FilterBuilder::new("positioned").with::<Position>())
    }

    fn advance_tick_entity(&mut self, ctx: &mut WorldContext, entity: Entity, _dt: f32) -> WorldResult<()> {
        if ctx.get::<Position>(entity).is_some_and(|p| p.0 > 40) {
            ctx.remove_entity(entity)?;
        }
        Ok(())
    }
}

#[test]
fn test_module_changes_visible_to_systems_same_tick() {
    let mut world = world();
    let visits = Arc::new(AtomicUsize::new(0));
    world.add_module::<Spawner>().unwrap();
    world
        .add_system_group(SystemGroup::new("movement").with(Mover {
            visits: Arc::clone(&visits),
        }))
        .unwrap();

    world.simulate(0, 1).unwrap();

    assert_eq!(visits.load(Ordering::Relaxed), 1);
    assert_eq!(world.entities_count(), 1);
    assert_eq!(world.state_tick(), 1);
    assert_eq!(world.cpf(), 1);
}

#[test]
fn test_range_guard_fails_before_any_tick() {
    let mut world = world_with(WorldSettings {
        max_ticks_simulation_count: 10,
        ..WorldSettings::default()
    });
    world.add_module::<Spawner>().unwrap();
    let ticks = Arc::clone(&world.get_module::<Spawner>().unwrap().ticks);

    let result = world.simulate(0, 11);
    assert!(matches!(
        result,
        Err(WorldError::SimulationRangeExceeded { from: 0, to: 11, max: 10 })
    ));
    assert_eq!(ticks.load(Ordering::Relaxed), 0);
    assert_eq!(world.state_tick(), 0);
    assert_eq!(world.entities_count(), 0);

    world.simulate(0, 10).unwrap();
    assert_eq!(ticks.load(Ordering::Relaxed), 10);
}

#[test]
fn test_empty_and_negative_ranges() {
    let mut world = world();
    world.add_module::<Spawner>().unwrap();

    world.simulate(5, 5).unwrap();
    world.simulate(7, 3).unwrap();
    assert_eq!(world.entities_count(), 0);

    world.simulate(-3, 2).unwrap();
    assert_eq!(world.entities_count(), 2);
    assert_eq!(world.cpf(), 2);
}

fn run_session(seed: u64) -> u64 {
    let mut world = world();
    world.set_seed(seed);
    world.add_module::<Spawner>().unwrap();
    world
        .add_system_group(SystemGroup::new("movement").with(Mover::default()).with(Despawner))
        .unwrap();
    world.simulate(0, 100).unwrap();
    world.state_hash().unwrap()
}

#[test]
fn test_simulation_is_deterministic() {
    assert_eq!(run_session(7), run_session(7));
    assert_ne!(run_session(7), run_session(8));
}

#[test]
fn test_removed_entities_leave_filters_after_system() {
    let mut world = world();
    world.add_module::<Spawner>().unwrap();
    world
        .add_system_group(SystemGroup::new("movement").with(Mover::default()).with(Despawner))
        .unwrap();
    world.simulate(0, 60).unwrap();

    let positioned = world
        .register_filter(&FilterBuilder::new("positioned").with::<Position>())
        .unwrap();
    let filter = world.filter(positioned).unwrap();
    assert_eq!(filter.count(), world.entities_count());
    for entity in world.context().filter_entities(positioned) {
        assert!(world.context().get::<Position>(entity).unwrap().0 <= 40);
    }
}

#[derive(Default)]
struct EveryOther {
    ticks: Vec<i64>,
}

impl Module for EveryOther {
    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::NONE
            .with_advance_tick()
            .every(NonZeroU32::new(2).unwrap())
    }

    fn advance_tick(&mut self, ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.ticks.push(ctx.tick());
        Ok(())
    }
}

#[test]
fn test_module_step_interval() {
    let mut world = world();
    world.add_module::<EveryOther>().unwrap();
    world.simulate(0, 7).unwrap();
    assert_eq!(world.get_module::<EveryOther>().unwrap().ticks, vec![0, 2, 4, 6]);
}

#[test]
fn test_inactive_module_is_skipped() {
    let mut world = world();
    world.add_module::<EveryOther>().unwrap();
    assert!(world.set_module_state::<EveryOther>(ModuleState::LOGIC_INACTIVE));
    world.simulate(0, 4).unwrap();
    assert!(world.get_module::<EveryOther>().unwrap().ticks.is_empty());
    assert_eq!(world.module_state::<Spawner>(), ModuleState::ALL_ACTIVE);
}

#[derive(Default)]
struct Picky;

impl Module for Picky {
    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::NONE
    }

    fn could_be_added(&self, _ctx: &WorldContext) -> bool {
        false
    }
}

#[test]
fn test_module_registry() {
    let mut world = world();
    assert!(!world.add_module::<Picky>().unwrap());
    assert!(!world.has_module::<Picky>());

    assert!(world.add_module::<EveryOther>().unwrap());
    assert!(world.add_module::<EveryOther>().unwrap());
    assert_eq!(world.modules_count(), 2);
    assert_eq!(world.remove_modules::<EveryOther>().unwrap(), 2);
    assert!(world.get_module::<EveryOther>().is_none());
}

/// Records which phase ran, in order.
struct Journal {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Module for Journal {
    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::NONE.with_advance_tick().with_update()
    }

    fn update(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.log.lock().push("module_visual");
        Ok(())
    }

    fn advance_tick(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.log.lock().push("module");
        Ok(())
    }
}

impl WorldPlugin for Journal {
    fn on_tick(&mut self, _ctx: &mut WorldContext, _tick: i64) -> WorldResult<()> {
        self.log.lock().push("plugin");
        Ok(())
    }

    fn on_simulate(&mut self, _ctx: &mut WorldContext, _from: i64, _to: i64) -> WorldResult<()> {
        self.log.lock().push("plugin_range");
        Ok(())
    }
}

impl System for Journal {
    fn capabilities(&self) -> SystemCapabilities {
        SystemCapabilities {
            visual: true,
            pre: true,
            main: Some(MainTick::Plain),
            post: true,
            ..SystemCapabilities::default()
        }
    }

    fn update(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.log.lock().push("system_visual");
        Ok(())
    }

    fn advance_tick_pre(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.log.lock().push("pre");
        Ok(())
    }

    fn advance_tick(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.log.lock().push("main");
        Ok(())
    }

    fn advance_tick_post(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        self.log.lock().push("post");
        Ok(())
    }
}

#[test]
fn test_frame_phase_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let journal = || Journal { log: Arc::clone(&log) };

    let mut world = world_with(WorldSettings {
        tick_time: 0.5,
        ..WorldSettings::default()
    });
    world.add_module_with(journal()).unwrap();
    world.add_plugin(journal());
    world.add_system_group(SystemGroup::new("journal").with(journal())).unwrap();

    world.pre_update(0.5).unwrap();
    world.update(0.5).unwrap();
    world.late_update(0.5).unwrap();

    assert_eq!(
        *log.lock(),
        vec!["module_visual", "module", "plugin", "pre", "main", "post", "plugin_range", "system_visual"]
    );
    assert_eq!(world.state_tick(), 1);
}

#[test]
fn test_negative_dt_is_noop() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut world = world();
    world.add_module_with(Journal { log: Arc::clone(&log) }).unwrap();

    world.pre_update(-1.0).unwrap();
    world.update(-1.0).unwrap();
    world.late_update(-1.0).unwrap();
    assert!(log.lock().is_empty());
    assert!(world.time_since_start().abs() < f64::EPSILON);
}

#[test]
fn test_external_range_overrides_accumulated_time() {
    let mut world = world();
    world.add_module::<EveryOther>().unwrap();

    assert!(matches!(
        world.set_from_to_ticks(5, 2),
        Err(WorldError::InvalidTickRange { from: 5, to: 2 })
    ));
    world.set_from_to_ticks(0, 3).unwrap();
    world.update(0.0).unwrap();
    assert_eq!(world.state_tick(), 3);
    assert_eq!(world.get_module::<EveryOther>().unwrap().ticks, vec![0, 2]);
}

#[derive(Default)]
struct StepLog {
    entries: Arc<Mutex<Vec<(String, WorldStep)>>>,
}

impl CheckpointCollector for StepLog {
    fn reset(&mut self) {
        self.entries.lock().clear();
    }

    fn checkpoint(&mut self, subject: &str, step: WorldStep) {
        self.entries.lock().push((subject.to_string(), step));
    }
}

#[test]
fn test_checkpoints_bracket_units() {
    let collector = StepLog::default();
    let entries = Arc::clone(&collector.entries);

    let mut world = world();
    world.add_module::<EveryOther>().unwrap();
    world.set_checkpoint_collector(Box::new(collector));
    world.simulate(0, 1).unwrap();

    let entries = entries.lock();
    assert_eq!(entries.first().unwrap().1, WorldStep::SIMULATE);
    assert_eq!(entries.last().unwrap().1, WorldStep::SIMULATE);
    let module_checkpoints = entries
        .iter()
        .filter(|(_, step)| *step == WorldStep::MODULES_LOGIC_TICK)
        .count();
    assert_eq!(module_checkpoints, 2);
}

/// Fails on a fixed tick.
#[derive(Default)]
struct Faulty;

impl Module for Faulty {
    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::NONE.with_advance_tick()
    }

    fn advance_tick(&mut self, ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        if ctx.tick() == 3 {
            return Err(WorldError::Hook {
                subject: "Faulty",
                reason: "tick 3".to_string(),
            });
        }
        Ok(())
    }
}

#[test]
fn test_unit_failure_aborts_simulate() {
    let mut world = world();
    world.add_module::<Faulty>().unwrap();

    assert!(matches!(world.simulate(0, 10), Err(WorldError::Hook { .. })));
    assert_eq!(world.context().step(), WorldStep::NONE);
    assert_ne!(world.state_tick(), 10);
}
