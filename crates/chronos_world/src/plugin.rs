//! # Plugins
//!
//! Extension objects called by the scheduler at a fixed set of points.
//! Plugins run in registration order.
//!
//! Entity and restore hooks see the raw [`State`]; components attached in
//! `on_create_entity` are picked up by the filter membership computed right
//! after. Tick hooks get the [`WorldContext`], so their component writes
//! update filters like any system's. While a tick hook runs the plugin list
//! is detached: entities it adds skip `on_create_entity`.

use chronos_core::{Entity, State, Tick};

use crate::context::WorldContext;
use crate::error::WorldResult;

/// Scheduler extension point. Every hook defaults to a no-op.
pub trait WorldPlugin: Send + Sync {
    /// Name used in checkpoints and logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// After an entity slot is allocated, before filter membership.
    fn on_create_entity(&mut self, _state: &mut State, _entity: Entity) -> WorldResult<()> {
        Ok(())
    }

    /// After an entity left its filters, before its components are removed.
    fn on_destroy_entity(&mut self, _state: &mut State, _entity: Entity) -> WorldResult<()> {
        Ok(())
    }

    /// Once per tick, after modules and before systems.
    fn on_tick(&mut self, _ctx: &mut WorldContext, _tick: Tick) -> WorldResult<()> {
        Ok(())
    }

    /// Once per `simulate` call, after the whole `[from, to)` range.
    fn on_simulate(&mut self, _ctx: &mut WorldContext, _from: Tick, _to: Tick) -> WorldResult<()> {
        Ok(())
    }

    /// Before a state is restored from a snapshot or reset state.
    fn on_begin_restore(&mut self, _state: &mut State) -> WorldResult<()> {
        Ok(())
    }

    /// After a restored state has its filters rebuilt.
    fn on_end_restore(&mut self, _state: &mut State) -> WorldResult<()> {
        Ok(())
    }

    /// When the entity capacity changes.
    fn on_set_capacity(&mut self, _capacity: usize) -> WorldResult<()> {
        Ok(())
    }
}
