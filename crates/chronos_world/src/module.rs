//! # Modules
//!
//! Long-lived per-world services. A module declares what it does once,
//! through [`ModuleCapabilities`], and the scheduler only calls the hooks it
//! declared.

use std::any::{Any, TypeId};
use std::num::NonZeroU32;

use chronos_core::Tick;

use crate::context::WorldContext;
use crate::error::WorldResult;
use crate::step::ModuleState;

/// Downcasting support for scheduler units.
pub trait AsAny: Any {
    /// Upcasts to `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Upcasts to `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Which module hooks the scheduler calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModuleCapabilities {
    /// Call [`Module::update`] in the visual-pre pass.
    pub visual_update: bool,
    /// Call [`Module::advance_tick`] every logic tick.
    pub advance_tick: bool,
    /// Only advance on ticks divisible by this interval.
    pub step: Option<NonZeroU32>,
}

impl ModuleCapabilities {
    /// No scheduled hooks; construct/deconstruct only.
    pub const NONE: Self = Self {
        visual_update: false,
        advance_tick: false,
        step: None,
    };

    /// Enables the visual-pre hook.
    #[must_use]
    pub const fn with_update(mut self) -> Self {
        self.visual_update = true;
        self
    }

    /// Enables the logic-tick hook.
    #[must_use]
    pub const fn with_advance_tick(mut self) -> Self {
        self.advance_tick = true;
        self
    }

    /// Restricts the logic-tick hook to every `step`-th tick.
    #[must_use]
    pub const fn every(mut self, step: NonZeroU32) -> Self {
        self.step = Some(step);
        self
    }
}

/// A per-world service.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Spawner;
///
/// impl Module for Spawner {
///     fn capabilities(&self) -> ModuleCapabilities {
///         ModuleCapabilities::NONE.with_advance_tick()
///     }
///
///     fn advance_tick(&mut self, ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
///         let entity = ctx.add_entity()?;
///         ctx.set(entity, Health(100))
///     }
/// }
/// ```
pub trait Module: AsAny + Send {
    /// Hooks this module wants called. Read once at registration.
    fn capabilities(&self) -> ModuleCapabilities;

    /// Acceptance check run before the module is added.
    fn could_be_added(&self, _ctx: &WorldContext) -> bool {
        true
    }

    /// Called once the module is accepted.
    fn on_construct(&mut self, _ctx: &mut WorldContext) -> WorldResult<()> {
        Ok(())
    }

    /// Called when the module is removed or the world is recycled.
    fn on_deconstruct(&mut self, _ctx: &mut WorldContext) -> WorldResult<()> {
        Ok(())
    }

    /// Per-frame visual hook.
    fn update(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        Ok(())
    }

    /// Per-tick logic hook. Runs before plugins and systems.
    fn advance_tick(&mut self, _ctx: &mut WorldContext, _dt: f32) -> WorldResult<()> {
        Ok(())
    }
}

pub(crate) struct ModuleEntry {
    pub(crate) module: Box<dyn Module>,
    pub(crate) capabilities: ModuleCapabilities,
    pub(crate) state: ModuleState,
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl ModuleEntry {
    pub(crate) fn new<M: Module>(module: Box<dyn Module>) -> Self {
        let capabilities = module.capabilities();
        Self {
            module,
            capabilities,
            state: ModuleState::ALL_ACTIVE,
            type_id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    pub(crate) fn downcast_ref<M: Module>(&self) -> Option<&M> {
        (*self.module).as_any().downcast_ref::<M>()
    }

    pub(crate) fn downcast_mut<M: Module>(&mut self) -> Option<&mut M> {
        (*self.module).as_any_mut().downcast_mut::<M>()
    }
}

/// Returns `true` if a unit with interval `step` runs on `tick`.
#[inline]
pub(crate) fn runs_on(step: Option<NonZeroU32>, tick: Tick) -> bool {
    step.map_or(true, |step| tick % i64::from(step.get()) == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_on_interval() {
        let every_third = NonZeroU32::new(3);
        assert!(runs_on(None, 7));
        assert!(runs_on(every_third, 0));
        assert!(!runs_on(every_third, 1));
        assert!(runs_on(every_third, 6));
    }

    #[test]
    fn test_capabilities_builder() {
        let caps = ModuleCapabilities::NONE
            .with_advance_tick()
            .every(NonZeroU32::MIN);
        assert!(caps.advance_tick);
        assert!(!caps.visual_update);
        assert_eq!(caps.step, Some(NonZeroU32::MIN));
    }
}
