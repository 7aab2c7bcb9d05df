//! # Features
//!
//! Composable bundles that install modules, system groups and plugins
//! together. A feature receives the whole [`World`] on construction.

use std::any::TypeId;

use crate::error::WorldResult;
use crate::module::AsAny;
use crate::step::ModuleState;
use crate::world::World;

/// A bundle of modules and systems.
pub trait Feature: AsAny + Send {
    /// Acceptance check run before the feature is constructed.
    fn could_be_added(&self, _world: &World) -> bool {
        true
    }

    /// Installs whatever the feature provides.
    fn on_construct(&mut self, world: &mut World) -> WorldResult<()>;

    /// Removes what `on_construct` installed.
    fn on_deconstruct(&mut self, _world: &mut World) -> WorldResult<()> {
        Ok(())
    }
}

pub(crate) struct FeatureEntry {
    pub(crate) feature: Box<dyn Feature>,
    pub(crate) state: ModuleState,
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl FeatureEntry {
    pub(crate) fn downcast_ref<F: Feature>(&self) -> Option<&F> {
        (*self.feature).as_any().downcast_ref::<F>()
    }
}
