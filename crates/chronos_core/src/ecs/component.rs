//! # Component Types
//!
//! Components are pure data containers with no behavior. Each component
//! type gets a stable small bit id from the [`ComponentRegistry`], which
//! the archetype bitsets and the filter index are keyed by.

use std::any::TypeId;
use std::collections::HashMap;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::archetype::MAX_COMPONENT_BITS;
use super::components::{decode_store, new_store, ErasedStore};
use crate::error::{CoreError, CoreResult};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Clone`: states are copied for reset snapshots
/// - `Serialize`/`DeserializeOwned`: states are hashed and encoded
/// - `Send + Sync`: filter-bound systems may read them from worker threads
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Health {
///     current: i32,
///     max: i32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Stable bit id of a component type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentBit(u16);

impl ComponentBit {
    /// Creates a bit from its index.
    ///
    /// # Panics
    ///
    /// Debug builds panic if `index >= MAX_COMPONENT_BITS`.
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_COMPONENT_BITS, "component bit out of range");
        Self(index as u16)
    }

    /// Bit index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// How long a component set with a lifetime survives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentLifetime {
    /// Stays until removed explicitly.
    #[default]
    Infinite,
    /// Removed at the end of the tick that set it, after post systems.
    NotifyAllSystemsBelow,
    /// Removed after the whole simulated range, once plugins have run.
    NotifyAllModulesBelow,
}

struct ComponentInfo {
    name: &'static str,
    new_store: fn() -> Box<dyn ErasedStore>,
    decode_store: fn(&[u8]) -> CoreResult<Box<dyn ErasedStore>>,
}

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<TypeId, ComponentBit>,
    infos: Vec<ComponentInfo>,
}

/// Assigns stable bit ids to component types.
///
/// Bits are handed out in first-registration order. Peers that exchange
/// encoded states must register component types in the same order.
///
/// # Thread Safety
///
/// Lookups take a shared lock; only the first registration of a type takes
/// the exclusive lock.
#[derive(Default)]
pub struct ComponentRegistry {
    inner: RwLock<RegistryInner>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bit for `T`, registering it on first use.
    ///
    /// # Errors
    ///
    /// [`CoreError::TooManyComponentTypes`] once all bits are taken.
    pub fn register<T: Component>(&self) -> CoreResult<ComponentBit> {
        if let Some(bit) = self.bit_of::<T>() {
            return Ok(bit);
        }

        let mut inner = self.inner.write();
        if let Some(bit) = inner.by_type.get(&TypeId::of::<T>()) {
            return Ok(*bit);
        }
        if inner.infos.len() >= MAX_COMPONENT_BITS {
            return Err(CoreError::TooManyComponentTypes(MAX_COMPONENT_BITS));
        }

        let bit = ComponentBit::from_index(inner.infos.len());
        inner.infos.push(ComponentInfo {
            name: std::any::type_name::<T>(),
            new_store: new_store::<T>,
            decode_store: decode_store::<T>,
        });
        inner.by_type.insert(TypeId::of::<T>(), bit);

        tracing::debug!(component = std::any::type_name::<T>(), bit = bit.index(), "component registered");
        Ok(bit)
    }

    /// Returns the bit for `T` without registering it.
    #[inline]
    #[must_use]
    pub fn bit_of<T: Component>(&self) -> Option<ComponentBit> {
        self.inner.read().by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().infos.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type name registered at `bit`.
    #[must_use]
    pub fn name_of(&self, bit: ComponentBit) -> Option<&'static str> {
        self.inner.read().infos.get(bit.index()).map(|info| info.name)
    }

    pub(crate) fn new_store(&self, bit: ComponentBit) -> CoreResult<Box<dyn ErasedStore>> {
        let constructor = self
            .inner
            .read()
            .infos
            .get(bit.index())
            .map(|info| info.new_store)
            .ok_or(CoreError::UnknownComponentBit(bit.index() as u32))?;
        Ok(constructor())
    }

    pub(crate) fn decode_store(&self, bit: ComponentBit, bytes: &[u8]) -> CoreResult<Box<dyn ErasedStore>> {
        let decoder = self
            .inner
            .read()
            .infos
            .get(bit.index())
            .map(|info| info.decode_store)
            .ok_or(CoreError::UnknownComponentBit(bit.index() as u32))?;
        decoder(bytes)
    }
}
