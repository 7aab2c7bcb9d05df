//! # Component Stores
//!
//! Sparse per-type stores indexed by entity id, plus each entity's
//! archetype. Stores are type-erased behind [`ErasedStore`] so a state can
//! clone, hash and encode every component type without knowing it.

use std::any::Any;
use std::hash::Hasher;
use std::io::Write;
use std::sync::Arc;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use super::archetype::Archetype;
use super::component::{Component, ComponentBit, ComponentRegistry};
use super::entity::Entity;
use crate::error::{CoreError, CoreResult};

/// Type-erased component store.
pub(crate) trait ErasedStore: Send + Sync {
    /// Removes the value for `id`. Returns `true` if one was present.
    fn remove(&mut self, id: u32) -> bool;
    /// Copies the value at `from` to `to`. Returns `true` if `from` had one.
    fn copy_value(&mut self, from: u32, to: u32) -> bool;
    /// Calls `f` with every id holding a value, ascending.
    fn for_each_id(&self, f: &mut dyn FnMut(u32));
    /// Number of values held.
    fn count(&self) -> usize;
    /// Writes `(id, value)` pairs in ascending id order as MessagePack.
    fn encode(&self, out: &mut dyn Write) -> CoreResult<()>;
    fn clone_box(&self) -> Box<dyn ErasedStore>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Sparse store for one component type.
pub(crate) struct ComponentStore<T> {
    values: Vec<Option<T>>,
    count: usize,
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            count: 0,
        }
    }
}

impl<T: Component> ComponentStore<T> {
    fn set(&mut self, id: u32, value: T) -> bool {
        let index = id as usize;
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        let added = self.values[index].is_none();
        self.values[index] = Some(value);
        if added {
            self.count += 1;
        }
        added
    }

    fn get(&self, id: u32) -> Option<&T> {
        self.values.get(id as usize)?.as_ref()
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.values.get_mut(id as usize)?.as_mut()
    }

    fn present(&self) -> impl Iterator<Item = (u32, &T)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| value.as_ref().map(|value| (index as u32, value)))
    }
}

/// Serializes a store as a counted sequence of `(id, value)` pairs.
struct PresentValues<'a, T>(&'a ComponentStore<T>);

impl<T: Component> Serialize for PresentValues<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.count))?;
        for entry in self.0.present() {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn remove(&mut self, id: u32) -> bool {
        let removed = self
            .values
            .get_mut(id as usize)
            .and_then(Option::take)
            .is_some();
        if removed {
            self.count -= 1;
        }
        removed
    }

    fn copy_value(&mut self, from: u32, to: u32) -> bool {
        match self.get(from).cloned() {
            Some(value) => {
                self.set(to, value);
                true
            }
            None => {
                self.remove(to);
                false
            }
        }
    }

    fn for_each_id(&self, f: &mut dyn FnMut(u32)) {
        for (id, _) in self.present() {
            f(id);
        }
    }

    fn count(&self) -> usize {
        self.count
    }

    fn encode(&self, mut out: &mut dyn Write) -> CoreResult<()> {
        rmp_serde::encode::write(&mut out, &PresentValues(self))
            .map_err(|err| CoreError::Encode(err.to_string()))
    }

    fn clone_box(&self) -> Box<dyn ErasedStore> {
        Box::new(Self {
            values: self.values.clone(),
            count: self.count,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn new_store<T: Component>() -> Box<dyn ErasedStore> {
    Box::new(ComponentStore::<T>::default())
}

pub(crate) fn decode_store<T: Component>(bytes: &[u8]) -> CoreResult<Box<dyn ErasedStore>> {
    let entries: Vec<(u32, T)> =
        rmp_serde::from_slice(bytes).map_err(|err| CoreError::Decode(err.to_string()))?;
    let mut store = ComponentStore::<T>::default();
    for (id, value) in entries {
        store.set(id, value);
    }
    Ok(Box::new(store))
}

/// Adapts a [`Hasher`] into a byte sink so stores can stream into it.
pub(crate) struct HashWriter<'a, H: Hasher>(pub &'a mut H);

impl<H: Hasher> Write for HashWriter<'_, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// All component values of a state.
///
/// Values are keyed by entity id. Liveness checks belong to the caller;
/// this layer only tracks which bits each id currently carries.
pub struct Components {
    registry: Arc<ComponentRegistry>,
    /// Store per component bit.
    stores: Vec<Option<Box<dyn ErasedStore>>>,
    /// Current archetype per entity id.
    archetypes: Vec<Archetype>,
}

impl Components {
    /// Creates empty stores bound to `registry`.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            stores: Vec::new(),
            archetypes: Vec::new(),
        }
    }

    /// The registry that assigns component bits.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Reserves archetype slots for `capacity` entities.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.archetypes.len() {
            self.archetypes.resize(capacity, Archetype::EMPTY);
        }
    }

    /// Current archetype of `entity`.
    #[inline]
    #[must_use]
    pub fn archetype(&self, entity: Entity) -> Archetype {
        self.archetypes
            .get(entity.index())
            .copied()
            .unwrap_or(Archetype::EMPTY)
    }

    /// Sets a component value.
    ///
    /// # Returns
    ///
    /// The component bit, and `true` if the entity did not have it before.
    ///
    /// # Errors
    ///
    /// Propagates registry errors.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> CoreResult<(ComponentBit, bool)> {
        let bit = self.registry.register::<T>()?;
        let added = self.typed_store_mut::<T>(bit)?.set(entity.id, value);
        if added {
            self.archetype_mut(entity).set(bit);
        }
        Ok((bit, added))
    }

    /// Returns the component value, if present.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let bit = self.registry.bit_of::<T>()?;
        self.typed_store::<T>(bit)?.get(entity.id)
    }

    /// Returns the component value mutably, if present.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let bit = self.registry.bit_of::<T>()?;
        self.stores
            .get_mut(bit.index())?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<ComponentStore<T>>()?
            .get_mut(entity.id)
    }

    /// Returns `true` if the entity carries `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.registry
            .bit_of::<T>()
            .is_some_and(|bit| self.archetype(entity).has_bit(bit))
    }

    /// Removes `T` from the entity.
    ///
    /// # Returns
    ///
    /// The component bit if a value was removed.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<ComponentBit> {
        let bit = self.registry.bit_of::<T>()?;
        self.remove_by_bit(entity, bit).then_some(bit)
    }

    /// Removes whatever component sits at `bit` from the entity.
    pub fn remove_by_bit(&mut self, entity: Entity, bit: ComponentBit) -> bool {
        let removed = self
            .stores
            .get_mut(bit.index())
            .and_then(Option::as_mut)
            .is_some_and(|store| store.remove(entity.id));
        if removed {
            self.archetype_mut(entity).unset(bit);
        }
        removed
    }

    /// Removes every component from the entity.
    ///
    /// # Returns
    ///
    /// The archetype the entity had.
    pub fn remove_all(&mut self, entity: Entity) -> Archetype {
        let archetype = self.archetype(entity);
        for bit in archetype.bits() {
            if let Some(Some(store)) = self.stores.get_mut(bit.index()) {
                store.remove(entity.id);
            }
        }
        if let Some(slot) = self.archetypes.get_mut(entity.index()) {
            *slot = Archetype::EMPTY;
        }
        archetype
    }

    /// Replaces every component of `to` with copies of `from`'s.
    pub fn copy_entity(&mut self, from: Entity, to: Entity) {
        let source = self.archetype(from);
        let target = self.archetype(to);
        for bit in source.bits().chain(target.bits()) {
            if let Some(Some(store)) = self.stores.get_mut(bit.index()) {
                store.copy_value(from.id, to.id);
            }
        }
        *self.archetype_mut(to) = source;
    }

    /// Streams every non-empty store into `hasher`, ascending bit order.
    pub(crate) fn hash_into<H: Hasher>(&self, hasher: &mut H) -> CoreResult<()> {
        for (index, store) in self.present_stores() {
            hasher.write_u16(index as u16);
            store.encode(&mut HashWriter(hasher))?;
        }
        Ok(())
    }

    /// Encodes every non-empty store as `(bit, bytes)` pairs.
    pub(crate) fn encode(&self) -> CoreResult<Vec<(u16, Vec<u8>)>> {
        let mut encoded = Vec::new();
        for (index, store) in self.present_stores() {
            let mut bytes = Vec::new();
            store.encode(&mut bytes)?;
            encoded.push((index as u16, bytes));
        }
        Ok(encoded)
    }

    /// Replaces all stores with decoded ones and rebuilds archetypes.
    pub(crate) fn decode(&mut self, encoded: &[(u16, Vec<u8>)]) -> CoreResult<()> {
        self.stores.clear();
        for slot in &mut self.archetypes {
            *slot = Archetype::EMPTY;
        }

        for (index, bytes) in encoded {
            let bit = ComponentBit::from_index(usize::from(*index));
            let store = self.registry.decode_store(bit, bytes)?;
            let archetypes = &mut self.archetypes;
            store.for_each_id(&mut |id| {
                let slot = id as usize;
                if slot >= archetypes.len() {
                    archetypes.resize(slot + 1, Archetype::EMPTY);
                }
                archetypes[slot].set(bit);
            });
            self.install(bit, store);
        }
        Ok(())
    }

    fn present_stores(&self) -> impl Iterator<Item = (usize, &dyn ErasedStore)> {
        self.stores
            .iter()
            .enumerate()
            .filter_map(|(index, store)| store.as_deref().map(|store| (index, store)))
            .filter(|(_, store)| store.count() > 0)
    }

    fn install(&mut self, bit: ComponentBit, store: Box<dyn ErasedStore>) {
        let index = bit.index();
        if index >= self.stores.len() {
            self.stores.resize_with(index + 1, || None);
        }
        self.stores[index] = Some(store);
    }

    fn archetype_mut(&mut self, entity: Entity) -> &mut Archetype {
        let index = entity.index();
        if index >= self.archetypes.len() {
            self.archetypes.resize(index + 1, Archetype::EMPTY);
        }
        &mut self.archetypes[index]
    }

    fn typed_store<T: Component>(&self, bit: ComponentBit) -> Option<&ComponentStore<T>> {
        self.stores
            .get(bit.index())?
            .as_ref()?
            .as_any()
            .downcast_ref::<ComponentStore<T>>()
    }

    fn typed_store_mut<T: Component>(&mut self, bit: ComponentBit) -> CoreResult<&mut ComponentStore<T>> {
        let index = bit.index();
        if self.stores.get(index).map_or(true, Option::is_none) {
            let store = self.registry.new_store(bit)?;
            self.install(bit, store);
        }
        self.stores[index]
            .as_mut()
            .and_then(|store| store.as_any_mut().downcast_mut::<ComponentStore<T>>())
            .ok_or(CoreError::UnknownComponentBit(index as u32))
    }
}

impl Clone for Components {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            stores: self
                .stores
                .iter()
                .map(|store| store.as_ref().map(|store| store.clone_box()))
                .collect(),
            archetypes: self.archetypes.clone(),
        }
    }
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("types", &self.present_stores().count())
            .field("entities", &self.archetypes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Health(i32);
    impl Component for Health {}

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Speed(u8);
    impl Component for Speed {}

    fn components() -> Components {
        Components::new(Arc::new(ComponentRegistry::new()))
    }

    #[test]
    fn test_set_get_remove() {
        let mut components = components();
        let entity = Entity::new(3, 1);

        let (bit, added) = components.set(entity, Health(10)).unwrap();
        assert!(added);
        assert!(components.archetype(entity).has_bit(bit));
        assert_eq!(components.get::<Health>(entity), Some(&Health(10)));

        let (_, added) = components.set(entity, Health(5)).unwrap();
        assert!(!added);

        components.get_mut::<Health>(entity).unwrap().0 += 1;
        assert_eq!(components.get::<Health>(entity), Some(&Health(6)));

        assert_eq!(components.remove::<Health>(entity), Some(bit));
        assert!(!components.has::<Health>(entity));
        assert_eq!(components.remove::<Health>(entity), None);
    }

    #[test]
    fn test_remove_all() {
        let mut components = components();
        let entity = Entity::new(0, 1);
        components.set(entity, Health(1)).unwrap();
        components.set(entity, Speed(2)).unwrap();

        let old = components.remove_all(entity);
        assert_eq!(old.bits_count(), 2);
        assert!(components.archetype(entity).is_empty());
        assert!(components.get::<Speed>(entity).is_none());
    }

    #[test]
    fn test_copy_entity() {
        let mut components = components();
        let from = Entity::new(0, 1);
        let to = Entity::new(1, 1);
        components.set(from, Health(7)).unwrap();
        components.set(to, Speed(3)).unwrap();

        components.copy_entity(from, to);
        assert_eq!(components.get::<Health>(to), Some(&Health(7)));
        assert!(components.get::<Speed>(to).is_none());
        assert_eq!(components.archetype(to), components.archetype(from));
    }

    #[test]
    fn test_encode_decode_rebuilds_archetypes() {
        let mut components = components();
        let entity = Entity::new(4, 1);
        components.set(entity, Health(42)).unwrap();
        components.set(entity, Speed(9)).unwrap();

        let encoded = components.encode().unwrap();
        let mut restored = Components::new(Arc::clone(components.registry()));
        restored.decode(&encoded).unwrap();

        assert_eq!(restored.get::<Health>(entity), Some(&Health(42)));
        assert_eq!(restored.get::<Speed>(entity), Some(&Speed(9)));
        assert_eq!(restored.archetype(entity), components.archetype(entity));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut components = components();
        let entity = Entity::new(0, 1);
        components.set(entity, Health(1)).unwrap();

        let snapshot = components.clone();
        components.set(entity, Health(2)).unwrap();
        assert_eq!(snapshot.get::<Health>(entity), Some(&Health(1)));
    }
}
