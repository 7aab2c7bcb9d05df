//! # Simulation State
//!
//! Everything a tick reads or writes: entity slots, filters, component
//! values and the random stream. A state can be copied (reset snapshots,
//! rollback), hashed (desync detection) and encoded (network snapshots).

use std::hash::Hasher;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher24;

use super::component::ComponentRegistry;
use super::components::{Components, HashWriter};
use super::filter::FiltersStorage;
use super::random::RandomState;
use super::storage::EntityStorage;
use crate::error::{CoreError, CoreResult};

/// Tick number. Ticks are non-negative in practice; the signed type lets
/// range arithmetic clamp instead of wrap.
pub type Tick = i64;

/// Fixed SipHash keys, identical on every peer.
const HASH_KEYS: (u64, u64) = (0x6368_726f_6e6f_7331, 0x7374_6174_6568_6173);

/// Complete simulation state.
#[derive(Clone, Debug)]
pub struct State {
    /// Tick this state represents.
    pub tick: Tick,
    /// Entity slots.
    pub storage: EntityStorage,
    /// Registered filters and their members.
    pub filters: FiltersStorage,
    /// Component values.
    pub components: Components,
    /// Random stream.
    pub random: RandomState,
}

#[derive(Serialize)]
struct EncodedStateRef<'a> {
    tick: Tick,
    storage: &'a EntityStorage,
    random: &'a RandomState,
    components: Vec<(u16, Vec<u8>)>,
}

#[derive(Deserialize)]
struct EncodedState {
    tick: Tick,
    storage: EntityStorage,
    random: RandomState,
    components: Vec<(u16, Vec<u8>)>,
}

impl State {
    /// Creates an empty state at tick 0.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            tick: 0,
            storage: EntityStorage::default(),
            filters: FiltersStorage::default(),
            components: Components::new(registry),
            random: RandomState::default(),
        }
    }

    /// Reserves room for `capacity` entities in every per-entity table.
    pub fn initialize(&mut self, capacity: usize) {
        self.storage.reserve(capacity);
        self.components.reserve(capacity);
        self.filters.reserve(capacity);
    }

    /// Overwrites this state with a copy of `other`, reusing allocations
    /// where possible.
    pub fn copy_from(&mut self, other: &Self) {
        self.tick = other.tick;
        self.storage.clone_from(&other.storage);
        self.filters.clone_from(&other.filters);
        self.components = other.components.clone();
        self.random.clone_from(&other.random);
    }

    /// Deterministic hash over tick, entities, components and random
    /// position. Filter membership is derived data and not included.
    ///
    /// # Errors
    ///
    /// [`CoreError::Encode`] if a component fails to serialize.
    pub fn hash(&self) -> CoreResult<u64> {
        let mut hasher = SipHasher24::new_with_keys(HASH_KEYS.0, HASH_KEYS.1);
        {
            let mut writer = HashWriter(&mut hasher);
            rmp_serde::encode::write(&mut writer, &(self.tick, &self.storage, &self.random))
                .map_err(|err| CoreError::Encode(err.to_string()))?;
        }
        self.components.hash_into(&mut hasher)?;
        Ok(hasher.finish())
    }

    /// Encodes the state as MessagePack. Filters are not encoded; the
    /// receiving world rebuilds membership from its own definitions.
    ///
    /// # Errors
    ///
    /// [`CoreError::Encode`] on serialization failure.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let encoded = EncodedStateRef {
            tick: self.tick,
            storage: &self.storage,
            random: &self.random,
            components: self.components.encode()?,
        };
        rmp_serde::to_vec(&encoded).map_err(|err| CoreError::Encode(err.to_string()))
    }

    /// Replaces entities, components and random state with decoded ones.
    ///
    /// Filter definitions are kept but their membership is cleared; the
    /// caller replays membership for every alive entity.
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed input or
    /// [`CoreError::UnknownComponentBit`] for a type this side never registered.
    pub fn restore(&mut self, bytes: &[u8]) -> CoreResult<()> {
        let decoded: EncodedState =
            rmp_serde::from_slice(bytes).map_err(|err| CoreError::Decode(err.to_string()))?;
        self.components.decode(&decoded.components)?;
        self.tick = decoded.tick;
        self.storage = decoded.storage;
        self.random = decoded.random;
        self.filters.clear_members();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Component;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Health(i32);
    impl Component for Health {}

    fn populated() -> State {
        let mut state = State::new(Arc::new(ComponentRegistry::new()));
        state.initialize(16);
        for value in 0..4 {
            let entity = state.storage.alloc();
            state.components.set(entity, Health(value)).unwrap();
        }
        state.random.set_seed(42);
        state.tick = 10;
        state
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = populated();
        let b = populated();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn test_hash_tracks_changes() {
        let a = populated();
        let mut b = populated();
        let entity = b.storage.entity_by_id(1).unwrap();
        b.components.set(entity, Health(100)).unwrap();
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());

        let mut c = populated();
        c.random.next_u32();
        assert_ne!(a.hash().unwrap(), c.hash().unwrap());
    }

    #[test]
    fn test_copy_from() {
        let source = populated();
        let mut target = State::new(Arc::clone(source.components.registry()));
        target.copy_from(&source);
        assert_eq!(target.tick, 10);
        assert_eq!(target.hash().unwrap(), source.hash().unwrap());
    }

    #[test]
    fn test_encode_restore() {
        let source = populated();
        let bytes = source.encode().unwrap();

        let mut target = State::new(Arc::clone(source.components.registry()));
        target.restore(&bytes).unwrap();
        assert_eq!(target.tick, source.tick);
        assert_eq!(target.storage, source.storage);
        assert_eq!(target.hash().unwrap(), source.hash().unwrap());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let mut state = populated();
        assert!(matches!(state.restore(&[0xc1, 0x00]), Err(CoreError::Decode(_))));
    }
}
