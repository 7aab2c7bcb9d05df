//! # CHRONOS Core
//!
//! Pooled memory and deterministic ECS primitives for lockstep simulation:
//! - Size-classed array pools that keep steady-state ticks allocation-free
//! - Generation-tagged entities and bit-keyed component stores
//! - Incrementally maintained filters with a per-bit filter index
//! - Hashable, encodable simulation state
//!
//! ## Architecture Rules
//!
//! 1. **No per-tick garbage** - Transient arrays come from [`memory::ArrayPool`]
//! 2. **Determinism** - Identical inputs produce bit-identical state
//! 3. **No hidden sharing** - Pools live in an explicit [`memory::ArrayArena`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use chronos_core::{ArrayArena, ComponentRegistry, State};
//!
//! let arena = ArrayArena::new();
//! let mut state = State::new(Arc::new(ComponentRegistry::new()));
//! state.initialize(10_000);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod error;
pub mod memory;

pub use ecs::{
    Archetype, Component, ComponentBit, ComponentLifetime, ComponentRegistry, Components, Entity,
    EntityStorage, Filter, FilterBuilder, FilterId, FiltersStorage, FiltersTree, RandomState,
    State, Tick,
};
pub use error::{CoreError, CoreResult};
pub use memory::{pot_length, ArrayArena, ArrayPool, BufferArray, ObjectPool};
