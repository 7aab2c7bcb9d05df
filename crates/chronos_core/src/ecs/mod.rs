//! # Entity Component System
//!
//! Deterministic ECS data layer.
//!
//! ## Design Philosophy
//!
//! - Entity handles are slot ids with generation counters
//! - Component types map to stable bits; entities carry a 256-bit archetype
//! - Filters are standing queries kept up to date incrementally
//! - The filter index maps each bit to the filters that care about it

pub mod archetype;
mod component;
mod components;
mod entity;
mod filter;
mod filters_tree;
mod random;
mod state;
mod storage;

pub use archetype::{Archetype, MAX_COMPONENT_BITS};
pub use component::{Component, ComponentBit, ComponentLifetime, ComponentRegistry};
pub use components::Components;
pub use entity::Entity;
pub use filter::{Filter, FilterBuilder, FilterId, FiltersStorage};
pub use filters_tree::FiltersTree;
pub use random::RandomState;
pub use state::{State, Tick};
pub use storage::EntityStorage;
