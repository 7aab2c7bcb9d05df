//! # CHRONOS World
//!
//! Deterministic lockstep scheduler built on [`chronos_core`]:
//! - Modules, system groups, features and plugins with declared capabilities
//! - Fixed-step tick loop with a strict phase order
//! - Entity lifecycle with incrementally maintained filters
//! - Reset states, snapshots and pooled worlds
//!
//! ## Architecture Rules
//!
//! 1. **Fixed order** - Modules, plugins, then pre/main/post systems, every tick
//! 2. **No reentrancy** - Scheduled units get a [`WorldContext`], never the [`World`]
//! 3. **Fail fast** - An error inside a tick aborts the whole `simulate` call
//!
//! ## Example
//!
//! ```rust,ignore
//! use chronos_world::{WorldPool, WorldSettings};
//!
//! let pool = WorldPool::new(Arc::new(ArrayArena::new()), 4);
//! let mut world = pool.spawn(WorldSettings::default())?;
//! world.simulate(0, 100)?;
//! let hash = world.state_hash()?;
//! pool.recycle(world)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod feature;
pub mod module;
pub mod plugin;
pub mod pool;
pub mod snapshot;
pub mod step;
pub mod system;
pub mod world;

pub use checkpoint::{CheckpointCollector, RecordingCollector};
pub use config::WorldSettings;
pub use context::WorldContext;
pub use error::{WorldError, WorldResult};
pub use events::{GlobalEvent, GlobalEventType};
pub use feature::Feature;
pub use module::{AsAny, Module, ModuleCapabilities};
pub use plugin::WorldPlugin;
pub use pool::WorldPool;
pub use snapshot::{
    EventHistory, HistoryEvent, MsgPackSerializer, StatesHistory, WorldSerializer, WorldStateCapsule,
};
pub use step::{ModuleState, WorldStep};
pub use system::{LoadCompletion, MainTick, System, SystemCapabilities, SystemGroup};
pub use world::World;
