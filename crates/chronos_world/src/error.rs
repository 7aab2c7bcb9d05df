//! # World Error Types
//!
//! All errors that can occur while scheduling a world.

use chronos_core::{CoreError, Entity, Tick};
use thiserror::Error;

/// Errors raised by the world scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// An arena or ECS primitive failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// `simulate` was asked for more ticks than the configured bound.
    #[error("simulation range exceeded: {from}..{to} is more than {max} ticks")]
    SimulationRangeExceeded {
        /// First tick of the range.
        from: Tick,
        /// End of the range (exclusive).
        to: Tick,
        /// Configured maximum.
        max: u32,
    },

    /// A tick range with `from > to` was supplied.
    #[error("invalid tick range: {from}..{to}")]
    InvalidTickRange {
        /// First tick of the range.
        from: Tick,
        /// End of the range (exclusive).
        to: Tick,
    },

    /// An entity handle failed its liveness check in strict mode.
    #[error("entity is not alive: {0}")]
    EntityNotAlive(Entity),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool could not be built.
    #[error("worker pool: {0}")]
    WorkerPool(String),

    /// A world-state capsule could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A module, system or plugin reported a failure.
    #[error("{subject} failed: {reason}")]
    Hook {
        /// Type name of the failing unit.
        subject: &'static str,
        /// Failure description.
        reason: String,
    },
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
