//! # Core Error Types
//!
//! All errors that can occur in the arena and ECS primitives.

use thiserror::Error;

/// Errors raised by the pooled-array arena and the ECS data layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A claim asked for a size class beyond the largest representable bucket.
    #[error("length out of range: {length} needs a bucket beyond 2^{max_bucket}")]
    LengthOutOfRange {
        /// The requested length.
        length: usize,
        /// The largest usable bucket index.
        max_bucket: usize,
    },

    /// A non-power-of-two array was released without the explicit override.
    #[error("length is not a power of two: {0}")]
    NotPowerOfTwo(usize),

    /// The component registry ran out of archetype bits.
    #[error("too many component types: limit is {0}")]
    TooManyComponentTypes(usize),

    /// A component bit has no registered type.
    #[error("component bit not registered: {0}")]
    UnknownComponentBit(u32),

    /// Encoding state into bytes failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Decoding state from bytes failed.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
