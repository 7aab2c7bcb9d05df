//! # Memory Management
//!
//! Pooled arrays and object pools for allocation-free ticks.
//!
//! ## Design Philosophy
//!
//! Arrays are claimed from size-classed pools and released back when no
//! longer needed. After warm-up a steady-state tick:
//! - Claims only arrays that were released earlier
//! - Never frees memory back to the allocator
//! - Keeps latency flat

mod arena;
mod buffer;
mod pool;
mod pool_array;

pub use arena::ArrayArena;
pub use buffer::BufferArray;
pub use pool::ObjectPool;
pub use pool_array::{
    pot_length, size_class, ArrayPool, BUCKET_COUNT, MAX_BUCKET_INDEX, MAX_EXACT_LENGTH,
};
