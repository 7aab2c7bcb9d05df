//! # Array Arena
//!
//! Explicit registry of [`ArrayPool`]s, one per element type.
//!
//! Pools are created lazily on first request and live until the arena is
//! cleared. Callers on the hot path fetch their pool once and keep the
//! returned `Arc` instead of looking it up per tick.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::pool_array::ArrayPool;

type ErasedPool = Arc<dyn Any + Send + Sync>;

/// Type-partitioned arena of pooled arrays.
///
/// # Thread Safety
///
/// The registry is read-mostly and guarded by an `RwLock`. Each returned
/// pool guards its own buckets, so the arena is always safe to share.
///
/// # Example
///
/// ```rust,ignore
/// let arena = ArrayArena::new();
/// let pool = arena.pool::<u32>();
///
/// let buffer = pool.spawn(100)?;
/// pool.recycle(buffer)?;
/// ```
#[derive(Default)]
pub struct ArrayArena {
    /// Pools keyed by element type.
    pools: RwLock<HashMap<TypeId, ErasedPool>>,
}

impl ArrayArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool for element type `T`, creating it on first use.
    #[must_use]
    pub fn pool<T: Default + Send + 'static>(&self) -> Arc<ArrayPool<T>> {
        let key = TypeId::of::<T>();
        if let Some(pool) = self.pools.read().get(&key).and_then(typed::<T>) {
            return pool;
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&key).and_then(typed::<T>) {
            return pool;
        }
        let pool = Arc::new(ArrayPool::<T>::new());
        pools.insert(key, Arc::clone(&pool) as ErasedPool);
        pool
    }

    /// Number of element types with a pool.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Drops every pool. Arrays still held by callers stay valid; they are
    /// simply not returned to this arena anymore.
    pub fn clear(&self) {
        self.pools.write().clear();
        tracing::debug!("array arena cleared");
    }
}

fn typed<T: Send + 'static>(entry: &ErasedPool) -> Option<Arc<ArrayPool<T>>> {
    Arc::clone(entry).downcast::<ArrayPool<T>>().ok()
}
