//! # Object Pool
//!
//! Recycles whole objects (worlds, modules) between uses.

use parking_lot::Mutex;

/// A bounded free list of reusable objects.
///
/// `spawn` hands out a pooled object if one exists and otherwise builds a
/// new one. `recycle` keeps the object for the next spawn unless the pool
/// is full, in which case it is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let pool: ObjectPool<Vec<u8>> = ObjectPool::new(16);
///
/// let mut scratch = pool.spawn(Vec::new);
/// scratch.push(1);
/// scratch.clear();
/// pool.recycle(scratch);
/// ```
pub struct ObjectPool<T> {
    /// Objects waiting for reuse.
    free: Mutex<Vec<T>>,
    /// Maximum number of pooled objects.
    capacity: usize,
}

impl<T> ObjectPool<T> {
    /// Creates a pool that keeps at most `capacity` idle objects.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of idle objects retained
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns the maximum number of idle objects.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of idle objects.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Takes an idle object, or builds one with `create`.
    pub fn spawn(&self, create: impl FnOnce() -> T) -> T {
        let pooled = self.free.lock().pop();
        pooled.unwrap_or_else(create)
    }

    /// Takes an idle object without building one.
    pub fn take(&self) -> Option<T> {
        self.free.lock().pop()
    }

    /// Returns an object to the pool.
    ///
    /// # Returns
    ///
    /// `true` if the object was kept, `false` if the pool was full.
    pub fn recycle(&self, item: T) -> bool {
        let mut free = self.free.lock();
        if free.len() >= self.capacity {
            return false;
        }
        free.push(item);
        true
    }

    /// Drops every idle object.
    pub fn clear(&self) {
        self.free.lock().clear();
    }
}
