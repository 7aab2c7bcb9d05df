//! # Pooled Arrays
//!
//! Reusable backing arrays for one element type, bucketed by power-of-two
//! size plus a small exact-length pool.
//!
//! ## Size Classes
//!
//! ```text
//! bucket i  -> arrays of length 2^i          (i = 0..=30)
//! exact  n  -> arrays of length n, n <= 256   (n not a power of two)
//! ```
//!
//! Claimed arrays are NOT cleared. A pooled array may hold values written
//! during a previous tick; use [`ArrayPool::spawn`] when zeroed memory is
//! required.

use parking_lot::Mutex;

use super::buffer::BufferArray;
use crate::error::{CoreError, CoreResult};

/// Number of power-of-two buckets.
pub const BUCKET_COUNT: usize = 31;

/// Bucket index at which a claim is rejected as out of range.
pub const MAX_BUCKET_INDEX: usize = 30;

/// Longest non-power-of-two array kept by the exact-length pool.
///
/// Longer arrays are dropped on release so that rarely reused lengths
/// cannot grow the pool without bound.
pub const MAX_EXACT_LENGTH: usize = 256;

/// Returns the bucket index for `length`: the smallest `i` with
/// `2^i >= length`, capped at [`MAX_BUCKET_INDEX`].
#[inline]
#[must_use]
pub const fn size_class(length: usize) -> usize {
    if length <= 1 {
        return 0;
    }
    let bucket = (usize::BITS - (length - 1).leading_zeros()) as usize;
    if bucket > MAX_BUCKET_INDEX {
        MAX_BUCKET_INDEX
    } else {
        bucket
    }
}

/// Returns the power-of-two length a claim of `length` produces.
#[inline]
#[must_use]
pub const fn pot_length(length: usize) -> usize {
    1 << size_class(length)
}

/// Pool of reusable arrays for element type `T`.
///
/// # Thread Safety
///
/// Every bucket and every exact-length stack sits behind its own lock, so
/// concurrent claim/release on different size classes never contend.
pub struct ArrayPool<T> {
    /// Power-of-two stacks, index = bucket.
    buckets: Box<[Mutex<Vec<Box<[T]>>>]>,
    /// Exact-length stacks, index = length.
    exact: Box<[Mutex<Vec<Box<[T]>>>]>,
    /// Addresses of arrays currently handed out (diagnostics only).
    #[cfg(debug_assertions)]
    outstanding: Mutex<std::collections::HashSet<usize>>,
}

impl<T: Default + Send + 'static> ArrayPool<T> {
    /// Creates an empty pool. No arrays are allocated until first claim.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
            exact: (0..=MAX_EXACT_LENGTH).map(|_| Mutex::new(Vec::new())).collect(),
            #[cfg(debug_assertions)]
            outstanding: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Returns an array of length `pot_length(min_length)`.
    ///
    /// Pulled from the matching bucket if one is pooled, otherwise freshly
    /// allocated. A zero length returns the shared empty array.
    ///
    /// # Errors
    ///
    /// [`CoreError::LengthOutOfRange`] if the size class reaches
    /// [`MAX_BUCKET_INDEX`].
    pub fn claim(&self, min_length: usize) -> CoreResult<Box<[T]>> {
        if min_length == 0 {
            return Ok(Box::default());
        }

        let bucket = size_class(min_length);
        if bucket == MAX_BUCKET_INDEX {
            return Err(CoreError::LengthOutOfRange {
                length: min_length,
                max_bucket: MAX_BUCKET_INDEX,
            });
        }

        let pooled = self.buckets[bucket].lock().pop();
        let array = pooled.unwrap_or_else(|| Self::allocate(1 << bucket));
        self.track_claim(&array);
        Ok(array)
    }

    /// Returns an array of exactly `length` elements.
    ///
    /// Power-of-two lengths go through [`claim`](Self::claim). Other lengths
    /// up to [`MAX_EXACT_LENGTH`] pop the exact-length stack and fall back to
    /// a fresh allocation when it is empty.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError::LengthOutOfRange`] from the power-of-two path.
    pub fn claim_exact_length(&self, length: usize) -> CoreResult<Box<[T]>> {
        if length.is_power_of_two() {
            return self.claim(length);
        }
        if length == 0 {
            return Ok(Box::default());
        }

        let pooled = if length <= MAX_EXACT_LENGTH {
            self.exact[length].lock().pop()
        } else {
            None
        };
        let array = pooled.unwrap_or_else(|| Self::allocate(length));
        self.track_claim(&array);
        Ok(array)
    }

    /// Returns an array to the pool.
    ///
    /// Power-of-two arrays go back to their bucket. Non-power-of-two arrays
    /// need `allow_non_pot`; those up to [`MAX_EXACT_LENGTH`] are kept in the
    /// exact-length pool and longer ones are dropped.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotPowerOfTwo`] for a non-power-of-two array released
    /// without the override. The array is dropped.
    pub fn release(&self, array: Box<[T]>, allow_non_pot: bool) -> CoreResult<()> {
        let length = array.len();
        if length == 0 {
            return Ok(());
        }

        let is_pot = length.is_power_of_two();
        if !is_pot && !allow_non_pot {
            return Err(CoreError::NotPowerOfTwo(length));
        }

        self.track_release(&array);

        if is_pot {
            self.buckets[size_class(length)].lock().push(array);
        } else if length <= MAX_EXACT_LENGTH {
            self.exact[length].lock().push(array);
        }

        Ok(())
    }

    /// Claims a buffer with logical length `length` and zeroes that range.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError::LengthOutOfRange`].
    pub fn spawn(&self, length: usize) -> CoreResult<BufferArray<T>> {
        let mut array = self.claim(length)?;
        for slot in &mut array[..length] {
            *slot = T::default();
        }
        Ok(BufferArray::from_parts(array, length))
    }

    /// Zeroes the whole backing array and releases it.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotPowerOfTwo`] if the buffer was not built from a claim.
    pub fn recycle(&self, buffer: BufferArray<T>) -> CoreResult<()> {
        let (mut array, _) = buffer.into_parts();
        for slot in array.iter_mut() {
            *slot = T::default();
        }
        self.release(array, false)
    }

    /// Grows `buffer` so that `index` is inside its logical range.
    ///
    /// Existing values are moved into the new array; new slots are zeroed.
    /// With `with_offset` the buffer roughly doubles, which keeps repeated
    /// single-step growth amortised.
    ///
    /// # Errors
    ///
    /// Propagates arena errors from the claim or the release.
    pub fn resize(&self, buffer: &mut BufferArray<T>, index: usize, with_offset: bool) -> CoreResult<()> {
        let offset = if with_offset { 2 } else { 1 };

        if !buffer.is_created() {
            *buffer = self.spawn(index * offset + 1)?;
            return Ok(());
        }
        if index < buffer.len() {
            return Ok(());
        }

        let mut new_length = buffer.len() * offset + 1;
        if new_length <= index {
            new_length = index * offset + 1;
        }

        let mut grown = self.spawn(new_length)?;
        let old = std::mem::take(buffer);
        let (mut array, length) = old.into_parts();
        for (dst, src) in grown.iter_mut().zip(array[..length].iter_mut()) {
            *dst = std::mem::take(src);
        }
        *buffer = grown;
        self.recycle(BufferArray::from_parts(array, length))
    }

    /// Number of arrays currently pooled in `bucket`.
    #[must_use]
    pub fn pooled_count(&self, bucket: usize) -> usize {
        self.buckets.get(bucket).map_or(0, |stack| stack.lock().len())
    }

    /// Number of arrays currently pooled for the exact `length`.
    #[must_use]
    pub fn pooled_exact_count(&self, length: usize) -> usize {
        self.exact.get(length).map_or(0, |stack| stack.lock().len())
    }

    /// Drops every pooled array.
    pub fn clear(&self) {
        for stack in self.buckets.iter().chain(self.exact.iter()) {
            stack.lock().clear();
        }
    }

    fn allocate(length: usize) -> Box<[T]> {
        std::iter::repeat_with(T::default).take(length).collect()
    }

    #[cfg(debug_assertions)]
    fn track_claim(&self, array: &[T]) {
        if std::mem::size_of::<T>() != 0 && !array.is_empty() {
            self.outstanding.lock().insert(array.as_ptr() as usize);
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn track_claim(&self, _array: &[T]) {}

    #[cfg(debug_assertions)]
    fn track_release(&self, array: &[T]) {
        if std::mem::size_of::<T>() == 0 {
            return;
        }
        if !self.outstanding.lock().remove(&(array.as_ptr() as usize)) {
            tracing::warn!(
                length = array.len(),
                element = std::any::type_name::<T>(),
                "released an array that was not claimed from this pool"
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn track_release(&self, _array: &[T]) {}
}

impl<T: Default + Send + 'static> Default for ArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
