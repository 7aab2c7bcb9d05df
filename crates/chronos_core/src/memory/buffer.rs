//! # Buffer Handle
//!
//! A pooled backing array paired with a logical length.

use std::fmt;
use std::ops::{Deref, DerefMut};

/// A pooled array with a logical length `<= capacity`.
///
/// Only the logical range is reachable through `Deref`. Slots past the
/// logical length may still hold values from a previous use of the array
/// and are never exposed.
pub struct BufferArray<T> {
    /// Backing storage claimed from an [`ArrayPool`](super::ArrayPool).
    arr: Box<[T]>,
    /// Logical length.
    length: usize,
}

impl<T> BufferArray<T> {
    /// An unallocated buffer.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            arr: Box::default(),
            length: 0,
        }
    }

    /// Wraps a backing array. `length` is clamped to the array's capacity.
    #[inline]
    #[must_use]
    pub fn from_parts(arr: Box<[T]>, length: usize) -> Self {
        let length = length.min(arr.len());
        Self { arr, length }
    }

    /// Splits the buffer into its backing array and logical length.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (Box<[T]>, usize) {
        (self.arr, self.length)
    }

    /// Logical length.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the logical range is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Length of the backing array.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arr.len()
    }

    /// Returns `true` once a backing array has been attached.
    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        !self.arr.is_empty()
    }

    /// Appends within the current capacity.
    ///
    /// # Errors
    ///
    /// Hands `value` back when the backing array is full; the caller grows
    /// the buffer through its pool and retries.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        match self.arr.get_mut(self.length) {
            Some(slot) => {
                *slot = value;
                self.length += 1;
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Shrinks the logical length to `length`. Growing is not possible here.
    #[inline]
    pub fn truncate(&mut self, length: usize) {
        self.length = self.length.min(length);
    }

    /// The logical range.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.arr[..self.length]
    }

    /// The logical range, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.arr[..self.length]
    }
}

impl<T: Default> BufferArray<T> {
    /// Resets every slot in the logical range to its default.
    pub fn clear(&mut self) {
        for slot in self.as_mut_slice() {
            *slot = T::default();
        }
    }
}

impl<T> Default for BufferArray<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for BufferArray<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for BufferArray<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for BufferArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferArray")
            .field("length", &self.length)
            .field("capacity", &self.arr.len())
            .field("items", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_length_hides_capacity() {
        let backing: Box<[u8]> = vec![1, 2, 3, 4, 5, 6, 7, 8].into_boxed_slice();
        let buffer = BufferArray::from_parts(backing, 3);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(&*buffer, &[1, 2, 3]);
    }

    #[test]
    fn test_try_push_within_capacity() {
        let backing: Box<[u8]> = vec![0; 2].into_boxed_slice();
        let mut buffer = BufferArray::from_parts(backing, 0);
        assert_eq!(buffer.try_push(1), Ok(()));
        assert_eq!(buffer.try_push(2), Ok(()));
        assert_eq!(buffer.try_push(3), Err(3));
        assert_eq!(&*buffer, &[1, 2]);

        buffer.truncate(1);
        assert_eq!(&*buffer, &[1]);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer: BufferArray<u32> = BufferArray::empty();
        assert!(buffer.is_empty());
        assert!(!buffer.is_created());
        assert!(buffer.iter().next().is_none());
    }
}
