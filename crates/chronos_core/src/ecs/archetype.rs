//! # Archetype Bitset
//!
//! Fixed 256-bit set of component bits, one per registered component type.
//!
//! Used for an entity's current component set and for a filter's
//! `contains`/`not_contains` masks. Four `u64` words, so every operation
//! is a handful of word ops and never allocates.

use serde::{Deserialize, Serialize};

use super::component::ComponentBit;

/// Maximum number of component types.
pub const MAX_COMPONENT_BITS: usize = 256;

const WORDS: usize = MAX_COMPONENT_BITS / 64;

/// A set of component bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Archetype {
    /// 64 component bits per word.
    words: [u64; WORDS],
}

impl Archetype {
    /// The empty set.
    pub const EMPTY: Self = Self { words: [0; WORDS] };

    /// Adds `bit`.
    #[inline]
    pub fn set(&mut self, bit: ComponentBit) {
        let index = bit.index();
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Removes `bit`.
    #[inline]
    pub fn unset(&mut self, bit: ComponentBit) {
        let index = bit.index();
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if `bit` is set.
    #[inline]
    #[must_use]
    pub fn has_bit(&self, bit: ComponentBit) -> bool {
        let index = bit.index();
        (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Returns `true` if every bit of `other` is set here.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }

    /// Returns `true` if any bit is set in both.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(mine, theirs)| mine & theirs != 0)
    }

    /// Number of set bits.
    #[inline]
    #[must_use]
    pub fn bits_count(&self) -> u32 {
        self.words.iter().map(|word| word.count_ones()).sum()
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Iterates set bits in ascending order.
    pub fn bits(&self) -> impl Iterator<Item = ComponentBit> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, word)| {
            let mut remaining = *word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let offset = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(ComponentBit::from_index(word_index * 64 + offset))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit(index: usize) -> ComponentBit {
        ComponentBit::from_index(index)
    }

    #[test]
    fn test_set_unset() {
        let mut archetype = Archetype::EMPTY;
        archetype.set(bit(3));
        archetype.set(bit(200));
        assert!(archetype.has_bit(bit(3)));
        assert!(archetype.has_bit(bit(200)));
        assert!(!archetype.has_bit(bit(4)));
        assert_eq!(archetype.bits_count(), 2);

        archetype.unset(bit(3));
        assert!(!archetype.has_bit(bit(3)));
        assert_eq!(archetype.bits_count(), 1);
    }

    #[test]
    fn test_contains_all_and_intersects() {
        let mut entity = Archetype::EMPTY;
        entity.set(bit(1));
        entity.set(bit(70));

        let mut required = Archetype::EMPTY;
        required.set(bit(70));
        assert!(entity.contains_all(&required));
        assert!(entity.contains_all(&Archetype::EMPTY));

        let mut forbidden = Archetype::EMPTY;
        forbidden.set(bit(2));
        assert!(!entity.intersects(&forbidden));
        forbidden.set(bit(1));
        assert!(entity.intersects(&forbidden));
    }

    #[test]
    fn test_bits_ascending() {
        let mut archetype = Archetype::EMPTY;
        for index in [255, 0, 64, 63, 130] {
            archetype.set(bit(index));
        }
        let bits: Vec<usize> = archetype.bits().map(ComponentBit::index).collect();
        assert_eq!(bits, vec![0, 63, 64, 130, 255]);
    }
}
