//! # Entity Handles
//!
//! Entities are lightweight identifiers consisting of:
//! - A slot id into the entity storage
//! - A generation counter for safe reuse

use serde::{Deserialize, Serialize};

/// Handle to an entity slot.
///
/// A handle is valid only while the slot's current generation equals the
/// handle's generation. Removing an entity bumps the slot generation, so
/// every outstanding handle to it fails liveness checks from then on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// Slot id in the entity storage.
    pub id: u32,
    /// Generation of the slot when this handle was issued.
    pub generation: u16,
}

impl Entity {
    /// The null handle. Generation 0 is never issued, so it is never alive.
    pub const EMPTY: Self = Self { id: 0, generation: 0 };

    /// Creates a handle from its parts.
    #[inline]
    #[must_use]
    pub const fn new(id: u32, generation: u16) -> Self {
        Self { id, generation }
    }

    /// Returns `true` for the null handle.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.generation == 0
    }

    /// Slot id as an index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.id as usize
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity#{}:{}", self.id, self.generation)
    }
}
