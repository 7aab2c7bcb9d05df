//! # World Phases
//!
//! Bitmask of the scheduling section currently running. Collaborators read
//! it to know where they are called from without walking a call stack.

use std::ops::{BitOr, BitOrAssign};

/// Current scheduling phase, as a set of flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WorldStep(u8);

impl WorldStep {
    /// Outside any scheduling section.
    pub const NONE: Self = Self(0);
    /// Module hooks are running.
    pub const MODULES: Self = Self(0x01);
    /// System hooks are running.
    pub const SYSTEMS: Self = Self(0x02);
    /// Plugin hooks are running.
    pub const PLUGINS: Self = Self(0x04);
    /// Inside a deterministic logic tick.
    pub const LOGIC_TICK: Self = Self(0x08);
    /// Inside a per-frame visual pass.
    pub const VISUAL_TICK: Self = Self(0x10);
    /// Inside the range-scoped tail of `simulate`.
    pub const SIMULATE: Self = Self(0x20);

    /// Module visual hooks.
    pub const MODULES_VISUAL_TICK: Self = Self(0x01 | 0x10);
    /// System visual hooks.
    pub const SYSTEMS_VISUAL_TICK: Self = Self(0x02 | 0x10);
    /// Module logic advance.
    pub const MODULES_LOGIC_TICK: Self = Self(0x01 | 0x08);
    /// System logic advance.
    pub const SYSTEMS_LOGIC_TICK: Self = Self(0x02 | 0x08);
    /// Tick-scoped plugin hooks.
    pub const PLUGINS_LOGIC_TICK: Self = Self(0x04 | 0x08);
    /// Range-scoped plugin hooks after the tick loop.
    pub const PLUGINS_LOGIC_SIMULATE: Self = Self(0x04 | 0x08 | 0x20);

    /// Raw flags.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every flag of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any flag of `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if no flag is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for WorldStep {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WorldStep {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Per-unit activity flags for modules, features and systems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModuleState(u8);

impl ModuleState {
    /// Runs in every phase.
    pub const ALL_ACTIVE: Self = Self(0);
    /// Skipped in visual passes.
    pub const VISUAL_INACTIVE: Self = Self(0x01);
    /// Skipped in logic ticks.
    pub const LOGIC_INACTIVE: Self = Self(0x02);
    /// Skipped everywhere.
    pub const INACTIVE: Self = Self(0x01 | 0x02);

    /// Returns `true` if a unit in this state may run during `step`.
    #[inline]
    #[must_use]
    pub const fn allows(self, step: WorldStep) -> bool {
        if step.intersects(WorldStep::LOGIC_TICK) && self.0 & Self::LOGIC_INACTIVE.0 != 0 {
            return false;
        }
        if step.intersects(WorldStep::VISUAL_TICK) && self.0 & Self::VISUAL_INACTIVE.0 != 0 {
            return false;
        }
        true
    }
}

impl BitOr for ModuleState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composites() {
        assert!(WorldStep::SYSTEMS_LOGIC_TICK.contains(WorldStep::LOGIC_TICK));
        assert!(WorldStep::SYSTEMS_LOGIC_TICK.contains(WorldStep::SYSTEMS));
        assert!(!WorldStep::SYSTEMS_LOGIC_TICK.contains(WorldStep::MODULES));
        assert_eq!(WorldStep::MODULES | WorldStep::VISUAL_TICK, WorldStep::MODULES_VISUAL_TICK);
        assert!(WorldStep::NONE.is_empty());
    }

    #[test]
    fn test_module_state_gating() {
        assert!(ModuleState::ALL_ACTIVE.allows(WorldStep::MODULES_LOGIC_TICK));
        assert!(!ModuleState::LOGIC_INACTIVE.allows(WorldStep::MODULES_LOGIC_TICK));
        assert!(ModuleState::LOGIC_INACTIVE.allows(WorldStep::MODULES_VISUAL_TICK));
        assert!(!ModuleState::VISUAL_INACTIVE.allows(WorldStep::SYSTEMS_VISUAL_TICK));
        assert!(!ModuleState::INACTIVE.allows(WorldStep::SYSTEMS_VISUAL_TICK));
    }
}
