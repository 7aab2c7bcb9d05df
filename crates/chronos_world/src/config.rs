//! # World Settings
//!
//! Loaded once at startup from TOML. Every field has a default, so a file
//! only needs the values it changes.
//!
//! ```toml
//! max_ticks_simulation_count = 600
//! use_jobs_for_systems = true
//! jobs_batch_count = 128
//! tick_time = 0.05
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{WorldError, WorldResult};

/// Scheduler configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Largest `to - from` a single `simulate` call accepts. 0 = unbounded.
    pub max_ticks_simulation_count: u32,
    /// Allows filter-bound systems in parallel groups to use the worker grid.
    pub use_jobs_for_systems: bool,
    /// Entities per worker batch.
    pub jobs_batch_count: usize,
    /// Size of a dedicated worker pool. 0 = the shared global pool.
    pub worker_threads: usize,
    /// Runs each `update` call as a single job on the worker pool.
    pub threaded_tick: bool,
    /// Fixed step in seconds.
    pub tick_time: f32,
    /// Derives the tick range from accumulated time when no driver has set one.
    pub auto_tick_range: bool,
    /// Makes operations on dead entity handles an error instead of a no-op.
    pub strict_entity_checks: bool,
    /// Entity slots reserved when the world spawns.
    pub entities_capacity: usize,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            max_ticks_simulation_count: 0,
            use_jobs_for_systems: false,
            jobs_batch_count: 64,
            worker_threads: 0,
            threaded_tick: false,
            tick_time: 0.033,
            auto_tick_range: true,
            strict_entity_checks: true,
            entities_capacity: 1024,
        }
    }
}

impl WorldSettings {
    /// Parses settings from a TOML string.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> WorldResult<Self> {
        let settings: Self =
            toml::from_str(source).map_err(|err| WorldError::InvalidConfig(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| WorldError::InvalidConfig(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> WorldResult<()> {
        if !(self.tick_time.is_finite() && self.tick_time > 0.0) {
            return Err(WorldError::InvalidConfig(format!(
                "tick_time must be positive, got {}",
                self.tick_time
            )));
        }
        if self.jobs_batch_count == 0 {
            return Err(WorldError::InvalidConfig(
                "jobs_batch_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(WorldSettings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let settings = WorldSettings::from_toml_str(
            "max_ticks_simulation_count = 600\nuse_jobs_for_systems = true\n",
        )
        .unwrap();
        assert_eq!(settings.max_ticks_simulation_count, 600);
        assert!(settings.use_jobs_for_systems);
        assert_eq!(settings.jobs_batch_count, 64);
    }

    #[test]
    fn test_invalid_values() {
        let result = WorldSettings::from_toml_str("tick_time = 0.0");
        assert!(matches!(result, Err(WorldError::InvalidConfig(_))));

        let result = WorldSettings::from_toml_str("jobs_batch_count = 0");
        assert!(matches!(result, Err(WorldError::InvalidConfig(_))));

        let result = WorldSettings::from_toml_str("tick_time = \"fast\"");
        assert!(matches!(result, Err(WorldError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = WorldSettings::load("/nonexistent/chronos/world.toml");
        assert!(matches!(result, Err(WorldError::InvalidConfig(_))));
    }
}
