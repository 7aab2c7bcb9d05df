//! # World Pool
//!
//! Recycles whole worlds between sessions. A recycled world is torn down
//! completely and may be handed to an unrelated session.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chronos_core::{ArrayArena, ObjectPool};

use crate::config::WorldSettings;
use crate::error::WorldResult;
use crate::world::World;

/// Pool of reusable worlds sharing one arena.
pub struct WorldPool {
    arena: Arc<ArrayArena>,
    worlds: ObjectPool<World>,
    next_id: AtomicU32,
}

impl WorldPool {
    /// Creates a pool keeping at most `capacity` idle worlds.
    #[must_use]
    pub fn new(arena: Arc<ArrayArena>, capacity: usize) -> Self {
        Self {
            arena,
            worlds: ObjectPool::new(capacity),
            next_id: AtomicU32::new(0),
        }
    }

    /// The arena every pooled world draws from.
    #[must_use]
    pub fn arena(&self) -> &Arc<ArrayArena> {
        &self.arena
    }

    /// Number of idle worlds.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.worlds.pooled_count()
    }

    /// Hands out a world with a fresh id, reusing an idle one if possible.
    ///
    /// # Errors
    ///
    /// Invalid settings or a worker pool failure.
    pub fn spawn(&self, settings: WorldSettings) -> WorldResult<World> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        match self.worlds.take() {
            Some(mut world) => {
                world.on_spawn(id, settings)?;
                tracing::debug!(world = id, "world reused from pool");
                Ok(world)
            }
            None => World::new(id, Arc::clone(&self.arena), settings),
        }
    }

    /// Tears the world down and keeps it for reuse.
    ///
    /// # Errors
    ///
    /// Propagates deconstruction hook errors; the world is dropped.
    pub fn recycle(&self, mut world: World) -> WorldResult<()> {
        world.on_recycle()?;
        if !self.worlds.recycle(world) {
            tracing::debug!("world pool full, dropping world");
        }
        Ok(())
    }
}
