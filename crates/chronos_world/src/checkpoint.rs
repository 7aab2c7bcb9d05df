//! # Checkpoint Collector
//!
//! Profiling side channel. The scheduler reports the start and end of every
//! phase and every unit it runs; what the collector does with that is up to
//! the collector. It has no influence on the simulation.

use crate::step::WorldStep;

/// Receives phase checkpoints from the scheduler.
pub trait CheckpointCollector: Send {
    /// Called at the start of every `update` call.
    fn reset(&mut self);

    /// Called before and after each scheduled unit or phase.
    fn checkpoint(&mut self, subject: &str, step: WorldStep);
}

/// Collector that records every checkpoint in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingCollector {
    entries: Vec<(String, WorldStep)>,
}

impl RecordingCollector {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoints recorded since the last reset.
    #[must_use]
    pub fn entries(&self) -> &[(String, WorldStep)] {
        &self.entries
    }
}

impl CheckpointCollector for RecordingCollector {
    fn reset(&mut self) {
        self.entries.clear();
    }

    fn checkpoint(&mut self, subject: &str, step: WorldStep) {
        self.entries.push((subject.to_string(), step));
    }
}

/// Reports `subject` to the collector, if one is installed.
#[inline]
pub(crate) fn report(collector: &mut Option<Box<dyn CheckpointCollector>>, subject: &str, step: WorldStep) {
    if let Some(collector) = collector.as_deref_mut() {
        collector.checkpoint(subject, step);
    }
}
