//! # Snapshots
//!
//! Join-in-progress support. A capsule carries the oldest retained state,
//! every input event recorded since that state and the tick the sender had
//! reached. The receiver restores the state and re-simulates up to that
//! tick.

use std::collections::VecDeque;

use chronos_core::Tick;
use serde::{Deserialize, Serialize};

use crate::error::{WorldError, WorldResult};

/// A recorded input event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Tick the event applies to.
    pub tick: Tick,
    /// Order within the tick.
    pub order: u32,
    /// Remote call id.
    pub rpc_id: u16,
    /// Encoded arguments.
    pub payload: Vec<u8>,
}

/// Serialized world transfer unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldStateCapsule {
    /// Encoded [`chronos_core::State`].
    pub state: Vec<u8>,
    /// Events since the encoded state's tick.
    pub events: Vec<HistoryEvent>,
    /// Tick the sender had reached.
    pub tick: Tick,
}

/// Converts capsules to and from bytes.
pub trait WorldSerializer: Send + Sync {
    /// Encodes a capsule.
    ///
    /// # Errors
    ///
    /// [`WorldError::Serialization`] on failure.
    fn serialize(&self, capsule: &WorldStateCapsule) -> WorldResult<Vec<u8>>;

    /// Decodes a capsule.
    ///
    /// # Errors
    ///
    /// [`WorldError::Serialization`] on malformed input.
    fn deserialize(&self, bytes: &[u8]) -> WorldResult<WorldStateCapsule>;
}

/// MessagePack capsule codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgPackSerializer;

impl WorldSerializer for MsgPackSerializer {
    fn serialize(&self, capsule: &WorldStateCapsule) -> WorldResult<Vec<u8>> {
        rmp_serde::to_vec(capsule).map_err(|err| WorldError::Serialization(err.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> WorldResult<WorldStateCapsule> {
        rmp_serde::from_slice(bytes).map_err(|err| WorldError::Serialization(err.to_string()))
    }
}

/// Retained states and input events.
pub trait StatesHistory {
    /// Oldest retained encoded state and its tick.
    fn oldest_state(&self) -> Option<(Tick, &[u8])>;

    /// Events at or after `tick`, ordered by tick then order.
    fn events_since(&self, tick: Tick) -> Vec<HistoryEvent>;

    /// Adds events, skipping ones already recorded.
    fn add_events(&mut self, events: &[HistoryEvent]);

    /// Retains an encoded state.
    fn store_state(&mut self, tick: Tick, state: Vec<u8>);
}

/// In-memory history keeping the last `max_states` states.
#[derive(Clone, Debug)]
pub struct EventHistory {
    states: VecDeque<(Tick, Vec<u8>)>,
    events: Vec<HistoryEvent>,
    max_states: usize,
}

impl EventHistory {
    /// Creates an empty history. `max_states` is at least 1.
    #[must_use]
    pub fn new(max_states: usize) -> Self {
        Self {
            states: VecDeque::new(),
            events: Vec::new(),
            max_states: max_states.max(1),
        }
    }

    /// Number of retained states.
    #[must_use]
    pub fn states_count(&self) -> usize {
        self.states.len()
    }

    /// Number of retained events.
    #[must_use]
    pub fn events_count(&self) -> usize {
        self.events.len()
    }

    /// Events recorded for exactly `tick`.
    pub fn events_at(&self, tick: Tick) -> impl Iterator<Item = &HistoryEvent> {
        self.events.iter().filter(move |event| event.tick == tick)
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(8)
    }
}

impl StatesHistory for EventHistory {
    fn oldest_state(&self) -> Option<(Tick, &[u8])> {
        self.states.front().map(|(tick, state)| (*tick, state.as_slice()))
    }

    fn events_since(&self, tick: Tick) -> Vec<HistoryEvent> {
        self.events.iter().filter(|event| event.tick >= tick).cloned().collect()
    }

    fn add_events(&mut self, events: &[HistoryEvent]) {
        for event in events {
            let known = self
                .events
                .iter()
                .any(|e| e.tick == event.tick && e.order == event.order && e.rpc_id == event.rpc_id);
            if !known {
                self.events.push(event.clone());
            }
        }
        self.events.sort_by_key(|event| (event.tick, event.order));
    }

    fn store_state(&mut self, tick: Tick, state: Vec<u8>) {
        self.states.push_back((tick, state));
        while self.states.len() > self.max_states {
            self.states.pop_front();
        }
        if let Some((oldest, _)) = self.states.front() {
            let oldest = *oldest;
            self.events.retain(|event| event.tick >= oldest);
        }
    }
}
