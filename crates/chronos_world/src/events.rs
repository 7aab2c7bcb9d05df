//! # Global Events
//!
//! Named notifications raised by simulation code and delivered later, at a
//! fixed point of the frame: `Logic` events at the end of every tick,
//! `Visual` events in late update. Raising the same event for the same
//! entity twice before delivery is collapsed into one.

use std::sync::Arc;

use chronos_core::Entity;
use parking_lot::Mutex;

type Listener = Box<dyn FnMut(Entity) + Send>;

/// When a global event is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalEventType {
    /// End of each logic tick.
    Logic,
    /// Late update.
    Visual,
}

/// A named event with subscribed listeners.
///
/// # Example
///
/// ```rust,ignore
/// let died = GlobalEvent::new("unit_died");
/// died.subscribe(|entity| println!("{entity} died"));
///
/// ctx.register_global_event(&died, entity, GlobalEventType::Visual);
/// ```
pub struct GlobalEvent {
    name: &'static str,
    listeners: Mutex<Vec<Listener>>,
}

impl GlobalEvent {
    /// Creates an event with no listeners.
    #[must_use]
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Adds a listener.
    pub fn subscribe(&self, listener: impl FnMut(Entity) + Send + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Calls every listener with `entity`.
    pub fn execute(&self, entity: Entity) {
        for listener in self.listeners.lock().iter_mut() {
            listener(entity);
        }
    }
}

impl std::fmt::Debug for GlobalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalEvent").field("name", &self.name).finish()
    }
}

/// Pending deliveries of one event type.
#[derive(Default)]
pub(crate) struct PendingEvents {
    items: Vec<(Arc<GlobalEvent>, Entity)>,
}

impl PendingEvents {
    /// Queues a delivery. Returns `false` if it was already queued.
    pub(crate) fn register(&mut self, event: &Arc<GlobalEvent>, entity: Entity) -> bool {
        if self.position(event, entity).is_some() {
            return false;
        }
        self.items.push((Arc::clone(event), entity));
        true
    }

    /// Drops a queued delivery. Returns `false` if none was queued.
    pub(crate) fn cancel(&mut self, event: &Arc<GlobalEvent>, entity: Entity) -> bool {
        match self.position(event, entity) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Delivers every queued event in registration order.
    pub(crate) fn flush(&mut self) {
        for (event, entity) in self.items.drain(..) {
            event.execute(entity);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    fn position(&self, event: &Arc<GlobalEvent>, entity: Entity) -> Option<usize> {
        self.items
            .iter()
            .position(|(queued, queued_entity)| Arc::ptr_eq(queued, event) && *queued_entity == entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dedup_and_flush() {
        let hits = Arc::new(AtomicUsize::new(0));
        let event = GlobalEvent::new("hit");
        let counter = Arc::clone(&hits);
        event.subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let mut pending = PendingEvents::default();
        let entity = Entity::new(1, 1);
        assert!(pending.register(&event, entity));
        assert!(!pending.register(&event, entity));
        assert!(pending.register(&event, Entity::new(2, 1)));
        assert_eq!(pending.len(), 2);

        pending.flush();
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_cancel() {
        let event = GlobalEvent::new("hit");
        let mut pending = PendingEvents::default();
        let entity = Entity::new(1, 1);
        pending.register(&event, entity);
        assert!(pending.cancel(&event, entity));
        assert!(!pending.cancel(&event, entity));
    }
}
