use parking_lot::RwLock;
use std::fmt;

/// Lifecycle notifications emitted by the update loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// An update is waiting for its deadline; payload is the remaining wait.
    Scheduled { next_update_secs: u64 },
    Started,
    Completed,
    /// A cycle failed and the loop stopped; the caller owns retry policy.
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Scheduled,
    Started,
    Completed,
    Failed,
}

impl UpdateEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UpdateEvent::Scheduled { .. } => EventKind::Scheduled,
            UpdateEvent::Started => EventKind::Started,
            UpdateEvent::Completed => EventKind::Completed,
            UpdateEvent::Failed { .. } => EventKind::Failed,
        }
    }
}

type Listener = Box<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Subscribers per event kind, fired synchronously in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(EventKind, Listener)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push((kind, Box::new(listener)));
    }

    pub fn emit(&self, event: &UpdateEvent) {
        let kind = event.kind();
        for (subscribed, listener) in self.listeners.read().iter() {
            if *subscribed == kind {
                listener(event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listeners_fire_in_registration_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let calls = Arc::clone(&calls);
            bus.subscribe(EventKind::Completed, move |_| {
                calls.lock().unwrap().push(tag);
            });
        }
        let calls_started = Arc::clone(&calls);
        bus.subscribe(EventKind::Started, move |_| {
            calls_started.lock().unwrap().push("started");
        });

        bus.emit(&UpdateEvent::Completed);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn events_only_reach_matching_subscribers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_sched = Arc::clone(&seen);
        bus.subscribe(EventKind::Scheduled, move |event| {
            if let UpdateEvent::Scheduled { next_update_secs } = event {
                seen_sched.lock().unwrap().push(*next_update_secs);
            }
        });

        bus.emit(&UpdateEvent::Started);
        bus.emit(&UpdateEvent::Scheduled {
            next_update_secs: 300,
        });
        assert_eq!(*seen.lock().unwrap(), vec![300]);
    }
}
