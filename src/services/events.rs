//! Event system for import operations
//!
//! Services emit events describing what an import did; listeners turn them
//! into audit logs or reports. Emission never blocks and never fails when
//! nobody is subscribed.

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::db::PersistAction;
use crate::error::ErrorKind;

/// Events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ImportStarted {
        batch_id: String,
        rows: usize,
    },
    EntityImported {
        batch_id: String,
        name: String,
        action: PersistAction,
    },
    EntitySkipped {
        batch_id: String,
        row_index: usize,
        name: Option<String>,
        kind: ErrorKind,
        message: String,
    },
    StatisticsRecomputed {
        categories: usize,
    },
    ImportCompleted {
        batch_id: String,
        persisted: usize,
        skipped: usize,
    },
    ImportRejected {
        batch_id: String,
        violations: usize,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

/// Event bus for broadcasting store events
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: StoreEvent) {
        trace!(event = ?event, "Emitting store event");
        // no subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::ImportStarted { batch_id, rows } => {
                info!(batch_id = %batch_id, rows, "Import started");
            }
            StoreEvent::EntityImported { name, action, .. } => {
                debug!(name = %name, ?action, "Entity imported");
            }
            StoreEvent::EntitySkipped { row_index, name, kind, message, .. } => {
                warn!(
                    row = row_index,
                    name = name.as_deref().unwrap_or("<unknown>"),
                    ?kind,
                    "Entity skipped: {}",
                    message
                );
            }
            StoreEvent::ImportCompleted { batch_id, persisted, skipped } => {
                info!(batch_id = %batch_id, persisted, skipped, "Import completed");
            }
            StoreEvent::ImportRejected { batch_id, violations } => {
                warn!(batch_id = %batch_id, violations, "Import rejected");
            }
            _ => {
                trace!(event = ?event, "Store event");
            }
        }
    }
}

/// Deliver every queued event to `listener`, returning how many were handled
pub fn drain_events(receiver: &mut broadcast::Receiver<StoreEvent>, listener: &dyn EventListener) -> usize {
    let mut handled = 0;
    loop {
        match receiver.try_recv() {
            Ok(event) => {
                listener.on_event(&event);
                handled += 1;
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                debug!(skipped = n, "Event listener lagged, skipped events");
            }
            Err(broadcast::error::TryRecvError::Empty) | Err(broadcast::error::TryRecvError::Closed) => {
                break;
            }
        }
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<StoreEvent>>);

    impl EventListener for Collect {
        fn on_event(&self, event: &StoreEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(StoreEvent::StatisticsRecomputed { categories: 3 });
        bus.emit(StoreEvent::ImportCompleted { batch_id: "b".into(), persisted: 2, skipped: 1 });

        let collect = Collect(Mutex::new(vec![]));
        assert_eq!(drain_events(&mut receiver, &collect), 2);
        let events = collect.0.lock().unwrap();
        assert_eq!(events[0], StoreEvent::StatisticsRecomputed { categories: 3 });
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(StoreEvent::StatisticsRecomputed { categories: 0 });
    }
}
