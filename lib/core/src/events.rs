use crate::models::{Operation, ResultStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Enum representing gateway events
#[derive(Clone, Debug)]
pub enum GatewayEvent {
    /// A processor-facing operation finished. Carries what the host records
    /// in its gateway log.
    OperationCompleted {
        operation: Operation,
        status: ResultStatus,
        raw_data: Value,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Called when an event occurs
    fn on_event(&self, event: &GatewayEvent);
}

/// Event emitter for gateway events
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<HashMap<String, Box<dyn EventListener>>>,
}

impl EventEmitter {
    /// Creates a new event emitter
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, Box<dyn EventListener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a listener to the event emitter
    ///
    /// # Arguments
    ///
    /// * `listener` - The listener to add
    ///
    /// # Returns
    ///
    /// A unique ID for the listener
    pub fn add_listener(&self, listener: Box<dyn EventListener>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.listeners().insert(id.clone(), listener);
        id
    }

    /// Removes a listener from the event emitter
    ///
    /// # Returns
    ///
    /// `true` if the listener was found and removed, `false` otherwise
    pub fn remove_listener(&self, id: &str) -> bool {
        self.listeners().remove(id).is_some()
    }

    /// Emits an event to all listeners
    pub fn emit(&self, event: &GatewayEvent) {
        for listener in self.listeners().values() {
            listener.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct Recorder(Arc<Mutex<Vec<GatewayEvent>>>);

    impl EventListener for Recorder {
        fn on_event(&self, event: &GatewayEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn completed() -> GatewayEvent {
        GatewayEvent::OperationCompleted {
            operation: Operation::Refund,
            status: ResultStatus::Success,
            raw_data: json!({"success": true}),
        }
    }

    #[test]
    fn test_emit_reaches_listener_until_removed() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = emitter.add_listener(Box::new(Recorder(seen.clone())));

        emitter.emit(&completed());
        assert_eq!(1, seen.lock().unwrap().len());

        assert!(emitter.remove_listener(&id));
        assert!(!emitter.remove_listener(&id));
        emitter.emit(&completed());
        assert_eq!(1, seen.lock().unwrap().len());
    }
}
