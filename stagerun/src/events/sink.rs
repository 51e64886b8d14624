//! Event sink trait and implementations.

use crate::core::StageEvent;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Trait for sinks that receive lifecycle events.
pub trait EventSink: Send + Sync {
    /// Records an event without blocking.
    ///
    /// This method must never panic. Errors are logged but suppressed.
    fn try_emit(&self, event: &StageEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _event: &StageEvent) {}
}

/// An event sink that forwards events to `tracing`.
///
/// Failure and cancellation events are always logged at WARN; everything
/// else uses the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event: &StageEvent) {
        let stage = event
            .data
            .get("stage")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("-");
        let payload = event.payload();

        if event.event_type.ends_with(".failed") || event.event_type.ends_with(".cancelled") {
            warn!(event_type = %event.event_type, stage, event_data = %payload, "Event: {}", event.event_type);
        } else if self.level == Level::DEBUG {
            debug!(event_type = %event.event_type, stage, event_data = %payload, "Event: {}", event.event_type);
        } else {
            info!(event_type = %event.event_type, stage, event_data = %payload, "Event: {}", event.event_type);
        }
    }
}

/// A collecting event sink, mostly useful in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StageEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.read().clone()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }
}
