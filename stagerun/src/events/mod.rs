//! Event sink system for observability.
//!
//! Lifecycle events (`pipeline.*`, `stage.*`, `scope.*`) and stage findings
//! (`lint.*`, `test.*`) are emitted through the [`EventSink`] installed on the
//! pipeline context. Contexts default to [`NoOpEventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
