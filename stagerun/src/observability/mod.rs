//! Span timing and span attribute helpers.

mod spans;

pub use spans::{PipelineSpanAttributes, SpanTimer, StageSpanAttributes};
