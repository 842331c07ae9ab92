//! The outbound event stream.
//!
//! The scheduler emits one [`PipelineEvent`](crate::core::PipelineEvent) per
//! lifecycle transition into whatever [`EventSink`] the run was given.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
