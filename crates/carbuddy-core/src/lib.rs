//! carbuddy-core - Core models and traits for the CarBuddy monitor
//!
//! This crate holds the types shared by the adapter link, the monitoring
//! pipeline and the event sinks: validated trouble codes, the severity table,
//! reportable events, link state and the `EventSink` abstraction.

pub mod error;
pub mod models;
pub mod sink;

pub use error::{CodeError, SinkError, SinkResult};
pub use models::*;
pub use sink::EventSink;
