//! carbuddy-sentry - Event sinks for CarBuddy
//!
//! [`SentrySink`] posts each [`carbuddy_core::ReportableEvent`] to the Sentry
//! store API and classifies the outcome as delivered, transient or permanent.
//! [`LogSink`] is the fallback when no DSN is configured.

pub mod config;
pub mod dsn;
pub mod error;
pub mod log_sink;
pub mod payload;
pub mod sink;

pub use config::SentryConfig;
pub use dsn::Dsn;
pub use error::SentryError;
pub use log_sink::LogSink;
pub use payload::{Level, SentryEvent};
pub use sink::{classify_status, SentrySink};
