//! EventSink trait - the boundary to the remote error-tracking system

use async_trait::async_trait;

use crate::error::SinkResult;
use crate::models::ReportableEvent;

/// Destination for reportable events
///
/// Implementations perform a single delivery attempt; retry, backoff and
/// queueing belong to the dispatcher. Delivery is at-least-once, so a sink
/// may see the same code more than once across reconnect cycles.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &str;

    /// Submit one event
    ///
    /// `Ok(())` acknowledges delivery. `SinkError::Transient` asks for a
    /// retry; `SinkError::Permanent` means the event will never be accepted.
    async fn submit(&self, event: &ReportableEvent) -> SinkResult;
}
