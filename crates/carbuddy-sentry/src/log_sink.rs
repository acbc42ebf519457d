//! Sink that only writes events to the log

use async_trait::async_trait;
use carbuddy_core::{EventKind, EventSink, ReportableEvent, Severity, SinkResult};
use tracing::{info, warn};

/// Used when no Sentry DSN is configured
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn submit(&self, event: &ReportableEvent) -> SinkResult {
        match (event.kind(), event.severity()) {
            (EventKind::Appeared, Severity::Critical | Severity::Warning) => warn!(
                event_id = %event.id(),
                code = %event.code(),
                severity = %event.severity(),
                system = event.code().system(),
                description = event.description(),
                device_id = %event.device().device_id,
                "Trouble code reported"
            ),
            _ => info!(
                event_id = %event.id(),
                code = %event.code(),
                kind = %event.kind(),
                severity = %event.severity(),
                description = event.description(),
                device_id = %event.device().device_id,
                "Trouble code event"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use carbuddy_core::{DeviceContext, DtcCode, TroubleCode};
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn test_log_sink_always_accepts() {
        let code = TroubleCode {
            code: DtcCode::parse("P0420").unwrap(),
            description: "Catalyst".to_string(),
            first_seen_at: Utc::now(),
            severity: Severity::Warning,
        };
        let sink = LogSink::new();
        let appeared = ReportableEvent::appeared(&code, Utc::now(), DeviceContext::default());
        let resolved = ReportableEvent::resolved(&code, Utc::now(), DeviceContext::default());

        assert_eq!(sink.name(), "log");
        assert!(sink.submit(&appeared).await.is_ok());
        assert!(sink.submit(&resolved).await.is_ok());
    }
}
