//! HTTP sink posting events to the Sentry store API

use std::time::Duration;

use async_trait::async_trait;
use carbuddy_core::{DeviceContext, EventSink, ReportableEvent, SinkError, SinkResult};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::config::SentryConfig;
use crate::dsn::Dsn;
use crate::error::SentryError;
use crate::payload::SentryEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Submits [`ReportableEvent`]s to Sentry, one request per attempt
pub struct SentrySink {
    client: Client,
    dsn: Dsn,
    auth: String,
    release: String,
    environment: String,
}

impl SentrySink {
    pub fn new(config: &SentryConfig) -> Result<Self, SentryError> {
        let dsn = Dsn::parse(&config.dsn)?;
        let client_name = format!("carbuddy/{}", env!("CARGO_PKG_VERSION"));

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout()))
            .user_agent(client_name.clone())
            .build()?;

        Ok(Self {
            auth: dsn.auth_header(&client_name),
            client,
            dsn,
            release: config.release(),
            environment: config.environment.clone(),
        })
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    /// Send one info-level startup message to confirm the DSN is accepted
    ///
    /// Not retried; failures are for the caller to log.
    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    pub async fn test_connection(&self, device: &DeviceContext) -> SinkResult {
        let payload = SentryEvent::startup(device, &self.release, &self.environment);
        self.post(&payload).await
    }

    async fn post(&self, payload: &SentryEvent) -> SinkResult {
        let response = self
            .client
            .post(self.dsn.store_url().clone())
            .header("X-Sentry-Auth", &self.auth)
            .json(payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        debug!(%status, "Sentry responded");
        classify_status(status)
    }
}

/// Map an HTTP status to a delivery outcome
pub fn classify_status(status: StatusCode) -> SinkResult {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Err(SinkError::Transient(format!("HTTP {}", status)))
    } else {
        Err(SinkError::Permanent(format!("HTTP {}", status)))
    }
}

fn classify_transport(err: reqwest::Error) -> SinkError {
    if err.is_builder() {
        SinkError::Permanent(err.to_string())
    } else {
        // connect failures, timeouts and dropped connections
        SinkError::Transient(err.to_string())
    }
}

#[async_trait]
impl EventSink for SentrySink {
    fn name(&self) -> &str {
        "sentry"
    }

    #[instrument(skip(self, event), fields(event_id = %event.id(), code = %event.code()))]
    async fn submit(&self, event: &ReportableEvent) -> SinkResult {
        let payload = SentryEvent::from_event(event, &self.release, &self.environment);
        self.post(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::ACCEPTED).is_ok());

        for transient in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(classify_status(transient).unwrap_err().is_transient());
        }

        for permanent in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::PAYLOAD_TOO_LARGE,
        ] {
            assert!(!classify_status(permanent).unwrap_err().is_transient());
        }
    }

    #[test]
    fn test_rejects_bad_dsn() {
        let result = SentrySink::new(&SentryConfig::new("https://sentry.io/1"));
        assert!(matches!(result, Err(SentryError::InvalidDsn(_))));
    }
}
