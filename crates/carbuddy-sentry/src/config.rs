//! Sentry sink configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[sentry]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Project DSN, `https://<key>@<host>/<project>`
    pub dsn: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Overrides the default `carbuddy@<version>` release tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl SentryConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            environment: default_environment(),
            release: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn release(&self) -> String {
        self.release
            .clone()
            .unwrap_or_else(|| format!("carbuddy@{}", env!("CARGO_PKG_VERSION")))
    }
}
