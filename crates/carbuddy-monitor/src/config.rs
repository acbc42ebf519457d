//! Monitor and dispatch configuration

use std::time::Duration;

use carbuddy_core::SeverityTable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Monitor Configuration
// =============================================================================

/// Supervisor and poller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between trouble code queries while the vehicle is ready
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// First reconnect delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    /// Reconnect delay cap in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Consecutive failed verifications before a full reconnect
    #[serde(default = "default_verify_retry_limit")]
    pub verify_retry_limit: u32,
    /// Seconds between verification attempts while degraded
    #[serde(default = "default_verify_interval")]
    pub verify_interval_secs: u64,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-query timeout in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
    /// Severity classification table
    #[serde(default)]
    pub severity: SeverityTable,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_initial_backoff() -> u64 {
    1_000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_verify_retry_limit() -> u32 {
    3
}

fn default_verify_interval() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    15_000
}

fn default_command_timeout() -> u64 {
    5_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            verify_retry_limit: default_verify_retry_limit(),
            verify_interval_secs: default_verify_interval(),
            connect_timeout_ms: default_connect_timeout(),
            command_timeout_ms: default_command_timeout(),
            severity: SeverityTable::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("monitor.poll_interval_secs", self.poll_interval_secs)?;
        positive("monitor.initial_backoff_ms", self.initial_backoff_ms)?;
        positive("monitor.verify_interval_secs", self.verify_interval_secs)?;
        positive("monitor.connect_timeout_ms", self.connect_timeout_ms)?;
        positive("monitor.command_timeout_ms", self.command_timeout_ms)?;
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "monitor.max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        if self.verify_retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "monitor.verify_retry_limit must be at least 1".to_string(),
            ));
        }
        self.severity.validate().map_err(ConfigError::Invalid)
    }
}

// =============================================================================
// Dispatch Configuration
// =============================================================================

/// Outbound queue and retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bounded queue capacity; newest events are dropped when full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Emit an info-level event when a code clears
    #[serde(default = "default_report_resolved")]
    pub report_resolved: bool,
    /// Retries after the first failed submission
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds
    #[serde(default = "default_retry_initial")]
    pub retry_initial_ms: u64,
    /// Retry delay cap in milliseconds
    #[serde(default = "default_retry_max")]
    pub retry_max_ms: u64,
    /// Time allowed to drain the queue on shutdown, in seconds
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_secs: u64,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_report_resolved() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_initial() -> u64 {
    1_000
}

fn default_retry_max() -> u64 {
    30_000
}

fn default_flush_timeout() -> u64 {
    5
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            report_resolved: default_report_resolved(),
            max_retries: default_max_retries(),
            retry_initial_ms: default_retry_initial(),
            retry_max_ms: default_retry_max(),
            flush_timeout_secs: default_flush_timeout(),
        }
    }
}

impl DispatchConfig {
    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        positive("dispatch.retry_initial_ms", self.retry_initial_ms)?;
        if self.retry_max_ms < self.retry_initial_ms {
            return Err(ConfigError::Invalid(format!(
                "dispatch.retry_max_ms ({}) is below retry_initial_ms ({})",
                self.retry_max_ms, self.retry_initial_ms
            )));
        }
        Ok(())
    }
}

fn positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{} must be positive", name)));
    }
    Ok(())
}
