//! Daemon configuration file

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use carbuddy_monitor::{DispatchConfig, MonitorConfig};
use carbuddy_obd::TransportConfig;
use carbuddy_sentry::{Dsn, SentryConfig};
use serde::{Deserialize, Serialize};

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log filter level when `RUST_LOG` is unset (e.g. "info", "debug")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Events go to the log when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentry: Option<SentryConfig>,
    #[serde(default)]
    pub status: StatusConfig,
}

/// Identifiers merged into the detected device context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Overrides the hardware serial as device id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default = "default_application")]
    pub application: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_application() -> String {
    "carbuddy".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            device_type: None,
            application: default_application(),
            extra: BTreeMap::new(),
        }
    }
}

/// Status endpoint and periodic health log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Serve `GET /health` and `GET /codes`
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds between health log lines, 0 disables them
    #[serde(default = "default_health_log_interval")]
    pub health_log_interval_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_health_log_interval() -> u64 {
    300
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
            health_log_interval_secs: default_health_log_interval(),
        }
    }
}

impl StatusConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("Invalid status bind address {:?}", self.bind))
    }

    pub fn health_log_interval(&self) -> Option<Duration> {
        (self.health_log_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_log_interval_secs))
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.monitor.validate()?;
        self.dispatch.validate()?;

        if let TransportConfig::Serial(serial) = &self.transport {
            if serial.path.trim().is_empty() {
                bail!("transport.path must not be empty");
            }
            if let Some(bt) = &serial.bluetooth {
                if !is_valid_mac(&bt.mac) {
                    bail!("Invalid Bluetooth MAC address {:?}", bt.mac);
                }
            }
        }

        if let Some(sentry) = &self.sentry {
            Dsn::parse(&sentry.dsn).context("Invalid sentry.dsn")?;
        }

        if self.status.enabled {
            self.status.bind_addr()?;
        }

        Ok(())
    }
}

/// Six colon-separated hex octets, e.g. `00:1D:A5:68:98:8B`
pub fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}
