//! Adapter transport configuration

use serde::{Deserialize, Serialize};

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Serial or RFCOMM device (e.g. `/dev/rfcomm0`)
    Serial(SerialConfig),
    /// ELM327 WiFi adapter speaking raw TCP
    Tcp(TcpConfig),
    /// Scripted adapter for testing and `--mock`
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

impl TransportConfig {
    /// Endpoint identifier used for logging and leases
    pub fn endpoint(&self) -> String {
        match self {
            TransportConfig::Serial(cfg) => cfg.path.clone(),
            TransportConfig::Tcp(cfg) => format!("{}:{}", cfg.host, cfg.port),
            TransportConfig::Mock(cfg) => format!("mock://{}", cfg.name),
        }
    }
}

/// Serial / RFCOMM configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/rfcomm0", "/dev/ttyUSB0")
    pub path: String,
    /// Line speed; ignored by RFCOMM devices
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Bring the Bluetooth device up with bluetoothctl before opening
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bluetooth: Option<BluetoothConfig>,
}

fn default_baud_rate() -> u32 {
    38400
}

/// Bluetooth pre-connect settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothConfig {
    /// Adapter MAC address (e.g., "00:1D:A5:68:98:8B")
    pub mac: String,
    /// Timeout for each bluetoothctl invocation in seconds
    #[serde(default = "default_bluetooth_timeout")]
    pub timeout_secs: u64,
}

fn default_bluetooth_timeout() -> u64 {
    10
}

/// TCP (WiFi adapter) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Adapter IP address or hostname
    pub host: String,
    /// Adapter TCP port (default: 35000)
    #[serde(default = "default_tcp_port")]
    pub port: u16,
}

fn default_tcp_port() -> u16 {
    35000
}

/// Mock adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Endpoint name, must be unique per process
    #[serde(default = "default_mock_name")]
    pub name: String,
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Whether the simulated vehicle answers
    #[serde(default = "default_ignition_on")]
    pub ignition_on: bool,
    /// Codes reported by the simulated vehicle
    #[serde(default)]
    pub codes: Vec<String>,
    /// VIN reported by the simulated vehicle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
}

fn default_mock_name() -> String {
    "elm327".to_string()
}

fn default_ignition_on() -> bool {
    true
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: default_mock_name(),
            latency_ms: 0,
            ignition_on: default_ignition_on(),
            codes: Vec::new(),
            vin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_from_toml() {
        let config: TransportConfig = toml::from_str(
            r#"
            type = "serial"
            path = "/dev/rfcomm0"

            [bluetooth]
            mac = "00:1D:A5:68:98:8B"
            "#,
        )
        .unwrap();

        match config {
            TransportConfig::Serial(cfg) => {
                assert_eq!(cfg.path, "/dev/rfcomm0");
                assert_eq!(cfg.baud_rate, 38400);
                let bt = cfg.bluetooth.unwrap();
                assert_eq!(bt.mac, "00:1D:A5:68:98:8B");
                assert_eq!(bt.timeout_secs, 10);
            }
            other => panic!("expected serial transport, got {:?}", other),
        }
    }

    #[test]
    fn test_tcp_and_mock_defaults() {
        let tcp: TransportConfig = toml::from_str(
            r#"
            type = "tcp"
            host = "192.168.0.10"
            "#,
        )
        .unwrap();
        assert_eq!(tcp.endpoint(), "192.168.0.10:35000");

        let mock: TransportConfig = toml::from_str("type = \"mock\"").unwrap();
        assert_eq!(mock, TransportConfig::default());
        assert_eq!(mock.endpoint(), "mock://elm327");
    }
}
