//! Bluetooth pre-connect through `bluetoothctl`
//!
//! RFCOMM devices only carry data once the Bluetooth link is up. Before
//! opening the serial device we ask BlueZ whether the adapter is connected
//! and, if not, connect it. An adapter that was never paired cannot be
//! connected from here and is reported as a provisioning problem.

use std::collections::HashMap;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BluetoothConfig;
use crate::error::LinkError;

/// Pairing and connection state of the adapter as BlueZ reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Unknown to BlueZ or not paired; the device needs provisioning
    NotPaired,
    Disconnected,
    Connected,
}

impl PairingState {
    /// Derive the state from `bluetoothctl info` fields
    pub fn from_info(info: &HashMap<String, String>) -> Self {
        let yes = |key: &str| info.get(key).is_some_and(|v| v.eq_ignore_ascii_case("yes"));
        if yes("Connected") {
            PairingState::Connected
        } else if yes("Paired") {
            PairingState::Disconnected
        } else {
            PairingState::NotPaired
        }
    }
}

/// A paired Bluetooth OBD adapter
#[derive(Debug, Clone)]
pub struct BluetoothDevice {
    mac: String,
    timeout: Duration,
}

impl BluetoothDevice {
    pub fn new(config: &BluetoothConfig) -> Self {
        Self {
            mac: config.mac.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// `bluetoothctl info <mac>` as key/value pairs; empty for unknown devices
    pub async fn info(&self) -> Result<HashMap<String, String>, LinkError> {
        let output = self.run("bluetoothctl", &["info", &self.mac]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return Ok(parse_info(&stdout));
        }
        if is_unknown_device(&stdout) {
            return Ok(HashMap::new());
        }
        Err(LinkError::Unavailable(format!(
            "bluetoothctl info {} failed: {}",
            self.mac,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    pub async fn state(&self) -> Result<PairingState, LinkError> {
        Ok(PairingState::from_info(&self.info().await?))
    }

    /// Whether `systemctl is-active bluetooth` reports the BlueZ service running
    pub async fn service_active(&self) -> bool {
        match self.run("systemctl", &["is-active", "bluetooth"]).await {
            Ok(output) => {
                output.status.success()
                    && is_active_reply(&String::from_utf8_lossy(&output.stdout))
            }
            Err(e) => {
                debug!(%e, "Bluetooth service check failed");
                false
            }
        }
    }

    /// Connect unless BlueZ already reports the device connected
    pub async fn ensure_connected(&self) -> Result<(), LinkError> {
        let state = match self.state().await {
            Ok(state) => state,
            Err(e) => {
                if !self.service_active().await {
                    warn!(mac = %self.mac, "Bluetooth service is not running");
                    return Err(LinkError::Unavailable(
                        "bluetooth service is not running".to_string(),
                    ));
                }
                return Err(e);
            }
        };

        match state {
            PairingState::Connected => {
                debug!(mac = %self.mac, "Bluetooth adapter already connected");
                return Ok(());
            }
            PairingState::NotPaired => {
                warn!(
                    mac = %self.mac,
                    "Bluetooth adapter is not paired, device needs provisioning"
                );
                return Err(LinkError::Unavailable(format!(
                    "bluetooth device {} is not paired",
                    self.mac
                )));
            }
            PairingState::Disconnected => {}
        }

        info!(mac = %self.mac, "Connecting Bluetooth adapter");
        let output = self.run("bluetoothctl", &["connect", &self.mac]).await?;
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "bluetoothctl connect failed"
            );
        }

        if self.state().await? != PairingState::Connected {
            warn!(mac = %self.mac, "Bluetooth adapter did not come up");
            return Err(LinkError::Unavailable(format!(
                "bluetooth device {} not connected",
                self.mac
            )));
        }
        info!(mac = %self.mac, "Bluetooth adapter connected");
        Ok(())
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Output, LinkError> {
        tokio::time::timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| LinkError::Timeout(format!("{} {}", program, args.join(" "))))?
        .map_err(|e| LinkError::from_io(e, program))
    }
}

/// `bluetoothctl info` for a device BlueZ has never seen
fn is_unknown_device(stdout: &str) -> bool {
    stdout.contains("not available")
}

fn is_active_reply(stdout: &str) -> bool {
    stdout.trim() == "active"
}

/// Parse `Key: value` lines from `bluetoothctl info`
pub fn parse_info(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let output = "Device 00:1D:A5:68:98:8B (public)\n\
                      \tName: OBDII\n\
                      \tPaired: yes\n\
                      \tConnected: no\n";
        let info = parse_info(output);
        assert_eq!(info.get("Name").map(String::as_str), Some("OBDII"));
        assert_eq!(info.get("Connected").map(String::as_str), Some("no"));
    }

    #[test]
    fn test_pairing_state_from_info() {
        let state = |output: &str| PairingState::from_info(&parse_info(output));

        assert_eq!(
            state("\tPaired: yes\n\tConnected: yes\n"),
            PairingState::Connected
        );
        assert_eq!(
            state("\tPaired: yes\n\tConnected: no\n"),
            PairingState::Disconnected
        );
        assert_eq!(
            state("\tPaired: no\n\tConnected: no\n"),
            PairingState::NotPaired
        );
        // Unknown device: bluetoothctl prints no fields
        assert_eq!(state(""), PairingState::NotPaired);
    }

    #[test]
    fn test_unknown_device_reply() {
        assert!(is_unknown_device("Device 00:1D:A5:68:98:8B not available\n"));
        assert!(!is_unknown_device("Device 00:1D:A5:68:98:8B (public)\n"));
    }

    #[test]
    fn test_service_active_reply() {
        assert!(is_active_reply("active\n"));
        assert!(!is_active_reply("inactive\n"));
        assert!(!is_active_reply("activating\n"));
    }
}
