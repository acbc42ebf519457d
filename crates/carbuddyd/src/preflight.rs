//! Startup checks
//!
//! Both checks are best effort: they log what they find and never stop the
//! daemon. The supervisor keeps retrying the adapter and the dispatcher keeps
//! retrying Sentry regardless of the outcome.

use carbuddy_core::DeviceContext;
use carbuddy_obd::transport::bluetooth::{BluetoothDevice, PairingState};
use carbuddy_obd::TransportConfig;
use carbuddy_sentry::SentrySink;
use tracing::{error, info, warn};

/// Send the startup message to Sentry; returns whether it was accepted
pub async fn check_sentry(sink: &SentrySink, device: &DeviceContext) -> bool {
    match sink.test_connection(device).await {
        Ok(()) => {
            info!(dsn = %sink.dsn(), "Sentry connection test delivered");
            true
        }
        Err(e) if e.is_transient() => {
            warn!(%e, "Sentry unreachable at startup, events will be retried");
            false
        }
        Err(e) => {
            error!(%e, "Sentry rejected the connection test, check the DSN");
            false
        }
    }
}

/// Report BlueZ service and pairing state for a Bluetooth serial adapter
///
/// Returns `None` when the transport has no Bluetooth device or BlueZ could
/// not be queried.
pub async fn check_bluetooth(transport: &TransportConfig) -> Option<PairingState> {
    let TransportConfig::Serial(serial) = transport else {
        return None;
    };
    let device = BluetoothDevice::new(serial.bluetooth.as_ref()?);

    if !device.service_active().await {
        warn!("Bluetooth service is not running");
    }

    match device.state().await {
        Ok(PairingState::Connected) => {
            info!(mac = %device.mac(), "Bluetooth adapter is connected");
            Some(PairingState::Connected)
        }
        Ok(PairingState::Disconnected) => {
            info!(mac = %device.mac(), "Bluetooth adapter paired but not connected yet");
            Some(PairingState::Disconnected)
        }
        Ok(PairingState::NotPaired) => {
            error!(
                mac = %device.mac(),
                "Bluetooth adapter is not paired, this indicates a provisioning issue"
            );
            Some(PairingState::NotPaired)
        }
        Err(e) => {
            warn!(mac = %device.mac(), %e, "Could not query Bluetooth adapter");
            None
        }
    }
}
