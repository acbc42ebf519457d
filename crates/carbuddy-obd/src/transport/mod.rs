//! Transport layer for ELM327 adapters
//!
//! This module provides adapter links:
//! - ELM327 over a serial/RFCOMM device (with optional Bluetooth pre-connect)
//! - ELM327 over TCP (WiFi adapters)
//! - Mock link for testing
//!
//! # Example
//!
//! ```ignore
//! use carbuddy_obd::transport::{create_link, QueryKind};
//! use carbuddy_obd::config::TransportConfig;
//!
//! let link = create_link(&TransportConfig::Mock(Default::default()))?;
//! link.connect(Duration::from_secs(10)).await?;
//! let codes = link.send_query(QueryKind::QueryTroubleCodes, Duration::from_secs(5)).await?;
//! ```

mod adapter;
pub mod bluetooth;
pub mod elm327;
pub mod lease;
pub mod mock;
pub mod stream;

pub use adapter::{AdapterLink, QueryKind, QueryResponse};
pub use elm327::Elm327Link;
pub use lease::EndpointLease;
pub use mock::MockAdapterLink;

use std::sync::Arc;

use crate::config::TransportConfig;
use crate::error::LinkError;

/// Create an adapter link based on configuration
///
/// Nothing is opened here; the first `connect` opens the session.
pub fn create_link(config: &TransportConfig) -> Result<Arc<dyn AdapterLink>, LinkError> {
    match config {
        #[cfg(feature = "serial")]
        TransportConfig::Serial(cfg) => {
            let connector = stream::SerialConnector::new(&cfg.path, cfg.baud_rate);
            let mut link = Elm327Link::new(Box::new(connector));
            if let Some(bt) = &cfg.bluetooth {
                link = link.with_bluetooth(bluetooth::BluetoothDevice::new(bt));
            }
            Ok(Arc::new(link))
        }
        #[cfg(not(feature = "serial"))]
        TransportConfig::Serial(_) => Err(LinkError::Unsupported(
            "serial adapters require the 'serial' feature".to_string(),
        )),
        TransportConfig::Tcp(cfg) => {
            let connector = stream::TcpConnector::new(&cfg.host, cfg.port);
            Ok(Arc::new(Elm327Link::new(Box::new(connector))))
        }
        TransportConfig::Mock(cfg) => Ok(Arc::new(MockAdapterLink::new(cfg))),
    }
}
