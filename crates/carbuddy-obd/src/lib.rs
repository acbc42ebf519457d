//! carbuddy-obd - OBD-II adapter link
//!
//! This crate owns the transport to an ELM327-family diagnostic adapter and
//! exposes it through the [`AdapterLink`] trait: connect, send one of a small
//! set of abstract queries, disconnect. Every operation is bounded by a
//! caller-supplied timeout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 dyn AdapterLink                      │
//! │                                                      │
//! │   ┌───────────────────┐      ┌───────────────────┐   │
//! │   │ Elm327Link        │      │ MockAdapterLink   │   │
//! │   │ (AT session, OBD  │      │ (scripted, tests) │   │
//! │   │  mode 01/03/04/09)│      └───────────────────┘   │
//! │   └─────────┬─────────┘                              │
//! │             │                                        │
//! │   ┌─────────┴─────────┐  ┌──────────────┐            │
//! │   │ Connector         │  │ bluetoothctl │            │
//! │   │ (serial / TCP)    │  │ pre-connect  │            │
//! │   └───────────────────┘  └──────────────┘            │
//! │             EndpointLease (one session per endpoint) │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod obd;
pub mod transport;

pub use config::{BluetoothConfig, MockConfig, SerialConfig, TcpConfig, TransportConfig};
pub use error::LinkError;
pub use transport::{
    create_link, AdapterLink, Elm327Link, EndpointLease, MockAdapterLink, QueryKind,
    QueryResponse,
};
