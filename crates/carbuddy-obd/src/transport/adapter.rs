//! Adapter link trait and query types

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LinkError;

/// Abstract queries understood by every adapter link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Check that the vehicle side answers (ignition on, bus up)
    VerifyVehicleLink,
    /// Read stored trouble codes (OBD mode 03)
    QueryTroubleCodes,
    /// Clear stored trouble codes (OBD mode 04)
    ClearTroubleCodes,
    /// Read the vehicle identification number (OBD mode 09 PID 02)
    ReadVin,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryKind::VerifyVehicleLink => "verify_vehicle_link",
            QueryKind::QueryTroubleCodes => "query_trouble_codes",
            QueryKind::ClearTroubleCodes => "clear_trouble_codes",
            QueryKind::ReadVin => "read_vin",
        };
        f.write_str(s)
    }
}

/// Successful query outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResponse {
    /// Vehicle answered; protocol description when the adapter reports one
    VehicleLink { protocol: Option<String> },
    /// Raw code strings as reported, not yet validated
    TroubleCodes(Vec<String>),
    /// Stored codes were cleared
    Cleared,
    /// VIN if the vehicle supports the request
    Vin(Option<String>),
    /// Adapter is fine but the vehicle side is silent
    NoVehicleLink(String),
}

/// Transport-agnostic interface to an OBD-II adapter
///
/// At most one session per endpoint may be open at a time, across the whole
/// process. Operations on one link are serialized by the implementation, and
/// every operation completes or fails within its `timeout`.
#[async_trait]
pub trait AdapterLink: Send + Sync {
    /// Endpoint identifier (device path, host:port, mock name)
    fn endpoint(&self) -> String;

    /// Open the session and initialize the adapter
    ///
    /// Fails with `LinkError::Busy` if a session on this endpoint is already
    /// open.
    async fn connect(&self, timeout: Duration) -> Result<(), LinkError>;

    /// Run one query on the open session
    ///
    /// Fails with `LinkError::Closed` if no session is open.
    async fn send_query(
        &self,
        kind: QueryKind,
        timeout: Duration,
    ) -> Result<QueryResponse, LinkError>;

    /// Close the session and release the endpoint. Idempotent.
    async fn disconnect(&self);
}
