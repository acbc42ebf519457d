//! Reportable events handed to the outbound sink

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::code::{DtcCategory, DtcCode, TroubleCode};
use super::severity::Severity;

/// Identifiers describing the device and vehicle an event came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceContext {
    /// Stable device identifier (hardware serial or configured id)
    pub device_id: String,
    /// Hardware type, e.g. "raspberry_pi_zero_w"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Application name reported with every event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Board serial number when the hardware exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_serial: Option<String>,
    /// Vehicle identification number, once read from the ECU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    /// Free-form additional identifiers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Transition that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Code became active
    Appeared,
    /// Previously active code is no longer reported
    Resolved,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Appeared => f.write_str("appeared"),
            EventKind::Resolved => f.write_str("resolved"),
        }
    }
}

/// An event ready for submission. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportableEvent {
    id: Uuid,
    kind: EventKind,
    code: DtcCode,
    description: String,
    severity: Severity,
    detected_at: DateTime<Utc>,
    device: DeviceContext,
}

impl ReportableEvent {
    /// Event for a newly active code
    pub fn appeared(code: &TroubleCode, detected_at: DateTime<Utc>, device: DeviceContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: EventKind::Appeared,
            code: code.code.clone(),
            description: code.description.clone(),
            severity: code.severity,
            detected_at,
            device,
        }
    }

    /// Lower-severity event for a code that cleared
    pub fn resolved(code: &TroubleCode, detected_at: DateTime<Utc>, device: DeviceContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: EventKind::Resolved,
            code: code.code.clone(),
            description: code.description.clone(),
            severity: Severity::Info,
            detected_at,
            device,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn code(&self) -> &DtcCode {
        &self.code
    }

    pub fn category(&self) -> DtcCategory {
        self.code.category()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }
}
