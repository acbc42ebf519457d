//! Sentry store-API event payload built from a [`ReportableEvent`]

use std::collections::BTreeMap;

use carbuddy_core::{DeviceContext, EventKind, ReportableEvent, Severity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Sentry event levels used by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl From<Severity> for Level {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Level::Error,
            Severity::Warning => Level::Warning,
            Severity::Info => Level::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
}

/// One event as POSTed to `/api/<project>/store/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentryEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub platform: &'static str,
    pub logger: &'static str,
    pub message: String,
    pub release: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    pub user: User,
    pub tags: BTreeMap<String, String>,
    pub contexts: BTreeMap<String, Value>,
    pub fingerprint: Vec<String>,
}

impl SentryEvent {
    pub fn from_event(event: &ReportableEvent, release: &str, environment: &str) -> Self {
        let code = event.code().as_str();
        let device = event.device();

        let message = match event.kind() {
            EventKind::Appeared => format!(
                "Vehicle Diagnostic Trouble Code: {} - {}",
                code,
                event.description()
            ),
            EventKind::Resolved => format!(
                "Vehicle Diagnostic Trouble Code cleared: {} - {}",
                code,
                event.description()
            ),
        };

        let mut tags = BTreeMap::new();
        tags.insert("dtc_code".to_string(), code.to_string());
        tags.insert("dtc_category".to_string(), event.category().to_string());
        tags.insert("dtc_severity".to_string(), event.severity().to_string());
        tags.insert("dtc_system".to_string(), event.code().system().to_string());
        tags.insert("dtc_event".to_string(), event.kind().to_string());
        tags.insert(
            "error_type".to_string(),
            "diagnostic_trouble_code".to_string(),
        );
        if let Some(vin) = &device.vehicle_id {
            tags.insert("vehicle_id".to_string(), vin.clone());
        }

        let mut contexts = BTreeMap::new();
        contexts.insert(
            "vehicle_diagnostic".to_string(),
            json!({
                "dtc_code": code,
                "description": event.description(),
                "category": event.category().to_string(),
                "severity": event.severity().to_string(),
                "system": event.code().system(),
                "event": event.kind().to_string(),
                "detected_at": event.detected_at(),
            }),
        );
        contexts.insert("device".to_string(), device_context(device));

        Self {
            event_id: event.id().simple().to_string(),
            timestamp: event.detected_at(),
            level: event.severity().into(),
            platform: "other",
            logger: "carbuddy",
            message,
            release: release.to_string(),
            environment: environment.to_string(),
            server_name: device.hostname.clone(),
            user: User::from(device),
            tags,
            contexts,
            fingerprint: vec!["dtc".to_string(), code.to_string()],
        }
    }

    /// Info-level message sent once at startup to confirm the DSN is accepted
    pub fn startup(device: &DeviceContext, release: &str, environment: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("event_type".to_string(), "startup".to_string());

        let mut contexts = BTreeMap::new();
        contexts.insert("device".to_string(), device_context(device));

        Self {
            event_id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            level: Level::Info,
            platform: "other",
            logger: "carbuddy",
            message: "CarBuddy started: Sentry connection test".to_string(),
            release: release.to_string(),
            environment: environment.to_string(),
            server_name: device.hostname.clone(),
            user: User::from(device),
            tags,
            contexts,
            fingerprint: vec!["carbuddy".to_string(), "startup".to_string()],
        }
    }
}

impl From<&DeviceContext> for User {
    fn from(device: &DeviceContext) -> Self {
        Self {
            id: device.device_id.clone(),
            device_type: device.device_type.clone(),
            application: device.application.clone(),
        }
    }
}

fn device_context(device: &DeviceContext) -> Value {
    let mut context = json!({
        "type": "device",
        "device_id": device.device_id,
    });
    if let Value::Object(map) = &mut context {
        if let Some(model) = &device.device_type {
            map.insert("model".to_string(), json!(model));
        }
        if let Some(serial) = &device.hardware_serial {
            map.insert("serial".to_string(), json!(serial));
        }
        for (key, value) in &device.extra {
            map.insert(key.clone(), json!(value));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use carbuddy_core::{DtcCode, TroubleCode};
    use pretty_assertions::assert_eq;

    use super::*;

    fn device() -> DeviceContext {
        DeviceContext {
            device_id: "00000000a1b2c3d4".to_string(),
            device_type: Some("raspberry_pi_zero_w".to_string()),
            application: Some("carbuddy".to_string()),
            hostname: Some("carbuddy-pi".to_string()),
            vehicle_id: Some("1HGCM82633A004352".to_string()),
            ..Default::default()
        }
    }

    fn trouble(code: &str, severity: Severity) -> TroubleCode {
        TroubleCode {
            code: DtcCode::parse(code).unwrap(),
            description: "Cylinder 1 Misfire Detected".to_string(),
            first_seen_at: Utc::now(),
            severity,
        }
    }

    #[test]
    fn test_appeared_event_shape() {
        let event =
            ReportableEvent::appeared(&trouble("P0301", Severity::Critical), Utc::now(), device());
        let payload = SentryEvent::from_event(&event, "carbuddy@0.1.0", "production");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["level"], "error");
        assert_eq!(
            json["message"],
            "Vehicle Diagnostic Trouble Code: P0301 - Cylinder 1 Misfire Detected"
        );
        assert_eq!(json["event_id"].as_str().unwrap().len(), 32);
        assert_eq!(json["fingerprint"], json!(["dtc", "P0301"]));
        assert_eq!(json["tags"]["dtc_category"], "powertrain");
        assert_eq!(json["tags"]["dtc_system"], "ignition_system");
        assert_eq!(json["tags"]["error_type"], "diagnostic_trouble_code");
        assert_eq!(json["tags"]["vehicle_id"], "1HGCM82633A004352");
        assert_eq!(json["contexts"]["vehicle_diagnostic"]["severity"], "critical");
        assert_eq!(json["contexts"]["device"]["model"], "raspberry_pi_zero_w");
        assert_eq!(json["user"]["id"], "00000000a1b2c3d4");
        assert_eq!(json["server_name"], "carbuddy-pi");
        assert_eq!(json["release"], "carbuddy@0.1.0");
    }

    #[test]
    fn test_resolved_event_is_info() {
        let event =
            ReportableEvent::resolved(&trouble("P0301", Severity::Critical), Utc::now(), device());
        let payload = SentryEvent::from_event(&event, "carbuddy@0.1.0", "production");

        assert_eq!(payload.level, Level::Info);
        assert!(payload.message.contains("cleared"));
        assert_eq!(payload.tags["dtc_event"], "resolved");
        // Same fingerprint groups both transitions under one issue
        assert_eq!(payload.fingerprint, vec!["dtc", "P0301"]);
    }

    #[test]
    fn test_warning_level() {
        let event = ReportableEvent::appeared(
            &trouble("B1234", Severity::Warning),
            Utc::now(),
            DeviceContext::default(),
        );
        let payload = SentryEvent::from_event(&event, "r", "e");
        assert_eq!(payload.level, Level::Warning);
        assert!(payload.server_name.is_none());
        assert!(!payload.tags.contains_key("vehicle_id"));
    }

    #[test]
    fn test_startup_event_shape() {
        let payload = SentryEvent::startup(&device(), "carbuddy@0.1.0", "staging");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["level"], "info");
        assert_eq!(json["tags"]["event_type"], "startup");
        assert_eq!(json["environment"], "staging");
        assert_eq!(json["user"]["id"], "00000000a1b2c3d4");
        assert_eq!(json["contexts"]["device"]["model"], "raspberry_pi_zero_w");
        assert!(json["contexts"].get("vehicle_diagnostic").is_none());
        assert_eq!(json["fingerprint"], json!(["carbuddy", "startup"]));
    }
}
