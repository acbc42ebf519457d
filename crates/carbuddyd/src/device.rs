//! Device context detection

use std::path::Path;

use carbuddy_core::DeviceContext;
use tracing::debug;

use crate::config::DeviceConfig;

/// Hardware facts read from `/proc`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    pub model: Option<String>,
    pub serial: Option<String>,
    pub revision: Option<String>,
}

/// Read model, serial and revision from a procfs root
pub fn read_board_info(proc_root: &Path) -> BoardInfo {
    let mut info = BoardInfo {
        model: std::fs::read_to_string(proc_root.join("device-tree/model"))
            .ok()
            .map(|m| m.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
            .filter(|m| !m.is_empty()),
        ..Default::default()
    };

    if let Ok(cpuinfo) = std::fs::read_to_string(proc_root.join("cpuinfo")) {
        for line in cpuinfo.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "Serial" if info.serial.is_none() => info.serial = Some(value.to_string()),
                "Revision" if info.revision.is_none() => info.revision = Some(value.to_string()),
                "Model" if info.model.is_none() => info.model = Some(value.to_string()),
                _ => {}
            }
        }
    }

    info
}

fn read_hostname(proc_root: &Path) -> Option<String> {
    std::fs::read_to_string(proc_root.join("sys/kernel/hostname"))
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// "Raspberry Pi Zero W Rev 1.1" -> "raspberry_pi_zero_w"
pub fn device_type_from_model(model: &str) -> String {
    let base = model.split(" Rev ").next().unwrap_or(model);
    let mut slug = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Detect the device context of the running host
pub fn detect(config: &DeviceConfig) -> DeviceContext {
    detect_from(config, Path::new("/proc"))
}

/// Merge configured identifiers over what the board reports
pub fn detect_from(config: &DeviceConfig, proc_root: &Path) -> DeviceContext {
    let board = read_board_info(proc_root);
    let hostname = read_hostname(proc_root);
    debug!(?board, ?hostname, "Board info");

    let device_id = config
        .device_id
        .clone()
        .or_else(|| board.serial.clone())
        .or_else(|| hostname.clone())
        .unwrap_or_else(|| "carbuddy-unknown".to_string());

    let device_type = config
        .device_type
        .clone()
        .or_else(|| board.model.as_deref().map(device_type_from_model));

    let mut extra = config.extra.clone();
    if let Some(model) = &board.model {
        extra.entry("board_model".to_string()).or_insert_with(|| model.clone());
    }
    if let Some(revision) = &board.revision {
        extra
            .entry("board_revision".to_string())
            .or_insert_with(|| revision.clone());
    }

    DeviceContext {
        device_id,
        device_type,
        application: Some(config.application.clone()),
        hostname,
        hardware_serial: board.serial,
        vehicle_id: None,
        extra,
    }
}
