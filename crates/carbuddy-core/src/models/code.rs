//! Trouble code models (validated DTC identifiers and tracked codes)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::severity::Severity;
use crate::error::CodeError;

/// DTC category based on the first character of the code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcCategory {
    /// P codes - Powertrain (engine, transmission)
    Powertrain,
    /// C codes - Chassis (ABS, suspension)
    Chassis,
    /// B codes - Body (airbags, climate control)
    Body,
    /// U codes - Network (communication)
    Network,
}

impl DtcCategory {
    /// Get category from the two high bits of the first DTC byte
    pub fn from_dtc_high_byte(high_byte: u8) -> Self {
        match (high_byte >> 6) & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    /// Get category from its prefix letter
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }

    /// Get category prefix character
    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

impl fmt::Display for DtcCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtcCategory::Powertrain => "powertrain",
            DtcCategory::Chassis => "chassis",
            DtcCategory::Body => "body",
            DtcCategory::Network => "network",
        };
        f.write_str(s)
    }
}

/// A validated trouble code identifier such as `P0301`
///
/// Exactly one system letter (`P`, `C`, `B`, `U`) followed by four decimal
/// digits. Anything else is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DtcCode(String);

impl DtcCode {
    /// Validate a raw code string (surrounding whitespace is ignored)
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        let code = raw.trim();
        if code.len() != 5 || !code.is_ascii() {
            return Err(CodeError::Length(raw.to_string()));
        }

        let mut chars = code.chars();
        let prefix = chars.next().unwrap_or_default();
        if DtcCategory::from_prefix(prefix).is_none() {
            return Err(CodeError::System(raw.to_string()));
        }
        if !chars.all(|c| c.is_ascii_digit()) {
            return Err(CodeError::Digits(raw.to_string()));
        }

        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// System category derived from the leading letter
    pub fn category(&self) -> DtcCategory {
        // Validated at construction, the fallback is unreachable
        self.0
            .chars()
            .next()
            .and_then(DtcCategory::from_prefix)
            .unwrap_or(DtcCategory::Powertrain)
    }

    /// Leading letter (`P`, `C`, `B` or `U`)
    pub fn prefix(&self) -> char {
        self.category().prefix()
    }

    /// The four digits as a number, e.g. `P0301` -> 301
    pub fn number(&self) -> u16 {
        self.0[1..].parse().unwrap_or(0)
    }

    /// Affected vehicle system, used for grouping in the sink
    pub fn system(&self) -> &'static str {
        let code = self.as_str();
        match self.category() {
            DtcCategory::Powertrain if code.starts_with("P030") => "ignition_system",
            DtcCategory::Powertrain if code.starts_with("P017") => "fuel_system",
            DtcCategory::Powertrain if code.starts_with("P042") => "emissions_catalyst",
            DtcCategory::Powertrain => "powertrain",
            DtcCategory::Body => "body_control",
            DtcCategory::Chassis => "chassis_control",
            DtcCategory::Network => "network_communication",
        }
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DtcCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DtcCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DtcCode> for String {
    fn from(code: DtcCode) -> Self {
        code.0
    }
}

/// A trouble code currently reported by the vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroubleCode {
    /// Validated code identifier
    pub code: DtcCode,
    /// Human-readable description
    pub description: String,
    /// When the code was first observed in the current active streak
    pub first_seen_at: DateTime<Utc>,
    /// Classified severity
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_codes() {
        for raw in ["P0301", "C0420", "B1234", "U0100", " P0171\r"] {
            let code = DtcCode::parse(raw).unwrap();
            assert_eq!(code.as_str(), raw.trim());
        }
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        assert!(matches!(DtcCode::parse("X9999"), Err(CodeError::System(_))));
        assert!(matches!(DtcCode::parse("P12"), Err(CodeError::Length(_))));
        assert!(matches!(DtcCode::parse("P03011"), Err(CodeError::Length(_))));
        assert!(matches!(DtcCode::parse("P0A80"), Err(CodeError::Digits(_))));
        assert!(matches!(DtcCode::parse("p0301"), Err(CodeError::System(_))));
        assert!(matches!(DtcCode::parse(""), Err(CodeError::Length(_))));
        assert!(DtcCode::parse("P03\u{e9}1").is_err());
    }

    #[test]
    fn test_category_and_number() {
        let code = DtcCode::parse("C0420").unwrap();
        assert_eq!(code.category(), DtcCategory::Chassis);
        assert_eq!(code.prefix(), 'C');
        assert_eq!(code.number(), 420);
        assert_eq!(code.category().to_string(), "chassis");
    }

    #[test]
    fn test_category_from_high_byte() {
        assert_eq!(DtcCategory::from_dtc_high_byte(0x01), DtcCategory::Powertrain);
        assert_eq!(DtcCategory::from_dtc_high_byte(0x44), DtcCategory::Chassis);
        assert_eq!(DtcCategory::from_dtc_high_byte(0x92), DtcCategory::Body);
        assert_eq!(DtcCategory::from_dtc_high_byte(0xC1), DtcCategory::Network);
    }

    #[test]
    fn test_system_tags() {
        let system = |raw: &str| DtcCode::parse(raw).unwrap().system();
        assert_eq!(system("P0302"), "ignition_system");
        assert_eq!(system("P0171"), "fuel_system");
        assert_eq!(system("P0420"), "emissions_catalyst");
        assert_eq!(system("P0101"), "powertrain");
        assert_eq!(system("B0001"), "body_control");
        assert_eq!(system("C0035"), "chassis_control");
        assert_eq!(system("U0100"), "network_communication");
    }

    #[test]
    fn test_serde_validates() {
        let code: DtcCode = serde_json::from_str("\"P0420\"").unwrap();
        assert_eq!(code.as_str(), "P0420");
        assert!(serde_json::from_str::<DtcCode>("\"Z0420\"").is_err());
    }
}
