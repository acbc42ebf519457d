//! Severity classification for trouble codes

use std::fmt;

use serde::{Deserialize, Serialize};

use super::code::{DtcCategory, DtcCode};

/// Severity levels, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only
    #[default]
    Info,
    /// Warning condition
    Warning,
    /// Critical failure
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Maps an inclusive numeric range of one system letter to a severity
///
/// `{ letter = "P", first = 300, last = 304, severity = "critical" }`
/// matches `P0300` through `P0304`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub letter: char,
    pub first: u16,
    pub last: u16,
    pub severity: Severity,
}

impl SeverityRule {
    pub fn new(letter: char, first: u16, last: u16, severity: Severity) -> Self {
        Self {
            letter,
            first,
            last,
            severity,
        }
    }

    pub fn matches(&self, code: &DtcCode) -> bool {
        let number = code.number();
        code.prefix() == self.letter && (self.first..=self.last).contains(&number)
    }
}

/// Lookup table from code ranges to severity
///
/// Classification is a pure function of the code: when several rules match
/// the highest severity wins, so rule order never changes the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityTable {
    /// Severity for codes no rule matches
    #[serde(default)]
    pub default: Severity,
    #[serde(default)]
    pub rules: Vec<SeverityRule>,
}

impl Default for SeverityTable {
    fn default() -> Self {
        use Severity::*;
        Self {
            default: Info,
            rules: vec![
                // Generic powertrain and network codes
                SeverityRule::new('P', 0, 999, Warning),
                SeverityRule::new('U', 0, 999, Warning),
                // Cylinder misfires
                SeverityRule::new('P', 300, 304, Critical),
                // Fuel system lean/rich
                SeverityRule::new('P', 171, 172, Critical),
                // Catalyst efficiency
                SeverityRule::new('P', 420, 420, Critical),
                SeverityRule::new('P', 430, 430, Critical),
            ],
        }
    }
}

impl SeverityTable {
    /// A table with no rules: everything maps to `default`
    pub fn empty(default: Severity) -> Self {
        Self {
            default,
            rules: Vec::new(),
        }
    }

    pub fn classify(&self, code: &DtcCode) -> Severity {
        self.rules
            .iter()
            .filter(|rule| rule.matches(code))
            .map(|rule| rule.severity)
            .max()
            .unwrap_or(self.default)
    }

    /// Check that every rule names a known system letter and a sane range
    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.rules {
            if DtcCategory::from_prefix(rule.letter).is_none() {
                return Err(format!("severity rule has unknown letter {:?}", rule.letter));
            }
            if rule.first > rule.last || rule.last > 9999 {
                return Err(format!(
                    "severity rule {}{:04}-{}{:04} has an invalid range",
                    rule.letter, rule.first, rule.letter, rule.last
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> DtcCode {
        DtcCode::parse(raw).unwrap()
    }

    #[test]
    fn test_default_table() {
        let table = SeverityTable::default();
        assert_eq!(table.classify(&code("P0301")), Severity::Critical);
        assert_eq!(table.classify(&code("P0420")), Severity::Critical);
        assert_eq!(table.classify(&code("P0171")), Severity::Critical);
        assert_eq!(table.classify(&code("P0101")), Severity::Warning);
        assert_eq!(table.classify(&code("U0100")), Severity::Warning);
        assert_eq!(table.classify(&code("P1234")), Severity::Info);
        assert_eq!(table.classify(&code("C1234")), Severity::Info);
        assert_eq!(table.classify(&code("B0001")), Severity::Info);
    }

    #[test]
    fn test_rule_order_does_not_matter() {
        let mut table = SeverityTable::default();
        let forward: Vec<Severity> = ["P0301", "P0101", "U0001", "B1000"]
            .iter()
            .map(|c| table.classify(&code(c)))
            .collect();

        table.rules.reverse();
        let reversed: Vec<Severity> = ["P0301", "P0101", "U0001", "B1000"]
            .iter()
            .map(|c| table.classify(&code(c)))
            .collect();

        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_empty_table_uses_default() {
        let table = SeverityTable::empty(Severity::Warning);
        assert_eq!(table.classify(&code("C0035")), Severity::Warning);
    }

    #[test]
    fn test_validate_rejects_bad_rules() {
        let mut table = SeverityTable::empty(Severity::Info);
        table.rules.push(SeverityRule::new('X', 0, 10, Severity::Critical));
        assert!(table.validate().is_err());

        table.rules = vec![SeverityRule::new('P', 500, 100, Severity::Critical)];
        assert!(table.validate().is_err());

        assert!(SeverityTable::default().validate().is_ok());
    }

    #[test]
    fn test_table_from_toml() {
        let table: SeverityTable = toml::from_str(
            r#"
            default = "warning"

            [[rules]]
            letter = "C"
            first = 0
            last = 99
            severity = "critical"
            "#,
        )
        .unwrap();

        assert_eq!(table.classify(&code("C0035")), Severity::Critical);
        assert_eq!(table.classify(&code("C0100")), Severity::Warning);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
