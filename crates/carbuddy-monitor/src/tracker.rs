//! Code tracker: active code set and per-poll deltas

use std::collections::HashSet;
use std::sync::Arc;

use carbuddy_core::{describe, DtcCode, SeverityTable, TroubleCode};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

/// Codes currently reported by the vehicle, in order of discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActiveCodeSet {
    codes: Vec<TroubleCode>,
}

impl ActiveCodeSet {
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn get(&self, code: &DtcCode) -> Option<&TroubleCode> {
        self.codes.iter().find(|c| &c.code == code)
    }

    pub fn contains(&self, code: &DtcCode) -> bool {
        self.get(code).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TroubleCode> {
        self.codes.iter()
    }

    pub fn codes(&self) -> &[TroubleCode] {
        &self.codes
    }
}

/// Difference between two consecutive active sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeDelta {
    pub appeared: Vec<TroubleCode>,
    pub cleared: Vec<TroubleCode>,
}

impl CodeDelta {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.cleared.is_empty()
    }
}

/// Owns the active code set
///
/// Only the poller calls [`update`](CodeTracker::update); readers take cheap
/// `Arc` snapshots that never observe a half-built set.
pub struct CodeTracker {
    severity: SeverityTable,
    active: RwLock<Arc<ActiveCodeSet>>,
}

impl CodeTracker {
    pub fn new(severity: SeverityTable) -> Self {
        Self {
            severity,
            active: RwLock::new(Arc::new(ActiveCodeSet::default())),
        }
    }

    pub fn snapshot(&self) -> Arc<ActiveCodeSet> {
        self.active.read().clone()
    }

    /// Replace the active set with the codes from one successful poll
    ///
    /// Malformed strings are logged and skipped. Codes present in both sets
    /// keep their original `first_seen_at`, description and severity.
    pub fn update(&self, raw_codes: &[String], now: DateTime<Utc>) -> CodeDelta {
        let previous = self.snapshot();

        let mut reported: Vec<DtcCode> = Vec::with_capacity(raw_codes.len());
        let mut seen = HashSet::new();
        for raw in raw_codes {
            match DtcCode::parse(raw) {
                Ok(code) => {
                    if seen.insert(code.clone()) {
                        reported.push(code);
                    }
                }
                Err(e) => warn!(%e, "Skipping malformed trouble code"),
            }
        }

        let mut next = Vec::with_capacity(reported.len());
        let mut cleared = Vec::new();
        for existing in previous.iter() {
            if seen.contains(&existing.code) {
                next.push(existing.clone());
            } else {
                cleared.push(existing.clone());
            }
        }

        let mut appeared = Vec::new();
        for code in reported {
            if previous.contains(&code) {
                continue;
            }
            let trouble = TroubleCode {
                severity: self.severity.classify(&code),
                description: describe(&code).to_string(),
                first_seen_at: now,
                code,
            };
            next.push(trouble.clone());
            appeared.push(trouble);
        }

        debug!(
            active = next.len(),
            appeared = appeared.len(),
            cleared = cleared.len(),
            "Active codes updated"
        );
        *self.active.write() = Arc::new(ActiveCodeSet { codes: next });

        CodeDelta { appeared, cleared }
    }
}

#[cfg(test)]
mod tests {
    use carbuddy_core::Severity;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    fn raw(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn names(codes: &[TroubleCode]) -> Vec<&str> {
        codes.iter().map(|c| c.code.as_str()).collect()
    }

    #[test]
    fn test_first_poll_reports_everything() {
        let tracker = CodeTracker::new(SeverityTable::default());
        let delta = tracker.update(&raw(&["P0301", "P0420"]), Utc::now());

        assert_eq!(names(&delta.appeared), vec!["P0301", "P0420"]);
        assert!(delta.cleared.is_empty());
        assert_eq!(delta.appeared[0].severity, Severity::Critical);
        assert_eq!(delta.appeared[0].description, "Cylinder 1 Misfire Detected");
    }

    #[test]
    fn test_identical_polls_yield_empty_delta() {
        let tracker = CodeTracker::new(SeverityTable::default());
        tracker.update(&raw(&["P0301", "P0420"]), Utc::now());
        let delta = tracker.update(&raw(&["P0420", "P0301"]), Utc::now());
        assert!(delta.is_empty());
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn test_cleared_code_delta() {
        let tracker = CodeTracker::new(SeverityTable::default());
        tracker.update(&raw(&["P0301", "P0420"]), Utc::now());
        let delta = tracker.update(&raw(&["P0420"]), Utc::now());

        assert!(delta.appeared.is_empty());
        assert_eq!(names(&delta.cleared), vec!["P0301"]);
        assert_eq!(names(tracker.snapshot().codes()), vec!["P0420"]);
    }

    #[test]
    fn test_appear_clear_reappear() {
        let tracker = CodeTracker::new(SeverityTable::default());
        let start = Utc::now();

        let first = tracker.update(&raw(&["P0171"]), start);
        let second = tracker.update(&raw(&[]), start + Duration::seconds(30));
        let third = tracker.update(&raw(&["P0171"]), start + Duration::seconds(60));

        assert_eq!(first.appeared.len(), 1);
        assert_eq!(second.cleared.len(), 1);
        assert_eq!(third.appeared.len(), 1);
        // A new streak gets a new first-seen time
        assert_eq!(third.appeared[0].first_seen_at, start + Duration::seconds(60));
    }

    #[test]
    fn test_carried_codes_keep_first_seen() {
        let tracker = CodeTracker::new(SeverityTable::default());
        let start = Utc::now();
        tracker.update(&raw(&["P0420"]), start);
        tracker.update(&raw(&["P0301", "P0420"]), start + Duration::seconds(30));

        let snapshot = tracker.snapshot();
        assert_eq!(names(snapshot.codes()), vec!["P0420", "P0301"]);
        let carried = snapshot.get(&DtcCode::parse("P0420").unwrap()).unwrap();
        assert_eq!(carried.first_seen_at, start);
    }

    #[test]
    fn test_malformed_and_duplicate_codes() {
        let tracker = CodeTracker::new(SeverityTable::default());
        let delta = tracker.update(
            &raw(&["P0301", "X9999", "P12", "P0301", "p0420", "U0100"]),
            Utc::now(),
        );

        assert_eq!(names(&delta.appeared), vec!["P0301", "U0100"]);
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn test_published_snapshot_is_stable() {
        let tracker = CodeTracker::new(SeverityTable::default());
        tracker.update(&raw(&["P0301"]), Utc::now());
        let before = tracker.snapshot();
        tracker.update(&raw(&["P0420"]), Utc::now());

        assert_eq!(names(before.codes()), vec!["P0301"]);
        assert_eq!(names(tracker.snapshot().codes()), vec!["P0420"]);
    }
}
