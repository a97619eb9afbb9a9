//! Derived attribute rules: on-call shift labels, alert name
//! standardization, namespace extraction, and the silencing-agent check.
//!
//! Every rule here is pure; the db layer applies them at write time so the
//! stored columns are always consistent with their source fields.

use std::sync::OnceLock;

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use thiserror::Error;

use crate::util::truncate_chars;

/// Raised when an alert name is empty, absent, or reduces to nothing.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Alert name is missing or invalid")]
pub struct InvalidName;

/// Map a UTC instant to the on-call shift covering it.
///
/// Shift boundaries are fixed in UTC. The end of the UTC day belongs to
/// "APAC 1" of the next working day but keeps the current calendar date in
/// its label.
///
/// Example: `2023-05-01T14:07:09Z` → `"NASA 1 (2023-05-01)"`
pub fn calculate_shift(at: DateTime<Utc>) -> String {
    let hour_minute = (at.hour(), at.minute());

    let shift = if hour_minute < (3, 30) {
        "APAC 1"
    } else if hour_minute < (8, 30) {
        "APAC 2"
    } else if hour_minute < (13, 30) {
        "EMEA"
    } else if hour_minute < (18, 0) {
        "NASA 1"
    } else if hour_minute < (22, 30) {
        "NASA 2"
    } else {
        // End of UTC day is covered by APAC 1 (next working day)
        "APAC 1"
    };

    format!("{} ({})", shift, at.format("%Y-%m-%d"))
}

/// Standardize an alert name, abbreviating the noisy well-known families.
///
/// Names that match a known family collapse to one canonical token; anything
/// else keeps its first whitespace-delimited word, capped at 500 characters.
pub fn standardize_alert_name(raw: Option<&str>) -> Result<String, InvalidName> {
    let raw = match raw {
        Some(name) if !name.is_empty() => name,
        _ => return Err(InvalidName),
    };

    if raw.contains("ClusterProvisioningDelay") {
        return Ok("ClusterProvisioningDelay".to_string());
    }
    if raw.contains("has gone missing") {
        return Ok("ClusterHasGoneMissing".to_string());
    }
    if raw.contains("Heartbeat.ping has failed") {
        return Ok("HeartbeatPingFailed".to_string());
    }
    if raw.contains("CUST ESCALATION") {
        return Ok("CustomerEscalation".to_string());
    }

    // Catch-all: take the first word and cap it under the column max
    raw.split_whitespace()
        .next()
        .map(|word| truncate_chars(word, 500).to_string())
        .ok_or(InvalidName)
}

static NAMESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn namespace_re() -> &'static Regex {
    NAMESPACE_RE.get_or_init(|| Regex::new(r"namespace = (.*)").unwrap())
}

/// Pull the namespace out of an alert's firing details.
///
/// Scans line by line for the first `namespace = <value>` occurrence and
/// returns the value. `None` when no line carries one.
pub fn extract_namespace(firing_details: &str) -> Option<String> {
    for line in firing_details.lines() {
        if let Some(captures) = namespace_re().captures(line) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Whether an agent name marks an incident as silenced.
///
/// The upstream "Silent Test" user shows up under a few spellings; matching
/// is case-insensitive on the substring.
pub fn is_silencing_agent(name: Option<&str>) -> bool {
    name.map(|n| n.to_lowercase().contains("silent test"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 1, hour, minute, second).unwrap()
    }

    #[test]
    fn test_shift_boundaries() {
        let cases = [
            (0, 0, 0, "APAC 1"),
            (3, 29, 59, "APAC 1"),
            (3, 30, 0, "APAC 2"),
            (8, 29, 59, "APAC 2"),
            (8, 30, 0, "EMEA"),
            (13, 29, 59, "EMEA"),
            (13, 30, 0, "NASA 1"),
            (17, 59, 59, "NASA 1"),
            (18, 0, 0, "NASA 2"),
            (22, 29, 59, "NASA 2"),
            (22, 30, 0, "APAC 1"),
            (23, 59, 59, "APAC 1"),
        ];
        for (hour, minute, second, expected) in cases {
            assert_eq!(
                calculate_shift(at(hour, minute, second)),
                format!("{} (2023-05-01)", expected),
                "wrong shift for {:02}:{:02}:{:02}",
                hour,
                minute,
                second
            );
        }
    }

    #[test]
    fn test_end_of_day_keeps_calendar_date() {
        // 22:30 onward belongs to the next APAC 1 rotation but the label
        // keeps the current date
        assert_eq!(calculate_shift(at(23, 0, 0)), "APAC 1 (2023-05-01)");
    }

    #[test]
    fn test_standardize_known_families() {
        let cases = [
            (
                "ClusterProvisioningDelay warning for hive",
                "ClusterProvisioningDelay",
            ),
            ("cluster foo has gone missing", "ClusterHasGoneMissing"),
            ("Heartbeat.ping has failed on bar", "HeartbeatPingFailed"),
            ("CUST ESCALATION please page", "CustomerEscalation"),
        ];
        for (raw, expected) in cases {
            assert_eq!(standardize_alert_name(Some(raw)), Ok(expected.to_string()));
        }
    }

    #[test]
    fn test_standardize_takes_first_word() {
        assert_eq!(
            standardize_alert_name(Some("DNSErrors05MinSRE CRITICAL (6)")),
            Ok("DNSErrors05MinSRE".to_string())
        );
    }

    #[test]
    fn test_standardize_caps_long_names() {
        let long = "a".repeat(600);
        let standardized = standardize_alert_name(Some(&long)).expect("valid name");
        assert_eq!(standardized.len(), 500);
    }

    #[test]
    fn test_standardize_rejects_empty_or_missing() {
        assert_eq!(standardize_alert_name(None), Err(InvalidName));
        assert_eq!(standardize_alert_name(Some("")), Err(InvalidName));
        assert_eq!(standardize_alert_name(Some("   ")), Err(InvalidName));
    }

    #[test]
    fn test_extract_namespace_first_match_wins() {
        let details = "[FIRING:2] KubePodCrashLooping\n\
                       namespace = openshift-monitoring\n\
                       namespace = openshift-dns\n";
        assert_eq!(
            extract_namespace(details),
            Some("openshift-monitoring".to_string())
        );
    }

    #[test]
    fn test_extract_namespace_mid_line() {
        let details = "labels: namespace = openshift-ingress, severity = warning";
        assert_eq!(
            extract_namespace(details),
            Some("openshift-ingress, severity = warning".to_string())
        );
    }

    #[test]
    fn test_extract_namespace_last_line_without_newline() {
        assert_eq!(
            extract_namespace("namespace = openshift-sre"),
            Some("openshift-sre".to_string())
        );
    }

    #[test]
    fn test_extract_namespace_absent() {
        assert_eq!(extract_namespace("[FIRING:1] nothing to see\n"), None);
        assert_eq!(extract_namespace(""), None);
    }

    #[test]
    fn test_silencing_agent_matching() {
        assert!(is_silencing_agent(Some("Silent Test")));
        assert!(is_silencing_agent(Some("SILENT TEST ROTATION")));
        assert!(is_silencing_agent(Some("the silent tester")));
        assert!(!is_silencing_agent(Some("Jane Doe")));
        assert!(!is_silencing_agent(None));
    }
}
