//! PagerDuty REST API response types.
//!
//! Only the fields the cache consumes are modeled; everything else in the
//! payload is ignored by serde. Alert `body` payloads vary by integration,
//! so that field stays a raw `serde_json::Value` with accessor helpers.

use serde::Deserialize;
use serde_json::Value;

/// Compact reference to another PagerDuty resource, as embedded inside
/// incident and log-entry payloads.
///
/// Every field is optional so a sparse stub still deserializes; the
/// consumer checks for the fields it needs and decides how much a
/// missing one matters there.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// An incident item from `GET /incidents`.
///
/// `created_at`, `status`, `urgency`, and `service` are required by the
/// API contract; a payload missing any of them fails deserialization and
/// is handled as a per-incident error by the sync loop.
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    pub created_at: String,
    pub status: String,
    pub urgency: String,
    #[serde(default)]
    pub escalation_policy: Option<ResourceRef>,
    pub service: ResourceRef,
    #[serde(default)]
    pub teams: Vec<ResourceRef>,
}

/// An alert item from `GET /incidents/{id}/alerts`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    pub created_at: String,
    pub status: String,
    pub severity: String,
    #[serde(default)]
    pub suppressed: bool,
    pub incident: ResourceRef,
    #[serde(default)]
    pub body: Option<Value>,
}

impl AlertRecord {
    /// Monitoring-side alert name from `body.details.alert_name`.
    pub fn alert_name(&self) -> Option<&str> {
        self.detail("alert_name")
    }

    /// Cluster identifier from `body.details.cluster_id`.
    ///
    /// Empty strings count as absent.
    pub fn cluster_id(&self) -> Option<&str> {
        self.detail("cluster_id").filter(|c| !c.is_empty())
    }

    /// Raw Alertmanager firing block from `body.details.firing`.
    pub fn firing_details(&self) -> Option<&str> {
        self.detail("firing")
    }

    fn detail(&self, key: &str) -> Option<&str> {
        self.body.as_ref()?.get("details")?.get(key)?.as_str()
    }
}

/// A log entry from `GET /incidents/{id}/log_entries`.
///
/// Only resolve/acknowledge/assign entries carry data the cache uses;
/// every field beyond `type` is optional so unrelated entry types still
/// deserialize cleanly.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntryRecord {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub agent: Option<ResourceRef>,
    #[serde(default)]
    pub assignees: Vec<ResourceRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_deserialization() {
        let json = r#"{
            "id": "PINC123",
            "summary": "[#1234] ClusterProvisioningDelay prod-cluster",
            "html_url": "https://acme.pagerduty.com/incidents/PINC123",
            "created_at": "2023-05-01T14:00:00Z",
            "status": "triggered",
            "urgency": "high",
            "escalation_policy": {
                "id": "PESCPOL",
                "summary": "Platform Escalation"
            },
            "service": {
                "id": "PSVC1",
                "summary": "osd-prod.a1b2.p1.openshiftapps.com-hive-cluster"
            },
            "teams": [
                {"id": "PTEAM1", "summary": "SRE Platform"},
                {"id": "PTEAM2", "summary": "SRE Pool"}
            ]
        }"#;

        let incident: IncidentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(incident.id, "PINC123");
        assert_eq!(incident.status, "triggered");
        assert_eq!(incident.urgency, "high");
        assert_eq!(
            incident.escalation_policy.as_ref().unwrap().id.as_deref(),
            Some("PESCPOL")
        );
        assert_eq!(
            incident.service.summary.as_deref(),
            Some("osd-prod.a1b2.p1.openshiftapps.com-hive-cluster")
        );
        assert_eq!(incident.teams.len(), 2);
    }

    #[test]
    fn test_incident_without_escalation_policy() {
        let json = r#"{
            "id": "PINC124",
            "created_at": "2023-05-01T15:00:00Z",
            "status": "resolved",
            "urgency": "low",
            "service": {"id": "PSVC1", "summary": "some-service"}
        }"#;

        let incident: IncidentRecord = serde_json::from_str(json).unwrap();
        assert!(incident.escalation_policy.is_none());
        assert!(incident.summary.is_none());
        assert!(incident.teams.is_empty());
    }

    #[test]
    fn test_incident_escalation_policy_without_id_deserializes() {
        let json = r#"{
            "id": "PINC126",
            "created_at": "2023-05-01T15:00:00Z",
            "status": "triggered",
            "urgency": "high",
            "escalation_policy": {"summary": "Platform Escalation"},
            "service": {"id": "PSVC1", "summary": "some-service"}
        }"#;

        let incident: IncidentRecord = serde_json::from_str(json).unwrap();
        let esc = incident.escalation_policy.unwrap();
        assert!(esc.id.is_none());
        assert_eq!(esc.summary.as_deref(), Some("Platform Escalation"));
    }

    #[test]
    fn test_incident_missing_created_at_is_rejected() {
        let json = r#"{
            "id": "PINC125",
            "status": "triggered",
            "urgency": "high",
            "service": {"id": "PSVC1"}
        }"#;

        assert!(serde_json::from_str::<IncidentRecord>(json).is_err());
    }

    #[test]
    fn test_alert_body_details() {
        let json = r#"{
            "id": "PALERT1",
            "summary": "ClusterProvisioningDelay prod-cluster is delayed",
            "created_at": "2023-05-01T14:00:05Z",
            "status": "triggered",
            "severity": "critical",
            "suppressed": false,
            "incident": {"id": "PINC123"},
            "body": {
                "details": {
                    "alert_name": "ClusterProvisioningDelay",
                    "cluster_id": "9f2c1a34-0d8e-4b7a-9c21-6f8d2f1e0a55",
                    "firing": "Labels:\n - alertname = ClusterProvisioningDelay\n - namespace = openshift-machine-api\n"
                }
            }
        }"#;

        let alert: AlertRecord = serde_json::from_str(json).unwrap();
        assert_eq!(alert.alert_name(), Some("ClusterProvisioningDelay"));
        assert_eq!(
            alert.cluster_id(),
            Some("9f2c1a34-0d8e-4b7a-9c21-6f8d2f1e0a55")
        );
        assert!(alert.firing_details().unwrap().contains("namespace ="));
        assert_eq!(alert.incident.id.as_deref(), Some("PINC123"));
        assert!(!alert.suppressed);
    }

    #[test]
    fn test_alert_without_body() {
        let json = r#"{
            "id": "PALERT2",
            "summary": "Manual incident",
            "created_at": "2023-05-01T14:10:00Z",
            "status": "triggered",
            "severity": "error",
            "incident": {"id": "PINC123"}
        }"#;

        let alert: AlertRecord = serde_json::from_str(json).unwrap();
        assert!(alert.alert_name().is_none());
        assert!(alert.cluster_id().is_none());
        assert!(alert.firing_details().is_none());
    }

    #[test]
    fn test_alert_empty_cluster_id_counts_as_absent() {
        let json = r#"{
            "id": "PALERT3",
            "created_at": "2023-05-01T14:10:00Z",
            "status": "triggered",
            "severity": "warning",
            "incident": {"id": "PINC123"},
            "body": {"details": {"cluster_id": ""}}
        }"#;

        let alert: AlertRecord = serde_json::from_str(json).unwrap();
        assert!(alert.cluster_id().is_none());
    }

    #[test]
    fn test_log_entry_deserialization() {
        let json = r#"[
            {
                "type": "resolve_log_entry",
                "created_at": "2023-05-01T14:30:00Z",
                "agent": {
                    "id": "PAGENT1",
                    "summary": "Alertmanager",
                    "html_url": "https://acme.pagerduty.com/users/PAGENT1"
                }
            },
            {
                "type": "assign_log_entry",
                "created_at": "2023-05-01T14:05:00Z",
                "assignees": [
                    {"id": "PAGENT2", "summary": "Dana Ops"},
                    {"id": "PAGENT3", "summary": "Silent Test Rotation"}
                ]
            },
            {
                "type": "annotate_log_entry"
            }
        ]"#;

        let entries: Vec<LogEntryRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].entry_type, "resolve_log_entry");
        assert_eq!(
            entries[0].agent.as_ref().unwrap().id.as_deref(),
            Some("PAGENT1")
        );
        assert_eq!(entries[1].assignees.len(), 2);
        assert!(entries[2].agent.is_none());
        assert!(entries[2].created_at.is_none());
        assert!(entries[2].assignees.is_empty());
    }
}
