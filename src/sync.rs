//! Sync orchestration: pull incidents and alerts from the API into the
//! cache.
//!
//! Incidents come first so alerts can resolve their parent rows. A
//! failure on one item logs an error and moves on; a failure fetching a
//! page aborts the whole pass so the caller's transaction can roll
//! back.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db::CacheDb;
use crate::error::SyncError;
use crate::ingest;
use crate::pd::records::{AlertRecord, IncidentRecord};
use crate::pd::{PdError, Upstream, PAGE_LIMIT};
use crate::reconcile;
use crate::util::format_utc;

/// Handle to an incident cached by the current pass, used to scope the
/// follow-up alert sync.
#[derive(Debug, Clone)]
pub struct SyncedIncident {
    pub row_id: i64,
    pub pd_id: String,
}

/// Pull incidents for the given teams and window, newest first, and
/// cache up to `max_count` of them.
///
/// Each cached incident also has its log entries fetched and
/// reconciled, so resolution and assignment state land in the same
/// pass. Returns exactly the incidents cached by this call.
pub fn sync_incidents(
    db: &CacheDb,
    api: &dyn Upstream,
    team_ids: &[String],
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    max_count: usize,
) -> Result<Vec<SyncedIncident>, SyncError> {
    let mut params: Vec<(String, String)> = team_ids
        .iter()
        .map(|team| ("team_ids[]".to_string(), team.clone()))
        .collect();
    params.push(("limit".to_string(), max_count.min(PAGE_LIMIT).to_string()));
    params.push(("sort_by".to_string(), "created_at:desc".to_string()));
    if let Some(since) = since {
        params.push(("since".to_string(), format_utc(since)));
    }
    if let Some(until) = until {
        params.push(("until".to_string(), format_utc(until)));
    }

    let mut synced = Vec::new();
    for item in api.iter_all("incidents", &params) {
        let item = item?;
        let pd_id = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();

        match sync_one_incident(db, api, item) {
            Ok(incident) => {
                log::info!("Cached incident {}", incident.pd_id);
                synced.push(incident);
                if synced.len() >= max_count {
                    break;
                }
            }
            Err(err) => log::error!("Failed to process incident {}: {}", pd_id, err),
        }
    }

    Ok(synced)
}

fn sync_one_incident(
    db: &CacheDb,
    api: &dyn Upstream,
    item: Value,
) -> Result<SyncedIncident, SyncError> {
    let record: IncidentRecord = serde_json::from_value(item)
        .map_err(|err| SyncError::Record(format!("incident: {}", err)))?;
    let row_id = ingest::cache_incident(db, &record)?;

    let log_entries = api.rget(&format!("incidents/{}/log_entries", record.id))?;
    let entries = log_entries.as_array().cloned().ok_or_else(|| {
        PdError::Envelope(format!(
            "log_entries for incident {} is not an array",
            record.id
        ))
    })?;
    reconcile::reconcile_log(db, &record.id, row_id, &entries)?;

    Ok(SyncedIncident {
        row_id,
        pd_id: record.id,
    })
}

/// Pull and cache every alert belonging to the given incidents,
/// returning the number cached.
pub fn sync_alerts(
    db: &CacheDb,
    api: &dyn Upstream,
    incidents: &[SyncedIncident],
) -> Result<usize, SyncError> {
    let mut cached = 0;
    for incident in incidents {
        log::debug!("Querying alerts owned by incident {}", incident.pd_id);
        let resource = format!("incidents/{}/alerts", incident.pd_id);

        for item in api.iter_all(&resource, &[]) {
            let item = item?;
            let pd_id = item
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();

            match sync_one_alert(db, item) {
                Ok(alert_pd_id) => {
                    log::info!(
                        "Cached alert {} (belongs to incident {})",
                        alert_pd_id,
                        incident.pd_id
                    );
                    cached += 1;
                }
                Err(err) => log::error!("Failed to process alert {}: {}", pd_id, err),
            }
        }
    }

    Ok(cached)
}

fn sync_one_alert(db: &CacheDb, item: Value) -> Result<String, SyncError> {
    let record: AlertRecord = serde_json::from_value(item)
        .map_err(|err| SyncError::Record(format!("alert: {}", err)))?;
    ingest::cache_alert(db, &record)?;
    Ok(record.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::pd::test_utils::FakeUpstream;
    use chrono::TimeZone;
    use serde_json::json;

    fn incident_json(id: &str, created_at: &str) -> Value {
        json!({
            "id": id,
            "summary": format!("[#1] incident {}", id),
            "html_url": format!("https://acme.pagerduty.com/incidents/{}", id),
            "created_at": created_at,
            "status": "triggered",
            "urgency": "high",
            "escalation_policy": {"id": "PESCPOL", "summary": "Platform Escalation"},
            "service": {"id": "PSVC1", "summary": "example-service"},
            "teams": [{"id": "PTEAM1", "summary": "SRE Platform"}]
        })
    }

    fn alert_json(id: &str, incident_pd_id: &str) -> Value {
        json!({
            "id": id,
            "summary": "ClusterProvisioningDelay prod is delayed",
            "created_at": "2023-05-01T14:00:05Z",
            "status": "triggered",
            "severity": "critical",
            "incident": {"id": incident_pd_id},
            "body": {
                "details": {
                    "alert_name": "ClusterProvisioningDelay",
                    "cluster_id": "abc-123",
                    "firing": "namespace = openshift-monitoring\n"
                }
            }
        })
    }

    #[test]
    fn test_sync_incidents_reconciles_log_entries() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        fake.stage_items(
            "incidents",
            vec![incident_json("PINC1", "2023-05-01T14:00:00Z")],
        );
        fake.stage_rget(
            "incidents/PINC1/log_entries",
            json!([
                {
                    "type": "acknowledge_log_entry",
                    "agent": {"id": "PAGENT2", "summary": "Dana Ops"}
                },
                {
                    "type": "resolve_log_entry",
                    "created_at": "2023-05-01T14:30:00Z",
                    "agent": {"id": "PAGENT1", "summary": "Alertmanager"}
                }
            ]),
        );

        let synced = sync_incidents(&db, &fake, &["PTEAM1".to_string()], None, None, 100).unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].pd_id, "PINC1");

        let cached = db.get_incident_by_pd_id("PINC1").unwrap().unwrap();
        assert_eq!(
            cached.resolved_at.as_deref(),
            Some("2023-05-01T14:30:00+00:00")
        );
        assert!(cached.resolved_by_id.is_some());
    }

    #[test]
    fn test_sync_incidents_skips_failing_items() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        fake.stage_items(
            "incidents",
            vec![
                // Missing created_at: rejected during deserialization.
                json!({
                    "id": "PBAD1",
                    "status": "triggered",
                    "urgency": "high",
                    "service": {"id": "PSVC1", "summary": "svc"}
                }),
                incident_json("PINC1", "2023-05-01T14:00:00Z"),
            ],
        );
        fake.stage_rget("incidents/PINC1/log_entries", json!([]));

        let synced = sync_incidents(&db, &fake, &[], None, None, 100).unwrap();

        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].pd_id, "PINC1");
        assert!(db.incident_id_by_pd_id("PBAD1").unwrap().is_none());
    }

    #[test]
    fn test_sync_incidents_failed_log_fetch_drops_item_from_result() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        // No canned log_entries response, so the rget fails.
        fake.stage_items(
            "incidents",
            vec![incident_json("PINC1", "2023-05-01T14:00:00Z")],
        );

        let synced = sync_incidents(&db, &fake, &[], None, None, 100).unwrap();

        // The incident row itself was written before the fetch failed.
        assert!(synced.is_empty());
        assert!(db.incident_id_by_pd_id("PINC1").unwrap().is_some());
    }

    #[test]
    fn test_sync_incidents_stops_at_max_count() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        fake.stage_items(
            "incidents",
            vec![
                incident_json("PINC1", "2023-05-03T14:00:00Z"),
                incident_json("PINC2", "2023-05-02T14:00:00Z"),
                incident_json("PINC3", "2023-05-01T14:00:00Z"),
            ],
        );
        fake.stage_rget("incidents/PINC1/log_entries", json!([]));
        fake.stage_rget("incidents/PINC2/log_entries", json!([]));
        fake.stage_rget("incidents/PINC3/log_entries", json!([]));

        let synced = sync_incidents(&db, &fake, &[], None, None, 2).unwrap();

        assert_eq!(synced.len(), 2);
        assert!(db.incident_id_by_pd_id("PINC3").unwrap().is_none());
    }

    #[test]
    fn test_sync_incidents_pagination_failure_is_fatal() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        fake.stage_items(
            "incidents",
            vec![incident_json("PINC1", "2023-05-01T14:00:00Z")],
        );
        fake.stage_rget("incidents/PINC1/log_entries", json!([]));
        fake.fail_iteration_after("incidents", 1);

        let result = sync_incidents(&db, &fake, &[], None, None, 100);
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_incidents_query_params() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        fake.stage_items("incidents", vec![]);

        let since = Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        sync_incidents(
            &db,
            &fake,
            &["PTEAM1".to_string(), "PTEAM2".to_string()],
            Some(since),
            Some(until),
            5,
        )
        .unwrap();

        let recorded = fake.recorded_params.borrow();
        let (resource, params) = &recorded[0];
        assert_eq!(resource, "incidents");

        let teams: Vec<&str> = params
            .iter()
            .filter(|(k, _)| k == "team_ids[]")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(teams, vec!["PTEAM1", "PTEAM2"]);
        assert!(params.contains(&("limit".to_string(), "5".to_string())));
        assert!(params.contains(&("sort_by".to_string(), "created_at:desc".to_string())));
        assert!(params.contains(&("since".to_string(), "2023-04-01T00:00:00+00:00".to_string())));
        assert!(params.contains(&("until".to_string(), "2023-05-01T00:00:00+00:00".to_string())));
    }

    #[test]
    fn test_sync_alerts_counts_successes_only() {
        let db = test_db();
        let mut fake = FakeUpstream::new();
        fake.stage_items(
            "incidents",
            vec![incident_json("PINC1", "2023-05-01T14:00:00Z")],
        );
        fake.stage_rget("incidents/PINC1/log_entries", json!([]));
        fake.stage_items(
            "incidents/PINC1/alerts",
            vec![
                alert_json("PALERT1", "PINC1"),
                // Missing severity: rejected during deserialization.
                json!({
                    "id": "PBAD1",
                    "created_at": "2023-05-01T14:00:05Z",
                    "status": "triggered",
                    "incident": {"id": "PINC1"}
                }),
            ],
        );

        let synced = sync_incidents(&db, &fake, &[], None, None, 100).unwrap();
        let cached = sync_alerts(&db, &fake, &synced).unwrap();

        assert_eq!(cached, 1);
        assert!(db.get_alert_by_pd_id("PALERT1").unwrap().is_some());
        assert!(db.get_alert_by_pd_id("PBAD1").unwrap().is_none());
    }
}
