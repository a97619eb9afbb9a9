//! Turns API payloads into cache rows.
//!
//! One entry point per record kind. Fields the cache cannot live
//! without are hard requirements; the rest degrade to warnings and
//! keep whatever an earlier sync stored.

use crate::db::entities::EntityKind;
use crate::db::types::{NewAlert, NewIncident};
use crate::db::CacheDb;
use crate::derived::standardize_alert_name;
use crate::error::SyncError;
use crate::pd::records::{AlertRecord, IncidentRecord};
use crate::util::parse_utc;

/// Create or refresh the cached incident behind one API record.
///
/// `created_at` and the service summary are hard requirements. An
/// unusable escalation policy only logs a warning, leaving any
/// previously cached label in place. Team links are replaced with the
/// set carried by this record.
pub fn cache_incident(db: &CacheDb, record: &IncidentRecord) -> Result<i64, SyncError> {
    let created_at = parse_utc(&record.created_at)
        .ok_or_else(|| SyncError::Timestamp(record.created_at.clone()))?;
    let service = record
        .service
        .summary
        .clone()
        .ok_or_else(|| SyncError::MissingService(record.id.clone()))?;

    let esc_policy = record.escalation_policy.as_ref().and_then(|ep| {
        ep.summary
            .as_deref()
            .zip(ep.id.as_deref())
            .map(|(summary, id)| format!("{} ({})", summary, id))
    });
    if esc_policy.is_none() {
        log::warn!(
            "Incident {}'s escalation policy is missing or invalid",
            record.id
        );
    }

    let incident_id = db.upsert_incident(&NewIncident {
        pd_id: record.id.clone(),
        name: record.summary.clone(),
        html_url: record.html_url.clone(),
        created_at,
        esc_policy,
        service,
        status: record.status.clone(),
        urgency: record.urgency.clone(),
    })?;

    let mut team_ids = Vec::with_capacity(record.teams.len());
    for team in &record.teams {
        let team_pd_id = team.id.as_deref().ok_or_else(|| {
            SyncError::Record(format!("incident {} has a team without an ID", record.id))
        })?;
        let team_id = db.upsert_entity(
            EntityKind::Team,
            team_pd_id,
            team.summary.as_deref(),
            team.html_url.as_deref(),
        )?;
        team_ids.push(team_id);
    }
    db.set_incident_teams(incident_id, &team_ids)?;

    Ok(incident_id)
}

/// Create or refresh the cached alert behind one API record.
///
/// The parent incident must already be cached. Name standardization
/// tries `body.details.alert_name` first and falls back to the alert
/// summary; when both are unusable the alert is rejected. Cluster ID
/// and firing details degrade to warnings.
pub fn cache_alert(db: &CacheDb, record: &AlertRecord) -> Result<i64, SyncError> {
    let incident_pd_id = record.incident.id.as_deref().ok_or_else(|| {
        SyncError::Record(format!("alert {} has no incident reference", record.id))
    })?;
    let incident_id = db
        .incident_id_by_pd_id(incident_pd_id)?
        .ok_or_else(|| SyncError::UnknownIncident {
            alert: record.id.clone(),
            incident: incident_pd_id.to_string(),
        })?;

    let created_at = parse_utc(&record.created_at)
        .ok_or_else(|| SyncError::Timestamp(record.created_at.clone()))?;

    // Some alerts carry no standard details section (manual incidents,
    // CHGM notifications), so the summary doubles as the name source.
    let name = match standardize_alert_name(record.alert_name()) {
        Ok(name) => name,
        Err(_) => match standardize_alert_name(record.summary.as_deref()) {
            Ok(name) => name,
            Err(err) => {
                log::warn!("Alert {}'s name is missing or invalid", record.id);
                return Err(err.into());
            }
        },
    };

    let cluster_id = record.cluster_id();
    if cluster_id.is_none() {
        log::warn!("Alert {}'s cluster ID is missing or invalid", record.id);
    }

    let firing_details = record.firing_details();
    if firing_details.is_none() {
        log::warn!("Alert {}'s firing details are missing or invalid", record.id);
    }

    let alert_id = db.upsert_alert(&NewAlert {
        pd_id: record.id.clone(),
        name,
        html_url: record.html_url.clone(),
        created_at,
        incident_id,
        status: record.status.clone(),
        severity: record.severity.clone(),
        suppressed: record.suppressed,
        cluster_id: cluster_id.map(str::to_string),
        firing_details: firing_details.map(str::to_string),
    })?;

    Ok(alert_id)
}
