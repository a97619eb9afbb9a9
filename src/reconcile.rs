//! Log-entry reconciliation.
//!
//! The `/incidents` listing never carries resolution, acknowledgement,
//! or assignment data; those only appear in the incident's log entries.
//! This module replays a log-entry listing onto the cached incident.
//! Entries missing the fields they need are skipped with a warning
//! rather than failing the whole incident.

use serde_json::Value;

use crate::db::entities::EntityKind;
use crate::db::types::DbError;
use crate::db::CacheDb;
use crate::pd::records::{LogEntryRecord, ResourceRef};
use crate::util::parse_utc;

/// Apply every relevant entry of an incident's log to the cache.
///
/// Resolve entries set the resolution timestamp and agent, acknowledge
/// entries extend the acknowledger set, and assign entries extend the
/// assignee set (flipping `silenced` when a silencing agent arrives).
/// All other entry types are ignored.
pub fn reconcile_log(
    db: &CacheDb,
    incident_pd_id: &str,
    incident_id: i64,
    entries: &[Value],
) -> Result<(), DbError> {
    for raw in entries {
        let entry: LogEntryRecord = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!(
                    "Skipping malformed log entry on incident {}: {}",
                    incident_pd_id,
                    err
                );
                continue;
            }
        };

        match entry.entry_type.as_str() {
            "resolve_log_entry" => {
                let Some((agent_pd_id, agent)) = agent_with_id(&entry) else {
                    log::warn!(
                        "Resolution entry on incident {} has no usable agent; skipping",
                        incident_pd_id
                    );
                    continue;
                };
                let Some(resolved_at) = entry.created_at.as_deref().and_then(parse_utc) else {
                    log::warn!(
                        "Resolution entry on incident {} has no usable timestamp; skipping",
                        incident_pd_id
                    );
                    continue;
                };

                let agent_id = upsert_agent(db, agent_pd_id, agent)?;
                db.set_incident_resolution(incident_id, resolved_at, agent_id)?;
                log::debug!("Found resolution by {}", agent_label(agent));
            }
            "acknowledge_log_entry" => {
                let Some((agent_pd_id, agent)) = agent_with_id(&entry) else {
                    log::warn!(
                        "Acknowledgement entry on incident {} has no usable agent; skipping",
                        incident_pd_id
                    );
                    continue;
                };

                let agent_id = upsert_agent(db, agent_pd_id, agent)?;
                db.append_incident_acknowledger(incident_id, agent_id)?;
                log::debug!("Found acknowledgement by {}", agent_label(agent));
            }
            "assign_log_entry" => {
                for assignee in &entry.assignees {
                    let Some(assignee_pd_id) = assignee.id.as_deref() else {
                        log::warn!(
                            "Assignment entry on incident {} has an assignee without an ID; skipping",
                            incident_pd_id
                        );
                        continue;
                    };
                    let agent_id = upsert_agent(db, assignee_pd_id, assignee)?;
                    db.append_incident_assignee(incident_id, agent_id)?;
                    log::debug!("Found assignment to {}", agent_label(assignee));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn agent_with_id(entry: &LogEntryRecord) -> Option<(&str, &ResourceRef)> {
    let agent = entry.agent.as_ref()?;
    Some((agent.id.as_deref()?, agent))
}

fn upsert_agent(db: &CacheDb, pd_id: &str, agent: &ResourceRef) -> Result<i64, DbError> {
    db.upsert_entity(
        EntityKind::Agent,
        pd_id,
        agent.summary.as_deref(),
        agent.html_url.as_deref(),
    )
}

fn agent_label(agent: &ResourceRef) -> &str {
    agent
        .summary
        .as_deref()
        .or(agent.id.as_deref())
        .unwrap_or("unknown agent")
}
