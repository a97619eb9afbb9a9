use super::*;
use chrono::{DateTime, Utc};

use super::entities::EntityKind;
use crate::derived;
use crate::util::{format_utc, parse_utc, truncate_chars};

impl CacheDb {
    // =========================================================================
    // Incidents
    // =========================================================================

    /// Rowid of the cached incident with the given upstream ID.
    pub fn incident_id_by_pd_id(&self, pd_id: &str) -> Result<Option<i64>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM incidents WHERE pd_id = ?1")?;
        let mut rows = stmt.query_map(params![pd_id], |row| row.get(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or refresh an incident from one upstream record.
    ///
    /// Envelope columns go through `upsert_entity`; the incident columns are
    /// overwritten with the latest upstream values. A record without an
    /// escalation policy leaves any previously cached label in place.
    pub fn upsert_incident(&self, inc: &NewIncident) -> Result<i64, DbError> {
        let id = self.upsert_entity(
            EntityKind::Incident,
            &inc.pd_id,
            inc.name.as_deref(),
            inc.html_url.as_deref(),
        )?;

        let esc_policy = inc
            .esc_policy
            .as_deref()
            .map(|p| truncate_chars(p, MAX_ESC_POLICY_LEN));

        self.conn.execute(
            "UPDATE incidents SET
                created_at = ?1,
                esc_policy = COALESCE(?2, esc_policy),
                service = ?3,
                status = ?4,
                urgency = ?5
             WHERE id = ?6",
            params![
                format_utc(inc.created_at),
                esc_policy,
                truncate_chars(&inc.service, MAX_SERVICE_LEN),
                inc.status,
                inc.urgency,
                id
            ],
        )?;
        Ok(id)
    }

    /// Replace the set of teams an incident belongs to.
    pub fn set_incident_teams(&self, incident_id: i64, team_ids: &[i64]) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM incident_teams WHERE incident_id = ?1",
            params![incident_id],
        )?;
        for team_id in team_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO incident_teams (incident_id, team_id) VALUES (?1, ?2)",
                params![incident_id, team_id],
            )?;
        }
        Ok(())
    }

    /// Replace the full assignee set, recomputing `silenced` from the new
    /// collection.
    pub fn set_incident_assignees(
        &self,
        incident_id: i64,
        agent_ids: &[i64],
    ) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM incident_assignees WHERE incident_id = ?1",
            params![incident_id],
        )?;

        let mut silenced = false;
        for agent_id in agent_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO incident_assignees (incident_id, agent_id) VALUES (?1, ?2)",
                params![incident_id, agent_id],
            )?;
            if derived::is_silencing_agent(self.agent_name(*agent_id)?.as_deref()) {
                silenced = true;
            }
        }
        self.set_silenced(incident_id, silenced)
    }

    /// Add one assignee. Assigning a silencing agent flips `silenced` on;
    /// any other agent leaves the flag untouched.
    pub fn append_incident_assignee(&self, incident_id: i64, agent_id: i64) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO incident_assignees (incident_id, agent_id) VALUES (?1, ?2)",
            params![incident_id, agent_id],
        )?;
        if derived::is_silencing_agent(self.agent_name(agent_id)?.as_deref()) {
            self.set_silenced(incident_id, true)?;
        }
        Ok(())
    }

    /// Drop one assignee. Unassigning a silencing agent flips `silenced` off
    /// without rescanning the remaining assignees.
    pub fn remove_incident_assignee(&self, incident_id: i64, agent_id: i64) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM incident_assignees WHERE incident_id = ?1 AND agent_id = ?2",
            params![incident_id, agent_id],
        )?;
        if derived::is_silencing_agent(self.agent_name(agent_id)?.as_deref()) {
            self.set_silenced(incident_id, false)?;
        }
        Ok(())
    }

    /// Record an acknowledgement. Repeat acknowledgements by the same agent
    /// collapse into one membership row.
    pub fn append_incident_acknowledger(
        &self,
        incident_id: i64,
        agent_id: i64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO incident_acknowledgers (incident_id, agent_id) VALUES (?1, ?2)",
            params![incident_id, agent_id],
        )?;
        Ok(())
    }

    /// Record who resolved the incident and when.
    pub fn set_incident_resolution(
        &self,
        incident_id: i64,
        resolved_at: DateTime<Utc>,
        resolved_by: i64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE incidents SET resolved_at = ?1, resolved_by_id = ?2 WHERE id = ?3",
            params![format_utc(resolved_at), resolved_by, incident_id],
        )?;
        Ok(())
    }

    /// Creation time of the oldest cached incident.
    ///
    /// Rows without a creation time are ignored. Returns `None` when the
    /// cache holds no dated incidents at all.
    pub fn oldest_incident_created_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let min: Option<String> = self.conn.query_row(
            "SELECT MIN(created_at) FROM incidents WHERE created_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(min.as_deref().and_then(parse_utc))
    }

    /// Fetch a cached incident by upstream ID.
    pub fn get_incident_by_pd_id(&self, pd_id: &str) -> Result<Option<CachedIncident>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, pd_id, cached_at, name, html_url, created_at, esc_policy,
                    service, status, urgency, resolved_at, resolved_by_id, silenced
             FROM incidents WHERE pd_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![pd_id], map_incident_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn agent_name(&self, agent_id: i64) -> Result<Option<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT name FROM agents WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![agent_id], |row| row.get(0))?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Ok(None),
        }
    }

    fn set_silenced(&self, incident_id: i64, silenced: bool) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE incidents SET silenced = ?1 WHERE id = ?2",
            params![silenced, incident_id],
        )?;
        Ok(())
    }
}

fn map_incident_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedIncident> {
    Ok(CachedIncident {
        id: row.get(0)?,
        pd_id: row.get(1)?,
        cached_at: row.get(2)?,
        name: row.get(3)?,
        html_url: row.get(4)?,
        created_at: row.get(5)?,
        esc_policy: row.get(6)?,
        service: row.get(7)?,
        status: row.get(8)?,
        urgency: row.get(9)?,
        resolved_at: row.get(10)?,
        resolved_by_id: row.get(11)?,
        silenced: row.get(12)?,
    })
}
