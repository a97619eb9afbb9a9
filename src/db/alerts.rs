use super::*;
use chrono::{DateTime, Utc};

use super::entities::EntityKind;
use crate::derived;
use crate::util::{format_utc, truncate_chars};

impl CacheDb {
    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert or refresh an alert from one upstream record.
    ///
    /// The shift label is recomputed from the creation time on every write;
    /// the namespace is re-extracted whenever new firing details arrive.
    /// Cluster ID and firing details keep their previous values when the
    /// incoming record lacks them.
    pub fn upsert_alert(&self, alert: &NewAlert) -> Result<i64, DbError> {
        let id = self.upsert_entity(
            EntityKind::Alert,
            &alert.pd_id,
            Some(&alert.name),
            alert.html_url.as_deref(),
        )?;

        let shift = derived::calculate_shift(alert.created_at);
        let namespace = alert
            .firing_details
            .as_deref()
            .and_then(|details| namespace_from_details(&alert.pd_id, details));
        let cluster_id = alert
            .cluster_id
            .as_deref()
            .map(|c| truncate_chars(c, MAX_CLUSTER_ID_LEN));

        self.conn.execute(
            "UPDATE alerts SET
                created_at = ?1,
                incident_id = ?2,
                status = ?3,
                severity = ?4,
                suppressed = ?5,
                cluster_id = COALESCE(?6, cluster_id),
                shift = ?7,
                namespace = COALESCE(?8, namespace),
                firing_details = COALESCE(?9, firing_details)
             WHERE id = ?10",
            params![
                format_utc(alert.created_at),
                alert.incident_id,
                alert.status,
                alert.severity,
                alert.suppressed,
                cluster_id,
                shift,
                namespace,
                alert.firing_details,
                id
            ],
        )?;
        Ok(id)
    }

    /// Re-point an alert's creation time, recomputing its shift label.
    pub fn set_alert_created_at(
        &self,
        alert_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let shift = derived::calculate_shift(created_at);
        self.conn.execute(
            "UPDATE alerts SET created_at = ?1, shift = ?2 WHERE id = ?3",
            params![format_utc(created_at), shift, alert_id],
        )?;
        Ok(())
    }

    /// Replace an alert's firing details, re-extracting the namespace.
    ///
    /// Details without a namespace line log a warning and keep whatever
    /// namespace was previously extracted.
    pub fn set_alert_firing_details(&self, alert_id: i64, details: &str) -> Result<(), DbError> {
        let pd_id: String = self.conn.query_row(
            "SELECT pd_id FROM alerts WHERE id = ?1",
            params![alert_id],
            |row| row.get(0),
        )?;
        let namespace = namespace_from_details(&pd_id, details);
        self.conn.execute(
            "UPDATE alerts SET firing_details = ?1, namespace = COALESCE(?2, namespace)
             WHERE id = ?3",
            params![details, namespace, alert_id],
        )?;
        Ok(())
    }

    /// Fetch a cached alert by upstream ID.
    pub fn get_alert_by_pd_id(&self, pd_id: &str) -> Result<Option<CachedAlert>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, pd_id, cached_at, name, html_url, created_at, incident_id,
                    status, severity, suppressed, cluster_id, shift, namespace,
                    firing_details
             FROM alerts WHERE pd_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![pd_id], map_alert_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

fn namespace_from_details(pd_id: &str, details: &str) -> Option<String> {
    match derived::extract_namespace(details) {
        Some(namespace) => Some(truncate_chars(&namespace, MAX_NAMESPACE_LEN).to_string()),
        None => {
            log::warn!("Alert {}'s firing details are missing a namespace", pd_id);
            None
        }
    }
}

fn map_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedAlert> {
    Ok(CachedAlert {
        id: row.get(0)?,
        pd_id: row.get(1)?,
        cached_at: row.get(2)?,
        name: row.get(3)?,
        html_url: row.get(4)?,
        created_at: row.get(5)?,
        incident_id: row.get(6)?,
        status: row.get(7)?,
        severity: row.get(8)?,
        suppressed: row.get(9)?,
        cluster_id: row.get(10)?,
        shift: row.get(11)?,
        namespace: row.get(12)?,
        firing_details: row.get(13)?,
    })
}
