use super::*;
use crate::util::truncate_chars;

/// The upstream record kinds that share the envelope columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Team,
    Agent,
    Incident,
    Alert,
}

impl EntityKind {
    /// Table backing this entity kind.
    pub(crate) fn table(self) -> &'static str {
        match self {
            EntityKind::Team => "teams",
            EntityKind::Agent => "agents",
            EntityKind::Incident => "incidents",
            EntityKind::Alert => "alerts",
        }
    }
}

impl CacheDb {
    // =========================================================================
    // Entity envelope
    // =========================================================================

    /// Insert or refresh the envelope row keyed by upstream ID, returning its
    /// rowid.
    ///
    /// A row that already exists keeps its rowid forever; refreshes overwrite
    /// the name and console URL with whatever the caller carries, absent
    /// values included. `cached_at` is bumped either way.
    pub fn upsert_entity(
        &self,
        kind: EntityKind,
        pd_id: &str,
        name: Option<&str>,
        html_url: Option<&str>,
    ) -> Result<i64, DbError> {
        let name = name.map(|n| truncate_chars(n, MAX_NAME_LEN));
        let html_url = html_url.map(|u| truncate_chars(u, MAX_URL_LEN));
        let cached_at = crate::util::format_utc(Utc::now());

        let existing: Option<i64> = {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT id FROM {} WHERE pd_id = ?1", kind.table()))?;
            let mut rows = stmt.query_map(params![pd_id], |row| row.get(0))?;
            match rows.next() {
                Some(row) => Some(row?),
                None => None,
            }
        };

        match existing {
            Some(id) => {
                self.conn.execute(
                    &format!(
                        "UPDATE {} SET
                            cached_at = ?1,
                            name = ?2,
                            html_url = ?3
                         WHERE id = ?4",
                        kind.table()
                    ),
                    params![cached_at, name, html_url, id],
                )?;
                Ok(id)
            }
            None => {
                self.conn.execute(
                    &format!(
                        "INSERT INTO {} (pd_id, cached_at, name, html_url)
                         VALUES (?1, ?2, ?3, ?4)",
                        kind.table()
                    ),
                    params![pd_id, cached_at, name, html_url],
                )?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    /// Fetch one envelope row by upstream ID.
    pub fn get_entity(
        &self,
        kind: EntityKind,
        pd_id: &str,
    ) -> Result<Option<CachedEntity>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, pd_id, cached_at, name, html_url FROM {} WHERE pd_id = ?1",
            kind.table()
        ))?;

        let mut rows = stmt.query_map(params![pd_id], |row| {
            Ok(CachedEntity {
                id: row.get(0)?,
                pd_id: row.get(1)?,
                cached_at: row.get(2)?,
                name: row.get(3)?,
                html_url: row.get(4)?,
            })
        })?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}
