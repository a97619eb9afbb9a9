//! Canned report questions over the alert cache.
//!
//! Each question is one parameterized SQL query evaluated over a time
//! window on alert creation. The standard questions aggregate by alert
//! identity (name, namespace, urgency, silenced) and only report
//! repeat offenders; the flapping question aggregates per shift first
//! and then sums across shifts.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::types::DbError;
use crate::db::CacheDb;
use crate::util::format_utc;

pub struct QuestionDef {
    pub id: &'static str,
    pub description: &'static str,
    pub columns: &'static [&'static str],
    sql: &'static str,
}

const STANDARD_COLUMNS: &[&str] = &["name", "namespace", "urgency", "silenced", "occurrences"];

macro_rules! standard_sql {
    ($filter:literal) => {
        concat!(
            "SELECT a.name, a.namespace, i.urgency, i.silenced, COUNT(*) AS occurrences
  FROM alerts a
  JOIN incidents i ON i.id = a.incident_id
 WHERE a.created_at BETWEEN ?1 AND ?2
   AND ",
            $filter,
            "
 GROUP BY a.name, a.namespace, i.urgency, i.silenced
HAVING COUNT(*) > 1
 ORDER BY occurrences DESC"
        )
    };
}

/// Every question the report command knows how to answer.
pub const QUESTIONS: &[QuestionDef] = &[
    QuestionDef {
        id: "nack",
        description: "Which alerts have yet to be acknowledged by SRE?",
        columns: STANDARD_COLUMNS,
        sql: standard_sql!(
            "NOT EXISTS (SELECT 1 FROM incident_acknowledgers ack
                          WHERE ack.incident_id = i.id)"
        ),
    },
    QuestionDef {
        id: "nacksres",
        description: "Which alerts self-resolve without acknowledgement?",
        columns: STANDARD_COLUMNS,
        sql: standard_sql!(
            "NOT EXISTS (SELECT 1 FROM incident_acknowledgers ack
                          WHERE ack.incident_id = i.id)
   AND EXISTS (SELECT 1 FROM agents ag
                WHERE ag.id = i.resolved_by_id
                  AND ag.name LIKE '%Alertmanager%')"
        ),
    },
    QuestionDef {
        id: "ackures",
        description: "Which alerts are acknowledged but never resolved?",
        columns: STANDARD_COLUMNS,
        sql: standard_sql!(
            "EXISTS (SELECT 1 FROM incident_acknowledgers ack
              WHERE ack.incident_id = i.id)
   AND i.resolved_at IS NULL"
        ),
    },
    QuestionDef {
        id: "sres15",
        description: "Which alerts self-resolve within 15 minutes?",
        columns: STANDARD_COLUMNS,
        sql: standard_sql!(
            "i.resolved_at IS NOT NULL
   AND EXISTS (SELECT 1 FROM agents ag
                WHERE ag.id = i.resolved_by_id
                  AND ag.name LIKE '%Alertmanager%')
   AND unixepoch(i.resolved_at) < unixepoch(i.created_at) + 900"
        ),
    },
    QuestionDef {
        id: "eres15",
        description: "Which alerts are resolved within 15 minutes by SRE?",
        columns: STANDARD_COLUMNS,
        sql: standard_sql!(
            "i.resolved_at IS NOT NULL
   AND NOT EXISTS (SELECT 1 FROM agents ag
                    WHERE ag.id = i.resolved_by_id
                      AND ag.name LIKE '%Alertmanager%')
   AND unixepoch(i.resolved_at) < unixepoch(i.created_at) + 900"
        ),
    },
    QuestionDef {
        id: "sflap",
        description: "Which alerts fire more than once per on-call shift (in the same cluster)?",
        columns: &["cluster", "name", "namespace", "urgency", "flaps"],
        sql: "SELECT cluster_id, name, namespace, urgency, SUM(flap_count) AS flaps
  FROM (SELECT a.cluster_id AS cluster_id, a.name AS name, a.namespace AS namespace,
               i.urgency AS urgency, COUNT(*) AS flap_count
          FROM alerts a
          JOIN incidents i ON i.id = a.incident_id
         WHERE a.created_at BETWEEN ?1 AND ?2
         GROUP BY a.cluster_id, a.name, a.namespace, a.shift, i.urgency
        HAVING COUNT(*) > 1)
 GROUP BY cluster_id, name, namespace, urgency
 ORDER BY flaps DESC",
    },
];

/// Look up a question by its machine-readable ID.
pub fn question(id: &str) -> Option<&'static QuestionDef> {
    QUESTIONS.iter().find(|q| q.id == id)
}

/// The evaluated result of one question.
#[derive(Debug)]
pub struct Answer {
    pub question_id: &'static str,
    pub description: &'static str,
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
}

impl Answer {
    /// Render as an aligned text table, one header line plus one line
    /// per row.
    pub fn render(&self) -> String {
        let mut out = format!("{} [{}]\n", self.description, self.question_id);

        if self.rows.is_empty() {
            out.push_str("  (no rows)\n");
            return out;
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate() {
                if cell.len() > widths[idx] {
                    widths[idx] = cell.len();
                }
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, &width)| format!("{:<width$}", name))
            .collect();
        out.push_str("  ");
        out.push_str(header.join("  ").trim_end());
        out.push('\n');

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str("  ");
        out.push_str(&rule.join("  "));
        out.push('\n');

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{:<width$}", cell))
                .collect();
            out.push_str("  ");
            out.push_str(cells.join("  ").trim_end());
            out.push('\n');
        }

        out
    }
}

fn value_to_string(value: rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(t) => t,
        Value::Blob(_) => "<blob>".to_string(),
    }
}

/// Evaluate one question over the window.
pub fn ask(
    db: &CacheDb,
    def: &'static QuestionDef,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Answer, DbError> {
    let mut stmt = db.conn_ref().prepare(def.sql)?;
    let column_count = stmt.column_count();

    let mut out = Vec::new();
    let mut rows = stmt.query(params![format_utc(since), format_utc(until)])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            cells.push(value_to_string(row.get::<_, rusqlite::types::Value>(idx)?));
        }
        out.push(cells);
    }

    Ok(Answer {
        question_id: def.id,
        description: def.description,
        columns: def.columns,
        rows: out,
    })
}

/// Evaluate every question over the window, in declaration order.
pub fn ask_all(
    db: &CacheDb,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<Answer>, DbError> {
    QUESTIONS.iter().map(|def| ask(db, def, since, until)).collect()
}
