//! Shared type definitions for the database layer.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Column capacity limits, enforced in code before a row is written.
pub const MAX_NAME_LEN: usize = 511;
pub const MAX_URL_LEN: usize = 511;
pub const MAX_SERVICE_LEN: usize = 255;
pub const MAX_ESC_POLICY_LEN: usize = 255;
pub const MAX_CLUSTER_ID_LEN: usize = 40;
pub const MAX_NAMESPACE_LEN: usize = 255;

/// A row from one of the plain entity tables (`teams`, `agents`).
#[derive(Debug, Clone)]
pub struct CachedEntity {
    pub id: i64,
    pub pd_id: String,
    pub cached_at: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
}

/// A row from the `incidents` table.
#[derive(Debug, Clone)]
pub struct CachedIncident {
    pub id: i64,
    pub pd_id: String,
    pub cached_at: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub created_at: Option<String>,
    pub esc_policy: Option<String>,
    pub service: Option<String>,
    pub status: Option<String>,
    pub urgency: Option<String>,
    pub resolved_at: Option<String>,
    pub resolved_by_id: Option<i64>,
    pub silenced: bool,
}

/// A row from the `alerts` table.
#[derive(Debug, Clone)]
pub struct CachedAlert {
    pub id: i64,
    pub pd_id: String,
    pub cached_at: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub created_at: Option<String>,
    pub incident_id: i64,
    pub status: Option<String>,
    pub severity: Option<String>,
    pub suppressed: bool,
    pub cluster_id: Option<String>,
    pub shift: Option<String>,
    pub namespace: Option<String>,
    pub firing_details: Option<String>,
}

/// Field values extracted from one upstream incident record, ready to write.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub pd_id: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub esc_policy: Option<String>,
    pub service: String,
    pub status: String,
    pub urgency: String,
}

/// Field values extracted from one upstream alert record, ready to write.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub pd_id: String,
    pub name: String,
    pub html_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub incident_id: i64,
    pub status: String,
    pub severity: String,
    pub suppressed: bool,
    pub cluster_id: Option<String>,
    pub firing_details: Option<String>,
}
