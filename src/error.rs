//! Crate-level error type for sync and backfill flows.
//!
//! Storage and API failures carry their own enums ([`DbError`],
//! [`PdError`]); this type unifies them for the orchestration layers,
//! plus the per-record failures that surface while turning API payloads
//! into cache rows.

use thiserror::Error;

use crate::db::types::DbError;
use crate::derived::InvalidName;
use crate::pd::PdError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Api(#[from] PdError),

    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    #[error("Invalid timestamp {0:?}")]
    Timestamp(String),

    #[error("Incident {0} has no service")]
    MissingService(String),

    #[error("Alert {alert} references unknown incident {incident}")]
    UnknownIncident { alert: String, incident: String },

    #[error("Malformed record: {0}")]
    Record(String),
}
