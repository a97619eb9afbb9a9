//! Local cache and analysis layer for PagerDuty incident data.
//!
//! Pulls incidents, their alerts, and the people around them from the
//! PagerDuty REST API into a SQLite database, derives the attributes
//! the API doesn't carry (on-call shift, alert namespace, silenced
//! state), and answers canned report questions over the result.

pub mod backfill;
pub mod config;
pub mod db;
pub mod derived;
pub mod error;
pub mod ingest;
mod migrations;
pub mod pd;
pub mod reconcile;
pub mod report;
pub mod sync;
pub mod util;
