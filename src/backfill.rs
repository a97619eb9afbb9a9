//! Bounded backfill around the sync pass.
//!
//! One pass caches the newest incidents in the requested window. When
//! the oldest cached incident is still younger than the backfill
//! target, the window slides back to cover the gap and the pass runs
//! again, up to a fixed number of attempts. The caller wraps the whole
//! run in a single transaction so a failed backfill leaves the cache
//! untouched.

use chrono::{DateTime, Duration, Utc};

use crate::db::CacheDb;
use crate::error::SyncError;
use crate::pd::Upstream;
use crate::sync;
use crate::util::format_utc;

pub struct BackfillParams {
    pub team_ids: Vec<String>,
    /// Initial window; later passes replace it with the computed gap.
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Per-pass incident cap.
    pub max_incidents: usize,
    /// The cache is complete once its oldest incident predates this.
    pub target: DateTime<Utc>,
    pub max_attempts: u32,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub runs: u32,
    pub incidents: usize,
    pub alerts: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub reached_target: bool,
}

/// Run sync passes until the cache reaches the backfill target or the
/// attempt budget runs out.
pub fn run_backfill(
    db: &CacheDb,
    api: &dyn Upstream,
    params: &BackfillParams,
) -> Result<BackfillReport, SyncError> {
    let mut since = params.since;
    let mut until = params.until;
    let mut attempts_remaining = params.max_attempts.max(1);
    let mut report = BackfillReport::default();

    while attempts_remaining > 0 {
        attempts_remaining -= 1;
        report.runs += 1;

        let incidents = sync::sync_incidents(
            db,
            api,
            &params.team_ids,
            since,
            until,
            params.max_incidents,
        )?;
        report.incidents += incidents.len();
        report.alerts += sync::sync_alerts(db, api, &incidents)?;

        let Some(oldest) = db.oldest_incident_created_at()? else {
            // Nothing cached and nothing upstream: no window to walk.
            log::warn!("Incident cache is empty!");
            break;
        };
        report.oldest = Some(oldest);

        if oldest <= params.target {
            report.reached_target = true;
            break;
        }

        // The next window starts a day before the target so successive
        // passes keep making progress.
        since = Some(params.target - Duration::days(1));
        until = Some(oldest);
        log::info!(
            "Attempting to backfill {} to {}",
            format_utc(params.target - Duration::days(1)),
            format_utc(oldest)
        );
        log::debug!("{} attempts remaining", attempts_remaining);

        if attempts_remaining == 0 {
            let shortfall = oldest - params.target;
            log::warn!(
                "Ran out of attempts without meeting the backfill target ({}h short). \
                 Ensure incidents exist throughout the requested time window, then try \
                 again with a larger --limit or smaller --backfill-days",
                shortfall.num_hours()
            );
        }
    }

    Ok(report)
}
