//! pdcache CLI: keep a local cache of PagerDuty incidents and alerts,
//! and answer canned report questions over it.

use std::process;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use pdcache::backfill::{self, BackfillParams};
use pdcache::config::Config;
use pdcache::db::types::DbError;
use pdcache::db::CacheDb;
use pdcache::error::SyncError;
use pdcache::pd::PdSession;
use pdcache::report;
use pdcache::util::{format_utc, parse_utc};

#[derive(Parser, Debug)]
#[command(name = "pdcache")]
#[command(author, version, about = "Caches PagerDuty incidents and alerts for offline analysis", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull incidents and alerts from the API into the cache
    Update {
        /// Start of the caching window (RFC 3339 or YYYY-MM-DD)
        #[arg(short, long)]
        since: Option<String>,

        /// End of the caching window (RFC 3339 or YYYY-MM-DD)
        #[arg(short, long)]
        until: Option<String>,

        /// Maximum number of incidents to cache per pass
        #[arg(short, long, default_value_t = 10_000)]
        limit: usize,

        /// After the initial pass, keep going until the oldest cached
        /// incident is at least DAYS days old; --since and --until only
        /// affect the initial pass
        #[arg(short = 'b', long = "backfill", value_name = "DAYS", default_value_t = 0)]
        backfill_days: i64,

        /// Upper bound on backfill passes
        #[arg(long, default_value_t = 30)]
        max_attempts: u32,
    },

    /// Answer canned questions over the cached alerts
    Report {
        /// Start of the reporting window (RFC 3339 or YYYY-MM-DD;
        /// default: 30 days before the end)
        #[arg(short, long)]
        since: Option<String>,

        /// End of the reporting window (RFC 3339 or YYYY-MM-DD;
        /// default: now)
        #[arg(short, long)]
        until: Option<String>,

        /// Answer a single question by ID instead of all of them
        #[arg(short, long)]
        question: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::from_env();

    let result = match cli.command {
        Commands::Update {
            since,
            until,
            limit,
            backfill_days,
            max_attempts,
        } => run_update(&config, since, until, limit, backfill_days, max_attempts),
        Commands::Report {
            since,
            until,
            question,
        } => run_report(&config, since, until, question),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run_update(
    config: &Config,
    since: Option<String>,
    until: Option<String>,
    limit: usize,
    backfill_days: i64,
    max_attempts: u32,
) -> Result<(), String> {
    let Some(token) = config.api_token.clone() else {
        return Err("PDCACHE_API_TOKEN is not set".to_string());
    };
    if config.team_ids.is_empty() {
        return Err("PDCACHE_TEAMS is not set".to_string());
    }

    let since = parse_time_arg(since.as_deref())?;
    let until = parse_time_arg(until.as_deref())?;
    let target = Utc::now() - Duration::days(backfill_days);

    let session = match &config.api_url {
        Some(url) => PdSession::with_base_url(&token, url),
        None => PdSession::new(&token),
    }
    .map_err(|err| err.to_string())?;

    let db = open_db(config).map_err(|err| err.to_string())?;

    let params = BackfillParams {
        team_ids: config.team_ids.clone(),
        since,
        until,
        max_incidents: limit,
        target,
        max_attempts,
    };

    log::debug!(
        "Starting cache update: since={:?}, until={:?}, team_ids={:?}, limit={}, backfill={}",
        since,
        until,
        config.team_ids,
        limit,
        backfill_days
    );

    let outcome = db
        .with_transaction(|db| backfill::run_backfill(db, &session, &params))
        .map_err(|err: SyncError| err.to_string())?;

    println!(
        "Cached {} incidents and {} alerts over {} pass(es).",
        outcome.incidents, outcome.alerts, outcome.runs
    );
    if backfill_days > 0 && !outcome.reached_target {
        println!("Backfill target not reached; see warnings above.");
    }
    log::info!("Database update complete!");

    Ok(())
}

fn run_report(
    config: &Config,
    since: Option<String>,
    until: Option<String>,
    question: Option<String>,
) -> Result<(), String> {
    let until = parse_time_arg(until.as_deref())?.unwrap_or_else(Utc::now);
    let since = parse_time_arg(since.as_deref())?.unwrap_or_else(|| until - Duration::days(30));

    let db = open_db_readonly(config).map_err(|err| err.to_string())?;

    let answers = match question.as_deref() {
        Some(id) => {
            let def = report::question(id).ok_or_else(|| {
                let known: Vec<&str> = report::QUESTIONS.iter().map(|q| q.id).collect();
                format!("Unknown question {:?} (known: {})", id, known.join(", "))
            })?;
            vec![report::ask(&db, def, since, until).map_err(|err| err.to_string())?]
        }
        None => {
            let all = report::ask_all(&db, since, until).map_err(|err| err.to_string())?;
            match &config.questions {
                Some(wanted) => all
                    .into_iter()
                    .filter(|answer| wanted.iter().any(|id| id == answer.question_id))
                    .collect(),
                None => all,
            }
        }
    };

    println!(
        "Reporting window: {} to {}",
        format_utc(since),
        format_utc(until)
    );
    for answer in &answers {
        println!();
        print!("{}", answer.render());
    }

    Ok(())
}

fn open_db(config: &Config) -> Result<CacheDb, DbError> {
    match &config.db_path {
        Some(path) => CacheDb::open_at(path.clone()),
        None => CacheDb::open(),
    }
}

fn open_db_readonly(config: &Config) -> Result<CacheDb, DbError> {
    match &config.db_path {
        Some(path) => CacheDb::open_readonly_at(path),
        None => CacheDb::open_readonly(),
    }
}

/// Accepts a full RFC 3339 timestamp or a bare date (midnight UTC).
fn parse_time_arg(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Some(parsed) = parse_utc(raw) {
        return Ok(Some(parsed));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(midnight.and_utc()));
        }
    }

    Err(format!(
        "Unrecognized time {:?}; use RFC 3339 or YYYY-MM-DD",
        raw
    ))
}
