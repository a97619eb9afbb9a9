//! Environment-driven configuration.
//!
//! Settings come from `PDCACHE_*` environment variables, with a `.env`
//! file in the working directory consulted for anything not already
//! set. Validation of required settings happens at the command layer,
//! where a missing token or team list can be reported per subcommand.

use std::path::PathBuf;

/// Runtime configuration pulled from the environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// `PDCACHE_API_TOKEN`: REST API token for the update command.
    pub api_token: Option<String>,
    /// `PDCACHE_TEAMS`: colon-separated team IDs to sync.
    pub team_ids: Vec<String>,
    /// `PDCACHE_DB`: cache database path override.
    pub db_path: Option<PathBuf>,
    /// `PDCACHE_API_URL`: API endpoint override.
    pub api_url: Option<String>,
    /// `PDCACHE_QUESTIONS`: colon-separated question IDs the report
    /// command answers by default.
    pub questions: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            api_token: read("PDCACHE_API_TOKEN"),
            team_ids: read("PDCACHE_TEAMS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            db_path: read("PDCACHE_DB").map(PathBuf::from),
            api_url: read("PDCACHE_API_URL"),
            questions: read("PDCACHE_QUESTIONS").map(|raw| split_list(&raw)),
        }
    }
}

fn read(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Colon-separated list with blank segments dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(':')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
