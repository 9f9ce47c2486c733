use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

pub const WIKIPEDIA_BASE_URL: &str = "https://en.wikipedia.org";
pub const EVENTS_LIST_URL: &str = "https://en.wikipedia.org/wiki/List_of_UFC_events";
pub const FIGHT_RU_BASE_URL: &str = "https://fight.ru";
pub const RANKINGS_URL: &str = "https://fight.ru/fighter-ratings/ufc/";
pub const STATS_ARCHIVE_URL: &str =
    "https://github.com/mtoto/ufc.stats/raw/master/data/ufc_stats.rda";

/// Wikipedia serves alternate markup to non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_DATABASE_PATH: &str = "ufc_ranker_v2.db";

/// Sibling directory of the store file that holds snapshots.
pub const SNAPSHOT_DIR_NAME: &str = "database_backups";

/// Sleep before retry N (milliseconds). Attempts beyond the table reuse the last entry.
pub const FETCH_BACKOFF_MS: &[u64] = &[1_000, 2_000, 4_000];

/// Default number of event pages visited by one `event-cards` run.
pub const DEFAULT_EVENT_CARDS_LIMIT: usize = 20;

/// Default number of fighter profile pages visited by one `profiles` run.
pub const DEFAULT_PROFILE_LIMIT: usize = 50;

/// Default wall-clock budget of a single job (seconds).
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 1_800;

pub const DEFAULT_API_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the single-file store (DATABASE_URL, `sqlite:` prefix stripped).
    pub db_path: PathBuf,
    /// Per-request deadline (HTTP_TIMEOUT_SECONDS)
    pub http_timeout: Duration,
    /// Attempts per fetch, including the first (FETCH_RETRIES)
    pub fetch_attempts: u32,
    /// Snapshots kept after pruning (BACKUP_RETENTION)
    pub backup_retention: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());

        let http_timeout_secs = std::env::var("HTTP_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|e| AppError::Config(format!("HTTP_TIMEOUT_SECONDS: {e}")))?;

        let fetch_attempts = std::env::var("FETCH_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .map_err(|e| AppError::Config(format!("FETCH_RETRIES: {e}")))?;

        let backup_retention = std::env::var("BACKUP_RETENTION")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<usize>()
            .map_err(|e| AppError::Config(format!("BACKUP_RETENTION: {e}")))?;

        Ok(Self {
            db_path: db_path_from_url(&database_url)?,
            http_timeout: Duration::from_secs(http_timeout_secs.max(1)),
            fetch_attempts: fetch_attempts.max(1),
            backup_retention: backup_retention.max(1),
        })
    }

    /// Configuration rooted at an explicit store path, defaults elsewhere.
    pub fn for_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            http_timeout: Duration::from_secs(30),
            fetch_attempts: 3,
            backup_retention: 5,
        }
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        snapshot_dir_for(&self.db_path)
    }
}

pub fn snapshot_dir_for(db_path: &Path) -> PathBuf {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(SNAPSHOT_DIR_NAME),
        _ => PathBuf::from(SNAPSHOT_DIR_NAME),
    }
}

/// Accepts a bare path or a `sqlite:` / `sqlite://` URL. In-memory URLs are
/// rejected: snapshots and the advisory lock need a real file.
pub fn db_path_from_url(url: &str) -> Result<PathBuf> {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path == ":memory:" {
        return Err(AppError::Config(format!(
            "DATABASE_URL must name a database file, got '{url}'"
        )));
    }
    Ok(PathBuf::from(path))
}
