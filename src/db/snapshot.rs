//! Whole-file snapshots of the store.
//!
//! Snapshots live in `<db dir>/database_backups/` and are named
//! `<db stem>_backup_YYYYMMDD_HHMMSS.db`. Both directions copy the file
//! verbatim, so callers must close every pool on the store first.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::schema::{self, REQUIRED_TABLES};
use crate::db::store::connect_with;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

fn db_stem(db_path: &Path) -> String {
    db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string())
}

fn snapshot_prefix(db_path: &Path) -> String {
    format!("{}_backup_", db_stem(db_path))
}

pub fn snapshot_file_name(db_path: &Path, at: NaiveDateTime) -> String {
    format!("{}{}.db", snapshot_prefix(db_path), at.format("%Y%m%d_%H%M%S"))
}

/// Open a file read-only and check that every required table exists and that
/// together they hold at least one row. Returns the row total.
pub async fn probe(path: &Path) -> Result<i64> {
    if !path.is_file() {
        return Err(AppError::Snapshot(format!("{} does not exist", path.display())));
    }
    let opts = SqliteConnectOptions::new().filename(path).read_only(true);
    let pool = connect_with(opts).await?;
    let result = probe_pool(&pool).await;
    pool.close().await;

    let total = result?;
    if total == 0 {
        return Err(AppError::Snapshot(format!(
            "{}: required tables are empty",
            path.display()
        )));
    }
    Ok(total)
}

async fn probe_pool(pool: &sqlx::SqlitePool) -> Result<i64> {
    let mut conn = pool.acquire().await?;
    let mut total = 0i64;
    for table in REQUIRED_TABLES {
        if !schema::table_exists(&mut conn, table).await? {
            return Err(AppError::Snapshot(format!("required table '{table}' is missing")));
        }
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut *conn)
            .await?;
        total += n;
    }
    Ok(total)
}

/// Copy the store into the snapshot directory, probe the copy, then prune to
/// the configured retention.
pub async fn create(cfg: &Config, at: NaiveDateTime) -> Result<PathBuf> {
    if !cfg.db_path.is_file() {
        return Err(AppError::Snapshot(format!(
            "no store at {}",
            cfg.db_path.display()
        )));
    }
    let dir = cfg.snapshot_dir();
    std::fs::create_dir_all(&dir)?;

    let base = snapshot_file_name(&cfg.db_path, at);
    let mut target = dir.join(&base);
    let mut n = 1;
    while target.exists() {
        let stem = base.trim_end_matches(".db");
        target = dir.join(format!("{stem}_{n}.db"));
        n += 1;
    }

    std::fs::copy(&cfg.db_path, &target)?;
    if let Err(e) = probe(&target).await {
        if let Err(rm) = std::fs::remove_file(&target) {
            warn!("[SNAPSHOT] could not remove failed snapshot {}: {rm}", target.display());
        }
        return Err(e);
    }
    info!("[SNAPSHOT] {} -> {}", cfg.db_path.display(), target.display());

    prune(cfg)?;
    Ok(target)
}

/// Snapshots of this store, newest first.
pub fn list(cfg: &Config) -> Result<Vec<SnapshotInfo>> {
    let dir = cfg.snapshot_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = snapshot_prefix(&cfg.db_path);
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".db") {
            continue;
        }
        out.push(SnapshotInfo {
            size_bytes: entry.metadata()?.len(),
            path: entry.path(),
            name,
        });
    }
    // Timestamps sort lexically; a `_N` suffix sorts after its base name.
    out.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(out)
}

fn prune(cfg: &Config) -> Result<()> {
    for stale in list(cfg)?.into_iter().skip(cfg.backup_retention) {
        match std::fs::remove_file(&stale.path) {
            Ok(()) => info!("[SNAPSHOT] pruned {}", stale.name),
            Err(e) => warn!("[SNAPSHOT] could not prune {}: {e}", stale.name),
        }
    }
    Ok(())
}

/// A bare file name resolves inside the snapshot directory.
pub fn resolve(cfg: &Config, arg: &str) -> PathBuf {
    let p = Path::new(arg);
    if p.components().count() == 1 {
        cfg.snapshot_dir().join(p)
    } else {
        p.to_path_buf()
    }
}

/// Probe a snapshot and copy it over the store file.
pub async fn restore(cfg: &Config, arg: &str) -> Result<PathBuf> {
    let source = resolve(cfg, arg);
    probe(&source).await?;
    std::fs::copy(&source, &cfg.db_path)?;
    info!("[SNAPSHOT] restored {} from {}", cfg.db_path.display(), source.display());
    Ok(source)
}
