//! Current store layout (schema v3) plus the legacy layouts the migrator reads.

use sqlx::SqliteConnection;

use crate::error::Result;
use crate::types::{RoundCounters, WeightClass};

pub const CURRENT_VERSION: u32 = 3;

/// Tables that must exist (and hold rows) for a store file to count as intact.
pub const REQUIRED_TABLES: &[&str] = &["weight_classes", "fighters", "events", "fights", "rankings"];

pub const CREATE_WEIGHT_CLASSES: &str = r#"
CREATE TABLE IF NOT EXISTS weight_classes (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    token           TEXT NOT NULL UNIQUE,
    name_en         TEXT NOT NULL,
    name_ru         TEXT NOT NULL,
    weight_limit_kg REAL,
    sort_order      INTEGER NOT NULL DEFAULT 0
)"#;

pub const CREATE_FIGHTERS: &str = r#"
CREATE TABLE IF NOT EXISTS fighters (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    name_en                 TEXT,
    name_ru                 TEXT,
    country                 TEXT,
    birth_date              TEXT,
    wins                    INTEGER,
    losses                  INTEGER,
    draws                   INTEGER,
    no_contests             INTEGER,
    current_weight_class_id INTEGER REFERENCES weight_classes(id),
    profile_url             TEXT,
    created_at              TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at              TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#;

pub const CREATE_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    event_number INTEGER,
    event_type   TEXT NOT NULL,
    date         TEXT,
    venue        TEXT,
    location     TEXT,
    status       TEXT NOT NULL DEFAULT 'scheduled',
    source_url   TEXT,
    created_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#;

/// `fights` since v2: corners and result flags carried as names.
pub const CREATE_FIGHTS: &str = r#"
CREATE TABLE IF NOT EXISTS fights (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name         TEXT NOT NULL,
    fighter1_name      TEXT NOT NULL DEFAULT '',
    fighter2_name      TEXT NOT NULL DEFAULT '',
    weight_class       TEXT,
    scheduled_rounds   INTEGER NOT NULL DEFAULT 3,
    method             TEXT,
    method_details     TEXT,
    round              INTEGER,
    time               TEXT,
    fight_date         TEXT,
    location           TEXT,
    notes              TEXT,
    is_title_fight     INTEGER NOT NULL DEFAULT 0,
    is_main_event      INTEGER NOT NULL DEFAULT 0,
    is_win             TEXT,
    is_loss            TEXT,
    is_draw            TEXT,
    is_nc              TEXT,
    fighter1_record    TEXT,
    fighter2_record    TEXT,
    fight_time_seconds INTEGER,
    card_type          TEXT,
    fight_order        INTEGER,
    judges_score       TEXT,
    referee            TEXT,
    created_at         TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at         TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#;

/// `rankings` since v3: one row per fighter per captured snapshot.
pub const CREATE_RANKINGS: &str = r#"
CREATE TABLE IF NOT EXISTS rankings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    fighter_id      INTEGER NOT NULL REFERENCES fighters(id),
    weight_class_id INTEGER NOT NULL REFERENCES weight_classes(id),
    rank_position   INTEGER NOT NULL,
    rank_move       TEXT,
    captured_at     TEXT NOT NULL
)"#;

pub const CREATE_UPCOMING_FIGHTS: &str = r#"
CREATE TABLE IF NOT EXISTS upcoming_fights (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id       INTEGER NOT NULL REFERENCES events(id),
    fighter1_name  TEXT NOT NULL,
    fighter2_name  TEXT NOT NULL,
    weight_class   TEXT,
    card_type      TEXT,
    fight_order    INTEGER,
    is_main_event  INTEGER NOT NULL DEFAULT 0,
    is_title_fight INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (event_id, fighter1_name, fighter2_name)
)"#;

pub const CREATE_ORPHAN_ROUND_STATS: &str = r#"
CREATE TABLE IF NOT EXISTS orphan_round_stats (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name     TEXT NOT NULL DEFAULT '',
    fighter_name   TEXT NOT NULL,
    opponent_name  TEXT NOT NULL DEFAULT '',
    round_number   INTEGER NOT NULL,
    fight_date     TEXT,
    reason         TEXT NOT NULL,
    payload        TEXT NOT NULL,
    quarantined_at TEXT NOT NULL,
    UNIQUE (event_name, fighter_name, opponent_name, round_number)
)"#;

pub const CREATE_ORPHAN_FIGHTS: &str = r#"
CREATE TABLE IF NOT EXISTS orphan_fights (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name     TEXT NOT NULL,
    fighter1_name  TEXT NOT NULL,
    fighter2_name  TEXT NOT NULL,
    reason         TEXT NOT NULL,
    payload        TEXT NOT NULL,
    quarantined_at TEXT NOT NULL,
    UNIQUE (event_name, fighter1_name, fighter2_name)
)"#;

/// `fight_round_stats`, one INTEGER column per counter.
pub fn create_fight_round_stats() -> String {
    let counters: String = RoundCounters::COLUMNS
        .iter()
        .map(|c| format!("    {c} INTEGER,\n"))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS fight_round_stats (\n    \
         id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
         fight_id INTEGER NOT NULL REFERENCES fights(id),\n    \
         fighter_id INTEGER NOT NULL REFERENCES fighters(id),\n    \
         round_number INTEGER NOT NULL,\n\
         {counters}    \
         significant_strikes_rate REAL,\n    \
         takedown_rate REAL,\n    \
         winner INTEGER,\n    \
         created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
         UNIQUE (fight_id, fighter_id, round_number)\n)"
    )
}

pub const FIGHTS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_fights_event_name ON fights(event_name)",
    "CREATE INDEX IF NOT EXISTS idx_fights_fighter1_name ON fights(fighter1_name)",
    "CREATE INDEX IF NOT EXISTS idx_fights_fighter2_name ON fights(fighter2_name)",
    "CREATE INDEX IF NOT EXISTS idx_fights_date ON fights(fight_date)",
    "CREATE INDEX IF NOT EXISTS idx_fights_weight_class ON fights(weight_class)",
    "CREATE INDEX IF NOT EXISTS idx_fights_is_win ON fights(is_win)",
    "CREATE INDEX IF NOT EXISTS idx_fights_is_loss ON fights(is_loss)",
];

pub const RANKINGS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_rankings_fighter ON rankings(fighter_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_rankings_snapshot ON rankings(weight_class_id, captured_at, rank_position)",
];

pub const OTHER_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_events_event_number ON events(event_number)",
    "CREATE INDEX IF NOT EXISTS idx_events_name ON events(name)",
    "CREATE INDEX IF NOT EXISTS idx_events_date ON events(date)",
    "CREATE INDEX IF NOT EXISTS idx_fighters_name_en ON fighters(name_en COLLATE NOCASE)",
    "CREATE INDEX IF NOT EXISTS idx_fighters_name_ru ON fighters(name_ru)",
    "CREATE INDEX IF NOT EXISTS idx_round_stats_fight ON fight_round_stats(fight_id)",
];

/// Create every current table and index that is missing, then seed weight
/// classes. Existing rows are never touched.
pub async fn ensure_schema(conn: &mut SqliteConnection) -> Result<()> {
    for ddl in [
        CREATE_WEIGHT_CLASSES,
        CREATE_FIGHTERS,
        CREATE_EVENTS,
        CREATE_FIGHTS,
        CREATE_RANKINGS,
        CREATE_UPCOMING_FIGHTS,
        CREATE_ORPHAN_ROUND_STATS,
        CREATE_ORPHAN_FIGHTS,
    ] {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }
    sqlx::query(&create_fight_round_stats()).execute(&mut *conn).await?;

    for ddl in FIGHTS_INDEXES.iter().chain(RANKINGS_INDEXES).chain(OTHER_INDEXES) {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }
    seed_weight_classes(conn).await
}

pub async fn seed_weight_classes(conn: &mut SqliteConnection) -> Result<()> {
    for (i, wc) in WeightClass::SEEDED.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO weight_classes (token, name_en, name_ru, weight_limit_kg, sort_order)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(wc.token())
        .bind(wc.name_en())
        .bind(wc.name_ru())
        .bind(wc.weight_limit_kg())
        .bind(i as i64 + 1)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn set_user_version(conn: &mut SqliteConnection, version: u32) -> Result<()> {
    // PRAGMA does not take bind parameters.
    sqlx::query(&format!("PRAGMA user_version = {version}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn user_version(conn: &mut SqliteConnection) -> Result<u32> {
    let v: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;
    Ok(u32::try_from(v).unwrap_or(0))
}

pub async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
    Ok(n > 0)
}

pub async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let cols: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    Ok(cols)
}

/// Schema version of an existing store. `user_version` wins when set;
/// otherwise the layout of `fights` and `rankings` decides. 0 means empty.
pub async fn detect_version(conn: &mut SqliteConnection) -> Result<u32> {
    let recorded = user_version(conn).await?;
    if recorded > 0 {
        return Ok(recorded);
    }
    if !table_exists(conn, "fights").await? {
        return Ok(0);
    }
    let fights = table_columns(conn, "fights").await?;
    if fights.iter().any(|c| c == "fighter1_id") {
        return Ok(1);
    }
    let rankings = table_columns(conn, "rankings").await?;
    if rankings.iter().any(|c| c == "captured_at") {
        Ok(3)
    } else {
        Ok(2)
    }
}

// ---------------------------------------------------------------------------
// Legacy layouts
// ---------------------------------------------------------------------------

/// `fights` before v2: corners as fighter ids, a single free-text winner.
pub const LEGACY_V1_FIGHTS: &str = r#"
CREATE TABLE fights (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name         TEXT,
    fighter1_id        INTEGER NOT NULL REFERENCES fighters(id),
    fighter2_id        INTEGER NOT NULL REFERENCES fighters(id),
    weight_class       TEXT,
    scheduled_rounds   INTEGER DEFAULT 3,
    method             TEXT,
    method_details     TEXT,
    round              INTEGER,
    time               TEXT,
    fight_date         DATE,
    location           TEXT,
    notes              TEXT,
    is_title_fight     BOOLEAN DEFAULT 0,
    is_main_event      BOOLEAN DEFAULT 0,
    winner_name        TEXT,
    fighter1_record    TEXT,
    fighter2_record    TEXT,
    fight_time_seconds INTEGER,
    card_type          TEXT,
    referee            TEXT,
    created_at         DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at         DATETIME DEFAULT CURRENT_TIMESTAMP
)"#;

/// `rankings` before v3: champion flag and a numeric change, no snapshot time.
pub const LEGACY_V2_RANKINGS: &str = r#"
CREATE TABLE rankings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    fighter_id      INTEGER NOT NULL REFERENCES fighters(id),
    weight_class_id INTEGER NOT NULL REFERENCES weight_classes(id),
    rank_position   INTEGER,
    is_champion     BOOLEAN DEFAULT 0,
    rank_change     INTEGER DEFAULT 0,
    created_at      DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at      DATETIME DEFAULT CURRENT_TIMESTAMP
)"#;
