//! Schema evolution by table rebuild.
//!
//! Each `(from, to)` step creates `<table>_new` with the target layout, streams
//! rows across with per-column transforms, drops the old table, renames the
//! new one and rebuilds its indexes. All steps of one run share a single
//! transaction, and a snapshot taken beforehand is copied back on failure.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::schema::{self, CURRENT_VERSION, FIGHTS_INDEXES, RANKINGS_INDEXES};
use crate::db::snapshot;
use crate::db::store::{connect_options, connect_with, Store};
use crate::error::{AppError, Result};
use crate::normalize::{classify_method, parse_judges_score, MethodOutcome};
use crate::types::{FightResult, RankMove};

/// Rows copied per page while streaming a rebuilt table.
const PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    /// Pre-migration snapshot; `None` for fresh stores and no-op runs.
    pub snapshot: Option<PathBuf>,
    pub rows_rebuilt: u64,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Bring the store at `cfg.db_path` to the current schema version.
pub async fn migrate(cfg: &Config, now: NaiveDateTime) -> Result<MigrationReport> {
    let from = if cfg.db_path.exists() {
        let pool = connect_with(connect_options(&cfg.db_path)).await?;
        let mut conn = pool.acquire().await?;
        let version = schema::detect_version(&mut conn).await;
        drop(conn);
        pool.close().await;
        version?
    } else {
        0
    };

    if from == 0 {
        Store::open(cfg).await?.close().await;
        info!("[MIGRATE] initialized {} at v{CURRENT_VERSION}", cfg.db_path.display());
        return Ok(MigrationReport {
            from,
            to: CURRENT_VERSION,
            snapshot: None,
            rows_rebuilt: 0,
        });
    }
    if from == CURRENT_VERSION {
        info!("[MIGRATE] {} already at v{CURRENT_VERSION}", cfg.db_path.display());
        return Ok(MigrationReport {
            from,
            to: from,
            snapshot: None,
            rows_rebuilt: 0,
        });
    }
    if from > CURRENT_VERSION {
        return Err(AppError::Schema(format!(
            "store is at v{from}, newer than this build (v{CURRENT_VERSION}); downgrade refused"
        )));
    }

    let snap = snapshot::create(cfg, now).await?;
    info!("[MIGRATE] v{from} -> v{CURRENT_VERSION}, snapshot {}", snap.display());

    match run_steps(cfg, from).await {
        Ok(rows_rebuilt) => {
            info!("[MIGRATE] done, {rows_rebuilt} rows rebuilt");
            Ok(MigrationReport {
                from,
                to: CURRENT_VERSION,
                snapshot: Some(snap),
                rows_rebuilt,
            })
        }
        Err(e) => {
            error!("[MIGRATE] failed: {e}; restoring {}", snap.display());
            std::fs::copy(&snap, &cfg.db_path)?;
            Err(AppError::Migration {
                snapshot: snap.display().to_string(),
                reason: e.to_string(),
            })
        }
    }
}

async fn run_steps(cfg: &Config, from: u32) -> Result<u64> {
    // Dropping a referenced table must not cascade into its children.
    let pool = connect_with(connect_options(&cfg.db_path).foreign_keys(false)).await?;

    let result: Result<u64> = async {
        let mut tx = pool.begin().await?;
        let mut rows = 0;
        for version in from..CURRENT_VERSION {
            rows += match version {
                1 => fights_v1_to_v2(&mut tx).await?,
                2 => rankings_v2_to_v3(&mut tx).await?,
                v => return Err(AppError::Schema(format!("no migration step from v{v}"))),
            };
            info!("[MIGRATE] step v{version} -> v{} applied", version + 1);
        }
        schema::ensure_schema(&mut tx).await?;
        schema::set_user_version(&mut tx, CURRENT_VERSION).await?;
        tx.commit().await?;
        Ok(rows)
    }
    .await;

    pool.close().await;
    result
}

fn new_table_ddl(ddl: &str, table: &str) -> String {
    ddl.replacen(
        &format!("CREATE TABLE IF NOT EXISTS {table} ("),
        &format!("CREATE TABLE {table}_new ("),
        1,
    )
}

async fn swap_tables(conn: &mut SqliteConnection, table: &str, indexes: &[&str]) -> Result<()> {
    sqlx::query(&format!("DROP TABLE {table}")).execute(&mut *conn).await?;
    sqlx::query(&format!("ALTER TABLE {table}_new RENAME TO {table}"))
        .execute(&mut *conn)
        .await?;
    for ddl in indexes {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// v1 -> v2: fights by name with result flags
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct LegacyFightRow {
    id: i64,
    event_name: Option<String>,
    fighter1_name: Option<String>,
    fighter2_name: Option<String>,
    weight_class: Option<String>,
    scheduled_rounds: Option<i64>,
    method: Option<String>,
    method_details: Option<String>,
    round: Option<i64>,
    time: Option<String>,
    fight_date: Option<String>,
    location: Option<String>,
    notes: Option<String>,
    is_title_fight: Option<bool>,
    is_main_event: Option<bool>,
    winner_name: Option<String>,
    fighter1_record: Option<String>,
    fighter2_record: Option<String>,
    fight_time_seconds: Option<i64>,
    card_type: Option<String>,
    referee: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

/// Result flags for a legacy row. Finishing methods credit the left corner;
/// the free-text winner only decides rows whose method says nothing.
pub fn legacy_result(method: Option<&str>, winner: Option<&str>, f1: &str, f2: &str) -> FightResult {
    if f1.is_empty() || f2.is_empty() {
        return FightResult::Pending;
    }
    let win = |w: &str, l: &str| FightResult::Win {
        winner: w.to_string(),
        loser: l.to_string(),
    };
    match classify_method(method.unwrap_or_default()) {
        MethodOutcome::NoContest => FightResult::NoContest,
        MethodOutcome::Draw => FightResult::Draw,
        MethodOutcome::Finish => win(f1, f2),
        MethodOutcome::Unknown => match winner.map(str::trim) {
            Some(w) if w.eq_ignore_ascii_case(f1) => win(f1, f2),
            Some(w) if w.eq_ignore_ascii_case(f2) => win(f2, f1),
            _ => FightResult::Pending,
        },
    }
}

async fn fights_v1_to_v2(conn: &mut SqliteConnection) -> Result<u64> {
    sqlx::query(&new_table_ddl(schema::CREATE_FIGHTS, "fights"))
        .execute(&mut *conn)
        .await?;

    let mut last_id = 0i64;
    let mut copied = 0u64;
    let mut unresolved = 0u64;
    loop {
        let page = sqlx::query_as::<_, LegacyFightRow>(
            r#"
            SELECT f.id, f.event_name,
                   COALESCE(NULLIF(trim(a.name_en), ''), a.name_ru) AS fighter1_name,
                   COALESCE(NULLIF(trim(b.name_en), ''), b.name_ru) AS fighter2_name,
                   f.weight_class, f.scheduled_rounds, f.method, f.method_details, f.round,
                   f.time, CAST(f.fight_date AS TEXT) AS fight_date, f.location, f.notes,
                   f.is_title_fight, f.is_main_event, f.winner_name, f.fighter1_record,
                   f.fighter2_record, f.fight_time_seconds, f.card_type, f.referee,
                   CAST(f.created_at AS TEXT) AS created_at,
                   CAST(f.updated_at AS TEXT) AS updated_at
            FROM fights f
            LEFT JOIN fighters a ON a.id = f.fighter1_id
            LEFT JOIN fighters b ON b.id = f.fighter2_id
            WHERE f.id > ?
            ORDER BY f.id
            LIMIT ?
            "#,
        )
        .bind(last_id)
        .bind(PAGE_SIZE)
        .fetch_all(&mut *conn)
        .await?;
        if page.is_empty() {
            break;
        }

        for row in page {
            last_id = row.id;
            let f1 = row.fighter1_name.clone().unwrap_or_default();
            let f2 = row.fighter2_name.clone().unwrap_or_default();
            if f1.is_empty() || f2.is_empty() {
                unresolved += 1;
            }
            let (is_win, is_loss, is_draw, is_nc) =
                legacy_result(row.method.as_deref(), row.winner_name.as_deref(), &f1, &f2).flags();
            let judges_score = row.method_details.as_deref().and_then(parse_judges_score);
            insert_rebuilt_fight(conn, &row, &f1, &f2, [is_win, is_loss, is_draw, is_nc], judges_score).await?;
            copied += 1;
        }
    }

    if unresolved > 0 {
        warn!("[MIGRATE] {unresolved} fights reference unknown fighter ids");
    }
    swap_tables(conn, "fights", FIGHTS_INDEXES).await?;
    info!("[MIGRATE] fights rebuilt: {copied} rows");
    Ok(copied)
}

async fn insert_rebuilt_fight(
    conn: &mut SqliteConnection,
    row: &LegacyFightRow,
    f1: &str,
    f2: &str,
    flags: [Option<String>; 4],
    judges_score: Option<String>,
) -> Result<()> {
    let [is_win, is_loss, is_draw, is_nc] = flags;
    sqlx::query(
        r#"
        INSERT INTO fights_new (
            id, event_name, fighter1_name, fighter2_name, weight_class, scheduled_rounds,
            method, method_details, round, time, fight_date, location, notes,
            is_title_fight, is_main_event, is_win, is_loss, is_draw, is_nc,
            fighter1_record, fighter2_record, fight_time_seconds, card_type, fight_order,
            judges_score, referee, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?,
                  COALESCE(?, CURRENT_TIMESTAMP), COALESCE(?, CURRENT_TIMESTAMP))
        "#,
    )
    .bind(row.id)
    .bind(row.event_name.as_deref().unwrap_or_default())
    .bind(f1)
    .bind(f2)
    .bind(&row.weight_class)
    .bind(row.scheduled_rounds.unwrap_or(3))
    .bind(&row.method)
    .bind(&row.method_details)
    .bind(row.round)
    .bind(&row.time)
    .bind(&row.fight_date)
    .bind(&row.location)
    .bind(&row.notes)
    .bind(row.is_title_fight.unwrap_or(false))
    .bind(row.is_main_event.unwrap_or(false))
    .bind(is_win)
    .bind(is_loss)
    .bind(is_draw)
    .bind(is_nc)
    .bind(&row.fighter1_record)
    .bind(&row.fighter2_record)
    .bind(row.fight_time_seconds)
    .bind(&row.card_type)
    .bind(judges_score)
    .bind(&row.referee)
    .bind(&row.created_at)
    .bind(&row.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// v2 -> v3: rankings as timestamped snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct LegacyRankingRow {
    id: i64,
    fighter_id: i64,
    weight_class_id: i64,
    rank_position: Option<i64>,
    is_champion: Option<bool>,
    rank_change: Option<i64>,
    created_at: Option<String>,
}

fn rank_move_from_change(change: Option<i64>) -> Option<String> {
    let change = change.unwrap_or(0);
    let mv = match change {
        0 => return None,
        n if n > 0 => RankMove::Up(n.unsigned_abs() as u32),
        n => RankMove::Down(n.unsigned_abs() as u32),
    };
    Some(mv.to_string())
}

async fn rankings_v2_to_v3(conn: &mut SqliteConnection) -> Result<u64> {
    sqlx::query(&new_table_ddl(schema::CREATE_RANKINGS, "rankings"))
        .execute(&mut *conn)
        .await?;

    let mut last_id = 0i64;
    let mut copied = 0u64;
    loop {
        let page = sqlx::query_as::<_, LegacyRankingRow>(
            r#"
            SELECT id, fighter_id, weight_class_id, rank_position, is_champion, rank_change,
                   CAST(created_at AS TEXT) AS created_at
            FROM rankings WHERE id > ? ORDER BY id LIMIT ?
            "#,
        )
        .bind(last_id)
        .bind(PAGE_SIZE)
        .fetch_all(&mut *conn)
        .await?;
        if page.is_empty() {
            break;
        }

        for row in page {
            last_id = row.id;
            let position = if row.is_champion.unwrap_or(false) {
                0
            } else {
                row.rank_position.ok_or_else(|| {
                    AppError::Schema(format!("ranking {} has no position and is not a champion", row.id))
                })?
            };
            sqlx::query(
                r#"
                INSERT INTO rankings_new (id, fighter_id, weight_class_id, rank_position, rank_move, captured_at)
                VALUES (?, ?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP))
                "#,
            )
            .bind(row.id)
            .bind(row.fighter_id)
            .bind(row.weight_class_id)
            .bind(position)
            .bind(rank_move_from_change(row.rank_change))
            .bind(&row.created_at)
            .execute(&mut *conn)
            .await?;
            copied += 1;
        }
    }

    swap_tables(conn, "rankings", RANKINGS_INDEXES).await?;
    info!("[MIGRATE] rankings rebuilt: {copied} rows");
    Ok(copied)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePool;
    use std::path::Path;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    /// A pre-v2 store: fights keyed by fighter ids, rankings with champion flags.
    pub(crate) async fn legacy_v1_store(path: &Path, fights: usize) {
        let pool: SqlitePool = connect_with(connect_options(path)).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        for ddl in [
            schema::CREATE_WEIGHT_CLASSES,
            schema::CREATE_FIGHTERS,
            schema::CREATE_EVENTS,
            schema::LEGACY_V1_FIGHTS,
            schema::LEGACY_V2_RANKINGS,
        ] {
            sqlx::query(ddl).execute(&mut *conn).await.unwrap();
        }
        schema::seed_weight_classes(&mut conn).await.unwrap();

        for i in 1..=10 {
            sqlx::query("INSERT INTO fighters (name_en) VALUES (?)")
                .bind(format!("Fighter {i}"))
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        let mut tx = pool.begin().await.unwrap();
        for i in 0..fights {
            sqlx::query(
                "INSERT INTO fights (event_name, fighter1_id, fighter2_id, method, round, time, fight_date)
                 VALUES (?, ?, ?, 'KO', 1, '2:00', '2020-01-18')",
            )
            .bind(format!("UFC {}", 200 + i % 50))
            .bind((i % 10) as i64 + 1)
            .bind(((i + 1) % 10) as i64 + 1)
            .execute(&mut *tx)
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        sqlx::query(
            "INSERT INTO rankings (fighter_id, weight_class_id, rank_position, is_champion, rank_change, created_at)
             VALUES (1, 4, 1, 1, 0, '2024-01-01 00:00:00'),
                    (2, 4, 2, 0, 3, '2024-01-01 00:00:00'),
                    (3, 4, 3, 0, -1, '2024-01-01 00:00:00')",
        )
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);
        pool.close().await;
    }

    #[test]
    fn legacy_results_credit_the_left_corner_on_finishes() {
        let r = legacy_result(Some("KO"), None, "A B", "C D");
        assert_eq!(r, FightResult::Win { winner: "A B".into(), loser: "C D".into() });
        assert_eq!(legacy_result(Some("Decision (split draw)"), None, "A B", "C D"), FightResult::Draw);
        assert_eq!(legacy_result(Some("NC"), None, "A B", "C D"), FightResult::NoContest);
        assert_eq!(
            legacy_result(None, Some("C D"), "A B", "C D"),
            FightResult::Win { winner: "C D".into(), loser: "A B".into() }
        );
        assert_eq!(legacy_result(Some("KO"), None, "", "C D"), FightResult::Pending);
    }

    #[test]
    fn rank_changes_become_move_markers() {
        assert_eq!(rank_move_from_change(Some(3)).as_deref(), Some("↑3"));
        assert_eq!(rank_move_from_change(Some(-1)).as_deref(), Some("↓1"));
        assert_eq!(rank_move_from_change(Some(0)), None);
        assert_eq!(rank_move_from_change(None), None);
    }

    #[tokio::test]
    async fn v1_store_is_rebuilt_preserving_rows() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_path(dir.path().join("ufc_ranker_v2.db"));
        legacy_v1_store(&cfg.db_path, 1_234).await;

        let report = migrate(&cfg, now()).await.unwrap();
        assert_eq!((report.from, report.to), (1, CURRENT_VERSION));
        assert_eq!(report.rows_rebuilt, 1_234 + 3);
        let snap = report.snapshot.unwrap();
        assert!(snap.ends_with("database_backups/ufc_ranker_v2_backup_20240501_083000.db"));

        let store = Store::open(&cfg).await.unwrap();
        assert_eq!(store.count_rows("fights").await.unwrap(), 1_234);

        let (min_id, max_id): (i64, i64) = sqlx::query_as("SELECT MIN(id), MAX(id) FROM fights")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!((min_id, max_id), (1, 1_234));

        let first = store.fight(1).await.unwrap().unwrap();
        assert_eq!(first.fighter1_name, "Fighter 1");
        assert_eq!(first.fighter2_name, "Fighter 2");
        assert_eq!(first.is_win.as_deref(), Some("Fighter 1"));
        assert_eq!(first.is_loss.as_deref(), Some("Fighter 2"));
        assert_eq!(first.fight_date.as_deref(), Some("2020-01-18"));

        let flagged: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fights
             WHERE is_win = fighter1_name AND is_loss = fighter2_name
               AND is_draw IS NULL AND is_nc IS NULL AND fighter1_name != ''",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(flagged, 1_234);

        let ranks: Vec<(i64, i64, Option<String>, String)> = sqlx::query_as(
            "SELECT fighter_id, rank_position, rank_move, captured_at FROM rankings ORDER BY fighter_id",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(ranks[0], (1, 0, None, "2024-01-01 00:00:00".to_string()));
        assert_eq!(ranks[1].2.as_deref(), Some("↑3"));
        assert_eq!(ranks[2].2.as_deref(), Some("↓1"));

        let indexed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name IN ('idx_fights_is_win', 'idx_fights_event_name')",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(indexed, 2);
        assert_eq!(store.count_rows("orphan_round_stats").await.unwrap(), 0);
        store.close().await;
    }

    #[tokio::test]
    async fn migrating_a_current_store_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_path(dir.path().join("ufc.db"));
        legacy_v1_store(&cfg.db_path, 12).await;
        migrate(&cfg, now()).await.unwrap();
        let before = std::fs::read(&cfg.db_path).unwrap();

        let report = migrate(&cfg, now()).await.unwrap();
        assert!(report.is_noop());
        assert!(report.snapshot.is_none());
        assert_eq!(std::fs::read(&cfg.db_path).unwrap(), before);
    }

    #[tokio::test]
    async fn fresh_store_is_initialized_without_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_path(dir.path().join("ufc.db"));
        let report = migrate(&cfg, now()).await.unwrap();
        assert_eq!((report.from, report.to), (0, CURRENT_VERSION));
        assert!(report.snapshot.is_none());
        assert!(!cfg.snapshot_dir().exists());
    }

    #[tokio::test]
    async fn failed_step_restores_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_path(dir.path().join("ufc.db"));
        legacy_v1_store(&cfg.db_path, 5).await;

        // A contender without a position cannot be carried into v3.
        let pool = connect_with(connect_options(&cfg.db_path)).await.unwrap();
        sqlx::query("INSERT INTO rankings (fighter_id, weight_class_id, rank_position, is_champion) VALUES (4, 4, NULL, 0)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
        let before = std::fs::read(&cfg.db_path).unwrap();

        let err = migrate(&cfg, now()).await.unwrap_err();
        let AppError::Migration { snapshot, reason } = err else {
            panic!("expected a migration error, got {err:?}");
        };
        assert!(reason.contains("no position"));
        assert!(Path::new(&snapshot).exists());
        assert_eq!(std::fs::read(&cfg.db_path).unwrap(), before);
        assert!(matches!(Store::open(&cfg).await, Err(AppError::Schema(_))));
    }

    #[tokio::test]
    async fn newer_stores_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_path(dir.path().join("ufc.db"));
        let store = Store::open(&cfg).await.unwrap();
        sqlx::query("PRAGMA user_version = 9").execute(store.pool()).await.unwrap();
        store.close().await;

        assert!(matches!(migrate(&cfg, now()).await, Err(AppError::Schema(_))));
    }
}
