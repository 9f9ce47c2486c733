use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::info;

use crate::config::Config;
use crate::db::models::{
    EventRow, FightRow, FighterRow, OrphanFightRow, OrphanRoundStatRow, RankingEntryRow, RoundStatRow,
    UpcomingFightRow, WeightClassRow,
};
use crate::db::schema::{self, CURRENT_VERSION};
use crate::error::{AppError, Result};
use crate::normalize::Normalizer;
use crate::types::WeightClass;

const SEARCH_LIMIT: i64 = 50;

/// Connection settings shared by every opener of the store file. DELETE
/// journaling keeps the store a single file between transactions.
pub(crate) fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
}

pub(crate) async fn connect_with(opts: SqliteConnectOptions) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

/// Handle on the single-file store at the current schema version.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    path: PathBuf,
}

impl Store {
    /// Open the store, creating and seeding it when the file is missing or
    /// empty. An outdated schema is refused; `migrate` must run first.
    pub async fn open(cfg: &Config) -> Result<Self> {
        let pool = connect_with(connect_options(&cfg.db_path)).await?;
        let mut conn = pool.acquire().await?;
        let version = schema::detect_version(&mut conn).await?;

        if version == 0 {
            let mut tx = pool.begin().await?;
            schema::ensure_schema(&mut tx).await?;
            schema::set_user_version(&mut tx, CURRENT_VERSION).await?;
            tx.commit().await?;
            info!("[STORE] created {} at schema v{CURRENT_VERSION}", cfg.db_path.display());
        } else if version != CURRENT_VERSION {
            drop(conn);
            pool.close().await;
            return Err(AppError::Schema(format!(
                "{} is at schema v{version}, expected v{CURRENT_VERSION}; run `ufc-ranker migrate`",
                cfg.db_path.display()
            )));
        }
        drop(conn);

        Ok(Self {
            pool,
            path: cfg.db_path.clone(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One logical batch. Dropping the transaction without commit rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Close every pooled connection so the file can be copied.
    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn schema_version(&self) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        schema::user_version(&mut conn).await
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // -----------------------------------------------------------------------
    // Weight classes
    // -----------------------------------------------------------------------

    pub async fn weight_classes(&self) -> Result<Vec<WeightClassRow>> {
        let rows = sqlx::query_as::<_, WeightClassRow>(
            "SELECT id, token, name_en, name_ru, weight_limit_kg, sort_order
             FROM weight_classes ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Resolve a user-supplied filter (token, English or Russian name).
    pub async fn weight_class_id(&self, filter: &str) -> Result<Option<i64>> {
        let token = match WeightClass::from_token(filter.trim()) {
            Some(wc) => wc.token(),
            None => match Normalizer::new().normalize_weight_class(filter) {
                WeightClass::Unknown => return Ok(None),
                wc => wc.token(),
            },
        };
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM weight_classes WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Rankings
    // -----------------------------------------------------------------------

    /// Latest snapshot of each weight class, or of one class when filtered.
    pub async fn latest_rankings(&self, weight_class_id: Option<i64>) -> Result<Vec<RankingEntryRow>> {
        let rows = sqlx::query_as::<_, RankingEntryRow>(
            r#"
            SELECT r.id, r.weight_class_id, wc.token AS weight_class_token,
                   wc.name_en AS weight_class_name, r.rank_position, r.rank_move, r.captured_at,
                   f.id AS fighter_id, f.name_en AS fighter_name_en, f.name_ru AS fighter_name_ru,
                   f.country AS fighter_country, f.wins AS fighter_wins,
                   f.losses AS fighter_losses, f.draws AS fighter_draws
            FROM rankings r
            JOIN fighters f ON f.id = r.fighter_id
            JOIN weight_classes wc ON wc.id = r.weight_class_id
            WHERE r.captured_at = (
                    SELECT MAX(r2.captured_at) FROM rankings r2
                    WHERE r2.weight_class_id = r.weight_class_id)
              AND (?1 IS NULL OR r.weight_class_id = ?1)
            ORDER BY wc.sort_order, r.rank_position
            "#,
        )
        .bind(weight_class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Fighters
    // -----------------------------------------------------------------------

    pub async fn fighters(&self, limit: i64, offset: i64) -> Result<Vec<FighterRow>> {
        let rows = sqlx::query_as::<_, FighterRow>(
            "SELECT * FROM fighters ORDER BY COALESCE(name_en, name_ru) LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn fighter(&self, id: i64) -> Result<Option<FighterRow>> {
        let row = sqlx::query_as::<_, FighterRow>("SELECT * FROM fighters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Substring match on either name. SQLite folds case for ASCII only.
    pub async fn search_fighters(&self, q: &str) -> Result<Vec<FighterRow>> {
        let pattern = format!("%{}%", q.trim());
        let rows = sqlx::query_as::<_, FighterRow>(
            "SELECT * FROM fighters
             WHERE name_en LIKE ?1 COLLATE NOCASE OR name_ru LIKE ?1 COLLATE NOCASE
             ORDER BY COALESCE(name_en, name_ru) LIMIT ?2",
        )
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Events and fights
    // -----------------------------------------------------------------------

    pub async fn events(&self, upcoming: Option<bool>) -> Result<Vec<EventRow>> {
        let sql = match upcoming {
            Some(true) => "SELECT * FROM events WHERE status = 'scheduled' ORDER BY date ASC, id",
            Some(false) => "SELECT * FROM events WHERE status != 'scheduled' ORDER BY date DESC, id",
            None => "SELECT * FROM events ORDER BY date DESC, id",
        };
        let rows = sqlx::query_as::<_, EventRow>(sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn event(&self, id: i64) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Fights of one event in card order.
    pub async fn event_fights(&self, event_name: &str) -> Result<Vec<FightRow>> {
        let rows = sqlx::query_as::<_, FightRow>(
            r#"
            SELECT * FROM fights WHERE event_name = ?
            ORDER BY CASE card_type
                         WHEN 'Main' THEN 0
                         WHEN 'Preliminary' THEN 1
                         WHEN 'Early Preliminary' THEN 2
                         ELSE 3 END,
                     fight_order, id
            "#,
        )
        .bind(event_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upcoming_fights(&self, event_id: i64) -> Result<Vec<UpcomingFightRow>> {
        let rows = sqlx::query_as::<_, UpcomingFightRow>(
            r#"
            SELECT id, event_id, fighter1_name, fighter2_name, weight_class, card_type,
                   fight_order, is_main_event, is_title_fight
            FROM upcoming_fights WHERE event_id = ?
            ORDER BY CASE card_type
                         WHEN 'Main' THEN 0
                         WHEN 'Preliminary' THEN 1
                         WHEN 'Early Preliminary' THEN 2
                         ELSE 3 END,
                     fight_order, id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn fight(&self, id: i64) -> Result<Option<FightRow>> {
        let row = sqlx::query_as::<_, FightRow>("SELECT * FROM fights WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn fight_rounds(&self, fight_id: i64) -> Result<Vec<RoundStatRow>> {
        let rows = sqlx::query_as::<_, RoundStatRow>(
            r#"
            SELECT s.*, COALESCE(f.name_en, f.name_ru) AS fighter_name
            FROM fight_round_stats s
            LEFT JOIN fighters f ON f.id = s.fighter_id
            WHERE s.fight_id = ?
            ORDER BY s.round_number, s.fighter_id
            "#,
        )
        .bind(fight_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Quarantine
    // -----------------------------------------------------------------------

    pub async fn orphan_round_stats(&self) -> Result<Vec<OrphanRoundStatRow>> {
        let rows = sqlx::query_as::<_, OrphanRoundStatRow>("SELECT * FROM orphan_round_stats ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn orphan_fights(&self) -> Result<Vec<OrphanFightRow>> {
        let rows = sqlx::query_as::<_, OrphanFightRow>("SELECT * FROM orphan_fights ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
