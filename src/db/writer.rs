//! Write-side CRUD used by the linker. Every function runs on the caller's
//! connection so a whole logical batch shares one transaction.

use serde_json::json;
use sqlx::SqliteConnection;

use crate::db::models::{EventRow, FighterRow};
use crate::error::Result;
use crate::types::{CanonicalEvent, CanonicalFight, CanonicalRoundStat, RoundCounters, WeightClass};

// ---------------------------------------------------------------------------
// Weight classes
// ---------------------------------------------------------------------------

pub async fn weight_class_id(conn: &mut SqliteConnection, wc: WeightClass) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM weight_classes WHERE token = ?")
        .bind(wc.token())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Fighters
// ---------------------------------------------------------------------------

pub async fn find_fighter_by_name_en(conn: &mut SqliteConnection, name_en: &str) -> Result<Option<FighterRow>> {
    let row = sqlx::query_as::<_, FighterRow>(
        "SELECT * FROM fighters WHERE lower(trim(name_en)) = lower(trim(?)) ORDER BY id LIMIT 1",
    )
    .bind(name_en)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn find_fighter_by_name_ru(conn: &mut SqliteConnection, name_ru: &str) -> Result<Option<FighterRow>> {
    let row = sqlx::query_as::<_, FighterRow>(
        "SELECT * FROM fighters WHERE trim(name_ru) = trim(?) ORDER BY id LIMIT 1",
    )
    .bind(name_ru)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Field values of a fighter row as written by the linker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FighterFields {
    pub name_en: Option<String>,
    pub name_ru: Option<String>,
    pub country: Option<String>,
    pub birth_date: Option<String>,
    pub wins: Option<i64>,
    pub losses: Option<i64>,
    pub draws: Option<i64>,
    pub no_contests: Option<i64>,
    pub current_weight_class_id: Option<i64>,
    pub profile_url: Option<String>,
}

impl From<&FighterRow> for FighterFields {
    fn from(row: &FighterRow) -> Self {
        Self {
            name_en: row.name_en.clone(),
            name_ru: row.name_ru.clone(),
            country: row.country.clone(),
            birth_date: row.birth_date.clone(),
            wins: row.wins,
            losses: row.losses,
            draws: row.draws,
            no_contests: row.no_contests,
            current_weight_class_id: row.current_weight_class_id,
            profile_url: row.profile_url.clone(),
        }
    }
}

pub async fn insert_fighter(conn: &mut SqliteConnection, f: &FighterFields, now: &str) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO fighters (
            name_en, name_ru, country, birth_date, wins, losses, draws, no_contests,
            current_weight_class_id, profile_url, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&f.name_en)
    .bind(&f.name_ru)
    .bind(&f.country)
    .bind(&f.birth_date)
    .bind(f.wins)
    .bind(f.losses)
    .bind(f.draws)
    .bind(f.no_contests)
    .bind(f.current_weight_class_id)
    .bind(&f.profile_url)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn update_fighter(conn: &mut SqliteConnection, id: i64, f: &FighterFields, now: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE fighters SET
            name_en = ?, name_ru = ?, country = ?, birth_date = ?, wins = ?, losses = ?,
            draws = ?, no_contests = ?, current_weight_class_id = ?, profile_url = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&f.name_en)
    .bind(&f.name_ru)
    .bind(&f.country)
    .bind(&f.birth_date)
    .bind(f.wins)
    .bind(f.losses)
    .bind(f.draws)
    .bind(f.no_contests)
    .bind(f.current_weight_class_id)
    .bind(&f.profile_url)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fighters with a profile page that still lack a birth date, oldest first.
pub async fn fighters_for_profiles(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<FighterRow>> {
    let rows = sqlx::query_as::<_, FighterRow>(
        "SELECT * FROM fighters
         WHERE profile_url IS NOT NULL AND profile_url <> '' AND birth_date IS NULL
         ORDER BY id LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn fighter_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<FighterRow>> {
    let row = sqlx::query_as::<_, FighterRow>("SELECT * FROM fighters WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub async fn find_event_by_number(conn: &mut SqliteConnection, number: i64) -> Result<Option<EventRow>> {
    let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE event_number = ?")
        .bind(number)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn find_event_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<EventRow>> {
    let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE name = ? ORDER BY id LIMIT 1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn insert_event(conn: &mut SqliteConnection, e: &CanonicalEvent, now: &str) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO events (
            name, event_number, event_type, date, venue, location, status, source_url,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&e.name)
    .bind(e.event_number)
    .bind(e.event_type.to_string())
    .bind(e.date.map(|d| d.to_string()))
    .bind(&e.venue)
    .bind(&e.location)
    .bind(e.status.to_string())
    .bind(&e.source_url)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn update_event(conn: &mut SqliteConnection, id: i64, merged: &EventRow, now: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE events SET
            name = ?, event_number = ?, event_type = ?, date = ?, venue = ?, location = ?,
            status = ?, source_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&merged.name)
    .bind(merged.event_number)
    .bind(&merged.event_type)
    .bind(&merged.date)
    .bind(&merged.venue)
    .bind(&merged.location)
    .bind(&merged.status)
    .bind(&merged.source_url)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rewrite fight rows still filed under the short `UFC <N>` reference.
pub async fn backfill_event_name(conn: &mut SqliteConnection, short: &str, full: &str, now: &str) -> Result<u64> {
    let done = sqlx::query("UPDATE fights SET event_name = ?, updated_at = ? WHERE event_name = ?")
        .bind(full)
        .bind(now)
        .bind(short)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(done)
}

/// Events whose page should be visited by `event-cards`: scheduled cards
/// first, then completed events that have no fights yet, newest first.
pub async fn events_for_cards(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<EventRow>> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT * FROM events e
        WHERE e.source_url IS NOT NULL
          AND (e.status = 'scheduled'
               OR (e.status = 'completed'
                   AND NOT EXISTS (SELECT 1 FROM fights f WHERE f.event_name = e.name)))
        ORDER BY CASE e.status WHEN 'scheduled' THEN 0 ELSE 1 END, e.date DESC, e.id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Fights
// ---------------------------------------------------------------------------

/// A fight on `event_name` between the two corners, in either order.
pub async fn find_fight(conn: &mut SqliteConnection, event_name: &str, f1: &str, f2: &str) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM fights
        WHERE event_name = ?1
          AND ((fighter1_name = ?2 AND fighter2_name = ?3)
               OR (fighter1_name = ?3 AND fighter2_name = ?2))
        ORDER BY id LIMIT 1
        "#,
    )
    .bind(event_name)
    .bind(f1)
    .bind(f2)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Insert a fight, or refresh an existing one without clearing populated
/// fields. Returns `(id, created)`.
pub async fn upsert_fight(
    conn: &mut SqliteConnection,
    f: &CanonicalFight,
    location: Option<&str>,
    now: &str,
) -> Result<(i64, bool)> {
    let (is_win, is_loss, is_draw, is_nc) = f.result.flags();
    let card_type = f.card_type.map(|c| c.to_string());
    let fight_date = f.fight_date.map(|d| d.to_string());

    if let Some(id) = find_fight(conn, &f.event_name, &f.fighter1, &f.fighter2).await? {
        // Result flags move together: a pending row never clears a stored result.
        let has_result = is_win.is_some() || is_draw.is_some() || is_nc.is_some();
        sqlx::query(
            r#"
            UPDATE fights SET
                weight_class = ?, scheduled_rounds = ?,
                method = COALESCE(?, method), method_details = COALESCE(?, method_details),
                round = COALESCE(?, round), time = COALESCE(?, time),
                fight_date = COALESCE(?, fight_date), location = COALESCE(?, location),
                notes = COALESCE(?, notes), is_title_fight = ?, is_main_event = ?,
                is_win = CASE WHEN ? THEN ? ELSE is_win END,
                is_loss = CASE WHEN ? THEN ? ELSE is_loss END,
                is_draw = CASE WHEN ? THEN ? ELSE is_draw END,
                is_nc = CASE WHEN ? THEN ? ELSE is_nc END,
                fight_time_seconds = COALESCE(?, fight_time_seconds),
                card_type = COALESCE(?, card_type), fight_order = ?,
                judges_score = COALESCE(?, judges_score),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&f.weight_class)
        .bind(f.scheduled_rounds)
        .bind(&f.method)
        .bind(&f.method_details)
        .bind(f.round)
        .bind(&f.time)
        .bind(&fight_date)
        .bind(location)
        .bind(&f.notes)
        .bind(f.is_title_fight)
        .bind(f.is_main_event)
        .bind(has_result)
        .bind(&is_win)
        .bind(has_result)
        .bind(&is_loss)
        .bind(has_result)
        .bind(&is_draw)
        .bind(has_result)
        .bind(&is_nc)
        .bind(f.fight_time_seconds)
        .bind(&card_type)
        .bind(f.fight_order)
        .bind(&f.judges_score)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok((id, false));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO fights (
            event_name, fighter1_name, fighter2_name, weight_class, scheduled_rounds,
            method, method_details, round, time, fight_date, location, notes,
            is_title_fight, is_main_event, is_win, is_loss, is_draw, is_nc,
            fight_time_seconds, card_type, fight_order, judges_score, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&f.event_name)
    .bind(&f.fighter1)
    .bind(&f.fighter2)
    .bind(&f.weight_class)
    .bind(f.scheduled_rounds)
    .bind(&f.method)
    .bind(&f.method_details)
    .bind(f.round)
    .bind(&f.time)
    .bind(&fight_date)
    .bind(location)
    .bind(&f.notes)
    .bind(f.is_title_fight)
    .bind(f.is_main_event)
    .bind(&is_win)
    .bind(&is_loss)
    .bind(&is_draw)
    .bind(&is_nc)
    .bind(f.fight_time_seconds)
    .bind(&card_type)
    .bind(f.fight_order)
    .bind(&f.judges_score)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok((id, true))
}

/// Insert or refresh a bout of a scheduled card. Returns `(id, created)`.
pub async fn upsert_upcoming(
    conn: &mut SqliteConnection,
    event_id: i64,
    f: &CanonicalFight,
    now: &str,
) -> Result<(i64, bool)> {
    let existing: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM upcoming_fights
        WHERE event_id = ?1
          AND ((fighter1_name = ?2 AND fighter2_name = ?3)
               OR (fighter1_name = ?3 AND fighter2_name = ?2))
        "#,
    )
    .bind(event_id)
    .bind(&f.fighter1)
    .bind(&f.fighter2)
    .fetch_optional(&mut *conn)
    .await?;
    let card_type = f.card_type.map(|c| c.to_string());

    if let Some(id) = existing {
        sqlx::query(
            r#"
            UPDATE upcoming_fights SET
                weight_class = ?, card_type = ?, fight_order = ?, is_main_event = ?,
                is_title_fight = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&f.weight_class)
        .bind(&card_type)
        .bind(f.fight_order)
        .bind(f.is_main_event)
        .bind(f.is_title_fight)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok((id, false));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO upcoming_fights (
            event_id, fighter1_name, fighter2_name, weight_class, card_type, fight_order,
            is_main_event, is_title_fight, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event_id)
    .bind(&f.fighter1)
    .bind(&f.fighter2)
    .bind(&f.weight_class)
    .bind(&card_type)
    .bind(f.fight_order)
    .bind(f.is_main_event)
    .bind(f.is_title_fight)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok((id, true))
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// `(fighter_id, rank_position, rank_move)` of one stored snapshot.
pub type SnapshotEntry = (i64, i64, Option<String>);

/// Latest snapshot of a class as `(captured_at, entries ordered by position)`.
pub async fn latest_snapshot(
    conn: &mut SqliteConnection,
    weight_class_id: i64,
) -> Result<Option<(String, Vec<SnapshotEntry>)>> {
    let captured: Option<String> =
        sqlx::query_scalar("SELECT MAX(captured_at) FROM rankings WHERE weight_class_id = ?")
            .bind(weight_class_id)
            .fetch_one(&mut *conn)
            .await?;
    let Some(captured) = captured else {
        return Ok(None);
    };
    let entries: Vec<SnapshotEntry> = sqlx::query_as(
        "SELECT fighter_id, rank_position, rank_move FROM rankings
         WHERE weight_class_id = ? AND captured_at = ? ORDER BY rank_position, id",
    )
    .bind(weight_class_id)
    .bind(&captured)
    .fetch_all(&mut *conn)
    .await?;
    Ok(Some((captured, entries)))
}

pub async fn delete_snapshot(conn: &mut SqliteConnection, weight_class_id: i64, captured_at: &str) -> Result<u64> {
    let done = sqlx::query("DELETE FROM rankings WHERE weight_class_id = ? AND captured_at = ?")
        .bind(weight_class_id)
        .bind(captured_at)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(done)
}

pub async fn insert_ranking(
    conn: &mut SqliteConnection,
    weight_class_id: i64,
    entry: &SnapshotEntry,
    captured_at: &str,
) -> Result<i64> {
    let id = sqlx::query(
        "INSERT INTO rankings (fighter_id, weight_class_id, rank_position, rank_move, captured_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(entry.0)
    .bind(weight_class_id)
    .bind(entry.1)
    .bind(&entry.2)
    .bind(captured_at)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

// ---------------------------------------------------------------------------
// Round statistics
// ---------------------------------------------------------------------------

/// Parent fight of a round row as `(id, scheduled_rounds, notes)`.
pub type FightTarget = (i64, i64, Option<String>);

/// Locate the fight a round row belongs to. The event may be stored under its
/// long or short name; without an event name the fight date narrows the search.
pub async fn find_fight_for_stat(
    conn: &mut SqliteConnection,
    event_name: Option<&str>,
    short_name: Option<&str>,
    fight_date: Option<&str>,
    fighter: &str,
    opponent: Option<&str>,
) -> Result<Option<FightTarget>> {
    let row: Option<FightTarget> = sqlx::query_as(
        r#"
        SELECT id, scheduled_rounds, notes FROM fights
        WHERE (event_name = ?1
               OR (?2 IS NOT NULL AND (event_name = ?2 OR event_name LIKE ?2 || ':%'))
               OR (?1 IS NULL AND ?3 IS NOT NULL AND fight_date = ?3))
          AND (fighter1_name = ?4 COLLATE NOCASE OR fighter2_name = ?4 COLLATE NOCASE)
          AND (?5 IS NULL OR fighter1_name = ?5 COLLATE NOCASE OR fighter2_name = ?5 COLLATE NOCASE)
        ORDER BY id LIMIT 1
        "#,
    )
    .bind(event_name)
    .bind(short_name)
    .bind(fight_date)
    .bind(fighter)
    .bind(opponent)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Insert or overwrite the row of `(fight, fighter, round)`. Returns true when created.
pub async fn upsert_round_stat(
    conn: &mut SqliteConnection,
    fight_id: i64,
    fighter_id: i64,
    stat: &CanonicalRoundStat,
) -> Result<bool> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM fight_round_stats WHERE fight_id = ? AND fighter_id = ? AND round_number = ?",
    )
    .bind(fight_id)
    .bind(fighter_id)
    .bind(stat.round_number)
    .fetch_optional(&mut *conn)
    .await?;

    let columns = RoundCounters::COLUMNS;
    let sql = format!(
        "INSERT INTO fight_round_stats (fight_id, fighter_id, round_number, {cols}, \
         significant_strikes_rate, takedown_rate, winner) VALUES (?, ?, ?, {marks}, ?, ?, ?) \
         ON CONFLICT (fight_id, fighter_id, round_number) DO UPDATE SET {updates}, \
         significant_strikes_rate = excluded.significant_strikes_rate, \
         takedown_rate = excluded.takedown_rate, winner = excluded.winner",
        cols = columns.join(", "),
        marks = vec!["?"; columns.len()].join(", "),
        updates = columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", "),
    );

    let mut query = sqlx::query(&sql).bind(fight_id).bind(fighter_id).bind(stat.round_number);
    for value in stat.counters.values() {
        query = query.bind(value);
    }
    query
        .bind(stat.significant_strikes_rate)
        .bind(stat.takedowns_rate)
        .bind(stat.winner)
        .execute(&mut *conn)
        .await?;
    Ok(exists.is_none())
}

// ---------------------------------------------------------------------------
// Quarantine
// ---------------------------------------------------------------------------

pub async fn quarantine_round_stat(
    conn: &mut SqliteConnection,
    stat: &CanonicalRoundStat,
    reason: &str,
    now: &str,
) -> Result<()> {
    let payload = json!({
        "event_name": stat.event_name,
        "fight_date": stat.fight_date.map(|d| d.to_string()),
        "fighter": stat.fighter,
        "opponent": stat.opponent,
        "round_number": stat.round_number,
        "counters": stat.counters,
        "significant_strikes_rate": stat.significant_strikes_rate,
        "takedown_rate": stat.takedowns_rate,
        "winner": stat.winner,
    });
    sqlx::query(
        r#"
        INSERT INTO orphan_round_stats (
            event_name, fighter_name, opponent_name, round_number, fight_date, reason,
            payload, quarantined_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (event_name, fighter_name, opponent_name, round_number) DO UPDATE SET
            reason = excluded.reason, payload = excluded.payload,
            quarantined_at = excluded.quarantined_at
        "#,
    )
    .bind(stat.event_name.as_deref().unwrap_or_default())
    .bind(&stat.fighter)
    .bind(stat.opponent.as_deref().unwrap_or_default())
    .bind(stat.round_number)
    .bind(stat.fight_date.map(|d| d.to_string()))
    .bind(reason)
    .bind(payload.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn quarantine_fight(conn: &mut SqliteConnection, f: &CanonicalFight, reason: &str, now: &str) -> Result<()> {
    let (is_win, is_loss, is_draw, is_nc) = f.result.flags();
    let payload = json!({
        "weight_class": f.weight_class,
        "method_details": f.method_details,
        "round": f.round,
        "time": f.time,
        "card_type": f.card_type.map(|c| c.to_string()),
        "fight_order": f.fight_order,
        "is_win": is_win,
        "is_loss": is_loss,
        "is_draw": is_draw,
        "is_nc": is_nc,
    });
    sqlx::query(
        r#"
        INSERT INTO orphan_fights (event_name, fighter1_name, fighter2_name, reason, payload, quarantined_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (event_name, fighter1_name, fighter2_name) DO UPDATE SET
            reason = excluded.reason, payload = excluded.payload,
            quarantined_at = excluded.quarantined_at
        "#,
    )
    .bind(&f.event_name)
    .bind(&f.fighter1)
    .bind(&f.fighter2)
    .bind(reason)
    .bind(payload.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
