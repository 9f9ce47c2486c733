//! Record linkage: canonical records in, store mutations out.
//!
//! Every method runs on the caller's connection, normally a transaction
//! covering one logical batch (one event, one rankings snapshot, one archive).

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::db::models::{EventRow, FighterRow};
use crate::db::writer::{self, FighterFields, SnapshotEntry};
use crate::error::{AppError, RecordError, Result};
use crate::normalize::{is_short_event_name, normalize_event_name, normalize_name};
use crate::types::{
    CanonicalEvent, CanonicalFight, CanonicalFighter, CanonicalName, CanonicalRanking, CanonicalRoundStat, EventStatus,
    FightResult, RankMove,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
}

/// Per-job tallies of what the linker did with the records it was handed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkCounts {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub buffered: u64,
    pub quarantined: u64,
}

impl LinkCounts {
    pub fn record(&mut self, change: Change) {
        match change {
            Change::Created => self.created += 1,
            Change::Updated => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }

    pub fn linked(&self) -> u64 {
        self.created + self.updated + self.unchanged
    }
}

enum Attach {
    Linked(Change),
    Rejected(RecordError),
    /// Nothing to attach to yet; the reason is kept for quarantine.
    Unresolved(String),
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn move_text(mv: RankMove) -> Option<String> {
    match mv {
        RankMove::Steady => None,
        other => Some(other.to_string()),
    }
}

/// Identity fields fill gaps only; everything else is last-writer-wins, but a
/// missing incoming value never clears a stored one.
fn merge_fighter(current: &FighterFields, incoming: &FighterFields) -> FighterFields {
    FighterFields {
        name_en: current.name_en.clone().or_else(|| incoming.name_en.clone()),
        name_ru: current.name_ru.clone().or_else(|| incoming.name_ru.clone()),
        country: incoming.country.clone().or_else(|| current.country.clone()),
        birth_date: incoming.birth_date.clone().or_else(|| current.birth_date.clone()),
        wins: incoming.wins.or(current.wins),
        losses: incoming.losses.or(current.losses),
        draws: incoming.draws.or(current.draws),
        no_contests: incoming.no_contests.or(current.no_contests),
        current_weight_class_id: incoming.current_weight_class_id.or(current.current_weight_class_id),
        profile_url: incoming.profile_url.clone().or_else(|| current.profile_url.clone()),
    }
}

/// The stored name wins only when the incoming one is the bare `UFC <N>` form.
fn merge_event(current: &EventRow, incoming: &CanonicalEvent) -> EventRow {
    let keep_name = is_short_event_name(&incoming.name) && !is_short_event_name(&current.name);
    EventRow {
        id: current.id,
        name: if keep_name {
            current.name.clone()
        } else {
            incoming.name.clone()
        },
        event_number: incoming.event_number.or(current.event_number),
        event_type: incoming.event_type.to_string(),
        date: incoming.date.map(|d| d.to_string()).or_else(|| current.date.clone()),
        venue: incoming.venue.clone().or_else(|| current.venue.clone()),
        location: incoming.location.clone().or_else(|| current.location.clone()),
        status: incoming.status.to_string(),
        source_url: incoming.source_url.clone().or_else(|| current.source_url.clone()),
    }
}

fn same_event(a: &EventRow, b: &EventRow) -> bool {
    a.name == b.name
        && a.event_number == b.event_number
        && a.event_type == b.event_type
        && a.date == b.date
        && a.venue == b.venue
        && a.location == b.location
        && a.status == b.status
        && a.source_url == b.source_url
}

pub struct Linker {
    now: String,
    /// Round rows whose fight was not found yet, retried by `flush_pending`.
    pending: Vec<CanonicalRoundStat>,
}

impl Linker {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: timestamp(now),
            pending: Vec::new(),
        }
    }

    /// Start a new batch time; all rows of one rankings snapshot share it.
    pub fn set_now(&mut self, now: NaiveDateTime) {
        self.now = timestamp(now);
    }

    pub fn now(&self) -> &str {
        &self.now
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------------
    // Fighters
    // -----------------------------------------------------------------------

    /// Find by `name_en` (case-insensitive), then by `name_ru`.
    pub async fn find_fighter(&self, conn: &mut SqliteConnection, name: &CanonicalName) -> Result<Option<FighterRow>> {
        if !name.name_en.is_empty() {
            if let Some(row) = writer::find_fighter_by_name_en(conn, &name.name_en).await? {
                return Ok(Some(row));
            }
        }
        if !name.name_ru.is_empty() {
            return writer::find_fighter_by_name_ru(conn, &name.name_ru).await;
        }
        Ok(None)
    }

    /// `find_fighter`, creating the fighter when nothing matches.
    pub async fn resolve_fighter(
        &self,
        conn: &mut SqliteConnection,
        fighter: &CanonicalFighter,
        weight_class_id: Option<i64>,
    ) -> Result<(i64, Change)> {
        let name = &fighter.name;
        let existing = self.find_fighter(conn, name).await?;

        let incoming = FighterFields {
            name_en: non_empty(&name.name_en),
            name_ru: non_empty(&name.name_ru),
            country: fighter.country.clone(),
            birth_date: fighter.birth_date.map(|d| d.to_string()),
            wins: fighter.record.map(|r| r.wins),
            losses: fighter.record.map(|r| r.losses),
            draws: fighter.record.map(|r| r.draws),
            no_contests: fighter.record.map(|r| r.no_contests),
            current_weight_class_id: weight_class_id,
            profile_url: fighter.profile_url.clone(),
        };

        let Some(row) = existing else {
            let id = writer::insert_fighter(conn, &incoming, &self.now).await?;
            debug!("[LINK] new fighter #{id} {}", name.display());
            return Ok((id, Change::Created));
        };
        let current = FighterFields::from(&row);
        let merged = merge_fighter(&current, &incoming);
        if merged == current {
            return Ok((row.id, Change::Unchanged));
        }
        writer::update_fighter(conn, row.id, &merged, &self.now).await?;
        Ok((row.id, Change::Updated))
    }

    /// Archive names only confirm fighters that already exist.
    pub async fn match_archive_name(&self, conn: &mut SqliteConnection, name: &str) -> Result<bool> {
        let found = writer::find_fighter_by_name_en(conn, name).await?;
        Ok(found.is_some())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Resolve on event number, then exact display name, else create. Fight
    /// rows filed under the short `UFC <N>` form (or a previous long name) are
    /// rewritten to the stored name. Returns `(event id, change, fights rewritten)`.
    pub async fn link_event(&self, conn: &mut SqliteConnection, event: &CanonicalEvent) -> Result<(i64, Change, u64)> {
        let mut existing = None;
        if let Some(n) = event.event_number {
            existing = writer::find_event_by_number(conn, n).await?;
        }
        if existing.is_none() {
            existing = writer::find_event_by_name(conn, &event.name).await?;
        }

        let (id, name, change) = match existing {
            None => {
                let id = writer::insert_event(conn, event, &self.now).await?;
                debug!("[LINK] new event #{id} {}", event.name);
                (id, event.name.clone(), Change::Created)
            }
            Some(current) => {
                let merged = merge_event(&current, event);
                if same_event(&current, &merged) {
                    (current.id, current.name, Change::Unchanged)
                } else {
                    writer::update_event(conn, current.id, &merged, &self.now).await?;
                    if merged.name != current.name && !is_short_event_name(&current.name) {
                        let moved = writer::backfill_event_name(conn, &current.name, &merged.name, &self.now).await?;
                        if moved > 0 {
                            info!("[LINK] renamed {moved} fights '{}' -> '{}'", current.name, merged.name);
                        }
                    }
                    (current.id, merged.name, Change::Updated)
                }
            }
        };

        let mut backfilled = 0;
        if let Some(n) = event.event_number {
            let short = format!("UFC {n}");
            if name != short {
                backfilled = writer::backfill_event_name(conn, &short, &name, &self.now).await?;
                if backfilled > 0 {
                    info!("[LINK] back-filled {backfilled} fights '{short}' -> '{name}'");
                }
            }
        }
        Ok((id, change, backfilled))
    }

    async fn resolve_event_by_name(&self, conn: &mut SqliteConnection, event_name: &str) -> Result<Option<EventRow>> {
        if let Some(row) = writer::find_event_by_name(conn, event_name).await? {
            return Ok(Some(row));
        }
        match normalize_event_name(event_name).number {
            Some(n) => writer::find_event_by_number(conn, n).await,
            None => Ok(None),
        }
    }

    /// Merge profile-page fields into a known fighter. A name that already
    /// identifies a different fighter is not copied over.
    pub async fn enrich_fighter(
        &self,
        conn: &mut SqliteConnection,
        fighter_id: i64,
        profile: &CanonicalFighter,
    ) -> Result<Change> {
        let Some(row) = writer::fighter_by_id(conn, fighter_id).await? else {
            return Err(AppError::NotFound(format!("fighter #{fighter_id}")));
        };

        let mut name_en = non_empty(&profile.name.name_en);
        if let Some(en) = &name_en {
            if let Some(other) = writer::find_fighter_by_name_en(conn, en).await? {
                if other.id != row.id {
                    debug!("[LINK] '{en}' already names fighter #{}; not copied to #{}", other.id, row.id);
                    name_en = None;
                }
            }
        }
        let mut name_ru = non_empty(&profile.name.name_ru);
        if let Some(ru) = &name_ru {
            if let Some(other) = writer::find_fighter_by_name_ru(conn, ru).await? {
                if other.id != row.id {
                    name_ru = None;
                }
            }
        }

        let incoming = FighterFields {
            name_en,
            name_ru,
            country: profile.country.clone(),
            birth_date: profile.birth_date.map(|d| d.to_string()),
            wins: profile.record.map(|r| r.wins),
            losses: profile.record.map(|r| r.losses),
            draws: profile.record.map(|r| r.draws),
            no_contests: profile.record.map(|r| r.no_contests),
            current_weight_class_id: None,
            profile_url: profile.profile_url.clone(),
        };
        let current = FighterFields::from(&row);
        let merged = merge_fighter(&current, &incoming);
        if merged == current {
            return Ok(Change::Unchanged);
        }
        writer::update_fighter(conn, row.id, &merged, &self.now).await?;
        Ok(Change::Updated)
    }

    // -----------------------------------------------------------------------
    // Fights
    // -----------------------------------------------------------------------

    /// Attach a card to its event. Completed events get `fights` rows (corners
    /// reconciled to fighters), scheduled ones `upcoming_fights`; fights of an
    /// event that cannot be resolved are quarantined.
    pub async fn link_fights(
        &self,
        conn: &mut SqliteConnection,
        event_name: &str,
        fights: &[CanonicalFight],
        counts: &mut LinkCounts,
    ) -> Result<()> {
        let Some(event) = self.resolve_event_by_name(conn, event_name).await? else {
            for fight in fights {
                let reason = RecordError::Linkage(format!("event '{event_name}' is not stored"));
                warn!("[LINK] {} vs {}: {reason}", fight.fighter1, fight.fighter2);
                writer::quarantine_fight(conn, fight, &reason.to_string(), &self.now).await?;
                counts.quarantined += 1;
            }
            return Ok(());
        };

        match EventStatus::parse(&event.status) {
            Some(EventStatus::Scheduled) => {
                for fight in fights {
                    let (_, created) = writer::upsert_upcoming(conn, event.id, fight, &self.now).await?;
                    counts.record(if created { Change::Created } else { Change::Updated });
                }
            }
            Some(EventStatus::Completed) => {
                for fight in fights {
                    if fight.result == FightResult::Pending {
                        let err = RecordError::Invariant(format!(
                            "{} vs {} on completed {} has no result",
                            fight.fighter1, fight.fighter2, event.name
                        ));
                        warn!("[LINK] {err}");
                        counts.rejected += 1;
                        continue;
                    }
                    for corner in [&fight.fighter1, &fight.fighter2] {
                        let fighter = CanonicalFighter::named(normalize_name(corner));
                        self.resolve_fighter(conn, &fighter, None).await?;
                    }
                    let mut fight = fight.clone();
                    // Cards are filed under the stored event name.
                    fight.event_name = event.name.clone();
                    let (_, created) =
                        writer::upsert_fight(conn, &fight, event.location.as_deref(), &self.now).await?;
                    counts.record(if created { Change::Created } else { Change::Updated });
                }
            }
            Some(EventStatus::Cancelled) | None => {
                debug!("[LINK] {} is {}; card ignored", event.name, event.status);
                counts.unchanged += fights.len() as u64;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rankings
    // -----------------------------------------------------------------------

    /// Store one weight-class snapshot at the linker's batch time. A snapshot
    /// identical to the latest stored one is not written again.
    pub async fn link_ranking(
        &self,
        conn: &mut SqliteConnection,
        ranking: &CanonicalRanking,
        counts: &mut LinkCounts,
    ) -> Result<()> {
        let wc_id = writer::weight_class_id(conn, ranking.weight_class)
            .await?
            .ok_or_else(|| AppError::Schema(format!("weight class '{}' is not seeded", ranking.weight_class)))?;

        let mut entries: Vec<SnapshotEntry> = Vec::with_capacity(ranking.entries.len());
        for entry in &ranking.entries {
            let fighter_wc = match entry.fighter.weight_class {
                Some(wc) => writer::weight_class_id(conn, wc).await?,
                None => None,
            };
            let (fighter_id, change) = self.resolve_fighter(conn, &entry.fighter, fighter_wc).await?;
            if change != Change::Unchanged {
                debug!("[LINK] fighter #{fighter_id} {change:?} from rankings");
            }
            entries.push((fighter_id, i64::from(entry.rank_position), move_text(entry.rank_move)));
        }
        entries.sort_by_key(|e| e.1);

        if let Some((captured_at, stored)) = writer::latest_snapshot(conn, wc_id).await? {
            if stored == entries {
                counts.unchanged += entries.len() as u64;
                return Ok(());
            }
            if captured_at == self.now {
                writer::delete_snapshot(conn, wc_id, &captured_at).await?;
            }
        }
        for entry in &entries {
            writer::insert_ranking(conn, wc_id, entry, &self.now).await?;
            counts.created += 1;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Round statistics
    // -----------------------------------------------------------------------

    async fn attach_round_stat(&self, conn: &mut SqliteConnection, stat: &CanonicalRoundStat) -> Result<Attach> {
        let short = stat
            .event_name
            .as_deref()
            .and_then(|e| normalize_event_name(e).short);
        let fight_date = stat.fight_date.map(|d| d.to_string());
        let target = writer::find_fight_for_stat(
            conn,
            stat.event_name.as_deref(),
            short.as_deref(),
            fight_date.as_deref(),
            &stat.fighter,
            stat.opponent.as_deref(),
        )
        .await?;
        let Some((fight_id, scheduled_rounds, notes)) = target else {
            return Ok(Attach::Unresolved(format!(
                "no fight for {} vs {} at '{}'",
                stat.fighter,
                stat.opponent.as_deref().unwrap_or("?"),
                stat.event_name.as_deref().unwrap_or("?"),
            )));
        };

        let overtime = notes.is_some_and(|n| n.to_lowercase().contains("overtime"));
        if stat.round_number > scheduled_rounds && !overtime {
            return Ok(Attach::Rejected(RecordError::Invariant(format!(
                "{} round {} exceeds {scheduled_rounds} scheduled rounds of fight #{fight_id}",
                stat.fighter, stat.round_number
            ))));
        }

        // Archive names are scanned, not curated; they never create fighters.
        let Some(fighter) = self.find_fighter(conn, &normalize_name(&stat.fighter)).await? else {
            return Ok(Attach::Unresolved(format!(
                "fighter '{}' of fight #{fight_id} is not stored",
                stat.fighter
            )));
        };
        let created = writer::upsert_round_stat(conn, fight_id, fighter.id, stat).await?;
        Ok(Attach::Linked(if created { Change::Created } else { Change::Updated }))
    }

    /// Attach a round row to its fight, or buffer it until `flush_pending`.
    pub async fn link_round_stat(
        &mut self,
        conn: &mut SqliteConnection,
        stat: CanonicalRoundStat,
        counts: &mut LinkCounts,
    ) -> Result<()> {
        match self.attach_round_stat(conn, &stat).await? {
            Attach::Linked(change) => counts.record(change),
            Attach::Rejected(err) => {
                warn!("[LINK] {err}");
                counts.rejected += 1;
            }
            Attach::Unresolved(_) => {
                counts.buffered += 1;
                self.pending.push(stat);
            }
        }
        Ok(())
    }

    /// Retry buffered round rows once; whatever still has no fight goes to
    /// `orphan_round_stats`.
    pub async fn flush_pending(&mut self, conn: &mut SqliteConnection, counts: &mut LinkCounts) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for stat in pending {
            match self.attach_round_stat(conn, &stat).await? {
                Attach::Linked(change) => counts.record(change),
                Attach::Rejected(err) => {
                    warn!("[LINK] {err}");
                    counts.rejected += 1;
                }
                Attach::Unresolved(why) => {
                    let reason = RecordError::Linkage(why);
                    warn!("[LINK] round {} quarantined: {reason}", stat.round_number);
                    writer::quarantine_round_stat(conn, &stat, &reason.to_string(), &self.now).await?;
                    counts.quarantined += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Store;
    use crate::normalize::Normalizer;
    use crate::types::{
        CanonicalName, CanonicalRankedFighter, CardType, EventSection, FightRecord, RoundCounters, StagingEvent,
        StagingFight, WeightClass,
    };
    use chrono::NaiveDate;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 20).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    async fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&Config::for_path(dir.path().join("ufc.db"))).await.unwrap();
        (dir, store)
    }

    fn event(name: &str, section: EventSection) -> CanonicalEvent {
        Normalizer::new()
            .canonical_event(&StagingEvent {
                name: name.into(),
                date_text: "April 13, 2024".into(),
                venue: "T-Mobile Arena".into(),
                location: "Las Vegas, Nevada, U.S.".into(),
                source_url: None,
                section,
                cancelled: false,
            })
            .unwrap()
    }

    fn fight(event_name: &str, f1: &str, f2: &str, method: &str, rounds: &str) -> CanonicalFight {
        bout(event_name, f1, "def.", f2, method, rounds)
    }

    fn bout(event_name: &str, f1: &str, result: &str, f2: &str, method: &str, rounds: &str) -> CanonicalFight {
        Normalizer::new()
            .canonical_fight(
                &StagingFight {
                    weight_class: "Lightweight".into(),
                    fighter1: f1.into(),
                    result_text: result.into(),
                    fighter2: f2.into(),
                    method: method.into(),
                    round_text: rounds.into(),
                    time: "5:00".into(),
                    notes: String::new(),
                    card_type: Some(CardType::Preliminary),
                    fight_order: 2,
                },
                event_name,
                NaiveDate::from_ymd_opt(2024, 4, 13),
            )
            .unwrap()
    }

    fn round(event: Option<&str>, fighter: &str, opponent: &str, n: i64) -> CanonicalRoundStat {
        CanonicalRoundStat {
            event_name: event.map(str::to_string),
            fight_date: None,
            fighter: fighter.into(),
            opponent: Some(opponent.into()),
            round_number: n,
            counters: RoundCounters {
                significant_strikes_landed: Some(10),
                significant_strikes_attempted: Some(20),
                ..RoundCounters::default()
            },
            significant_strikes_rate: Some(0.5),
            takedowns_rate: None,
            winner: Some(true),
        }
    }

    #[tokio::test]
    async fn fighters_resolve_by_english_then_russian_name() {
        let (_dir, store) = store().await;
        let linker = Linker::new(t(1));
        let mut tx = store.begin().await.unwrap();

        let mut islam = CanonicalFighter::named(CanonicalName {
            name_en: "Islam Makhachev".into(),
            name_ru: String::new(),
        });
        islam.country = Some("Russia".into());
        let (id, change) = linker.resolve_fighter(&mut tx, &islam, None).await.unwrap();
        assert_eq!(change, Change::Created);

        let again = CanonicalFighter::named(CanonicalName {
            name_en: " islam makhachev".into(),
            name_ru: "Ислам Махачев".into(),
        });
        let (same, change) = linker.resolve_fighter(&mut tx, &again, None).await.unwrap();
        assert_eq!((same, change), (id, Change::Updated));

        let mut by_ru = CanonicalFighter::named(CanonicalName {
            name_en: String::new(),
            name_ru: "Ислам Махачев".into(),
        });
        by_ru.record = Some(FightRecord { wins: 26, losses: 1, draws: 0, no_contests: 0 });
        let (same, _) = linker.resolve_fighter(&mut tx, &by_ru, None).await.unwrap();
        assert_eq!(same, id);
        tx.commit().await.unwrap();

        let row = store.fighter(id).await.unwrap().unwrap();
        assert_eq!(row.name_en.as_deref(), Some("Islam Makhachev"));
        assert_eq!(row.name_ru.as_deref(), Some("Ислам Махачев"));
        // A source without country does not clear it.
        assert_eq!(row.country.as_deref(), Some("Russia"));
        assert_eq!(row.wins, Some(26));
        assert_eq!(store.count_rows("fighters").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn long_event_name_backfills_short_fight_references() {
        let (_dir, store) = store().await;
        let linker = Linker::new(t(1));
        let mut tx = store.begin().await.unwrap();

        let mut ids = Vec::new();
        for (f1, f2) in [("Alex Pereira", "Jamahal Hill"), ("Bo Nickal", "Cody Brundage")] {
            let (id, _) = writer::upsert_fight(&mut tx, &fight("UFC 300", f1, f2, "KO (punches)", "1"), None, "x")
                .await
                .unwrap();
            ids.push(id);
        }

        let (event_id, change, backfilled) = linker
            .link_event(&mut tx, &event("UFC 300: Pereira vs. Hill", EventSection::Past))
            .await
            .unwrap();
        assert_eq!(change, Change::Created);
        assert_eq!(backfilled, 2);

        // The short form later seen elsewhere resolves to the same event.
        let (same, _, _) = linker.link_event(&mut tx, &event("UFC 300", EventSection::Past)).await.unwrap();
        assert_eq!(same, event_id);
        tx.commit().await.unwrap();

        let stored = store.event(event_id).await.unwrap().unwrap();
        assert_eq!(stored.name, "UFC 300: Pereira vs. Hill");
        assert_eq!(stored.event_number, Some(300));
        assert_eq!(store.count_rows("events").await.unwrap(), 1);
        for id in ids {
            let f = store.fight(id).await.unwrap().unwrap();
            assert_eq!(f.event_name, "UFC 300: Pereira vs. Hill");
        }
    }

    #[tokio::test]
    async fn cards_of_unknown_events_are_quarantined() {
        let (_dir, store) = store().await;
        let linker = Linker::new(t(1));
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();
        let fights = [fight("UFC Fight Night: Nobody vs. Nothing", "A Fighter", "B Fighter", "KO", "1")];
        linker
            .link_fights(&mut tx, "UFC Fight Night: Nobody vs. Nothing", &fights, &mut counts)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(counts.quarantined, 1);
        assert_eq!(store.count_rows("fights").await.unwrap(), 0);
        let orphans = store.orphan_fights().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert!(orphans[0].reason.starts_with("unlinked:"));
    }

    #[tokio::test]
    async fn completed_cards_need_a_result() {
        let (_dir, store) = store().await;
        let linker = Linker::new(t(1));
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();
        let ev = "UFC 300: Pereira vs. Hill";
        linker.link_event(&mut tx, &event(ev, EventSection::Past)).await.unwrap();
        let card = [
            bout(ev, "Alex Pereira", "def.", "Jamahal Hill", "KO (punches)", "1"),
            bout(ev, "Bo Nickal", "vs.", "Cody Brundage", "", ""),
            bout(ev, "Jalin Turner", "vs.", "Renato Moicano", "Overturned", "3"),
        ];
        linker.link_fights(&mut tx, ev, &card, &mut counts).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!((counts.created, counts.rejected), (2, 1));
        let fights = store.event_fights(ev).await.unwrap();
        assert_eq!(fights.len(), 2);
        for f in &fights {
            let set = [&f.is_win, &f.is_draw, &f.is_nc].iter().filter(|v| v.is_some()).count();
            assert_eq!(set, 1, "{} vs {}", f.fighter1_name, f.fighter2_name);
        }
    }

    #[tokio::test]
    async fn scheduled_cards_become_upcoming_fights() {
        let (_dir, store) = store().await;
        let linker = Linker::new(t(1));
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();
        let (event_id, _, _) = linker
            .link_event(&mut tx, &event("UFC 310: Pantoja vs. Asakura", EventSection::Scheduled))
            .await
            .unwrap();
        let card = [fight("UFC 310: Pantoja vs. Asakura", "Alexandre Pantoja", "Kai Asakura", "", "")];
        linker
            .link_fights(&mut tx, "UFC 310: Pantoja vs. Asakura", &card, &mut counts)
            .await
            .unwrap();
        linker
            .link_fights(&mut tx, "UFC 310: Pantoja vs. Asakura", &card, &mut counts)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!((counts.created, counts.updated), (1, 1));
        assert_eq!(store.upcoming_fights(event_id).await.unwrap().len(), 1);
        assert_eq!(store.count_rows("fights").await.unwrap(), 0);
    }

    fn lightweight(positions: &[(u32, &str)]) -> CanonicalRanking {
        CanonicalRanking {
            weight_class: WeightClass::Lightweight,
            entries: positions
                .iter()
                .map(|(p, name)| CanonicalRankedFighter {
                    fighter: CanonicalFighter {
                        weight_class: Some(WeightClass::Lightweight),
                        ..CanonicalFighter::named(normalize_name(name))
                    },
                    rank_position: *p,
                    rank_move: RankMove::Steady,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn identical_ranking_snapshots_are_not_duplicated() {
        let (_dir, store) = store().await;
        let mut linker = Linker::new(t(1));
        let ranking = lightweight(&[(0, "Ислам Махачев"), (1, "Арман Царукян")]);

        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();
        linker.link_ranking(&mut tx, &ranking, &mut counts).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(counts.created, 2);

        linker.set_now(t(2));
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();
        linker.link_ranking(&mut tx, &ranking, &mut counts).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!((counts.created, counts.unchanged), (0, 2));
        assert_eq!(store.count_rows("rankings").await.unwrap(), 2);

        // A changed list is a new snapshot.
        linker.set_now(t(3));
        let moved = lightweight(&[(0, "Ислам Махачев"), (1, "Чарльз Оливейра"), (2, "Арман Царукян")]);
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();
        linker.link_ranking(&mut tx, &moved, &mut counts).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(counts.created, 3);

        let latest = store.latest_rankings(None).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert!(latest.iter().all(|r| r.captured_at == "2024-04-20 03:00:00"));
        let champ = store.fighter(latest[0].fighter_id).await.unwrap().unwrap();
        assert!(champ.current_weight_class_id.is_some());
    }

    #[tokio::test]
    async fn round_stats_wait_for_their_fight_or_get_quarantined() {
        let (_dir, store) = store().await;
        let mut linker = Linker::new(t(1));
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();

        let ev = "UFC 300: Pereira vs. Hill";
        linker
            .link_round_stat(&mut tx, round(Some(ev), "Arman Tsarukyan", "Charles Oliveira", 2), &mut counts)
            .await
            .unwrap();
        linker
            .link_round_stat(&mut tx, round(Some("UFC 999: Ghost vs. Ghost"), "Nobody Here", "Someone Else", 1), &mut counts)
            .await
            .unwrap();
        assert_eq!((counts.buffered, linker.pending()), (2, 2));

        // The card arrives later in the run, filed under the short name.
        for name in ["Arman Tsarukyan", "Charles Oliveira"] {
            linker
                .resolve_fighter(&mut tx, &CanonicalFighter::named(normalize_name(name)), None)
                .await
                .unwrap();
        }
        let (fight_id, _) = writer::upsert_fight(
            &mut tx,
            &fight("UFC 300", "Arman Tsarukyan", "Charles Oliveira", "Decision (split)", "3"),
            None,
            "x",
        )
        .await
        .unwrap();

        linker
            .link_round_stat(&mut tx, round(Some(ev), "Charles Oliveira", "Arman Tsarukyan", 4), &mut counts)
            .await
            .unwrap();
        assert_eq!(counts.rejected, 1, "round 4 of a three-round fight");

        linker.flush_pending(&mut tx, &mut counts).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(linker.pending(), 0);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.quarantined, 1);

        let rounds = store.fight_rounds(fight_id).await.unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].round_number, 2);
        assert_eq!(rounds[0].fighter_name.as_deref(), Some("Arman Tsarukyan"));
        assert_eq!(rounds[0].significant_strikes_rate, Some(0.5));

        let orphans = store.orphan_round_stats().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].fighter_name, "Nobody Here");
        assert_eq!(orphans[0].event_name, "UFC 999: Ghost vs. Ghost");
        let payload: serde_json::Value = serde_json::from_str(&orphans[0].payload).unwrap();
        assert_eq!(payload["counters"]["significant_strikes_landed"], 10);
    }

    #[tokio::test]
    async fn round_stats_never_create_fighters() {
        let (_dir, store) = store().await;
        let mut linker = Linker::new(t(1));
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();

        // A fight whose corners were never stored as fighters.
        writer::upsert_fight(
            &mut tx,
            &fight("UFC 300", "Arman Tsarukyan", "Charles Oliveira", "Decision (split)", "3"),
            None,
            "x",
        )
        .await
        .unwrap();
        let ev = "UFC 300: Pereira vs. Hill";
        linker
            .link_round_stat(&mut tx, round(Some(ev), "Arman Tsarukyan", "Charles Oliveira", 1), &mut counts)
            .await
            .unwrap();
        assert_eq!((counts.created, counts.buffered), (0, 1));

        linker.flush_pending(&mut tx, &mut counts).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(counts.quarantined, 1);
        assert_eq!(store.count_rows("fighters").await.unwrap(), 0);
        assert_eq!(store.count_rows("fight_round_stats").await.unwrap(), 0);
        let orphans = store.orphan_round_stats().await.unwrap();
        assert!(orphans[0].reason.contains("is not stored"), "{}", orphans[0].reason);
    }

    #[tokio::test]
    async fn profiles_never_steal_another_fighters_name() {
        let (_dir, store) = store().await;
        let linker = Linker::new(t(1));
        let mut tx = store.begin().await.unwrap();
        let (by_en, _) = linker
            .resolve_fighter(&mut tx, &CanonicalFighter::named(normalize_name("Islam Makhachev")), None)
            .await
            .unwrap();
        let (by_ru, _) = linker
            .resolve_fighter(&mut tx, &CanonicalFighter::named(normalize_name("Ислам Махачев")), None)
            .await
            .unwrap();

        let profile = CanonicalFighter {
            birth_date: NaiveDate::from_ymd_opt(1991, 10, 27),
            profile_url: Some("https://fight.ru/fighters/islam-makhachev/".into()),
            ..CanonicalFighter::named(CanonicalName {
                name_en: "Islam Makhachev".into(),
                name_ru: "Ислам Махачев".into(),
            })
        };
        assert_eq!(linker.enrich_fighter(&mut tx, by_ru, &profile).await.unwrap(), Change::Updated);
        assert_eq!(linker.enrich_fighter(&mut tx, by_ru, &profile).await.unwrap(), Change::Unchanged);
        tx.commit().await.unwrap();

        let ru = store.fighter(by_ru).await.unwrap().unwrap();
        assert_eq!(ru.name_en, None);
        assert_eq!(ru.birth_date.as_deref(), Some("1991-10-27"));
        let en = store.fighter(by_en).await.unwrap().unwrap();
        assert_eq!(en.birth_date, None);
    }
}
