//! Canonicalization of names, weight classes, dates and event identifiers.
//!
//! Everything here is CPU-only. The [`Normalizer`] owns the curated weight-class
//! lookup table, built once at startup and never mutated.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RecordError;
use crate::types::{
    CanonicalEvent, CanonicalFight, CanonicalFighter, CanonicalName, CanonicalRankedFighter,
    CanonicalRanking, CanonicalRoundStat, CardType, EventSection, EventStatus, EventType,
    FightRecord, FightResult, StagingEvent, StagingFight, StagingProfile, StagingRankingList, StagingRoundStat,
    WeightClass,
};

static EVENT_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bUFC\s+(\d+)\b").expect("event number regex"));
static JUDGES_SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,2}\s*[–\-]\s*\d{1,2}(?:\s*,\s*\d{1,2}\s*[–\-]\s*\d{1,2})*$")
        .expect("judges score regex")
});
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"));
static LONG_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z]{3,9})\.?\s+(\d{1,2}),\s*(\d{4})\b").expect("long date regex")
});
static DAY_FIRST_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s+([A-Za-z]{3,9})\.?\s+(\d{4})\b").expect("day-first date regex")
});
static RECORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*[–\-]\s*(\d+)(?:\s*[–\-]\s*(\d+))?(?:\s*\((\d+)\s*NC\))?")
        .expect("record regex")
});
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("time regex"));

/// Seconds in one regulation round.
const ROUND_SECONDS: i64 = 300;

/// Clean visible text: drop soft hyphens, fold NBSP, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let s = s.replace("&shy;", "").replace('\u{00ad}', "").replace("&nbsp;", " ");
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Remove `[ ... ]` annotations such as footnote markers `[12]`. No nesting.
pub fn strip_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    clean_text(&out)
}

fn has_cyrillic(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '\u{0400}'..='\u{04FF}'))
}

fn has_latin(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_alphabetic())
}

/// Strip champion / interim markers that Wikipedia appends to names.
fn strip_title_markers(s: &str) -> String {
    let mut s = s.trim().to_string();
    for marker in ["(c)", "(ic)", "(C)", "(IC)"] {
        if let Some(rest) = s.strip_suffix(marker) {
            s = rest.trim_end().to_string();
        }
    }
    s
}

/// Bilingual name canonicalization. The original script is preserved; each
/// side is filled only when the input actually carries text in that script.
pub fn normalize_name(raw: &str) -> CanonicalName {
    let base = strip_title_markers(&strip_brackets(&clean_text(raw)));
    if base.is_empty() {
        return CanonicalName::default();
    }

    let mut parts: Vec<String> = Vec::new();
    if let (Some(open), true) = (base.find('('), base.ends_with(')')) {
        let outer = base[..open].trim();
        let inner = base[open + 1..base.len() - 1].trim();
        if has_cyrillic(outer) != has_cyrillic(inner) {
            parts.push(outer.to_string());
            parts.push(inner.to_string());
        }
    }
    if parts.is_empty() && base.contains(" / ") {
        parts.extend(base.split(" / ").map(|p| p.trim().to_string()));
    }
    if parts.is_empty() {
        parts.push(base);
    }

    let mut name = CanonicalName::default();
    for part in parts.into_iter().filter(|p| !p.is_empty()) {
        if has_cyrillic(&part) {
            if name.name_ru.is_empty() {
                name.name_ru = part;
            }
        } else if has_latin(&part) && name.name_en.is_empty() {
            name.name_en = part;
        }
    }
    name
}

/// Display name plus the numbered-event identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventName {
    pub display: String,
    pub number: Option<i64>,
    /// `UFC <N>`, the short form other sources use for numbered events.
    pub short: Option<String>,
    pub event_type: EventType,
}

pub fn classify_event_type(name: &str) -> EventType {
    let lc = name.to_lowercase();
    if lc.contains("fight night") {
        EventType::FightNight
    } else if lc.contains("on espn") {
        EventType::OnEspn
    } else if lc.contains("on abc") {
        EventType::OnAbc
    } else if lc.contains("on fox") {
        EventType::OnFox
    } else if lc.contains("on fx") {
        EventType::OnFx
    } else if lc.contains("on fuel") {
        EventType::OnFuel
    } else if EVENT_NUMBER_RE.is_match(name) {
        EventType::Numbered
    } else {
        EventType::Other
    }
}

pub fn normalize_event_name(raw: &str) -> EventName {
    let display = strip_brackets(&clean_text(raw));
    let event_type = classify_event_type(&display);
    let number = if event_type.is_numbered() {
        EVENT_NUMBER_RE
            .captures(&display)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    } else {
        None
    };
    EventName {
        short: number.map(|n| format!("UFC {n}")),
        display,
        number,
        event_type,
    }
}

/// A short event reference is `UFC <N>` with nothing after the number.
pub fn is_short_event_name(name: &str) -> bool {
    let ev = normalize_event_name(name);
    ev.short.as_deref() == Some(ev.display.as_str())
}

fn month_number(s: &str) -> Option<u32> {
    let lc = s.to_lowercase();
    let m = match lc.as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(m)
}

/// ISO `YYYY-MM-DD` (also when embedded as a sort key) or English long form.
/// Numeric `dd/mm/yyyy` style input is ambiguous and yields `None`.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let text = clean_text(raw);
    if let Some(c) = ISO_DATE_RE.captures(&text) {
        let y = c[1].parse().ok()?;
        let m = c[2].parse().ok()?;
        let d = c[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    if let Some(c) = LONG_DATE_RE.captures(&text) {
        if let Some(month) = month_number(&c[1]) {
            let day = c[2].parse().ok()?;
            let year = c[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }
    if let Some(c) = DAY_FIRST_DATE_RE.captures(&text) {
        if let Some(month) = month_number(&c[2]) {
            let day = c[1].parse().ok()?;
            let year = c[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }
    None
}

/// `"27–1 (1 NC)"`, `"22-3-1"` → wins, losses, draws, no contests.
pub fn parse_record(raw: &str) -> Option<FightRecord> {
    let text = clean_text(raw);
    let c = RECORD_RE.captures(&text)?;
    let num = |i: usize| c.get(i).and_then(|m| m.as_str().parse::<i64>().ok());
    Some(FightRecord {
        wins: num(1)?,
        losses: num(2)?,
        draws: num(3).unwrap_or(0),
        no_contests: num(4).unwrap_or(0),
    })
}

/// First parenthesized run made only of `dd–dd` scores.
pub fn parse_judges_score(method: &str) -> Option<String> {
    let mut rest = method;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        let close = after.find(')')?;
        let inner = after[..close].trim();
        if JUDGES_SCORE_RE.is_match(inner) {
            return Some(inner.to_string());
        }
        rest = &after[close + 1..];
    }
    None
}

/// Leading method category: `"KO (punches)"` → `"KO"`.
pub fn method_kind(method: &str) -> Option<String> {
    let head = method.split('(').next().unwrap_or("").trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOutcome {
    Finish,
    Draw,
    NoContest,
    Unknown,
}

/// Outcome implied by method text alone. No-contest and draw are checked before
/// the winning methods because "Decision (split draw)" starts like a win.
pub fn classify_method(method: &str) -> MethodOutcome {
    let lc = clean_text(method).to_lowercase();
    if lc.is_empty() {
        return MethodOutcome::Unknown;
    }
    let words: Vec<&str> = lc
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    // Overturned results are recorded as no contests.
    if lc.contains("no contest") || words.contains(&"nc") || words.contains(&"overturned") {
        return MethodOutcome::NoContest;
    }
    if words.contains(&"draw") {
        return MethodOutcome::Draw;
    }
    let finishes = ["ko", "tko", "submission", "decision", "dq", "disqualification"];
    match words.first() {
        Some(first) if finishes.contains(first) => MethodOutcome::Finish,
        _ => MethodOutcome::Unknown,
    }
}

/// Result of an event-page row: `def.` means the left corner won.
pub fn result_from_row(result_text: &str, method: &str, fighter1: &str, fighter2: &str) -> FightResult {
    match classify_method(method) {
        MethodOutcome::NoContest => return FightResult::NoContest,
        MethodOutcome::Draw => return FightResult::Draw,
        _ => {}
    }
    let lc = result_text.to_lowercase();
    if lc.contains("def") {
        FightResult::Win {
            winner: fighter1.to_string(),
            loser: fighter2.to_string(),
        }
    } else if lc.contains("drew") || lc.contains("draw") {
        FightResult::Draw
    } else {
        FightResult::Pending
    }
}

/// Elapsed fight time from the stoppage round and clock.
pub fn fight_time_seconds(round: Option<i64>, time: Option<&str>) -> Option<i64> {
    let round = round?;
    let c = TIME_RE.captures(time?.trim())?;
    let m: i64 = c[1].parse().ok()?;
    let s: i64 = c[2].parse().ok()?;
    if round < 1 || s >= 60 {
        return None;
    }
    Some((round - 1) * ROUND_SECONDS + m * 60 + s)
}

/// Landed over attempted, rounded to four decimals. Zero attempts count as one.
pub fn strike_rate(landed: i64, attempted: i64) -> f64 {
    let rate = landed as f64 / attempted.max(1) as f64;
    (rate * 10_000.0).round() / 10_000.0
}

/// Filter for names recovered by byte scanning: two to four capitalized words.
pub fn looks_like_person_name(s: &str) -> bool {
    let words: Vec<&str> = s.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) {
        return false;
    }
    words.iter().all(|w| {
        let mut chars = w.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_alphabetic() || matches!(c, '\'' | '-' | '.'))
    })
}

fn weight_class_key(s: &str) -> String {
    let s = clean_text(s).to_lowercase().replace('ё', "е").replace('’', "'");
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    clean_text(&out)
}

pub struct Normalizer {
    weight_classes: HashMap<String, WeightClass>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        for wc in WeightClass::SEEDED {
            for key in [wc.name_en().to_string(), wc.name_ru().to_string(), wc.token().replace('_', " ")] {
                table.entry(weight_class_key(&key)).or_insert(wc);
            }
        }
        // Curated drift seen in the sources.
        let aliases: &[(&str, WeightClass)] = &[
            ("heavyweights", WeightClass::Heavyweight),
            ("light heavyweights", WeightClass::LightHeavyweight),
            ("light-heavyweight", WeightClass::LightHeavyweight),
            ("middleweights", WeightClass::Middleweight),
            ("welterweights", WeightClass::Welterweight),
            ("lightweights", WeightClass::Lightweight),
            ("featherweights", WeightClass::Featherweight),
            ("bantamweights", WeightClass::Bantamweight),
            ("flyweights", WeightClass::Flyweight),
            ("women's strawweights", WeightClass::WomensStrawweight),
            ("women's flyweights", WeightClass::WomensFlyweight),
            ("women's bantamweights", WeightClass::WomensBantamweight),
            ("women's featherweights", WeightClass::WomensFeatherweight),
            ("womens strawweight", WeightClass::WomensStrawweight),
            ("womens flyweight", WeightClass::WomensFlyweight),
            ("womens bantamweight", WeightClass::WomensBantamweight),
            ("womens featherweight", WeightClass::WomensFeatherweight),
            ("strawweight", WeightClass::WomensStrawweight),
            ("catch weight", WeightClass::Catchweight),
            ("тяжелый вес", WeightClass::Heavyweight),
            ("полутяжелый вес", WeightClass::LightHeavyweight),
            ("полулегкий вес", WeightClass::Featherweight),
            ("легкий вес", WeightClass::Lightweight),
            ("минимальный вес", WeightClass::WomensStrawweight),
            ("женский минимальный", WeightClass::WomensStrawweight),
            ("женский наилегчайший", WeightClass::WomensFlyweight),
            ("женский легчайший", WeightClass::WomensBantamweight),
            ("женский полулегкий", WeightClass::WomensFeatherweight),
            ("наилегчайший вес (жен)", WeightClass::WomensFlyweight),
            ("легчайший вес (жен)", WeightClass::WomensBantamweight),
            ("pound-for-pound", WeightClass::PoundForPound),
            ("men's pound-for-pound", WeightClass::PoundForPound),
            ("women's pound-for-pound", WeightClass::WomensPoundForPound),
        ];
        for (alias, wc) in aliases {
            table.insert(weight_class_key(alias), *wc);
        }
        Self {
            weight_classes: table,
        }
    }

    pub fn normalize_name(&self, raw: &str) -> CanonicalName {
        normalize_name(raw)
    }

    pub fn normalize_event_name(&self, raw: &str) -> EventName {
        normalize_event_name(raw)
    }

    pub fn normalize_date(&self, raw: &str) -> Option<NaiveDate> {
        normalize_date(raw)
    }

    /// Maps English or Russian text to the seeded enum; `Unknown` is the flag.
    pub fn normalize_weight_class(&self, raw: &str) -> WeightClass {
        let raw_lc = clean_text(raw).to_lowercase();
        if raw_lc.contains("p4p") || raw_lc.contains("pound for pound") || raw_lc.contains("pound-for-pound") {
            let women = raw_lc.contains("жен") || raw_lc.contains("women");
            return if women {
                WeightClass::WomensPoundForPound
            } else {
                WeightClass::PoundForPound
            };
        }
        // Parenthesized gender markers carry meaning before they are stripped.
        if raw_lc.contains("(жен)") {
            let key = weight_class_key(&raw_lc);
            if let Some(wc) = self.weight_classes.get(&format!("женский {key}")) {
                return *wc;
            }
        }
        let key = weight_class_key(raw);
        if let Some(wc) = self.weight_classes.get(&key) {
            return *wc;
        }
        if key.starts_with("catchweight") || key.starts_with("catch weight") {
            return WeightClass::Catchweight;
        }
        if let Some(stripped) = key.strip_suffix(" bout") {
            if let Some(wc) = self.weight_classes.get(stripped) {
                return *wc;
            }
        }
        WeightClass::Unknown
    }

    pub fn canonical_event(&self, staging: &StagingEvent) -> Result<CanonicalEvent, RecordError> {
        let name = self.normalize_event_name(&staging.name);
        if name.display.is_empty() {
            return Err(RecordError::Parse("event row without a name".into()));
        }
        let status = if staging.cancelled {
            EventStatus::Cancelled
        } else {
            match staging.section {
                EventSection::Past => EventStatus::Completed,
                EventSection::Scheduled => EventStatus::Scheduled,
            }
        };
        let non_empty = |s: &str| {
            let s = strip_brackets(s);
            if s.is_empty() || s == "—" {
                None
            } else {
                Some(s)
            }
        };
        Ok(CanonicalEvent {
            date: self.normalize_date(&staging.date_text),
            venue: non_empty(&staging.venue),
            location: non_empty(&staging.location),
            source_url: staging.source_url.clone(),
            short_name: name.short,
            event_number: name.number,
            event_type: name.event_type,
            name: name.display,
            status,
        })
    }

    pub fn canonical_fight(
        &self,
        staging: &StagingFight,
        event_name: &str,
        event_date: Option<NaiveDate>,
    ) -> Result<CanonicalFight, RecordError> {
        let fighter1 = self.normalize_name(&staging.fighter1).display().to_string();
        let fighter2 = self.normalize_name(&staging.fighter2).display().to_string();
        if fighter1.is_empty() || fighter2.is_empty() {
            return Err(RecordError::Parse(format!(
                "fight row #{} on {event_name} is missing a fighter name",
                staging.fight_order
            )));
        }

        let weight_class = match self.normalize_weight_class(&staging.weight_class) {
            WeightClass::Unknown => {
                tracing::debug!("[NORMALIZE] unknown weight class '{}'", staging.weight_class);
                clean_text(&staging.weight_class)
            }
            wc => wc.name_en().to_string(),
        };

        let method_text = strip_brackets(&staging.method);
        let notes = strip_brackets(&staging.notes);
        let notes_lc = notes.to_lowercase();
        let round = clean_text(&staging.round_text).parse::<i64>().ok();
        let time = Some(clean_text(&staging.time)).filter(|t| !t.is_empty());

        let is_title_fight = notes_lc.contains("title") || notes_lc.contains("championship");
        let is_main_event = staging.card_type == Some(CardType::Main) && staging.fight_order == 1;
        let scheduled_rounds = if is_title_fight || is_main_event || round.is_some_and(|r| r > 3) {
            5
        } else {
            3
        };

        Ok(CanonicalFight {
            event_name: event_name.to_string(),
            result: result_from_row(&staging.result_text, &method_text, &fighter1, &fighter2),
            fighter1,
            fighter2,
            weight_class,
            scheduled_rounds,
            method: method_kind(&method_text),
            judges_score: parse_judges_score(&method_text),
            method_details: Some(method_text).filter(|m| !m.is_empty()),
            fight_time_seconds: fight_time_seconds(round, time.as_deref()),
            round,
            time,
            fight_date: event_date,
            notes: Some(notes).filter(|n| !n.is_empty()),
            card_type: staging.card_type,
            fight_order: i64::from(staging.fight_order),
            is_title_fight,
            is_main_event,
        })
    }

    /// Canonical snapshot of one weight class plus the entries rejected by the
    /// position invariants (duplicate position, second champion).
    pub fn canonical_ranking(
        &self,
        staging: &StagingRankingList,
    ) -> Result<(CanonicalRanking, Vec<RecordError>), RecordError> {
        let weight_class = self.normalize_weight_class(&staging.weight_class);
        if weight_class == WeightClass::Unknown {
            return Err(RecordError::Parse(format!(
                "unknown weight class '{}'",
                staging.weight_class
            )));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(staging.fighters.len());
        let mut rejected = Vec::new();
        for f in &staging.fighters {
            let name = self.normalize_name(&f.name);
            if name.is_empty() {
                rejected.push(RecordError::Parse(format!(
                    "{weight_class}: empty name at position {}",
                    f.rank_position
                )));
                continue;
            }
            if !seen.insert(f.rank_position) {
                rejected.push(RecordError::Invariant(format!(
                    "{weight_class}: duplicate rank position {} ({})",
                    f.rank_position,
                    name.display()
                )));
                continue;
            }
            let mut fighter = CanonicalFighter::named(name);
            fighter.record = f.record.as_deref().and_then(parse_record);
            fighter.country = f.country.as_deref().map(clean_text).filter(|c| !c.is_empty());
            fighter.profile_url = f.profile_url.clone();
            if !weight_class.is_pound_for_pound() {
                fighter.weight_class = Some(weight_class);
            }
            entries.push(CanonicalRankedFighter {
                fighter,
                rank_position: f.rank_position,
                rank_move: f.rank_move,
            });
        }
        Ok((CanonicalRanking { weight_class, entries }, rejected))
    }

    /// Profile fields as a fighter; the caller already knows which fighter.
    pub fn canonical_profile(&self, staging: &StagingProfile, profile_url: &str) -> Result<CanonicalFighter, RecordError> {
        let ru = staging.name_ru.as_deref().map(normalize_name).unwrap_or_default();
        let en = staging.name_en.as_deref().map(normalize_name).unwrap_or_default();
        let name = CanonicalName {
            name_en: if en.name_en.is_empty() { ru.name_en } else { en.name_en },
            name_ru: if ru.name_ru.is_empty() { en.name_ru } else { ru.name_ru },
        };
        if name.is_empty() {
            return Err(RecordError::Parse(format!("profile {profile_url} has no usable name")));
        }

        let birth_date = staging.birth_date.as_deref().and_then(normalize_date);
        if let (Some(raw), None) = (&staging.birth_date, birth_date) {
            tracing::debug!("[NORMALIZE] unreadable birth date '{raw}' on {profile_url}");
        }

        let mut fighter = CanonicalFighter::named(name);
        fighter.birth_date = birth_date;
        fighter.record = staging.record.as_deref().and_then(parse_record);
        fighter.country = staging.country.as_deref().map(clean_text).filter(|c| !c.is_empty());
        fighter.profile_url = Some(profile_url.to_string());
        Ok(fighter)
    }

    pub fn canonical_round_stat(&self, staging: &StagingRoundStat) -> Result<CanonicalRoundStat, RecordError> {
        let fighter = self.normalize_name(&staging.fighter).display().to_string();
        if fighter.is_empty() {
            return Err(RecordError::Parse("round stat without a fighter".into()));
        }
        let round_number = staging
            .round
            .ok_or_else(|| RecordError::Parse(format!("round stat for {fighter} without a round")))?;
        if round_number < 1 {
            return Err(RecordError::Invariant(format!(
                "round stat for {fighter} has round {round_number}"
            )));
        }

        let counters = staging.counters.clone();
        for (column, value) in crate::types::RoundCounters::COLUMNS.iter().zip(counters.values()) {
            if let Some(v) = value {
                if v < 0 {
                    return Err(RecordError::Invariant(format!(
                        "{fighter} round {round_number}: negative {column} ({v})"
                    )));
                }
            }
        }
        let rate = |landed: Option<i64>, attempted: Option<i64>, what: &str| match (landed, attempted) {
            (Some(l), Some(a)) if l > a => Err(RecordError::Invariant(format!(
                "{fighter} round {round_number}: {what} landed {l} > attempted {a}"
            ))),
            (Some(l), Some(a)) => Ok(Some(strike_rate(l, a))),
            _ => Ok(None),
        };
        let significant_strikes_rate = rate(
            counters.significant_strikes_landed,
            counters.significant_strikes_attempted,
            "significant strikes",
        )?;
        let takedowns_rate = rate(
            counters.takedowns_successful,
            counters.takedowns_attempted,
            "takedowns",
        )?;

        Ok(CanonicalRoundStat {
            event_name: staging
                .event_name
                .as_deref()
                .map(|e| normalize_event_name(e).display)
                .filter(|e| !e.is_empty()),
            fight_date: staging.fight_date.as_deref().and_then(normalize_date),
            opponent: staging
                .opponent
                .as_deref()
                .map(|o| normalize_name(o).display().to_string())
                .filter(|o| !o.is_empty()),
            fighter,
            round_number,
            counters,
            significant_strikes_rate,
            takedowns_rate,
            winner: staging.winner,
        })
    }
}
