use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Weight classes
// ---------------------------------------------------------------------------

/// Closed enumeration of weight classes. Everything except `Unknown` is seeded
/// into `weight_classes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightClass {
    Flyweight,
    Bantamweight,
    Featherweight,
    Lightweight,
    Welterweight,
    Middleweight,
    LightHeavyweight,
    Heavyweight,
    WomensStrawweight,
    WomensFlyweight,
    WomensBantamweight,
    WomensFeatherweight,
    Catchweight,
    PoundForPound,
    WomensPoundForPound,
    /// Sentinel for inputs the curated table does not know.
    Unknown,
}

impl WeightClass {
    pub const SEEDED: [WeightClass; 15] = [
        WeightClass::Flyweight,
        WeightClass::Bantamweight,
        WeightClass::Featherweight,
        WeightClass::Lightweight,
        WeightClass::Welterweight,
        WeightClass::Middleweight,
        WeightClass::LightHeavyweight,
        WeightClass::Heavyweight,
        WeightClass::WomensStrawweight,
        WeightClass::WomensFlyweight,
        WeightClass::WomensBantamweight,
        WeightClass::WomensFeatherweight,
        WeightClass::Catchweight,
        WeightClass::PoundForPound,
        WeightClass::WomensPoundForPound,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            WeightClass::Flyweight => "flyweight",
            WeightClass::Bantamweight => "bantamweight",
            WeightClass::Featherweight => "featherweight",
            WeightClass::Lightweight => "lightweight",
            WeightClass::Welterweight => "welterweight",
            WeightClass::Middleweight => "middleweight",
            WeightClass::LightHeavyweight => "light_heavyweight",
            WeightClass::Heavyweight => "heavyweight",
            WeightClass::WomensStrawweight => "womens_strawweight",
            WeightClass::WomensFlyweight => "womens_flyweight",
            WeightClass::WomensBantamweight => "womens_bantamweight",
            WeightClass::WomensFeatherweight => "womens_featherweight",
            WeightClass::Catchweight => "catchweight",
            WeightClass::PoundForPound => "pound_for_pound",
            WeightClass::WomensPoundForPound => "womens_pound_for_pound",
            WeightClass::Unknown => "unknown",
        }
    }

    pub fn name_en(&self) -> &'static str {
        match self {
            WeightClass::Flyweight => "Flyweight",
            WeightClass::Bantamweight => "Bantamweight",
            WeightClass::Featherweight => "Featherweight",
            WeightClass::Lightweight => "Lightweight",
            WeightClass::Welterweight => "Welterweight",
            WeightClass::Middleweight => "Middleweight",
            WeightClass::LightHeavyweight => "Light Heavyweight",
            WeightClass::Heavyweight => "Heavyweight",
            WeightClass::WomensStrawweight => "Women's Strawweight",
            WeightClass::WomensFlyweight => "Women's Flyweight",
            WeightClass::WomensBantamweight => "Women's Bantamweight",
            WeightClass::WomensFeatherweight => "Women's Featherweight",
            WeightClass::Catchweight => "Catchweight",
            WeightClass::PoundForPound => "Pound for Pound",
            WeightClass::WomensPoundForPound => "Women's Pound for Pound",
            WeightClass::Unknown => "Unknown",
        }
    }

    pub fn name_ru(&self) -> &'static str {
        match self {
            WeightClass::Flyweight => "Наилегчайший вес",
            WeightClass::Bantamweight => "Легчайший вес",
            WeightClass::Featherweight => "Полулегкий вес",
            WeightClass::Lightweight => "Легкий вес",
            WeightClass::Welterweight => "Полусредний вес",
            WeightClass::Middleweight => "Средний вес",
            WeightClass::LightHeavyweight => "Полутяжелый вес",
            WeightClass::Heavyweight => "Тяжелый вес",
            WeightClass::WomensStrawweight => "Женский минимальный вес",
            WeightClass::WomensFlyweight => "Женский наилегчайший вес",
            WeightClass::WomensBantamweight => "Женский легчайший вес",
            WeightClass::WomensFeatherweight => "Женский полулегкий вес",
            WeightClass::Catchweight => "Промежуточный вес",
            WeightClass::PoundForPound => "Вне весовых категорий (P4P)",
            WeightClass::WomensPoundForPound => "Вне весовых категорий (P4P) (жен)",
            WeightClass::Unknown => "Неизвестно",
        }
    }

    /// Upper limit in kilograms. Catchweight and the pound-for-pound lists have none.
    pub fn weight_limit_kg(&self) -> Option<f64> {
        match self {
            WeightClass::Flyweight | WeightClass::WomensFlyweight => Some(56.7),
            WeightClass::Bantamweight | WeightClass::WomensBantamweight => Some(61.2),
            WeightClass::Featherweight | WeightClass::WomensFeatherweight => Some(65.8),
            WeightClass::Lightweight => Some(70.3),
            WeightClass::Welterweight => Some(77.1),
            WeightClass::Middleweight => Some(83.9),
            WeightClass::LightHeavyweight => Some(93.0),
            WeightClass::Heavyweight => Some(120.2),
            WeightClass::WomensStrawweight => Some(52.2),
            WeightClass::Catchweight
            | WeightClass::PoundForPound
            | WeightClass::WomensPoundForPound
            | WeightClass::Unknown => None,
        }
    }

    pub fn is_pound_for_pound(&self) -> bool {
        matches!(self, WeightClass::PoundForPound | WeightClass::WomensPoundForPound)
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::SEEDED.into_iter().find(|wc| wc.token() == token)
    }
}

impl std::fmt::Display for WeightClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name_en())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Numbered card ("UFC 300").
    Numbered,
    FightNight,
    OnEspn,
    OnAbc,
    OnFox,
    OnFx,
    OnFuel,
    Other,
}

impl EventType {
    pub fn is_numbered(&self) -> bool {
        matches!(self, EventType::Numbered)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Numbered => "UFC",
            EventType::FightNight => "Fight Night",
            EventType::OnEspn => "on ESPN",
            EventType::OnAbc => "on ABC",
            EventType::OnFox => "on Fox",
            EventType::OnFx => "on FX",
            EventType::OnFuel => "on Fuel TV",
            EventType::Other => "Other",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(EventStatus::Scheduled),
            "completed" => Some(EventStatus::Completed),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Which table of the events list page a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSection {
    Past,
    Scheduled,
}

// ---------------------------------------------------------------------------
// Fight cards
// ---------------------------------------------------------------------------

/// Broadcast slot of a fight on one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    Main,
    Preliminary,
    EarlyPreliminary,
}

impl CardType {
    /// Recognizes a card header row such as "Main card" or "Early preliminary card (UFC Fight Pass)".
    pub fn from_header(text: &str) -> Option<Self> {
        let lc = text.trim().to_lowercase();
        if lc.starts_with("early preliminary card") {
            Some(CardType::EarlyPreliminary)
        } else if lc.starts_with("preliminary card") {
            Some(CardType::Preliminary)
        } else if lc.starts_with("main card") {
            Some(CardType::Main)
        } else {
            None
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Main" => Some(CardType::Main),
            "Preliminary" => Some(CardType::Preliminary),
            "Early Preliminary" => Some(CardType::EarlyPreliminary),
            _ => None,
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CardType::Main => "Main",
            CardType::Preliminary => "Preliminary",
            CardType::EarlyPreliminary => "Early Preliminary",
        };
        write!(f, "{s}")
    }
}

pub const DRAW_MARKER: &str = "Draw";
pub const NO_CONTEST_MARKER: &str = "No Contest";

/// Outcome of a fight, stored denormalized as the `is_win / is_loss / is_draw / is_nc` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FightResult {
    Win { winner: String, loser: String },
    Draw,
    NoContest,
    /// Not fought yet, or the source row carries no result.
    Pending,
}

/// Column values in the order `(is_win, is_loss, is_draw, is_nc)`.
pub type ResultFlags = (Option<String>, Option<String>, Option<String>, Option<String>);

impl FightResult {
    pub fn flags(&self) -> ResultFlags {
        match self {
            FightResult::Win { winner, loser } => {
                (Some(winner.clone()), Some(loser.clone()), None, None)
            }
            FightResult::Draw => (None, None, Some(DRAW_MARKER.to_string()), None),
            FightResult::NoContest => (None, None, None, Some(NO_CONTEST_MARKER.to_string())),
            FightResult::Pending => (None, None, None, None),
        }
    }
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMove {
    Up(u32),
    Down(u32),
    Steady,
}

impl std::fmt::Display for RankMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankMove::Up(n) => write!(f, "↑{n}"),
            RankMove::Down(n) => write!(f, "↓{n}"),
            RankMove::Steady => write!(f, "—"),
        }
    }
}

// ---------------------------------------------------------------------------
// Round statistics counters
// ---------------------------------------------------------------------------

macro_rules! round_counters {
    ($($field:ident),+ $(,)?) => {
        /// Per-round integer counters. `None` means the source did not carry the value.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct RoundCounters {
            $(pub $field: Option<i64>,)+
        }

        impl RoundCounters {
            /// Column names, in storage order.
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn values(&self) -> Vec<Option<i64>> {
                vec![$(self.$field),+]
            }

            /// Sets a counter by column name. Returns false for unknown names.
            pub fn set(&mut self, column: &str, value: Option<i64>) -> bool {
                match column {
                    $(stringify!($field) => { self.$field = value; true })+
                    _ => false,
                }
            }
        }
    };
}

round_counters! {
    knockdowns,
    significant_strikes_landed,
    significant_strikes_attempted,
    total_strikes_landed,
    total_strikes_attempted,
    takedowns_successful,
    takedowns_attempted,
    submission_attempts,
    reversals,
    head_landed,
    head_attempted,
    body_landed,
    body_attempted,
    leg_landed,
    leg_attempted,
    distance_landed,
    distance_attempted,
    clinch_landed,
    clinch_attempted,
    ground_landed,
    ground_attempted,
    control_time_seconds,
}

// ---------------------------------------------------------------------------
// Staging records (extractor output, raw strings)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StagingEvent {
    pub name: String,
    pub date_text: String,
    pub venue: String,
    pub location: String,
    pub source_url: Option<String>,
    pub section: EventSection,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagingFight {
    pub weight_class: String,
    pub fighter1: String,
    pub result_text: String,
    pub fighter2: String,
    pub method: String,
    pub round_text: String,
    pub time: String,
    pub notes: String,
    pub card_type: Option<CardType>,
    /// 1-based position within the card.
    pub fight_order: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagingRankedFighter {
    pub name: String,
    /// 0 for the champion.
    pub rank_position: u32,
    pub rank_move: RankMove,
    pub record: Option<String>,
    pub country: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagingRankingList {
    pub weight_class: String,
    pub fighters: Vec<StagingRankedFighter>,
}

/// Fields read from one fighter profile page; all raw text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagingProfile {
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub country: Option<String>,
    pub record: Option<String>,
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagingRoundStat {
    /// Source fight identifier, used only to pair corners.
    pub fight_key: Option<String>,
    pub event_name: Option<String>,
    pub fight_date: Option<String>,
    pub fighter: String,
    pub opponent: Option<String>,
    pub round: Option<i64>,
    pub counters: RoundCounters,
    pub winner: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveRecord {
    FighterName(String),
    Round(StagingRoundStat),
}

// ---------------------------------------------------------------------------
// Canonical records (normalizer output)
// ---------------------------------------------------------------------------

/// Bilingual name. Either side may be empty when the source did not carry it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalName {
    pub name_en: String,
    pub name_ru: String,
}

impl CanonicalName {
    pub fn is_empty(&self) -> bool {
        self.name_en.is_empty() && self.name_ru.is_empty()
    }

    /// Preferred display form.
    pub fn display(&self) -> &str {
        if self.name_en.is_empty() {
            &self.name_ru
        } else {
            &self.name_en
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightRecord {
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub no_contests: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalFighter {
    pub name: CanonicalName,
    pub country: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub record: Option<FightRecord>,
    pub weight_class: Option<WeightClass>,
    pub profile_url: Option<String>,
}

impl CanonicalFighter {
    pub fn named(name: CanonicalName) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    /// Display name, bracketed annotations removed.
    pub name: String,
    /// `UFC <N>` for numbered events.
    pub short_name: Option<String>,
    pub event_number: Option<i64>,
    pub event_type: EventType,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub status: EventStatus,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFight {
    pub event_name: String,
    pub fighter1: String,
    pub fighter2: String,
    /// Canonical English class name, or the raw text when unknown.
    pub weight_class: String,
    pub scheduled_rounds: i64,
    pub method: Option<String>,
    pub method_details: Option<String>,
    pub round: Option<i64>,
    pub time: Option<String>,
    pub fight_time_seconds: Option<i64>,
    pub fight_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub card_type: Option<CardType>,
    pub fight_order: i64,
    pub is_title_fight: bool,
    pub is_main_event: bool,
    pub result: FightResult,
    pub judges_score: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRankedFighter {
    pub fighter: CanonicalFighter,
    pub rank_position: u32,
    pub rank_move: RankMove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRanking {
    pub weight_class: WeightClass,
    pub entries: Vec<CanonicalRankedFighter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRoundStat {
    pub event_name: Option<String>,
    pub fight_date: Option<NaiveDate>,
    pub fighter: String,
    pub opponent: Option<String>,
    pub round_number: i64,
    pub counters: RoundCounters,
    pub significant_strikes_rate: Option<f64>,
    pub takedowns_rate: Option<f64>,
    pub winner: Option<bool>,
}
