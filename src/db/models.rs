/// Database row types for the current (v3) schema.
/// Used by sqlx for typed queries and serialized directly by the read API.
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WeightClassRow {
    pub id: i64,
    pub token: String,
    pub name_en: String,
    pub name_ru: String,
    pub weight_limit_kg: Option<f64>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FighterRow {
    pub id: i64,
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
    pub created_at: String,
    pub updated_at: String,
}

/// A ranking row joined with its fighter and weight class.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RankingEntryRow {
    pub id: i64,
    pub weight_class_id: i64,
    pub weight_class_token: String,
    pub weight_class_name: String,
    pub rank_position: i64,
    pub rank_move: Option<String>,
    pub captured_at: String,
    pub fighter_id: i64,
    pub fighter_name_en: Option<String>,
    pub fighter_name_ru: Option<String>,
    pub fighter_country: Option<String>,
    pub fighter_wins: Option<i64>,
    pub fighter_losses: Option<i64>,
    pub fighter_draws: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub name: String,
    pub event_number: Option<i64>,
    pub event_type: String,
    pub date: Option<String>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FightRow {
    pub id: i64,
    pub event_name: String,
    pub fighter1_name: String,
    pub fighter2_name: String,
    pub weight_class: Option<String>,
    pub scheduled_rounds: i64,
    pub method: Option<String>,
    pub method_details: Option<String>,
    pub round: Option<i64>,
    pub time: Option<String>,
    pub fight_date: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub is_title_fight: bool,
    pub is_main_event: bool,
    pub is_win: Option<String>,
    pub is_loss: Option<String>,
    pub is_draw: Option<String>,
    pub is_nc: Option<String>,
    pub fighter1_record: Option<String>,
    pub fighter2_record: Option<String>,
    pub fight_time_seconds: Option<i64>,
    pub card_type: Option<String>,
    pub fight_order: Option<i64>,
    pub judges_score: Option<String>,
    pub referee: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UpcomingFightRow {
    pub id: i64,
    pub event_id: i64,
    pub fighter1_name: String,
    pub fighter2_name: String,
    pub weight_class: Option<String>,
    pub card_type: Option<String>,
    pub fight_order: Option<i64>,
    pub is_main_event: bool,
    pub is_title_fight: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoundStatRow {
    pub id: i64,
    pub fight_id: i64,
    pub fighter_id: i64,
    pub fighter_name: Option<String>,
    pub round_number: i64,
    pub knockdowns: Option<i64>,
    pub significant_strikes_landed: Option<i64>,
    pub significant_strikes_attempted: Option<i64>,
    pub total_strikes_landed: Option<i64>,
    pub total_strikes_attempted: Option<i64>,
    pub takedowns_successful: Option<i64>,
    pub takedowns_attempted: Option<i64>,
    pub submission_attempts: Option<i64>,
    pub reversals: Option<i64>,
    pub head_landed: Option<i64>,
    pub head_attempted: Option<i64>,
    pub body_landed: Option<i64>,
    pub body_attempted: Option<i64>,
    pub leg_landed: Option<i64>,
    pub leg_attempted: Option<i64>,
    pub distance_landed: Option<i64>,
    pub distance_attempted: Option<i64>,
    pub clinch_landed: Option<i64>,
    pub clinch_attempted: Option<i64>,
    pub ground_landed: Option<i64>,
    pub ground_attempted: Option<i64>,
    pub control_time_seconds: Option<i64>,
    pub significant_strikes_rate: Option<f64>,
    pub takedown_rate: Option<f64>,
    pub winner: Option<bool>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrphanRoundStatRow {
    pub id: i64,
    pub event_name: String,
    pub fighter_name: String,
    pub opponent_name: String,
    pub round_number: i64,
    pub fight_date: Option<String>,
    pub reason: String,
    pub payload: String,
    pub quarantined_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrphanFightRow {
    pub id: i64,
    pub event_name: String,
    pub fighter1_name: String,
    pub fighter2_name: String,
    pub reason: String,
    pub payload: String,
    pub quarantined_at: String,
}
