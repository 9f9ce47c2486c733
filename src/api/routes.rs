use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::get_health;
use crate::db::models::{
    EventRow, FightRow, FighterRow, RankingEntryRow, RoundStatRow, UpcomingFightRow, WeightClassRow,
};
use crate::db::Store;
use crate::error::AppError;

const DEFAULT_PAGE: i64 = 100;
const MAX_PAGE: i64 = 500;

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
}

pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/health", get(get_health))
        .route("/weight-classes", get(get_weight_classes))
        .route("/rankings", get(get_rankings))
        .route("/fighters", get(get_fighters))
        .route("/fighters/:id", get(get_fighter))
        .route("/search", get(search_fighters))
        .route("/events", get(get_events))
        .route("/events/:id", get(get_event))
        .route("/events/:id/fights", get(get_event_fights))
        .route("/fights/:id/rounds", get(get_fight_rounds));
    Router::new().nest("/api", api).with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RankingsQuery {
    /// Token, English or Russian class name.
    pub weight_class: Option<String>,
}

#[derive(Deserialize)]
pub struct FightersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub upcoming: Option<bool>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RankedFighter {
    pub id: i64,
    pub name_en: Option<String>,
    pub name_ru: Option<String>,
    pub country: Option<String>,
    pub wins: Option<i64>,
    pub losses: Option<i64>,
    pub draws: Option<i64>,
}

#[derive(Serialize)]
pub struct RankingResponse {
    pub id: i64,
    pub weight_class: String,
    pub weight_class_name: String,
    pub rank_position: i64,
    pub is_champion: bool,
    pub rank_move: Option<String>,
    pub captured_at: String,
    pub fighter: RankedFighter,
}

impl From<RankingEntryRow> for RankingResponse {
    fn from(r: RankingEntryRow) -> Self {
        Self {
            id: r.id,
            weight_class: r.weight_class_token,
            weight_class_name: r.weight_class_name,
            is_champion: r.rank_position == 0,
            rank_position: r.rank_position,
            rank_move: r.rank_move,
            captured_at: r.captured_at,
            fighter: RankedFighter {
                id: r.fighter_id,
                name_en: r.fighter_name_en,
                name_ru: r.fighter_name_ru,
                country: r.fighter_country,
                wins: r.fighter_wins,
                losses: r.fighter_losses,
                draws: r.fighter_draws,
            },
        }
    }
}

#[derive(Serialize)]
pub struct EventFightsResponse {
    pub event: EventRow,
    /// Results, for completed events.
    pub fights: Vec<FightRow>,
    /// Announced bouts, for scheduled events.
    pub upcoming: Vec<UpcomingFightRow>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_weight_classes(State(state): State<ApiState>) -> Result<Json<Vec<WeightClassRow>>, AppError> {
    Ok(Json(state.store.weight_classes().await?))
}

async fn get_rankings(
    State(state): State<ApiState>,
    Query(params): Query<RankingsQuery>,
) -> Result<Json<Vec<RankingResponse>>, AppError> {
    let weight_class_id = match params.weight_class.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        Some(filter) => Some(
            state
                .store
                .weight_class_id(filter)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("weight class '{filter}'")))?,
        ),
        None => None,
    };
    let rows = state.store.latest_rankings(weight_class_id).await?;
    Ok(Json(rows.into_iter().map(RankingResponse::from).collect()))
}

async fn get_fighters(
    State(state): State<ApiState>,
    Query(params): Query<FightersQuery>,
) -> Result<Json<Vec<FighterRow>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = params.offset.unwrap_or(0).max(0);
    Ok(Json(state.store.fighters(limit, offset).await?))
}

async fn get_fighter(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<FighterRow>, AppError> {
    let fighter = state
        .store
        .fighter(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("fighter {id}")))?;
    Ok(Json(fighter))
}

async fn search_fighters(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<FighterRow>>, AppError> {
    let q = params.q.unwrap_or_default();
    if q.trim().is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.store.search_fighters(&q).await?))
}

async fn get_events(
    State(state): State<ApiState>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<Vec<EventRow>>, AppError> {
    Ok(Json(state.store.events(params.upcoming).await?))
}

async fn load_event(store: &Store, id: i64) -> Result<EventRow, AppError> {
    store
        .event(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("event {id}")))
}

async fn get_event(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<EventRow>, AppError> {
    Ok(Json(load_event(&state.store, id).await?))
}

async fn get_event_fights(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<EventFightsResponse>, AppError> {
    let event = load_event(&state.store, id).await?;
    let fights = state.store.event_fights(&event.name).await?;
    let upcoming = state.store.upcoming_fights(event.id).await?;
    Ok(Json(EventFightsResponse { event, fights, upcoming }))
}

async fn get_fight_rounds(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RoundStatRow>>, AppError> {
    if state.store.fight(id).await?.is_none() {
        return Err(AppError::NotFound(format!("fight {id}")));
    }
    Ok(Json(state.store.fight_rounds(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::linker::{LinkCounts, Linker};
    use crate::normalize::Normalizer;
    use crate::types::{EventSection, StagingEvent, StagingFight, StagingRankedFighter, StagingRankingList};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn seeded() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&Config::for_path(dir.path().join("ufc.db"))).await.unwrap();
        let normalizer = Normalizer::new();
        let linker = Linker::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap());
        let mut counts = LinkCounts::default();
        let mut tx = store.begin().await.unwrap();

        let event = normalizer
            .canonical_event(&StagingEvent {
                name: "UFC 300: Pereira vs. Hill".into(),
                date_text: "April 13, 2024".into(),
                venue: "T-Mobile Arena".into(),
                location: "Las Vegas, Nevada, U.S.".into(),
                source_url: None,
                section: EventSection::Past,
                cancelled: false,
            })
            .unwrap();
        linker.link_event(&mut tx, &event).await.unwrap();
        let fight = normalizer
            .canonical_fight(
                &StagingFight {
                    weight_class: "Light Heavyweight".into(),
                    fighter1: "Alex Pereira (c)".into(),
                    result_text: "def.".into(),
                    fighter2: "Jamahal Hill".into(),
                    method: "KO (punches)".into(),
                    round_text: "1".into(),
                    time: "3:14".into(),
                    notes: "For the UFC Light Heavyweight Championship.".into(),
                    card_type: None,
                    fight_order: 1,
                },
                &event.name,
                event.date,
            )
            .unwrap();
        linker.link_fights(&mut tx, &event.name, &[fight], &mut counts).await.unwrap();

        let list = StagingRankingList {
            weight_class: "Легкий вес".into(),
            fighters: vec![
                StagingRankedFighter {
                    name: "Ислам Махачев".into(),
                    rank_position: 0,
                    rank_move: crate::types::RankMove::Steady,
                    record: Some("26-1-0".into()),
                    country: Some("Россия".into()),
                    profile_url: None,
                },
                StagingRankedFighter {
                    name: "Арман Царукян".into(),
                    rank_position: 1,
                    rank_move: crate::types::RankMove::Up(2),
                    record: None,
                    country: None,
                    profile_url: None,
                },
            ],
        };
        let (ranking, _) = normalizer.canonical_ranking(&list).unwrap();
        linker.link_ranking(&mut tx, &ranking, &mut counts).await.unwrap();
        tx.commit().await.unwrap();
        (dir, store)
    }

    async fn get_json(store: &Store, uri: &str) -> (StatusCode, Value) {
        let app = router(ApiState { store: store.clone() });
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn weight_classes_are_ordered() {
        let (_dir, store) = seeded().await;
        let (status, body) = get_json(&store, "/api/weight-classes").await;
        assert_eq!(status, StatusCode::OK);
        let classes = body.as_array().unwrap();
        assert_eq!(classes.len(), 15);
        assert_eq!(classes[0]["token"], "flyweight");
    }

    #[tokio::test]
    async fn rankings_filter_accepts_russian_names() {
        let (_dir, store) = seeded().await;
        let (status, body) = get_json(&store, "/api/rankings?weight_class=%D0%9B%D0%B5%D0%B3%D0%BA%D0%B8%D0%B9%20%D0%B2%D0%B5%D1%81").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["is_champion"], true);
        assert_eq!(rows[0]["fighter"]["name_ru"], "Ислам Махачев");
        assert_eq!(rows[0]["fighter"]["wins"], 26);
        assert_eq!(rows[1]["rank_move"], "↑2");

        let (status, _) = get_json(&store, "/api/rankings?weight_class=lightweight").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get_json(&store, "/api/rankings?weight_class=sumo").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fighters_search_and_lookup() {
        let (_dir, store) = seeded().await;
        let (_, body) = get_json(&store, "/api/search?q=pereira").await;
        let hits = body.as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name_en"], "Alex Pereira");

        let id = hits[0]["id"].as_i64().unwrap();
        let (status, body) = get_json(&store, &format!("/api/fighters/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name_en"], "Alex Pereira");

        let (_, body) = get_json(&store, "/api/fighters?limit=2").await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _) = get_json(&store, "/api/fighters/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = get_json(&store, "/api/search?q=").await;
        assert_eq!(body, Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn event_fights_and_rounds() {
        let (_dir, store) = seeded().await;
        let (_, body) = get_json(&store, "/api/events?upcoming=false").await;
        let events = body.as_array().unwrap();
        assert_eq!(events.len(), 1);
        let id = events[0]["id"].as_i64().unwrap();

        let (status, body) = get_json(&store, &format!("/api/events/{id}/fights")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event"]["event_number"], 300);
        let fights = body["fights"].as_array().unwrap();
        assert_eq!(fights.len(), 1);
        assert_eq!(fights[0]["is_win"], "Alex Pereira");
        assert_eq!(fights[0]["is_title_fight"], true);

        let fight_id = fights[0]["id"].as_i64().unwrap();
        let (status, body) = get_json(&store, &format!("/api/fights/{fight_id}/rounds")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Array(Vec::new()));

        let (status, _) = get_json(&store, "/api/fights/4242/rounds").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = get_json(&store, "/api/events?upcoming=true").await;
        assert_eq!(body, Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn health_reports_schema_version() {
        let (_dir, store) = seeded().await;
        let (status, body) = get_json(&store, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["schema_version"], crate::db::schema::CURRENT_VERSION);
    }
}
