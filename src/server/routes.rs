//! Axum route handlers for the reading service.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use crate::models::{
    Card, CardFilter, Mentor, Page, Reading, ReadingCard, ReadingDetail, ReadingFilter, Suit,
    UserProfile,
};
use crate::orchestrator::{CreateReading, Guidance, ReadingOrchestrator};
use crate::spread::SpreadType;
use crate::store::Store;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReadingOrchestrator>,
    /// Balance granted to a profile created on first request.
    pub default_balance: u64,
}

impl AppState {
    pub fn new(orchestrator: ReadingOrchestrator, default_balance: u64) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            default_balance,
        }
    }

    fn store(&self) -> &Store {
        self.orchestrator.store()
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tarot/readings", post(create_reading_handler))
        .route("/tarot/readings/my", get(my_readings_handler))
        .route("/tarot/readings/:id", get(get_reading_handler))
        .route("/tarot/readings/:id/cards", get(reading_cards_handler))
        .route("/tarot/readings/:id/insight", post(generate_insight_handler))
        .route("/tarot/celestial", post(celestial_handler))
        .route("/tarot/suits", get(list_suits_handler))
        .route("/tarot/cards", get(list_cards_handler))
        .route("/tarot/cards/:key", get(get_card_handler))
        .route("/mentors", get(list_mentors_handler))
        .route("/mentors/:id", get(get_mentor_handler).post(pick_mentor_handler))
        .route("/users/me", get(profile_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The caller, taken from `X-User-Id`. Extracting it creates the profile
/// with the default balance if this is the user's first request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing X-User-Id header"))?
            .to_string();

        state
            .store()
            .ensure_profile(&user_id, state.default_balance)
            .await?;
        Ok(CurrentUser(user_id))
    }
}

// Body, path and query extractors whose rejections render as [`ApiError`].

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct AppJson<T>(T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
struct AppPath<T>(T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
struct AppQuery<T>(T);

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "celestial-insight",
    }))
}

#[derive(Debug, Deserialize)]
struct CreateReadingBody {
    question: String,
    mentor_id: i64,
    #[serde(default)]
    spread_type: Option<String>,
}

/// POST /tarot/readings: phase 1.
async fn create_reading_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppJson(body): AppJson<CreateReadingBody>,
) -> Result<(StatusCode, Json<ReadingDetail>), ApiError> {
    let spread_type = body
        .spread_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<SpreadType>)
        .transpose()
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;

    let detail = state
        .orchestrator
        .create_reading(
            &user_id,
            CreateReading {
                question: body.question,
                mentor_id: body.mentor_id,
                spread_type,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[derive(Debug, Default, Deserialize)]
struct ReadingQuery {
    question: Option<String>,
    date: Option<String>,
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_date_filter(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// GET /tarot/readings/my
async fn my_readings_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppQuery(query): AppQuery<ReadingQuery>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let date = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => Some(
            parse_date_filter(raw)
                .ok_or_else(|| ApiError::invalid_request(format!("invalid date '{}'", raw)))?,
        ),
        None => None,
    };
    let readings = state
        .store()
        .list_readings(
            &user_id,
            ReadingFilter {
                question: query.question,
                date,
            },
        )
        .await?;
    Ok(Json(readings))
}

async fn owned_reading(state: &AppState, id: i64, user_id: &str) -> Result<ReadingDetail, ApiError> {
    state
        .store()
        .get_reading_detail(id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("reading {}", id)))
}

/// GET /tarot/readings/:id
async fn get_reading_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ReadingDetail>, ApiError> {
    owned_reading(&state, id, &user_id).await.map(Json)
}

/// GET /tarot/readings/:id/cards
async fn reading_cards_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Vec<ReadingCard>>, ApiError> {
    let detail = owned_reading(&state, id, &user_id).await?;
    Ok(Json(detail.cards))
}

/// POST /tarot/readings/:id/insight: phase 2.
async fn generate_insight_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ReadingDetail>, ApiError> {
    let detail = state.orchestrator.generate_insight(id, &user_id).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
struct CelestialBody {
    question: String,
}

/// POST /tarot/celestial: free-form guidance, nothing stored.
async fn celestial_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppJson(body): AppJson<CelestialBody>,
) -> Result<Json<Guidance>, ApiError> {
    let guidance = state
        .orchestrator
        .celestial_guidance(&user_id, &body.question)
        .await?;
    Ok(Json(guidance))
}

/// GET /tarot/suits
async fn list_suits_handler(State(state): State<AppState>) -> Result<Json<Vec<Suit>>, ApiError> {
    Ok(Json(state.store().list_suits().await?))
}

/// GET /tarot/cards
async fn list_cards_handler(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<CardFilter>,
) -> Result<Json<Page<Card>>, ApiError> {
    Ok(Json(state.store().list_cards(filter).await?))
}

/// GET /tarot/cards/:key: numeric keys are ids, anything else a slug.
async fn get_card_handler(
    State(state): State<AppState>,
    AppPath(key): AppPath<String>,
) -> Result<Json<Card>, ApiError> {
    let card = match key.parse::<i64>() {
        Ok(id) => state.store().get_card(id).await?,
        Err(_) => state.store().get_card_by_slug(&key).await?,
    };
    card.map(Json)
        .ok_or_else(|| ApiError::not_found(format!("card '{}'", key)))
}

#[derive(Debug, Default, Deserialize)]
struct MentorQuery {
    is_active: Option<bool>,
}

/// GET /mentors
async fn list_mentors_handler(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<MentorQuery>,
) -> Result<Json<Vec<Mentor>>, ApiError> {
    Ok(Json(state.store().list_mentors(query.is_active).await?))
}

async fn find_mentor(state: &AppState, id: i64) -> Result<Mentor, ApiError> {
    state
        .store()
        .get_mentor(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("mentor {}", id)))
}

/// GET /mentors/:id
async fn get_mentor_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Mentor>, ApiError> {
    find_mentor(&state, id).await.map(Json)
}

/// POST /mentors/:id: set the caller's preferred mentor.
async fn pick_mentor_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Mentor>, ApiError> {
    let mentor = find_mentor(&state, id).await?;
    state
        .store()
        .set_preferred_mentor(&user_id, mentor.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("profile for {}", user_id)))?;
    Ok(Json(mentor))
}

/// GET /users/me
async fn profile_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<UserProfile>, ApiError> {
    state
        .store()
        .get_profile(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("profile for {}", user_id)))
}
