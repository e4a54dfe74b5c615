//! HTTP route definitions

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::error;

use crate::app::AppState;
use crate::store::highscores::{Highscore, DEFAULT_LEADERBOARD_LIMIT};
use crate::store::HighscoreStore;
use crate::util::time::uptime_secs;

/// Upper bound on a request, Supabase round trips included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_WALLET_LEN: usize = 64;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Read-only endpoints, open to any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/highscores/:wallet", get(highscore_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    persistence: bool,
    arena_participants: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        persistence: state.highscores.is_some(),
        arena_participants: state
            .simulation
            .as_ref()
            .map(|sim| sim.participant_count())
            .unwrap_or(0),
    })
}

// ============================================================================
// Highscore endpoints
// ============================================================================

#[derive(Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    entries: Vec<LeaderboardEntry>,
}

#[derive(Serialize)]
struct LeaderboardEntry {
    rank: usize,
    wallet_address: String,
    total_kills: u32,
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let store = store(&state)?;
    let rows = store
        .leaderboard(query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(LeaderboardResponse {
        entries: ranked(rows),
    }))
}

#[derive(Serialize)]
struct HighscoreResponse {
    wallet_address: String,
    total_kills: u32,
    /// Absent for wallets that never scored
    rank: Option<u64>,
}

async fn highscore_handler(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<HighscoreResponse>, AppError> {
    let wallet = wallet.trim().to_string();
    if !is_valid_wallet(&wallet) {
        return Err(AppError::BadRequest("Invalid wallet address".to_string()));
    }

    let store = store(&state)?;
    let ranking = store
        .user_rank(&wallet)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(match ranking {
        Some(ranking) => HighscoreResponse {
            wallet_address: ranking.highscore.wallet_address,
            total_kills: ranking.highscore.total_kills,
            rank: Some(ranking.rank),
        },
        None => HighscoreResponse {
            wallet_address: wallet,
            total_kills: 0,
            rank: None,
        },
    }))
}

/// Base58 wallet addresses, plus the `-`/`_` of simulated identities
fn is_valid_wallet(wallet: &str) -> bool {
    !wallet.is_empty()
        && wallet.len() <= MAX_WALLET_LEN
        && wallet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn store(state: &AppState) -> Result<&HighscoreStore, AppError> {
    state
        .highscores
        .as_ref()
        .ok_or(AppError::ServiceUnavailable("Highscore persistence is not configured"))
}

/// Number leaderboard rows in the order the store returned them
fn ranked(rows: Vec<Highscore>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardEntry {
            rank: index + 1,
            wallet_address: row.wallet_address,
            total_kills: row.total_kills,
        })
        .collect()
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.to_string()),
            AppError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
