pub mod catalog;
pub mod jobs;

use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::{AppState, HealthResponse};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/themes", get(catalog::get_themes))
        .route("/api/theme-details/*path", get(catalog::get_theme_details))
        .route("/api/search", get(catalog::search))
        .route("/api/top100", get(catalog::top100))
        .route("/api/index", post(jobs::start_indexing))
        .route("/api/index/status", get(jobs::indexing_status))
        .route("/api/enrich", post(jobs::start_enrichment))
        .route("/api/enrich/stop", post(jobs::stop_enrichment))
        .route("/api/enrich/status", get(jobs::enrichment_status))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
