use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::{AppState, IndexJobStatus, MetadataJobStatus, StartOutcome};
use crate::{enrich, scan};

#[derive(Serialize)]
pub struct StartResponse {
    pub status: &'static str,
}

fn start_response(outcome: StartOutcome) -> (StatusCode, Json<StartResponse>) {
    match outcome {
        StartOutcome::Accepted => (
            StatusCode::ACCEPTED,
            Json(StartResponse { status: "accepted" }),
        ),
        StartOutcome::AlreadyRunning => (
            StatusCode::CONFLICT,
            Json(StartResponse {
                status: "already_running",
            }),
        ),
    }
}

pub async fn start_indexing(State(state): State<AppState>) -> (StatusCode, Json<StartResponse>) {
    start_response(scan::start_index(state))
}

pub async fn indexing_status(State(state): State<AppState>) -> Json<IndexJobStatus> {
    Json(state.index_status.read().clone())
}

pub async fn start_enrichment(State(state): State<AppState>) -> (StatusCode, Json<StartResponse>) {
    start_response(enrich::start_enrichment(state))
}

pub async fn stop_enrichment(State(state): State<AppState>) -> Json<StartResponse> {
    enrich::stop_enrichment(&state);
    Json(StartResponse { status: "ok" })
}

pub async fn enrichment_status(State(state): State<AppState>) -> Json<MetadataJobStatus> {
    Json(state.enrich_status.read().clone())
}
