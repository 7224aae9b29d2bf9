use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use common::ThemeSet;
use library::SongStore;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: SongStore,
    pub config: Arc<ServerConfig>,
    pub config_path: PathBuf,
    pub themes: Arc<RwLock<ThemeSet>>,
    pub index_status: Arc<RwLock<IndexJobStatus>>,
    pub enrich_status: Arc<RwLock<MetadataJobStatus>>,
    pub external_client: Client,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexJobStatus {
    pub running: bool,
    pub total_dirs: usize,
    pub processed_dirs: usize,
    pub songs_found: usize,
    pub last_log_line: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MetadataJobStatus {
    pub running: bool,
    pub total: usize,
    pub current: usize,
    pub success: usize,
    pub fail: usize,
    pub last_log_line: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Accepted,
    AlreadyRunning,
}

/// Single-flight gate for the indexing job: flips the register to a fresh
/// running state or reports the conflict. The conflict is a normal answer
/// for the caller, not an error.
pub fn try_begin_index(status: &RwLock<IndexJobStatus>) -> StartOutcome {
    let mut guard = status.write();
    if guard.running {
        return StartOutcome::AlreadyRunning;
    }
    *guard = IndexJobStatus {
        running: true,
        last_log_line: "Indexing started.".to_string(),
        ..IndexJobStatus::default()
    };
    StartOutcome::Accepted
}

/// Same gate for the enrichment job, on its own register and lock.
pub fn try_begin_enrichment(status: &RwLock<MetadataJobStatus>) -> StartOutcome {
    let mut guard = status.write();
    if guard.running {
        return StartOutcome::AlreadyRunning;
    }
    *guard = MetadataJobStatus {
        running: true,
        last_log_line: "Enrichment started.".to_string(),
        ..MetadataJobStatus::default()
    };
    StartOutcome::Accepted
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[cfg(test)]
mod tests {
    use super::{
        try_begin_enrichment, try_begin_index, IndexJobStatus, MetadataJobStatus, StartOutcome,
    };
    use parking_lot::RwLock;

    #[test]
    fn index_start_is_single_flight() {
        let status = RwLock::new(IndexJobStatus::default());
        assert_eq!(try_begin_index(&status), StartOutcome::Accepted);
        assert_eq!(try_begin_index(&status), StartOutcome::AlreadyRunning);

        status.write().running = false;
        assert_eq!(try_begin_index(&status), StartOutcome::Accepted);
    }

    #[test]
    fn begin_resets_stale_counters() {
        let status = RwLock::new(IndexJobStatus::default());
        {
            let mut guard = status.write();
            guard.processed_dirs = 42;
            guard.songs_found = 7;
            guard.last_log_line = "old".to_string();
        }
        try_begin_index(&status);
        let snapshot = status.read().clone();
        assert!(snapshot.running);
        assert_eq!(snapshot.processed_dirs, 0);
        assert_eq!(snapshot.songs_found, 0);
        assert_eq!(snapshot.last_log_line, "Indexing started.");
    }

    #[test]
    fn job_gates_are_independent() {
        let index = RwLock::new(IndexJobStatus::default());
        let enrich = RwLock::new(MetadataJobStatus::default());
        assert_eq!(try_begin_index(&index), StartOutcome::Accepted);
        assert_eq!(try_begin_enrichment(&enrich), StartOutcome::Accepted);
        assert_eq!(try_begin_enrichment(&enrich), StartOutcome::AlreadyRunning);
        assert_eq!(try_begin_index(&index), StartOutcome::AlreadyRunning);
    }
}
