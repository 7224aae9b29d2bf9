mod api;
mod config;
mod enrich;
mod external;
mod scan;
mod state;
mod themes;
mod utils;

use std::sync::Arc;

use axum::Router;
use parking_lot::RwLock;
use reqwest::Client;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use api::api_router;
use common::ThemeSet;
use config::{config_path_from_env, load_or_create_config, resolve_music_root, resolve_path};
use library::SongStore;
use state::{AppState, IndexJobStatus, MetadataJobStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let index_path_value = config.index_path.trim();
    let index_path_value = if index_path_value.is_empty() {
        "catalog.redb"
    } else {
        index_path_value
    };
    let index_path = resolve_path(&config_path, index_path_value);
    let store = SongStore::open(&index_path)?;
    info!("Song index at {:?}", index_path);

    let external_client = Client::builder().user_agent("tremolite/0.1").build()?;

    let port = if config.port == 0 { 4444 } else { config.port };
    let bind_addr = format!("0.0.0.0:{}", port);

    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        config_path,
        themes: Arc::new(RwLock::new(ThemeSet::default())),
        index_status: Arc::new(RwLock::new(IndexJobStatus::default())),
        enrich_status: Arc::new(RwLock::new(MetadataJobStatus::default())),
        external_client,
    };

    match resolve_music_root(&state.config_path, &config.music_root) {
        Some(music_root) if music_root.exists() => {
            scan::start_index(state.clone());
        }
        Some(music_root) => {
            warn!(
                "Music root {:?} not found; indexing waits for a manual trigger",
                music_root
            );
        }
        None => {
            info!("Music root not configured yet; set music_root in the config.");
        }
    }

    let app = Router::new()
        .merge(api_router(state.clone()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // An enrichment sweep in flight stops at the next pair boundary.
    enrich::stop_enrichment(&state);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
