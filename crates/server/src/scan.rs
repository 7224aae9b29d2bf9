use std::sync::Arc;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use library::walk::{collect_dirs, scan_dir};

use crate::config::{resolve_music_root, scan_roots};
use crate::state::{try_begin_index, AppState, StartOutcome};
use crate::themes::build_theme_set;

/// Kicks off a full rebuild in the background. Returns `AlreadyRunning`
/// without side effects when an index job is in flight.
pub fn start_index(state: AppState) -> StartOutcome {
    let outcome = try_begin_index(&state.index_status);
    if outcome == StartOutcome::Accepted {
        tokio::spawn(async move {
            run_index(state).await;
        });
    }
    outcome
}

async fn run_index(state: AppState) {
    let music_root = match resolve_music_root(&state.config_path, &state.config.music_root) {
        Some(root) => root,
        None => {
            let mut status = state.index_status.write();
            status.running = false;
            status.last_log_line = "Music root not configured.".to_string();
            return;
        }
    };

    info!("Library indexing started under {:?}", music_root);
    let roots = scan_roots(&state.config, &music_root);
    let dirs = match tokio::task::spawn_blocking(move || collect_dirs(&roots)).await {
        Ok(dirs) => dirs,
        Err(err) => {
            warn!("Directory enumeration join error: {}", err);
            Vec::new()
        }
    };

    {
        let mut status = state.index_status.write();
        status.total_dirs = dirs.len();
        status.last_log_line = format!("Found {} folders to scan.", dirs.len());
    }

    // Bounded fan-out; every worker hits the same network mount.
    let workers = state.config.scan_workers.max(1);
    let update_every = state.config.status_update_every.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));

    let mut units = FuturesUnordered::new();
    for dir in dirs {
        let semaphore = Arc::clone(&semaphore);
        let root = music_root.clone();
        units.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let result = tokio::task::spawn_blocking({
                let root = root.clone();
                let dir = dir.clone();
                move || scan_dir(&root, &dir)
            })
            .await;
            (dir, result)
        }));
    }

    let mut songs = Vec::new();
    let mut processed = 0usize;
    let mut failures = 0usize;
    while let Some(joined) = units.next().await {
        processed += 1;
        match joined {
            Ok((_, Ok(Ok(mut found)))) => songs.append(&mut found),
            Ok((dir, Ok(Err(err)))) => {
                failures += 1;
                warn!("Failed to scan {:?}: {}", dir, err);
            }
            Ok((dir, Err(err))) => {
                failures += 1;
                warn!("Scan worker for {:?} died: {}", dir, err);
            }
            Err(err) => {
                failures += 1;
                warn!("Scan unit join error: {}", err);
            }
        }
        // Coarse flushes keep the worker pool off the status lock.
        if processed % update_every == 0 {
            let mut status = state.index_status.write();
            status.processed_dirs = processed;
            status.songs_found = songs.len();
            status.last_log_line =
                format!("Scanned {} folders, {} songs so far.", processed, songs.len());
        }
    }

    let songs_total = songs.len();
    {
        let mut status = state.index_status.write();
        status.processed_dirs = processed;
        status.songs_found = songs_total;
    }

    let store = state.store.clone();
    let rebuilt = tokio::task::spawn_blocking(move || store.rebuild(songs)).await;
    let summary = match rebuilt {
        Ok(Ok(stats)) => {
            info!(
                "Indexing finished: {} songs in {} folders, {} posters carried, {} failures",
                stats.songs, processed, stats.preserved, failures
            );
            format!(
                "Indexing finished: {} songs in {} folders, {} failures.",
                stats.songs, processed, failures
            )
        }
        Ok(Err(err)) => {
            warn!("Song index rebuild failed: {}", err);
            format!("Indexing finished with an index error: {}", err)
        }
        Err(err) => {
            warn!("Song index rebuild join error: {}", err);
            format!("Indexing finished with an index error: {}", err)
        }
    };

    let themes = {
        let config = Arc::clone(&state.config);
        let root = music_root.clone();
        tokio::task::spawn_blocking(move || build_theme_set(&config, &root)).await
    };
    match themes {
        Ok(theme_set) => {
            info!(
                "Theme catalog rebuilt: {} charts, {} collections, {} artists, {} genres",
                theme_set.charts.len(),
                theme_set.collections.len(),
                theme_set.artists.len(),
                theme_set.genres.len()
            );
            *state.themes.write() = theme_set;
        }
        Err(err) => warn!("Theme catalog rebuild join error: {}", err),
    }

    let mut status = state.index_status.write();
    status.running = false;
    status.last_log_line = summary;
}
