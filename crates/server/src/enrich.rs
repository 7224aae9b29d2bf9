use std::time::Duration;

use tracing::{info, warn};

use crate::external::{external_config, fetch_poster};
use crate::state::{try_begin_enrichment, AppState, StartOutcome};

/// Kicks off the poster sweep in the background; single-flight like the
/// index job, on its own register.
pub fn start_enrichment(state: AppState) -> StartOutcome {
    let outcome = try_begin_enrichment(&state.enrich_status);
    if outcome == StartOutcome::Accepted {
        tokio::spawn(async move {
            run_enrichment(state).await;
        });
    }
    outcome
}

/// Cooperative cancel: the sweep checks the flag between pairs, so it
/// stops at the next pair boundary with everything so far persisted.
pub fn stop_enrichment(state: &AppState) {
    let mut status = state.enrich_status.write();
    if status.running {
        status.running = false;
        status.last_log_line = "Stop requested.".to_string();
    }
}

async fn run_enrichment(state: AppState) {
    let pairs = {
        let store = state.store.clone();
        match tokio::task::spawn_blocking(move || store.pairs_missing_poster()).await {
            Ok(Ok(pairs)) => pairs,
            Ok(Err(err)) => {
                warn!("Enrichment could not read the song index: {}", err);
                finish(&state, format!("Enrichment failed to start: {}", err));
                return;
            }
            Err(err) => {
                warn!("Enrichment work set join error: {}", err);
                finish(&state, format!("Enrichment failed to start: {}", err));
                return;
            }
        }
    };

    {
        let mut status = state.enrich_status.write();
        status.total = pairs.len();
        status.last_log_line = format!("{} albums are missing a poster.", pairs.len());
    }
    info!("Poster enrichment started: {} albums to look up", pairs.len());

    let sources = external_config(&state.config);
    let delay = Duration::from_millis(state.config.pair_delay_ms);
    let mut success = 0usize;
    let mut fail = 0usize;
    let mut stopped = false;

    for (index, (artist, album)) in pairs.iter().enumerate() {
        if !state.enrich_status.read().running {
            stopped = true;
            break;
        }

        let outcome = match fetch_poster(&state.external_client, &sources, artist, album).await {
            Some(url) => {
                let store = state.store.clone();
                let write = {
                    let artist = artist.clone();
                    let album = album.clone();
                    let url = url.clone();
                    tokio::task::spawn_blocking(move || store.set_poster(&artist, &album, &url))
                        .await
                };
                match write {
                    Ok(Ok(_)) => {
                        success += 1;
                        "poster saved"
                    }
                    Ok(Err(err)) => {
                        fail += 1;
                        warn!("Failed to persist poster for {} - {}: {}", artist, album, err);
                        "index write failed"
                    }
                    Err(err) => {
                        fail += 1;
                        warn!("Poster write join error: {}", err);
                        "index write failed"
                    }
                }
            }
            None => {
                fail += 1;
                "no poster found"
            }
        };

        {
            let mut status = state.enrich_status.write();
            status.current = index + 1;
            status.success = success;
            status.fail = fail;
            status.last_log_line = format!("{} - {}: {}", artist, album, outcome);
        }

        // Provider etiquette: a fixed pause after every pair, hits and
        // misses alike.
        tokio::time::sleep(delay).await;
    }

    let line = if stopped {
        info!(
            "Poster enrichment stopped: {} fetched, {} missing so far",
            success, fail
        );
        format!(
            "Enrichment stopped: {} posters fetched, {} missing.",
            success, fail
        )
    } else {
        info!(
            "Poster enrichment finished: {} fetched, {} missing",
            success, fail
        );
        format!(
            "Enrichment finished: {} posters fetched, {} missing.",
            success, fail
        )
    };
    finish(&state, line);
}

fn finish(state: &AppState, line: String) {
    let mut status = state.enrich_status.write();
    status.running = false;
    status.last_log_line = line;
}
