use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use common::{SongRecord, ThemeEntry};

use crate::external::url_escape;
use crate::state::{AppState, JsonResult};
use crate::utils::json_error;

#[derive(Serialize)]
pub struct ThemeView {
    pub name: String,
    pub path: String,
}

#[derive(Serialize)]
pub struct ThemesResponse {
    pub charts: Vec<ThemeView>,
    pub collections: Vec<ThemeView>,
    pub artists: Vec<ThemeView>,
    pub genres: Vec<ThemeView>,
}

#[derive(Serialize)]
pub struct SongView {
    pub name: String,
    pub artist: String,
    #[serde(rename = "albumName")]
    pub album_name: String,
    pub stream_url: String,
    pub parent_path: String,
    #[serde(rename = "metaPoster")]
    pub meta_poster: Option<String>,
}

#[derive(Serialize)]
pub struct ThemeDetailView {
    pub category_name: String,
    pub songs: Vec<SongView>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

fn theme_view(entry: &ThemeEntry) -> ThemeView {
    ThemeView {
        name: entry.name.clone(),
        path: entry.path_key.clone(),
    }
}

fn song_view(base_url: &str, song: SongRecord) -> SongView {
    let escaped: Vec<String> = song.locator.split('/').map(url_escape).collect();
    SongView {
        name: song.title,
        artist: song.artist,
        album_name: song.album,
        stream_url: format!(
            "{}/stream/{}",
            base_url.trim_end_matches('/'),
            escaped.join("/")
        ),
        parent_path: song.parent_path,
        meta_poster: song.poster_url,
    }
}

pub async fn get_themes(State(state): State<AppState>) -> Json<ThemesResponse> {
    let themes = state.themes.read().clone();
    Json(ThemesResponse {
        charts: themes.charts.iter().map(theme_view).collect(),
        collections: themes.collections.iter().map(theme_view).collect(),
        artists: themes.artists.iter().map(theme_view).collect(),
        genres: themes.genres.iter().map(theme_view).collect(),
    })
}

/// Groups the flat prefix query into categories named after the last path
/// segment, in the order the query returned the rows.
pub async fn get_theme_details(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> JsonResult<Vec<ThemeDetailView>> {
    let songs = match state.store.query_by_path_prefix(&path) {
        Ok(songs) => songs,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("index error: {}", err),
            ))
        }
    };

    let base_url = state.config.public_base_url.clone();
    let mut details: Vec<ThemeDetailView> = Vec::new();
    let mut current_parent: Option<String> = None;
    for song in songs {
        if current_parent.as_deref() != Some(song.parent_path.as_str()) {
            let category = song
                .parent_path
                .rsplit('/')
                .next()
                .unwrap_or(song.parent_path.as_str())
                .to_string();
            current_parent = Some(song.parent_path.clone());
            details.push(ThemeDetailView {
                category_name: category,
                songs: Vec::new(),
            });
        }
        if let Some(group) = details.last_mut() {
            group.songs.push(song_view(&base_url, song));
        }
    }
    Ok(Json(details))
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> JsonResult<Vec<SongView>> {
    let query = params.q.unwrap_or_default();
    let songs = match state.store.search(&query, state.config.search_limit) {
        Ok(songs) => songs,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("index error: {}", err),
            ))
        }
    };
    let base_url = state.config.public_base_url.clone();
    Ok(Json(
        songs
            .into_iter()
            .map(|song| song_view(&base_url, song))
            .collect(),
    ))
}

pub async fn top100(State(state): State<AppState>) -> JsonResult<Vec<SongView>> {
    let path_key = state.config.top_path_key.trim();
    if path_key.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let songs = match state.store.query_by_path_prefix(path_key) {
        Ok(songs) => songs,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("index error: {}", err),
            ))
        }
    };
    let base_url = state.config.public_base_url.clone();
    Ok(Json(
        songs
            .into_iter()
            .map(|song| song_view(&base_url, song))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::song_view;
    use common::SongRecord;

    #[test]
    fn stream_urls_escape_path_segments_not_separators() {
        let song = SongRecord {
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: "TOP100".to_string(),
            locator: "charts/TOP 100/03. Artist - Title.mp3".to_string(),
            parent_path: "charts/TOP 100".to_string(),
            poster_url: Some("http://img/p.jpg".to_string()),
        };
        let view = song_view("http://192.168.0.2:4444/", song);
        assert_eq!(
            view.stream_url,
            "http://192.168.0.2:4444/stream/charts/TOP%20100/03.%20Artist%20-%20Title.mp3"
        );
        assert_eq!(view.album_name, "TOP100");
        assert_eq!(view.meta_poster.as_deref(), Some("http://img/p.jpg"));
    }
}
