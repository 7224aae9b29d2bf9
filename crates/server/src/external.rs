use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::config::ServerConfig;

#[derive(Clone, Copy, Debug)]
pub enum Provider {
    TheAudioDb,
    CoverArtArchive,
}

#[derive(Clone, Debug)]
pub struct ExternalSource {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub user_agent: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct ExternalConfig {
    pub sources: Vec<ExternalSource>,
}

/// Builds the provider list in priority order. A provider without its
/// credential placeholder is left out and behaves as "no result".
pub fn external_config(config: &ServerConfig) -> ExternalConfig {
    let timeout = Duration::from_secs(config.provider_timeout_secs.max(1));
    let mut sources = Vec::new();

    let api_key = config.audiodb_api_key.trim();
    if !api_key.is_empty() {
        sources.push(ExternalSource {
            provider: Provider::TheAudioDb,
            api_key: Some(api_key.to_string()),
            user_agent: None,
            timeout,
        });
    }

    let user_agent = config.musicbrainz_user_agent.trim();
    if !user_agent.is_empty() {
        sources.push(ExternalSource {
            provider: Provider::CoverArtArchive,
            api_key: None,
            user_agent: Some(user_agent.to_string()),
            timeout,
        });
    }

    ExternalConfig { sources }
}

/// Queries the providers in priority order; the first poster wins. Any
/// failure (network error, timeout, bad status, unparsable payload) is
/// treated as "no result" for that provider, never a hard error.
pub async fn fetch_poster(
    client: &Client,
    config: &ExternalConfig,
    artist: &str,
    album: &str,
) -> Option<String> {
    for source in &config.sources {
        let result = match source.provider {
            Provider::TheAudioDb => fetch_theaudiodb_poster(client, source, artist, album).await,
            Provider::CoverArtArchive => {
                fetch_coverartarchive_poster(client, source, artist, album).await
            }
        };
        match result {
            Ok(Some(url)) => return Some(url),
            Ok(None) => {}
            Err(err) => {
                warn!("Poster lookup failed for {} - {}: {}", artist, album, err);
            }
        }
    }
    None
}

#[derive(Deserialize)]
struct TheAudioDbAlbumResponse {
    album: Option<Vec<TheAudioDbAlbum>>,
}

#[derive(Deserialize)]
struct TheAudioDbAlbum {
    #[serde(rename = "strAlbumThumb")]
    thumb: Option<String>,
    #[serde(rename = "strAlbumThumbHQ")]
    thumb_hq: Option<String>,
}

async fn fetch_theaudiodb_poster(
    client: &Client,
    source: &ExternalSource,
    artist: &str,
    album: &str,
) -> Result<Option<String>, String> {
    let api_key = source.api_key.as_deref().unwrap_or("").trim();
    if api_key.is_empty() {
        return Ok(None);
    }
    let url = format!(
        "https://www.theaudiodb.com/api/v1/json/{}/searchalbum.php?s={}&a={}",
        api_key,
        url_escape(artist),
        url_escape(album)
    );
    let response = client
        .get(&url)
        .timeout(source.timeout)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    if !response.status().is_success() {
        return Err(format!("http {}", response.status()));
    }
    let payload = response
        .json::<TheAudioDbAlbumResponse>()
        .await
        .map_err(|err| err.to_string())?;
    Ok(audiodb_poster(payload))
}

fn audiodb_poster(payload: TheAudioDbAlbumResponse) -> Option<String> {
    let album = payload.album.and_then(|mut items| items.pop())?;
    clean_url(album.thumb_hq).or_else(|| clean_url(album.thumb))
}

#[derive(Deserialize)]
struct MusicBrainzReleaseGroupResponse {
    #[serde(rename = "release-groups")]
    release_groups: Option<Vec<MusicBrainzReleaseGroup>>,
}

#[derive(Deserialize)]
struct MusicBrainzReleaseGroup {
    id: Option<String>,
}

async fn fetch_coverartarchive_poster(
    client: &Client,
    source: &ExternalSource,
    artist: &str,
    album: &str,
) -> Result<Option<String>, String> {
    let user_agent = source.user_agent.as_deref().unwrap_or("").trim();
    if user_agent.is_empty() {
        return Ok(None);
    }
    let query = format!("artist:{} releasegroup:{}", artist, album);
    let url = format!(
        "https://musicbrainz.org/ws/2/release-group/?query={}&fmt=json&limit=1",
        url_escape(&query)
    );
    let response = client
        .get(&url)
        .timeout(source.timeout)
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    if !response.status().is_success() {
        return Err(format!("http {}", response.status()));
    }
    let payload = response
        .json::<MusicBrainzReleaseGroupResponse>()
        .await
        .map_err(|err| err.to_string())?;
    Ok(caa_front_url(payload))
}

fn caa_front_url(payload: MusicBrainzReleaseGroupResponse) -> Option<String> {
    let group = payload.release_groups.and_then(|mut items| items.pop())?;
    let id = group.id?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    Some(format!(
        "https://coverartarchive.org/release-group/{}/front",
        id
    ))
}

fn clean_url(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn url_escape(input: &str) -> String {
    let mut out = String::new();
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
