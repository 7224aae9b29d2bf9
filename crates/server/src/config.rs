use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use common::join_relpath;
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenreEntry {
    pub name: String,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub music_root: String,
    pub index_path: String,
    pub port: u16,
    pub public_base_url: String,
    pub charts_dir: String,
    pub collections_dir: String,
    pub artists_dir: String,
    pub genres: Vec<GenreEntry>,
    pub top_path_key: String,
    pub scan_workers: usize,
    pub status_update_every: usize,
    pub search_limit: usize,
    pub artist_sample_size: usize,
    pub audiodb_api_key: String,
    pub musicbrainz_user_agent: String,
    pub provider_timeout_secs: u64,
    pub pair_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: "".to_string(),
            index_path: "catalog.redb".to_string(),
            port: 4444,
            public_base_url: "http://127.0.0.1:4444".to_string(),
            charts_dir: "charts".to_string(),
            collections_dir: "collections".to_string(),
            artists_dir: "artists".to_string(),
            genres: vec![
                GenreEntry {
                    name: "K-Pop".to_string(),
                    path: "genres/kpop".to_string(),
                },
                GenreEntry {
                    name: "Ballad".to_string(),
                    path: "genres/ballad".to_string(),
                },
                GenreEntry {
                    name: "Hip-Hop".to_string(),
                    path: "genres/hiphop".to_string(),
                },
                GenreEntry {
                    name: "OST".to_string(),
                    path: "genres/ost".to_string(),
                },
            ],
            top_path_key: "charts/TOP100".to_string(),
            scan_workers: 12,
            status_update_every: 25,
            search_limit: 100,
            artist_sample_size: 30,
            audiodb_api_key: "".to_string(),
            musicbrainz_user_agent: "".to_string(),
            provider_timeout_secs: 5,
            pair_delay_ms: 300,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("TREMOLITE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = "catalog.redb".to_string();
        }
        if config.port == 0 {
            config.port = 4444;
        }
        if config.scan_workers == 0 {
            config.scan_workers = 12;
        }
        if config.status_update_every == 0 {
            config.status_update_every = 25;
        }
        if config.search_limit == 0 {
            config.search_limit = 100;
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_music_root(config_path: &Path, value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}

/// The directory roots a full index covers: the three discovered theme
/// family roots plus every configured genre path.
pub fn scan_roots(config: &ServerConfig, music_root: &Path) -> Vec<PathBuf> {
    let mut roots = vec![
        join_relpath(music_root, &config.charts_dir),
        join_relpath(music_root, &config.collections_dir),
        join_relpath(music_root, &config.artists_dir),
    ];
    for genre in &config.genres {
        roots.push(join_relpath(music_root, &genre.path));
    }
    roots.sort();
    roots.dedup();
    roots
}
