use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Separator for composite store keys. Sorts below every printable
/// character, so composite keys order by their leading component first.
pub const KEY_SEP: char = '\x1f';

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub locator: String,
    pub parent_path: String,
    #[serde(default)]
    pub poster_url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeFamily {
    Chart,
    Collection,
    Artist,
    Genre,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub family: ThemeFamily,
    pub name: String,
    pub path_key: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ThemeSet {
    pub charts: Vec<ThemeEntry>,
    pub collections: Vec<ThemeEntry>,
    pub artists: Vec<ThemeEntry>,
    pub genres: Vec<ThemeEntry>,
}

/// Identity used for poster preservation across rebuilds. Two songs with
/// the same pair key share one poster.
pub fn pair_key(artist: &str, album: &str) -> String {
    let mut out = String::with_capacity(artist.len() + album.len() + 1);
    out.push_str(artist);
    out.push(KEY_SEP);
    out.push_str(album);
    out
}

pub fn song_key(parent_path: &str, locator: &str) -> String {
    let mut out = String::with_capacity(parent_path.len() + locator.len() + 1);
    out.push_str(parent_path);
    out.push(KEY_SEP);
    out.push_str(locator);
    out
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::{join_relpath, pair_key, relpath_from, song_key};
    use std::path::Path;

    #[test]
    fn pair_key_separates_components() {
        assert_ne!(pair_key("ab", "c"), pair_key("a", "bc"));
        assert_eq!(pair_key("A", "B"), pair_key("A", "B"));
    }

    #[test]
    fn song_keys_order_by_parent_then_locator() {
        let a = song_key("charts/2024", "charts/2024/01. A - B.mp3");
        let b = song_key("charts/2024", "charts/2024/02. C - D.mp3");
        let c = song_key("charts/2024 Hits", "charts/2024 Hits/song.mp3");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn relpath_round_trips() {
        let root = Path::new("/srv/music");
        let path = Path::new("/srv/music/charts/TOP100/song.mp3");
        let rel = relpath_from(root, path).unwrap();
        assert_eq!(rel, "charts/TOP100/song.mp3");
        assert_eq!(join_relpath(root, &rel), path);
    }

    #[test]
    fn relpath_outside_root_is_none() {
        assert!(relpath_from(Path::new("/srv/music"), Path::new("/etc/passwd")).is_none());
    }
}
