use std::fs;
use std::path::Path;

use common::{join_relpath, relpath_from, ThemeEntry, ThemeFamily, ThemeSet};
use library::walk::discover_artist_dirs;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Rebuilds all four theme families. Chart and collection themes are the
/// sorted immediate subdirectories of their roots, genres come from the
/// fixed config mapping, and artists are a fresh random sample of the
/// leaf-pruned discovery on every rebuild.
pub fn build_theme_set(config: &ServerConfig, music_root: &Path) -> ThemeSet {
    let charts = subdir_themes(ThemeFamily::Chart, music_root, &config.charts_dir);
    let collections = subdir_themes(ThemeFamily::Collection, music_root, &config.collections_dir);

    let artist_root = join_relpath(music_root, &config.artists_dir);
    let mut discovered = Vec::new();
    for dir in discover_artist_dirs(&artist_root) {
        let path_key = match relpath_from(music_root, &dir) {
            Some(path_key) => path_key,
            None => continue,
        };
        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path_key.clone());
        discovered.push(ThemeEntry {
            family: ThemeFamily::Artist,
            name,
            path_key,
        });
    }
    let artists = sample_artists(&discovered, config.artist_sample_size);
    info!(
        "Discovered {} artist folders, sampled {}",
        discovered.len(),
        artists.len()
    );

    let genres = config
        .genres
        .iter()
        .map(|genre| ThemeEntry {
            family: ThemeFamily::Genre,
            name: genre.name.clone(),
            path_key: genre.path.clone(),
        })
        .collect();

    ThemeSet {
        charts,
        collections,
        artists,
        genres,
    }
}

fn subdir_themes(family: ThemeFamily, music_root: &Path, dir: &str) -> Vec<ThemeEntry> {
    let root = join_relpath(music_root, dir);
    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Theme root {:?} unreadable: {}", root, err);
            return Vec::new();
        }
    };

    let mut themes = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let path_key = match relpath_from(music_root, &path) {
            Some(path_key) => path_key,
            None => continue,
        };
        themes.push(ThemeEntry {
            family,
            name: entry.file_name().to_string_lossy().to_string(),
            path_key,
        });
    }
    themes.sort_by(|a, b| a.name.cmp(&b.name));
    themes
}

/// Uniform sample without replacement, redrawn on every rebuild.
fn sample_artists(entries: &[ThemeEntry], sample_size: usize) -> Vec<ThemeEntry> {
    let amount = entries.len().min(sample_size);
    let mut rng = rand::rng();
    entries.choose_multiple(&mut rng, amount).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::{build_theme_set, sample_artists, subdir_themes};
    use crate::config::ServerConfig;
    use common::{ThemeEntry, ThemeFamily};
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    fn entries(n: usize) -> Vec<ThemeEntry> {
        (0..n)
            .map(|i| ThemeEntry {
                family: ThemeFamily::Artist,
                name: format!("Artist {}", i),
                path_key: format!("artists/a/Artist {}", i),
            })
            .collect()
    }

    #[test]
    fn sample_is_bounded_and_distinct() {
        assert!(sample_artists(&entries(0), 30).is_empty());
        assert_eq!(sample_artists(&entries(5), 30).len(), 5);

        let sample = sample_artists(&entries(100), 30);
        assert_eq!(sample.len(), 30);
        let names: HashSet<String> = sample.into_iter().map(|entry| entry.name).collect();
        assert_eq!(names.len(), 30);
    }

    #[test]
    fn chart_themes_are_sorted_subdirectories() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("charts/Weekly")).unwrap();
        fs::create_dir_all(root.join("charts/2020s")).unwrap();
        fs::write(root.join("charts/readme.txt"), b"").unwrap();

        let themes = subdir_themes(ThemeFamily::Chart, root, "charts");
        let names: Vec<&str> = themes.iter().map(|theme| theme.name.as_str()).collect();
        assert_eq!(names, vec!["2020s", "Weekly"]);
        assert_eq!(themes[0].path_key, "charts/2020s");
    }

    #[test]
    fn genres_come_from_config_not_discovery() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::default();
        let set = build_theme_set(&config, dir.path());
        assert_eq!(set.genres.len(), config.genres.len());
        assert_eq!(set.genres[0].name, "K-Pop");
        assert_eq!(set.genres[0].path_key, "genres/kpop");
        assert!(set.charts.is_empty());
        assert!(set.artists.is_empty());
    }
}
