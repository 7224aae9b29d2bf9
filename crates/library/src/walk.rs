use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::{relpath_from, SongRecord};
use metadata::{is_audio_file, parse_file_name};
use tracing::warn;
use walkdir::WalkDir;

/// One traversal for both enumeration modes. `descend` sees every visited
/// directory and decides whether its children are walked; visited
/// directories come back in traversal order.
pub fn walk_dirs<F>(root: &Path, mut descend: F) -> Vec<PathBuf>
where
    F: FnMut(&Path) -> bool,
{
    let mut dirs = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Walk error under {:?}: {}", root, err);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path().to_path_buf();
        let go_deeper = descend(&path);
        dirs.push(path);
        if !go_deeper {
            walker.skip_current_dir();
        }
    }
    dirs
}

/// Every directory under every root, for bulk indexing. Missing roots are
/// logged and skipped.
pub fn collect_dirs(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for root in roots {
        if !root.exists() {
            warn!("Scan root {:?} does not exist; skipping", root);
            continue;
        }
        dirs.extend(walk_dirs(root, |_| true));
    }
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Leaf-pruned discovery for artist themes: the first directory on each
/// branch that directly contains audio is taken as an artist folder and
/// nothing below it is visited.
pub fn discover_artist_dirs(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        warn!("Artist root {:?} does not exist; skipping", root);
        return Vec::new();
    }
    let mut found = Vec::new();
    walk_dirs(root, |dir| {
        if dir_contains_audio(dir) {
            found.push(dir.to_path_buf());
            false
        } else {
            true
        }
    });
    found
}

fn dir_contains_audio(dir: &Path) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && is_audio_file(&path) {
            return true;
        }
    }
    false
}

/// Non-recursive scan of one directory: the unit of worker-pool work. An
/// unreadable directory surfaces as the error for the coordinator to count.
pub fn scan_dir(library_root: &Path, dir: &Path) -> io::Result<Vec<SongRecord>> {
    let parent_path = relpath_from(library_root, dir).unwrap_or_default();
    let album = dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| parent_path.clone());

    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_audio_file(&path) {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();

    let mut songs = Vec::with_capacity(names.len());
    for name in names {
        let parsed = parse_file_name(&name);
        let locator = if parent_path.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", parent_path, name)
        };
        songs.push(SongRecord {
            title: parsed.title,
            artist: parsed.artist,
            album: album.clone(),
            locator,
            parent_path: parent_path.clone(),
            poster_url: None,
        });
    }
    Ok(songs)
}
