use std::path::Path;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "dsf"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub artist: String,
}

pub fn is_audio_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Title/artist heuristics over a bare file name. The library carries no
/// tag data, so the naming convention `NN. Artist - Title.ext` is all
/// there is; anything that does not match degrades to the sentinel
/// artist instead of failing.
pub fn parse_file_name(file_name: &str) -> ParsedName {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());

    match stem.split_once(" - ") {
        Some((prefix, title)) => {
            let artist = match prefix.rfind(". ") {
                Some(idx) => &prefix[idx + 2..],
                None => prefix,
            };
            let artist = artist.trim();
            ParsedName {
                title: title.trim().to_string(),
                artist: if artist.is_empty() {
                    UNKNOWN_ARTIST.to_string()
                } else {
                    artist.to_string()
                },
            }
        }
        None => ParsedName {
            title: stem.trim().to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
        },
    }
}
