use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{pair_key, song_key, SongRecord, KEY_SEP};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod walk;

const SONGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("songs");
const PAIR_SONGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pair_songs");

/// Durable song index. Rows are keyed by `parent_path \x1f locator`, so a
/// range scan doubles as the prefix query in `(parent_path, locator)`
/// order. `pair_songs` maps `artist \x1f album \x1f song_key` back to row
/// keys for per-pair poster writes.
#[derive(Clone)]
pub struct SongStore {
    db: Arc<Database>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RebuildStats {
    pub songs: usize,
    pub preserved: usize,
}

impl SongStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        Ok(Self { db: Arc::new(db) })
    }

    /// Full replace of the song table, carrying forward every poster whose
    /// `(artist, album)` pair recurs in the new rows. Runs in one write
    /// transaction; readers see the old table or the new one, nothing in
    /// between. Pairs that do not recur vanish along with their posters.
    pub fn rebuild(&self, new_songs: Vec<SongRecord>) -> Result<RebuildStats, StoreError> {
        let write_txn = self.db.begin_write()?;

        let preserved: HashMap<String, String> = {
            let mut preserved = HashMap::new();
            let table = write_txn.open_table(SONGS_TABLE)?;
            for entry in table.iter()? {
                let entry = entry?;
                let song: SongRecord = decode_value(entry.1.value())?;
                if let Some(url) = song.poster_url {
                    preserved.insert(pair_key(&song.artist, &song.album), url);
                }
            }
            preserved
        };

        clear_table(&write_txn, SONGS_TABLE)?;
        clear_table(&write_txn, PAIR_SONGS_TABLE)?;

        let stats = {
            let mut songs_table = write_txn.open_table(SONGS_TABLE)?;
            let mut pair_table = write_txn.open_table(PAIR_SONGS_TABLE)?;

            let mut count = 0usize;
            let mut merged = 0usize;
            for mut song in new_songs {
                let pair = pair_key(&song.artist, &song.album);
                song.poster_url = preserved.get(&pair).cloned();
                if song.poster_url.is_some() {
                    merged += 1;
                }

                let key = song_key(&song.parent_path, &song.locator);
                let bytes = encode_value(&song)?;
                let prev = songs_table.insert(key.as_str(), bytes.as_slice())?;
                if prev.is_none() {
                    count += 1;
                }

                let index_key = pair_member_key(&pair, &key);
                pair_table.insert(index_key.as_str(), key.as_bytes())?;
            }
            RebuildStats {
                songs: count,
                preserved: merged,
            }
        };

        write_txn.commit()?;
        info!(
            "Song index rebuilt: {} songs, {} posters carried forward",
            stats.songs, stats.preserved
        );
        Ok(stats)
    }

    /// All songs whose `parent_path` starts with `prefix`, ordered by
    /// `(parent_path, locator)`.
    pub fn query_by_path_prefix(&self, prefix: &str) -> Result<Vec<SongRecord>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut end = prefix.to_string();
        end.push('\u{10ffff}');
        let mut songs = Vec::new();
        for entry in table.range(prefix..end.as_str())? {
            let entry = entry?;
            songs.push(decode_value(entry.1.value())?);
        }
        Ok(songs)
    }

    /// Case-insensitive containment match against title, artist and album.
    /// A blank query matches nothing rather than everything.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SongRecord>, StoreError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut songs = Vec::new();
        for entry in table.iter()? {
            if songs.len() >= limit {
                break;
            }
            let entry = entry?;
            let song: SongRecord = decode_value(entry.1.value())?;
            if song.title.to_lowercase().contains(&query)
                || song.artist.to_lowercase().contains(&query)
                || song.album.to_lowercase().contains(&query)
            {
                songs.push(song);
            }
        }
        Ok(songs)
    }

    /// Work set for the enrichment job: every distinct `(artist, album)`
    /// pair with no poster, in pair-key order.
    pub fn pairs_missing_poster(&self) -> Result<Vec<(String, String)>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut pairs: BTreeMap<String, (String, String)> = BTreeMap::new();
        for entry in table.iter()? {
            let entry = entry?;
            let song: SongRecord = decode_value(entry.1.value())?;
            if song.poster_url.is_none() {
                pairs
                    .entry(pair_key(&song.artist, &song.album))
                    .or_insert((song.artist, song.album));
            }
        }
        Ok(pairs.into_values().collect())
    }

    /// Write-through poster update for every row of one pair.
    pub fn set_poster(
        &self,
        artist: &str,
        album: &str,
        poster_url: &str,
    ) -> Result<usize, StoreError> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let pair = pair_key(artist, album);
            let mut prefix = pair.clone();
            prefix.push(KEY_SEP);
            let mut end = prefix.clone();
            end.push('\u{10ffff}');

            let song_keys: Vec<String> = {
                let pair_table = write_txn.open_table(PAIR_SONGS_TABLE)?;
                let mut keys = Vec::new();
                for entry in pair_table.range(prefix.as_str()..end.as_str())? {
                    let entry = entry?;
                    keys.push(String::from_utf8_lossy(entry.1.value()).to_string());
                }
                keys
            };

            let mut songs_table = write_txn.open_table(SONGS_TABLE)?;
            let mut updated = 0usize;
            for key in song_keys {
                let mut song: SongRecord = match songs_table.get(key.as_str())? {
                    Some(value) => decode_value(value.value())?,
                    None => continue,
                };
                if song.poster_url.as_deref() == Some(poster_url) {
                    continue;
                }
                song.poster_url = Some(poster_url.to_string());
                let bytes = encode_value(&song)?;
                songs_table.insert(key.as_str(), bytes.as_slice())?;
                updated += 1;
            }
            updated
        };
        write_txn.commit()?;
        Ok(updated)
    }

    pub fn song_count(&self) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut count = 0usize;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

fn pair_member_key(pair: &str, song_key: &str) -> String {
    let mut out = String::with_capacity(pair.len() + song_key.len() + 1);
    out.push_str(pair);
    out.push(KEY_SEP);
    out.push_str(song_key);
    out
}

fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), StoreError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {}", err),
            StoreError::Redb(err) => write!(f, "db error: {}", err),
            StoreError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Redb(err)
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<CommitError> for StoreError {
    fn from(err: CommitError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        StoreError::Bincode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::SongStore;
    use common::SongRecord;
    use tempfile::tempdir;

    fn song(artist: &str, album: &str, parent: &str, file: &str) -> SongRecord {
        SongRecord {
            title: file.trim_end_matches(".mp3").to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            locator: format!("{}/{}", parent, file),
            parent_path: parent.to_string(),
            poster_url: None,
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> SongStore {
        SongStore::open(&dir.path().join("catalog.redb")).unwrap()
    }

    #[test]
    fn rebuild_preserves_posters_by_pair() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .rebuild(vec![song("A", "B", "charts/2024", "01. A - x.mp3")])
            .unwrap();
        store.set_poster("A", "B", "http://img/x.jpg").unwrap();

        // Same pair, different locator: the poster must carry forward.
        let stats = store
            .rebuild(vec![song("A", "B", "collections/best", "07. A - y.mp3")])
            .unwrap();
        assert_eq!(stats.preserved, 1);

        let rows = store.query_by_path_prefix("collections/best").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].poster_url.as_deref(), Some("http://img/x.jpg"));

        // The old row itself is gone.
        assert!(store.query_by_path_prefix("charts/2024").unwrap().is_empty());
    }

    #[test]
    fn rebuild_drops_posters_of_vanished_pairs() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .rebuild(vec![song("Gone", "Album", "charts/old", "01. Gone - z.mp3")])
            .unwrap();
        store.set_poster("Gone", "Album", "http://img/z.jpg").unwrap();

        store
            .rebuild(vec![song("Other", "Album", "charts/new", "01. Other - w.mp3")])
            .unwrap();

        // No orphan poster: reintroducing the pair starts from scratch.
        let stats = store
            .rebuild(vec![
                song("Other", "Album", "charts/new", "01. Other - w.mp3"),
                song("Gone", "Album", "charts/old", "01. Gone - z.mp3"),
            ])
            .unwrap();
        assert_eq!(stats.preserved, 0);
        let rows = store.query_by_path_prefix("charts/old").unwrap();
        assert_eq!(rows[0].poster_url, None);
    }

    #[test]
    fn poster_applies_to_every_row_of_the_pair() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .rebuild(vec![
                song("A", "B", "charts/x", "01. A - one.mp3"),
                song("A", "B", "collections/y", "02. A - two.mp3"),
                song("C", "D", "charts/x", "03. C - three.mp3"),
            ])
            .unwrap();

        let updated = store.set_poster("A", "B", "http://img/p.jpg").unwrap();
        assert_eq!(updated, 2);

        let rows = store.query_by_path_prefix("charts/x").unwrap();
        let by_artist = |name: &str| {
            rows.iter()
                .find(|song| song.artist == name)
                .cloned()
                .unwrap()
        };
        assert_eq!(by_artist("A").poster_url.as_deref(), Some("http://img/p.jpg"));
        assert_eq!(by_artist("C").poster_url, None);
    }

    #[test]
    fn prefix_query_orders_by_parent_then_locator() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .rebuild(vec![
                song("A", "B", "charts/2024 Hits", "01. A - a.mp3"),
                song("A", "B", "charts/2024", "02. A - b.mp3"),
                song("A", "B", "charts/2024", "01. A - a.mp3"),
                song("A", "B", "chartsextra", "01. A - a.mp3"),
            ])
            .unwrap();

        let rows = store.query_by_path_prefix("charts/2024").unwrap();
        let keys: Vec<(String, String)> = rows
            .into_iter()
            .map(|song| (song.parent_path, song.locator))
            .collect();
        assert_eq!(
            keys,
            vec![
                (
                    "charts/2024".to_string(),
                    "charts/2024/01. A - a.mp3".to_string()
                ),
                (
                    "charts/2024".to_string(),
                    "charts/2024/02. A - b.mp3".to_string()
                ),
                (
                    "charts/2024 Hits".to_string(),
                    "charts/2024 Hits/01. A - a.mp3".to_string()
                ),
            ]
        );
    }

    #[test]
    fn search_is_capped_and_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut songs = Vec::new();
        for i in 0..120 {
            songs.push(song(
                "Common Artist",
                "Album",
                "charts/big",
                &format!("{:03}. Common Artist - Track {}.mp3", i, i),
            ));
        }
        store.rebuild(songs).unwrap();

        assert!(store.search("", 100).unwrap().is_empty());
        assert!(store.search("   ", 100).unwrap().is_empty());
        assert_eq!(store.search("COMMON artist", 100).unwrap().len(), 100);
        assert!(store.search("no such thing", 100).unwrap().is_empty());
    }

    #[test]
    fn missing_poster_pairs_are_distinct() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .rebuild(vec![
                song("A", "B", "charts/x", "01. A - one.mp3"),
                song("A", "B", "charts/y", "01. A - one.mp3"),
                song("C", "D", "charts/x", "02. C - two.mp3"),
            ])
            .unwrap();
        store.set_poster("C", "D", "http://img/c.jpg").unwrap();

        let pairs = store.pairs_missing_poster().unwrap();
        assert_eq!(pairs, vec![("A".to_string(), "B".to_string())]);
    }

    #[test]
    fn rebuild_is_atomic_for_concurrent_readers() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let old_set: Vec<SongRecord> = (0..50)
            .map(|i| song("A", "B", "old", &format!("{:02}. A - t{}.mp3", i, i)))
            .collect();
        let new_set: Vec<SongRecord> = (0..50)
            .map(|i| song("C", "D", "new", &format!("{:02}. C - t{}.mp3", i, i)))
            .collect();
        store.rebuild(old_set).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let store = store.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let rows = store.query_by_path_prefix("").unwrap();
                    // Never a partial table: all old rows or all new rows.
                    assert_eq!(rows.len(), 50);
                    let all_old = rows.iter().all(|row| row.parent_path == "old");
                    let all_new = rows.iter().all(|row| row.parent_path == "new");
                    assert!(all_old || all_new);
                }
            })
        };

        store.rebuild(new_set).unwrap();
        stop.store(true, Ordering::Relaxed);
        reader.join().unwrap();

        let rows = store.query_by_path_prefix("new").unwrap();
        assert_eq!(rows.len(), 50);
    }

    #[test]
    fn empty_store_queries_are_empty() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        assert!(store.query_by_path_prefix("anything").unwrap().is_empty());
        assert!(store.search("anything", 100).unwrap().is_empty());
        assert!(store.pairs_missing_poster().unwrap().is_empty());
        assert_eq!(store.song_count().unwrap(), 0);
    }
}
