//! Per-user records and book bytes.
//!
//! ## Records
//!
//! Everything the engine remembers about a user lives in one [`UserRecord`]:
//! reading state, pacing, and running context per book, plus the
//! recommendation history. Records are read and written through a
//! [`RecordStore`]; [`Records`] layers per-user critical sections on top so a
//! load/mutate/save cycle for one user never interleaves with another cycle
//! for the same user.
//!
//! ```text
//! session A:  lock(u1) load ── mutate ── save unlock
//! session B:                                      lock(u1) load ── ...
//! session C:  lock(u2) load ── save unlock        (other user, no wait)
//! ```
//!
//! ## Book bytes
//!
//! [`BookSource`] exposes the raw uploaded file (plain text or PDF). The
//! engine never writes it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::progress::{Pacing, ReadingState, RunningContext};
use crate::{Error, Result};

/// Everything persisted for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserRecord {
    /// Books keyed by name.
    pub books: BTreeMap<String, BookRecord>,
    /// Titles already recommended to this user.
    pub recommendation_history: BTreeSet<String>,
}

/// Persisted state for one of a user's books.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookRecord {
    /// Reading progress.
    pub state: ReadingState,
    /// Pacing collected when the book was first opened.
    pub pacing: Option<Pacing>,
    /// Compressed summary of everything read so far.
    pub context: RunningContext,
}

impl UserRecord {
    /// Look up a book, failing with [`Error::NotFound`].
    pub fn book(&self, name: &str) -> Result<&BookRecord> {
        self.books
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("book '{name}'")))
    }

    /// Look up a book mutably, failing with [`Error::NotFound`].
    pub fn book_mut(&mut self, name: &str) -> Result<&mut BookRecord> {
        self.books
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("book '{name}'")))
    }
}

/// Backend that loads and saves whole user records.
pub trait RecordStore: Send + Sync {
    /// Load a record; `None` when the user has never been seen.
    fn load(&self, user: &str) -> Result<Option<UserRecord>>;

    /// Replace a user's record.
    fn save(&self, user: &str, record: &UserRecord) -> Result<()>;
}

/// A store plus per-user locks.
pub struct Records<S> {
    store: S,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: RecordStore> Records<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // Locks are dropped from the map once nobody holds or waits on them.
    fn locked<T>(&self, user: &str, section: impl FnOnce() -> T) -> T {
        let lock = self.locks.entry(user.to_string()).or_default().clone();
        let out = {
            let _guard = lock.lock();
            section()
        };
        drop(lock);
        self.locks
            .remove_if(user, |_, lock| Arc::strong_count(lock) == 1);
        out
    }

    /// Load a user's record (or a fresh one) under the user's lock.
    pub fn read(&self, user: &str) -> Result<UserRecord> {
        self.locked(user, || Ok(self.store.load(user)?.unwrap_or_default()))
    }

    /// Run load, `mutate`, save as one critical section for `user`.
    ///
    /// Nothing is saved when `mutate` fails.
    pub fn update<T>(
        &self,
        user: &str,
        mutate: impl FnOnce(&mut UserRecord) -> Result<T>,
    ) -> Result<T> {
        self.locked(user, || {
            let mut record = self.store.load(user)?.unwrap_or_default();
            let out = mutate(&mut record)?;
            self.store.save(user, &record)?;
            Ok(out)
        })
    }
}

fn check_component(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Validation(format!("invalid {kind} '{name}'")));
    }
    Ok(())
}

/// One pretty-printed JSON file per user under a root directory.
///
/// Saves go to a temporary file in the same directory which is then renamed
/// over the record, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Store records under `root`, creating it on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, user: &str) -> Result<PathBuf> {
        check_component("user id", user)?;
        Ok(self.root.join(format!("{user}.json")))
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, user: &str) -> Result<Option<UserRecord>> {
        let path = self.path(user)?;
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::Storage(format!("{}: {err}", path.display()))),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| Error::Validation(format!("record for user '{user}': {e}")))
    }

    fn save(&self, user: &str, record: &UserRecord) -> Result<()> {
        let path = self.path(user)?;
        fs::create_dir_all(&self.root)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, record)
            .map_err(|e| Error::Storage(e.to_string()))?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e.error)))?;
        tracing::debug!(user, path = %path.display(), "saved user record");
        Ok(())
    }
}

/// Records kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, user: &str) -> Result<Option<UserRecord>> {
        Ok(self.records.lock().get(user).cloned())
    }

    fn save(&self, user: &str, record: &UserRecord) -> Result<()> {
        self.records.lock().insert(user.to_string(), record.clone());
        Ok(())
    }
}

/// Read-only access to uploaded book files.
pub trait BookSource: Send + Sync {
    /// The whole file.
    fn raw_bytes(&self, user: &str, book: &str) -> Result<Vec<u8>>;

    /// File size in bytes.
    fn byte_len(&self, user: &str, book: &str) -> Result<u64>;

    /// The first `len` bytes of the file, fewer when the file is shorter.
    fn head(&self, user: &str, book: &str, len: usize) -> Result<Vec<u8>> {
        let mut bytes = self.raw_bytes(user, book)?;
        bytes.truncate(len);
        Ok(bytes)
    }
}

/// Books stored as `<root>/<user>/<book>`.
#[derive(Debug, Clone)]
pub struct FsBookSource {
    root: PathBuf,
}

impl FsBookSource {
    /// Read books from under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the library.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, user: &str, book: &str) -> Result<PathBuf> {
        check_component("user id", user)?;
        check_component("book name", book)?;
        Ok(self.root.join(user).join(book))
    }
}

fn not_found_or_storage(err: std::io::Error, user: &str, book: &str) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::NotFound(format!("book '{book}' for user '{user}'"))
    } else {
        Error::Storage(err.to_string())
    }
}

impl BookSource for FsBookSource {
    fn raw_bytes(&self, user: &str, book: &str) -> Result<Vec<u8>> {
        fs::read(self.path(user, book)?).map_err(|e| not_found_or_storage(e, user, book))
    }

    fn byte_len(&self, user: &str, book: &str) -> Result<u64> {
        fs::metadata(self.path(user, book)?)
            .map(|m| m.len())
            .map_err(|e| not_found_or_storage(e, user, book))
    }

    fn head(&self, user: &str, book: &str, len: usize) -> Result<Vec<u8>> {
        let file = fs::File::open(self.path(user, book)?)
            .map_err(|e| not_found_or_storage(e, user, book))?;
        let mut bytes = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Books held in memory, keyed by `(user, book)`.
#[derive(Debug, Default)]
pub struct MemoryBookSource {
    books: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBookSource {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a book.
    pub fn insert(&self, user: &str, book: &str, bytes: impl Into<Vec<u8>>) {
        self.books
            .lock()
            .insert((user.to_string(), book.to_string()), bytes.into());
    }
}

impl BookSource for MemoryBookSource {
    fn raw_bytes(&self, user: &str, book: &str) -> Result<Vec<u8>> {
        self.books
            .lock()
            .get(&(user.to_string(), book.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("book '{book}' for user '{user}'")))
    }

    fn byte_len(&self, user: &str, book: &str) -> Result<u64> {
        self.raw_bytes(user, book).map(|b| b.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("42").unwrap().is_none());

        let mut record = UserRecord::default();
        record.books.insert("moby.txt".into(), BookRecord::default());
        record.recommendation_history.insert("Dune".into());
        store.save("42", &record).unwrap();

        assert_eq!(store.load("42").unwrap(), Some(record));
    }

    #[test]
    fn test_json_store_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("7.json"), r#"{"books": {}, "prefs": 1}"#).unwrap();
        let err = JsonFileStore::new(dir.path()).load("7").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_json_store_rejects_path_user_ids() {
        let store = JsonFileStore::new("/tmp");
        assert!(matches!(store.load("../etc"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_failed_update_is_not_saved() {
        let records = Records::new(MemoryStore::new());
        let out: Result<()> = records.update("1", |record| {
            record.recommendation_history.insert("X".into());
            Err(Error::Validation("nope".into()))
        });
        assert!(out.is_err());
        assert!(records.store().load("1").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_writes() {
        let records = Arc::new(Records::new(MemoryStore::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let records = Arc::clone(&records);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        records
                            .update("u", |r| {
                                r.recommendation_history.insert(format!("{i}-{j}"));
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(records.read("u").unwrap().recommendation_history.len(), 200);
        assert!(records.locks.is_empty());
    }

    #[test]
    fn test_user_locks_are_released() {
        let records = Records::new(MemoryStore::new());
        for user in ["a", "b", "c"] {
            records.update(user, |_| Ok(())).unwrap();
            records.read(user).unwrap();
        }
        let _ = records.update("d", |_| Err::<(), _>(Error::Validation("nope".into())));
        assert!(records.locks.is_empty());
    }

    #[test]
    fn test_fs_book_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsBookSource::new(dir.path());
        assert!(matches!(source.raw_bytes("1", "none.txt"), Err(Error::NotFound(_))));

        fs::create_dir_all(dir.path().join("1")).unwrap();
        fs::write(dir.path().join("1").join("a.txt"), b"hello").unwrap();
        assert_eq!(source.byte_len("1", "a.txt").unwrap(), 5);
        assert_eq!(source.head("1", "a.txt", 3).unwrap(), b"hel");
        assert_eq!(source.head("1", "a.txt", 64).unwrap(), b"hello");
    }
}
