// Durable state: open positions per partition and the order response log
pub mod json_file;
pub mod response_log;

pub use json_file::{file_key, JsonFileStore};
pub use response_log::{JsonResponseLog, LoggedResponse, MemoryResponseLog, ResponseLog};

use crate::error::StoreError;
use crate::models::PositionType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Open position for one market.
///
/// `base_position_size` is fixed at entry and reused for the exit order so
/// the exit always closes exactly what the entry opened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    pub position_type: PositionType,
    pub base_position_size: f64,
}

/// Market -> open position, at most one record per market.
///
/// Serializes as a flat JSON object keyed by market.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PositionBook {
    positions: BTreeMap<String, PositionRecord>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, market: &str) -> Option<&PositionRecord> {
        self.positions.get(market)
    }

    pub fn has_open_position(&self, market: &str) -> bool {
        self.positions.contains_key(market)
    }

    /// Record a new position. Refuses (returns false) if the market already
    /// has one.
    pub fn open(&mut self, market: &str, record: PositionRecord) -> bool {
        if self.positions.contains_key(market) {
            tracing::warn!(market, "Refusing second open position");
            return false;
        }
        self.positions.insert(market.to_string(), record);
        true
    }

    pub fn close(&mut self, market: &str) -> Option<PositionRecord> {
        self.positions.remove(market)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PositionRecord)> {
        self.positions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Keyed storage for position books, one book per partition.
///
/// `load` never fails: a missing or unreadable book is an empty one.
/// `save` replaces the whole book and must be surfaced when it fails.
pub trait PositionStore: Send + Sync {
    fn load(&self, key: &str) -> PositionBook;
    fn save(&self, key: &str, book: &PositionBook) -> Result<(), StoreError>;
}

/// In-process store, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    books: Mutex<HashMap<String, PositionBook>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryStore {
    fn load(&self, key: &str) -> PositionBook {
        self.books
            .lock()
            .map(|books| books.get(key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn save(&self, key: &str, book: &PositionBook) -> Result<(), StoreError> {
        if let Ok(mut books) = self.books.lock() {
            books.insert(key.to_string(), book.clone());
        }
        Ok(())
    }
}

/// Write `bytes` to a uniquely named temp file in the same directory and
/// rename it over `path`, so readers see either the old content or the new,
/// never a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(io_err)?;
            parent
        }
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}

/// Hold an exclusive advisory lock on `{path}.lock` until the returned file
/// is dropped. Serializes read-modify-write cycles across threads and
/// processes.
pub(crate) fn lock_exclusive(path: &Path) -> Result<File, StoreError> {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);

    let io_err = |source| StoreError::Io {
        path: lock_path.clone(),
        source,
    };

    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(io_err)?;
    file.lock().map_err(io_err)?;
    Ok(file)
}
