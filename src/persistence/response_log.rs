use super::{lock_exclusive, write_atomic};
use crate::error::StoreError;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const FILE_PREFIX: &str = "order_responses_";

/// Append-only record of raw execution responses, partitioned by strategy
/// name. Written once per successful order placement.
pub trait ResponseLog: Send + Sync {
    fn append(&self, strategy: &str, response: &Value) -> Result<(), StoreError>;
}

/// A logged response tagged with the strategy that produced it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoggedResponse {
    pub strategy: String,
    pub response: Value,
}

/// One JSON array file per strategy: `{dir}/order_responses_{strategy}.json`.
///
/// Partitions sharing a strategy share a file, so appends and drains take
/// an exclusive lock on `{file}.lock` for the whole read-modify-write.
#[derive(Debug, Clone)]
pub struct JsonResponseLog {
    dir: PathBuf,
}

impl JsonResponseLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, strategy: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", FILE_PREFIX, strategy))
    }

    /// Entries logged for one strategy, oldest first
    pub fn entries(&self, strategy: &str) -> Vec<Value> {
        read_entries(&self.path_for(strategy))
    }

    /// Take every logged response across all strategies and remove the log
    /// files. Used to hand entries to the export job.
    pub fn drain(&self) -> Result<Vec<LoggedResponse>, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.dir.clone(),
            source,
        };

        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in read_dir {
            let path = entry.map_err(io_err)?.path();
            let strategy = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(".json"))
                .map(str::to_string);

            if let Some(strategy) = strategy {
                files.push((strategy, path));
            }
        }
        files.sort();

        let mut drained = Vec::new();
        for (strategy, path) in files {
            let _lock = lock_exclusive(&path)?;
            let entries = read_entries(&path);
            tracing::info!(strategy = %strategy, count = entries.len(), "Draining response log");

            drained.extend(entries.into_iter().map(|response| LoggedResponse {
                strategy: strategy.clone(),
                response,
            }));

            match std::fs::remove_file(&path) {
                Ok(()) => {}
                // Drained by a concurrent caller between listing and locking
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StoreError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }

        Ok(drained)
    }
}

fn read_entries(path: &Path) -> Vec<Value> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<Value>>(&contents) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Unreadable response log {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

impl ResponseLog for JsonResponseLog {
    fn append(&self, strategy: &str, response: &Value) -> Result<(), StoreError> {
        let path = self.path_for(strategy);
        let _lock = lock_exclusive(&path)?;
        let mut entries = read_entries(&path);
        entries.push(response.clone());

        let json = serde_json::to_vec_pretty(&entries).map_err(|source| StoreError::Serialize {
            key: strategy.to_string(),
            source,
        })?;
        write_atomic(&path, &json)
    }
}

/// Keeps responses in memory, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryResponseLog {
    entries: Mutex<Vec<LoggedResponse>>,
}

impl MemoryResponseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LoggedResponse> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ResponseLog for MemoryResponseLog {
    fn append(&self, strategy: &str, response: &Value) -> Result<(), StoreError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LoggedResponse {
                strategy: strategy.to_string(),
                response: response.clone(),
            });
        }
        Ok(())
    }
}
