use super::{write_atomic, PositionBook, PositionStore};
use crate::error::StoreError;
use std::path::PathBuf;

/// Position books as pretty-printed JSON files, one per partition:
/// `{dir}/positions_{key}.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("positions_{}.json", file_key(key)))
    }
}

/// Partition key as used in file names. Distinct keys can collide here,
/// e.g. `ema.high` and `ema_high`.
pub fn file_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl PositionStore for JsonFileStore {
    fn load(&self, key: &str) -> PositionBook {
        let path = self.path_for(key);

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(partition = key, "No open positions found, starting fresh");
                return PositionBook::new();
            }
            Err(e) => {
                tracing::warn!(
                    partition = key,
                    "Could not read {}: {}. Starting with no open positions",
                    path.display(),
                    e
                );
                return PositionBook::new();
            }
        };

        match serde_json::from_str::<PositionBook>(&contents) {
            Ok(book) => {
                tracing::info!(partition = key, open = book.len(), "Open positions loaded");
                book
            }
            Err(e) => {
                tracing::warn!(
                    partition = key,
                    "Corrupt position file {}: {}. Starting with no open positions",
                    path.display(),
                    e
                );
                PositionBook::new()
            }
        }
    }

    fn save(&self, key: &str, book: &PositionBook) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(book).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let path = self.path_for(key);
        write_atomic(&path, &json)?;

        tracing::debug!(
            partition = key,
            open = book.len(),
            "Saved positions to {}",
            path.display()
        );
        Ok(())
    }
}
