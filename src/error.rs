use std::path::PathBuf;

/// Failure to persist a position book. Fatal for the cycle that hit it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize positions for partition {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single order placement. Isolated to the market that issued it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("order rejected with code {code}: {msg}")]
    Rejected { code: String, msg: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode gateway response: {0}")]
    Decode(String),
    #[error("could not sign request: {0}")]
    Signing(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("market data request failed: {0}")]
    Transport(String),
    #[error("market data rejected with code {code}: {msg}")]
    Rejected { code: String, msg: String },
    #[error("malformed candle: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("position state for partition {key} could not be saved: {source}")]
    Persistence {
        key: String,
        #[source]
        source: StoreError,
    },
}
