use thiserror::Error;

/// Why a single status probe produced no reading. Never leaves the prober.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("status query timed out")]
    Timeout,

    #[error("SRV lookup failed: {0}")]
    Resolve(String),

    #[error("network failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("malformed status payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("status payload has no usable players.online field")]
    MissingPlayerCount,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state encoding: {0}")]
    Serde(#[from] serde_json::Error),
}
