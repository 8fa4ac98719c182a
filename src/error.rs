//! Error taxonomy for the daemon's core modules.
//!
//! Every fallible operation named in the component design returns one of
//! these variants. `main` and the daemon loop decide fatality; the types
//! here only describe *what* went wrong.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorpushdError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("vendor authentication failed after retries: {0}")]
    AuthFailed(String),

    #[error("transient vendor API error: {0}")]
    TransientApi(String),

    #[error("backend '{backend}' write failed: {source}")]
    BackendWrite {
        backend: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("backend '{backend}' connect failed: {source}")]
    BackendConnect {
        backend: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no backend could be connected")]
    NoBackendAvailable,

    #[error("invalid backlog string '{0}'")]
    InvalidBacklog(String),

    #[error("invalid timestamp '{0}': {1}")]
    InvalidTimestamp(String, String),
}

pub type Result<T> = std::result::Result<T, SensorpushdError>;
