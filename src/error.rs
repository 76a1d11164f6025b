//! Crate-wide error types.

use std::time::Duration;

/// Error type for all search engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The query itself is unusable (empty text, k = 0). Never retried.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// An embedding provider failed or produced a malformed vector.
    #[error("embedding provider '{provider}' failed: {reason}")]
    Embedding { provider: String, reason: String },

    /// An embedding provider exceeded its time bound.
    #[error("embedding provider '{provider}' timed out after {}ms", .timeout.as_millis())]
    EmbeddingTimeout { provider: String, timeout: Duration },

    /// The retrieval store was unreachable or rejected the call.
    #[error("retrieval store failed: {0}")]
    Retrieval(String),

    /// The retrieval store exceeded its time bound.
    #[error("retrieval store timed out after {}ms", .0.as_millis())]
    RetrievalTimeout(Duration),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Ingest input could not be parsed.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// IO error (config files, ingest input).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for all search engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error identifies bad caller input rather than a
    /// collaborator failure.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Error::InvalidQuery(_))
    }

    /// Whether this error is a timeout on an external collaborator.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingTimeout { .. } | Error::RetrievalTimeout(_)
        )
    }
}
