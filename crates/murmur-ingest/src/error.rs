//! Error types for the ingestion pipeline.

use crate::store::StoreError;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Store error that was not retried (or not retryable).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The store kept failing after every retry. Fatal to the daemon.
    #[error("Store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Feed message decoding or row conversion error.
    #[error("Decode error: {0}")]
    Decode(#[from] murmur_core::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed endpoint rejected the subscription request.
    #[error("Feed returned status {status}: {body}")]
    FeedStatus { status: u16, body: String },

    /// The feed connection stayed open but sent nothing, not even keep-alives.
    #[error("Feed stalled: no data for {}s", .idle.as_secs())]
    FeedStalled { idle: std::time::Duration },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error only says the entity was already stored.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(StoreError::DuplicateKey { .. }))
    }

    /// Whether the daemon must stop because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
