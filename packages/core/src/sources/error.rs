//! Error types for data sources, their configuration and the record store.

use std::path::PathBuf;

use thiserror::Error;

/// Message used when a provider answers successfully but carries no records.
pub const NO_DATA_MESSAGE: &str = "Body contains no data.";

/// Per-endpoint failures delivered through the collect result channel.
///
/// None of these halt polling: they are scoped to one endpoint's fetch and
/// the harvester logs them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Data source responded with status code {status}")]
    Status { status: u16 },

    /// Error reported inside an otherwise successful response body.
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// The call nominally succeeded but the expected data field is absent.
    #[error("{message}")]
    NoData { message: String },

    #[error("Malformed payload: {message}")]
    Malformed { message: String },

    #[error("Mapping error: {message}")]
    Mapping { message: String },
}

impl SourceError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::Timeout {
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { message: message.into() }
    }

    pub fn no_data() -> Self {
        Self::NoData { message: NO_DATA_MESSAGE.to_string() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }

    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping { message: message.into() }
    }

    /// `true` for "the call succeeded but contained nothing usable".
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Status { .. } => "status",
            Self::Provider { .. } => "provider",
            Self::NoData { .. } => "no_data",
            Self::Malformed { .. } => "malformed",
            Self::Mapping { .. } => "mapping",
        }
    }
}

/// Fatal startup errors. An adapter that hits one of these is never built.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot use {source_name} without credentials")]
    MissingCredentials { source_name: String },

    #[error("No urls defined for {source_name}")]
    NoEndpoints { source_name: String },

    #[error("{source_name} url definition #{index} not complete: {reason}")]
    IncompleteEndpoint {
        source_name: String,
        index: usize,
        reason: String,
    },

    #[error("Failed to load endpoints for {source_name} from {path:?}: {message}")]
    EndpointFile {
        source_name: String,
        path: PathBuf,
        message: String,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors raised by record store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;
