//! Error types for Feast Core
//!
//! Two levels of failure exist:
//! - Query-level errors ([`FeastError`]) are returned from `start()` and
//!   must be handled by the consumer
//! - Entry-level errors ([`EnrichmentError`]) are absorbed by the
//!   orchestrator and only ever show up as a `Failed` entry status

use crate::types::EntryId;

/// Main query-level error type
#[derive(Debug, thiserror::Error)]
pub enum FeastError {
    /// Query rejected locally before any generation call
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Candidate suggestion call failed
    #[error("primary generation failed: {0}")]
    PrimaryGenerationFailed(#[from] GenerationError),

    /// Ingredient for a substitution request was rejected locally
    #[error("invalid ingredient: {0}")]
    InvalidIngredient(String),

    /// Substitution call failed
    #[error("substitution failed: {0}")]
    SubstitutionFailed(GenerationError),

    /// Entry is not part of the current collection
    #[error("unknown entry: {0}")]
    UnknownEntry(EntryId),

    /// Store could not be built from the candidate batch
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Background coordinator stopped unexpectedly
    #[error("coordinator failed: {0}")]
    Coordinator(String),
}

impl FeastError {
    /// Check if the error terminates the query it belongs to
    #[inline]
    #[must_use]
    pub fn is_query_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_) | Self::PrimaryGenerationFailed(_)
        )
    }

    /// Check if the error was raised before any generation call was made
    #[inline]
    #[must_use]
    pub fn is_local_rejection(&self) -> bool {
        matches!(self, Self::InvalidQuery(_) | Self::InvalidIngredient(_))
    }
}

/// Errors reported by the generation client's text calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Upstream model or transport failure
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Response could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Call exceeded its deadline
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Operation not offered by this client
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

/// Per-entry enrichment failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    /// Upstream model or transport failure
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Model answered but produced no media
    #[error("no media returned")]
    NoMedia,

    /// Call exceeded its deadline
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Enrichment task panicked or was aborted
    #[error("enrichment task aborted: {0}")]
    Aborted(String),
}

impl EnrichmentError {
    /// Check if another attempt could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Timeout { .. })
    }
}

/// Collection store construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Two entries share an id
    #[error("duplicate entry id: {0}")]
    DuplicateId(EntryId),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed values are inconsistent
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Create an invalid-value error
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
