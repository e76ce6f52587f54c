//! Orchestrator configuration
//!
//! Passed explicitly to [`EnrichmentOrchestrator::new`](crate::EnrichmentOrchestrator::new);
//! nothing here is read from global state. Every section is optional in
//! TOML and falls back to its `Default`.
//!
//! ```toml
//! primary_timeout_ms = 30000
//!
//! [query]
//! min_chars = 3
//! max_chars = 500
//!
//! [enrichment]
//! timeout_ms = 20000
//! max_concurrent = 4
//!
//! [enrichment.retry]
//! max_attempts = 2
//! backoff_ms = 250
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeastConfig {
    /// Accepted query length
    pub query: QueryLimits,
    /// Per-candidate enrichment behaviour
    pub enrichment: EnrichmentConfig,
    /// Deadline for the candidate suggestion call
    pub primary_timeout_ms: Option<u64>,
}

impl FeastConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With query length bounds
    #[inline]
    #[must_use]
    pub fn with_query_limits(mut self, min_chars: usize, max_chars: usize) -> Self {
        self.query = QueryLimits {
            min_chars,
            max_chars,
        };
        self
    }

    /// With per-entry enrichment timeout
    #[inline]
    #[must_use]
    pub fn with_enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment.timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// With cap on simultaneous enrichment calls
    #[inline]
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.enrichment.max_concurrent = Some(max);
        self
    }

    /// With retry policy for failed enrichments
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.enrichment.retry = retry;
        self
    }

    /// With deadline for the candidate suggestion call
    #[inline]
    #[must_use]
    pub fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Primary call deadline
    #[inline]
    #[must_use]
    pub fn primary_timeout(&self) -> Option<Duration> {
        self.primary_timeout_ms.map(Duration::from_millis)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// - `ConfigError::Parse` if the document is not valid TOML for this schema
    /// - `ConfigError::Invalid` if values are inconsistent
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - otherwise as [`FeastConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!("Loading config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// Check value consistency
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.min_chars == 0 {
            return Err(ConfigError::invalid(
                "query.min_chars",
                "must be at least 1 (empty queries are always rejected)",
            ));
        }
        if self.query.max_chars < self.query.min_chars {
            return Err(ConfigError::invalid(
                "query.max_chars",
                format!(
                    "{} is below min_chars {}",
                    self.query.max_chars, self.query.min_chars
                ),
            ));
        }
        if self.enrichment.max_concurrent == Some(0) {
            return Err(ConfigError::invalid(
                "enrichment.max_concurrent",
                "must be positive when set",
            ));
        }
        if self.enrichment.timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "enrichment.timeout_ms",
                "must be positive when set",
            ));
        }
        if self.primary_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "primary_timeout_ms",
                "must be positive when set",
            ));
        }
        if self.enrichment.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "enrichment.retry.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Accepted query length, in characters of the trimmed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Minimum length
    pub min_chars: usize,
    /// Maximum length
    pub max_chars: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            min_chars: 3,
            max_chars: 500,
        }
    }
}

/// Per-candidate enrichment behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Deadline per enrichment attempt
    pub timeout_ms: Option<u64>,
    /// Cap on simultaneous enrichment calls (unbounded when unset)
    pub max_concurrent: Option<usize>,
    /// Retry policy for retryable failures
    pub retry: RetryPolicy,
}

impl EnrichmentConfig {
    /// Attempt deadline
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Bounded retry for enrichment calls
///
/// One attempt (no retry) by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Single attempt
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Up to `max_attempts` attempts with exponential backoff
    #[inline]
    #[must_use]
    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: duration_ms(backoff),
        }
    }

    /// Delay before the given attempt (1-based); zero for the first
    #[must_use]
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempt - 2).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 250,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = FeastConfig::new();
        assert_eq!(config.query.min_chars, 3);
        assert_eq!(config.query.max_chars, 500);
        assert_eq!(config.enrichment.retry.max_attempts, 1);
        assert!(config.enrichment.max_concurrent.is_none());
        assert!(config.enrichment.timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = FeastConfig::new()
            .with_query_limits(1, 20)
            .with_enrichment_timeout(Duration::from_secs(2))
            .with_max_concurrent(3)
            .with_primary_timeout(Duration::from_millis(750))
            .with_retry(RetryPolicy::attempts(3, Duration::from_millis(10)));

        assert_eq!(config.query, QueryLimits { min_chars: 1, max_chars: 20 });
        assert_eq!(config.enrichment.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.enrichment.max_concurrent, Some(3));
        assert_eq!(config.primary_timeout(), Some(Duration::from_millis(750)));
        assert_eq!(config.enrichment.retry.max_attempts, 3);
    }

    #[test]
    fn from_toml_partial() {
        let config = FeastConfig::from_toml_str(
            r#"
            [enrichment]
            timeout_ms = 1500

            [enrichment.retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.query, QueryLimits::default());
        assert_eq!(config.enrichment.timeout_ms, Some(1500));
        assert_eq!(config.enrichment.retry.max_attempts, 2);
        assert_eq!(config.enrichment.retry.backoff_ms, 250);
        assert!(config.primary_timeout_ms.is_none());
    }

    #[test]
    fn from_toml_rejects_inverted_bounds() {
        let err = FeastConfig::from_toml_str("[query]\nmin_chars = 10\nmax_chars = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "query.max_chars", .. }));
    }

    #[test]
    fn from_toml_rejects_zero_cap() {
        let err = FeastConfig::from_toml_str("[enrichment]\nmax_concurrent = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "enrichment.max_concurrent", .. }
        ));
    }

    #[test]
    fn from_toml_rejects_garbage() {
        let err = FeastConfig::from_toml_str("query = 7").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "primary_timeout_ms = 900").unwrap();

        let config = FeastConfig::load(file.path()).unwrap();
        assert_eq!(config.primary_timeout(), Some(Duration::from_millis(900)));
    }

    #[test]
    fn load_missing_file() {
        let err = FeastConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn retry_backoff_doubles() {
        let retry = RetryPolicy::attempts(4, Duration::from_millis(100));
        assert_eq!(retry.backoff_before(1), Duration::ZERO);
        assert_eq!(retry.backoff_before(2), Duration::from_millis(100));
        assert_eq!(retry.backoff_before(3), Duration::from_millis(200));
        assert_eq!(retry.backoff_before(4), Duration::from_millis(400));
    }
}
