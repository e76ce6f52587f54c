//! Feast Core - recipe enrichment orchestration
//!
//! The engine behind Fridge Feast:
//! - Validates a free-text ingredient query
//! - Asks the generation client for an ordered list of recipe candidates
//! - Gives every candidate a stable id and publishes the base list at once
//! - Fans out one media enrichment call per candidate
//! - Merges out-of-order completions back by id, one writer per query
//! - Drops results that belong to a superseded query
//!
//! # Example
//!
//! ```rust,ignore
//! use feast_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn GenerationClient>) -> Result<(), FeastError> {
//! let orchestrator =
//!     EnrichmentOrchestrator::new(client, Arc::new(NoopObserver), FeastConfig::new())?;
//!
//! if let QueryOutcome::Started(handle) =
//!     orchestrator.start(RecipeQuery::new("eggs, flour")).await?
//! {
//!     let settled = handle.settled().await?;
//!     println!("{} recipes", settled.entries.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod observer;
pub mod orchestrator;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use client::GenerationClient;
pub use config::{EnrichmentConfig, FeastConfig, QueryLimits, RetryPolicy};
pub use error::{ConfigError, EnrichmentError, FeastError, GenerationError, StoreError};
pub use identity::{slugify, IdentityAssigner};
pub use observer::{CollectionObserver, NoopObserver};
pub use orchestrator::{EnrichmentOrchestrator, QueryHandle, QueryOutcome};
pub use store::{ApplyResult, CollectionSnapshot, CollectionStore, StatusCounts};
pub use types::{
    Candidate, EnrichedCandidate, EnrichmentOutcome, EnrichmentStatus, EntryId, Media,
    MediaSource, QueryId, RecipeQuery, StoreTag, Substitution, SubstitutionRequest,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Feast Core
    pub use crate::{
        Candidate, CollectionObserver, CollectionSnapshot, EnrichmentOrchestrator,
        EnrichmentStatus, EntryId, FeastConfig, FeastError, GenerationClient, Media,
        NoopObserver, QueryOutcome, RecipeQuery,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn identity_feeds_store() {
        let candidates = vec![
            Candidate::new("Toast", "Crunchy"),
            Candidate::new("Toast", "Also crunchy"),
        ];
        let entries: Vec<EnrichedCandidate> = IdentityAssigner::assign_batch(&candidates)
            .into_iter()
            .zip(candidates)
            .map(|(id, c)| EnrichedCandidate::pending(id, c))
            .collect();

        let store = CollectionStore::new(StoreTag(1), entries).unwrap();
        assert!(store.get(&EntryId::from_raw("toast-0")).is_some());
        assert!(store.get(&EntryId::from_raw("toast-1")).is_some());
    }

    #[tokio::test]
    async fn fresh_orchestrator_shows_empty_store() {
        let client = client::MockGenerationClient::new();
        let orchestrator =
            EnrichmentOrchestrator::new(Arc::new(client), Arc::new(NoopObserver), FeastConfig::new())
                .unwrap();

        assert_eq!(orchestrator.current_tag(), StoreTag::INITIAL);
        assert!(orchestrator.snapshot().is_empty());
        assert!(orchestrator.snapshot().is_settled());
    }
}
