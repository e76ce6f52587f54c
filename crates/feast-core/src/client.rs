//! Generation client seam
//!
//! The orchestrator never talks to a model directly. Everything it needs
//! from the outside world goes through [`GenerationClient`]; how prompts
//! are built and how the model is reached is up to the implementation.

use crate::error::GenerationError;
use crate::types::{Candidate, EnrichmentOutcome, RecipeQuery, Substitution, SubstitutionRequest};
use async_trait::async_trait;

/// Text and image generation operations
///
/// Calls are independent: the orchestrator may have one
/// `suggest_candidates` and any number of `enrich_candidate` calls in
/// flight at once, across overlapping queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Suggest recipes for a query, in display order
    async fn suggest_candidates(
        &self,
        query: &RecipeQuery,
    ) -> Result<Vec<Candidate>, GenerationError>;

    /// Generate media for one candidate
    async fn enrich_candidate(&self, candidate: &Candidate) -> EnrichmentOutcome;

    /// Suggest a replacement for a missing ingredient
    ///
    /// Clients without this capability keep the default, which reports
    /// `GenerationError::Unsupported`.
    async fn suggest_substitution(
        &self,
        request: &SubstitutionRequest,
    ) -> Result<Substitution, GenerationError> {
        let _ = request;
        Err(GenerationError::Unsupported("substitution"))
    }
}
