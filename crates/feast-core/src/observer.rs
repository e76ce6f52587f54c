//! Consumer notification interface
//!
//! Observers are called from orchestrator tasks, one notification at a
//! time, while the publication gate is held. They must return quickly and
//! must not call back into [`EnrichmentOrchestrator::start`](crate::EnrichmentOrchestrator::start)
//! or [`EnrichmentOrchestrator::current_tag`](crate::EnrichmentOrchestrator::current_tag)
//! from inside a callback (the gate is not reentrant). Reading snapshots is fine.

use crate::error::GenerationError;
use crate::types::{EnrichedCandidate, EnrichmentStatus, EntryId, Media};

/// Receives updates for the active query only
///
/// Every method defaults to a no-op.
pub trait CollectionObserver: Send + Sync {
    /// All candidates are known and pending, in display order
    fn on_base_list_ready(&self, entries: &[EnrichedCandidate]) {
        let _ = entries;
    }

    /// One entry reached a terminal status
    fn on_entry_updated(&self, id: &EntryId, status: EnrichmentStatus, media: Option<&Media>) {
        let _ = (id, status, media);
    }

    /// Candidate suggestion failed; the collection stays empty
    fn on_primary_failed(&self, reason: &GenerationError) {
        let _ = reason;
    }

    /// Candidate suggestion returned nothing
    fn on_no_results(&self) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CollectionObserver for NoopObserver {}
