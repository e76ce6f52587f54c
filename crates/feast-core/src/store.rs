//! Collection state store
//!
//! One store per query. Entries are inserted once, all together and in
//! display order, when the store is built; after that each entry accepts
//! exactly one terminal transition. The store itself is plain owned data:
//! the orchestrator gives each store to a single coordinator task, which
//! is the only writer, and consumers read immutable [`CollectionSnapshot`]s.

use crate::error::StoreError;
use crate::types::{
    EnrichedCandidate, EnrichmentOutcome, EnrichmentStatus, EntryId, StoreTag,
};
use serde::Serialize;
use std::collections::HashMap;

/// Result of applying an enrichment outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// Entry left `Pending`; carries the updated entry
    Applied(EnrichedCandidate),
    /// Entry was already terminal; nothing changed
    AlreadySettled(EnrichmentStatus),
    /// No entry with that id in this store
    UnknownEntry,
}

impl ApplyResult {
    /// Check if the store changed
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Entry totals by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Awaiting enrichment
    pub pending: usize,
    /// Enriched
    pub ready: usize,
    /// Enrichment failed
    pub failed: usize,
}

impl StatusCounts {
    /// All entries
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.ready + self.failed
    }
}

/// Per-query collection of enriched candidates
#[derive(Debug, Clone)]
pub struct CollectionStore {
    tag: StoreTag,
    entries: Vec<EnrichedCandidate>,
    index: HashMap<EntryId, usize>,
}

impl CollectionStore {
    /// Build a store from fully-constructed pending entries
    ///
    /// # Errors
    /// `StoreError::DuplicateId` if two entries share an id
    pub fn new(tag: StoreTag, entries: Vec<EnrichedCandidate>) -> Result<Self, StoreError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if index.insert(entry.id().clone(), position).is_some() {
                return Err(StoreError::DuplicateId(entry.id().clone()));
            }
        }
        Ok(Self {
            tag,
            entries,
            index,
        })
    }

    /// Store with no entries
    #[inline]
    #[must_use]
    pub fn empty(tag: StoreTag) -> Self {
        Self {
            tag,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Generation this store belongs to
    #[inline]
    #[must_use]
    pub fn tag(&self) -> StoreTag {
        self.tag
    }

    /// Entries in display order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[EnrichedCandidate] {
        &self.entries
    }

    /// Look up an entry
    #[inline]
    #[must_use]
    pub fn get(&self, id: &EntryId) -> Option<&EnrichedCandidate> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point update by id
    ///
    /// Only a `Pending` entry changes; duplicates and late results for a
    /// terminal entry are reported and dropped.
    pub fn apply(&mut self, id: &EntryId, outcome: EnrichmentOutcome) -> ApplyResult {
        let Some(&position) = self.index.get(id) else {
            return ApplyResult::UnknownEntry;
        };
        let entry = &mut self.entries[position];
        if entry.settle(outcome) {
            ApplyResult::Applied(entry.clone())
        } else {
            ApplyResult::AlreadySettled(entry.status())
        }
    }

    /// Entry totals by status
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        self.entries
            .iter()
            .fold(StatusCounts::default(), |mut counts, entry| {
                match entry.status() {
                    EnrichmentStatus::Pending => counts.pending += 1,
                    EnrichmentStatus::Ready => counts.ready += 1,
                    EnrichmentStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }

    /// Check if every entry is terminal
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.entries.iter().all(|e| e.status().is_terminal())
    }

    /// Immutable copy for consumers
    #[must_use]
    pub fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            tag: self.tag,
            entries: self.entries.clone(),
        }
    }
}

/// Read-only view of a store at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSnapshot {
    /// Generation the snapshot was taken from
    pub tag: StoreTag,
    /// Entries in display order
    pub entries: Vec<EnrichedCandidate>,
}

impl CollectionSnapshot {
    /// Snapshot of an empty store
    #[inline]
    #[must_use]
    pub fn empty(tag: StoreTag) -> Self {
        Self {
            tag,
            entries: Vec::new(),
        }
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, id: &EntryId) -> Option<&EnrichedCandidate> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Status of an entry
    #[inline]
    #[must_use]
    pub fn status_of(&self, id: &EntryId) -> Option<EnrichmentStatus> {
        self.get(id).map(EnrichedCandidate::status)
    }

    /// Entry ids in display order
    #[must_use]
    pub fn ids(&self) -> Vec<&EntryId> {
        self.entries.iter().map(EnrichedCandidate::id).collect()
    }

    /// Check if every entry is terminal
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.entries.iter().all(|e| e.status().is_terminal())
    }

    /// Check if there are no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
