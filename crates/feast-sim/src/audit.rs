//! Runtime invariant checks
//!
//! [`ViewAudit`] watches the snapshots a consumer would see and
//! [`AuditObserver`] watches the notifications. Both only record
//! violations; the simulator decides what to do with them.

use feast_core::{
    CollectionObserver, CollectionSnapshot, EnrichedCandidate, EnrichmentStatus, EntryId,
    GenerationError, Media, StoreTag,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Broken invariant found during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// View went back to an older store
    TagRegressed { from: StoreTag, to: StoreTag },
    /// Store gained, lost, or reordered entries after its base list
    EntrySetChanged { tag: StoreTag },
    /// Terminal entry changed status
    StatusReverted { tag: StoreTag, id: EntryId },
    /// Two entries of one store share an id
    DuplicateIds { tag: StoreTag },
    /// Media present without `Ready`, or missing with it
    MediaMismatch { tag: StoreTag, id: EntryId },
    /// Observer told about an entry outside the active base list
    UpdateOutsideActiveList { id: EntryId },
    /// Observer told twice about the same entry
    DuplicateUpdate { id: EntryId },
    /// Final view does not match the newest store
    StaleFinalView { expected: StoreTag, actual: StoreTag },
    /// A handle settled with pending entries left
    Unsettled { tag: StoreTag },
    /// A query failed in a way the run did not allow for
    UnexpectedError { message: String },
}

/// Checks consecutive snapshots of the consumer view
#[derive(Debug, Default)]
pub struct ViewAudit {
    last: Option<Arc<CollectionSnapshot>>,
    snapshots_seen: u64,
    violations: Vec<Violation>,
}

impl ViewAudit {
    /// Create new audit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the next snapshot against the previous one
    pub fn observe(&mut self, next: Arc<CollectionSnapshot>) {
        self.snapshots_seen += 1;
        self.check_entries(&next);

        if let Some(prev) = self.last.take() {
            if next.tag < prev.tag {
                self.violations.push(Violation::TagRegressed {
                    from: prev.tag,
                    to: next.tag,
                });
            } else if next.tag == prev.tag && !prev.is_empty() {
                self.check_transition(&prev, &next);
            }
        }
        self.last = Some(next);
    }

    /// Snapshots checked so far
    #[must_use]
    pub fn snapshots_seen(&self) -> u64 {
        self.snapshots_seen
    }

    /// Violations found so far
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Take the findings
    #[must_use]
    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    fn check_entries(&mut self, snapshot: &CollectionSnapshot) {
        let mut seen = HashSet::with_capacity(snapshot.entries.len());
        if !snapshot.entries.iter().all(|e| seen.insert(e.id())) {
            self.violations
                .push(Violation::DuplicateIds { tag: snapshot.tag });
        }

        for entry in &snapshot.entries {
            let ready = entry.status() == EnrichmentStatus::Ready;
            if ready != entry.media().is_some() {
                self.violations.push(Violation::MediaMismatch {
                    tag: snapshot.tag,
                    id: entry.id().clone(),
                });
            }
        }
    }

    fn check_transition(&mut self, prev: &CollectionSnapshot, next: &CollectionSnapshot) {
        if prev.ids() != next.ids() {
            self.violations
                .push(Violation::EntrySetChanged { tag: next.tag });
            return;
        }
        for (before, after) in prev.entries.iter().zip(&next.entries) {
            if before.status().is_terminal() && before.status() != after.status() {
                self.violations.push(Violation::StatusReverted {
                    tag: next.tag,
                    id: after.id().clone(),
                });
            }
        }
    }
}

/// Notification totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObserverTally {
    /// Base lists published
    pub base_lists: u64,
    /// Entry updates published
    pub updates: u64,
    /// Primary failures reported
    pub primary_failures: u64,
    /// Empty results reported
    pub no_results: u64,
}

#[derive(Debug, Default)]
struct ObserverState {
    active: HashSet<EntryId>,
    updated: HashSet<EntryId>,
    tally: ObserverTally,
    violations: Vec<Violation>,
}

impl ObserverState {
    fn reset(&mut self, active: HashSet<EntryId>) {
        self.active = active;
        self.updated.clear();
    }
}

/// Observer that checks every update belongs to the active base list
///
/// With `verbose` set, each notification is also logged.
#[derive(Debug, Default)]
pub struct AuditObserver {
    verbose: bool,
    state: Mutex<ObserverState>,
}

impl AuditObserver {
    /// Create new observer
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            state: Mutex::default(),
        }
    }

    /// Notification totals so far
    #[must_use]
    pub fn tally(&self) -> ObserverTally {
        self.state.lock().tally
    }

    /// Violations found so far
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.state.lock().violations.clone()
    }
}

impl CollectionObserver for AuditObserver {
    fn on_base_list_ready(&self, entries: &[EnrichedCandidate]) {
        if self.verbose {
            let titles: Vec<&str> = entries.iter().map(EnrichedCandidate::title).collect();
            tracing::info!("Base list ready: {}", titles.join(" | "));
        }
        let mut state = self.state.lock();
        state.tally.base_lists += 1;
        state.reset(entries.iter().map(|e| e.id().clone()).collect());
    }

    fn on_entry_updated(&self, id: &EntryId, status: EnrichmentStatus, media: Option<&Media>) {
        if self.verbose {
            tracing::info!(entry = %id, has_media = media.is_some(), "Entry {}", status);
        }
        let mut state = self.state.lock();
        state.tally.updates += 1;
        if !state.active.contains(id) {
            state
                .violations
                .push(Violation::UpdateOutsideActiveList { id: id.clone() });
        } else if !state.updated.insert(id.clone()) {
            state
                .violations
                .push(Violation::DuplicateUpdate { id: id.clone() });
        }
    }

    fn on_primary_failed(&self, reason: &GenerationError) {
        if self.verbose {
            tracing::warn!("Primary generation failed: {}", reason);
        }
        let mut state = self.state.lock();
        state.tally.primary_failures += 1;
        state.reset(HashSet::new());
    }

    fn on_no_results(&self) {
        if self.verbose {
            tracing::info!("No recipes found");
        }
        let mut state = self.state.lock();
        state.tally.no_results += 1;
        state.reset(HashSet::new());
    }
}
