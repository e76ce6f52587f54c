//! Testing utilities for the Feast workspace
//!
//! Shared fakes, fixtures, and assertions.

#![allow(missing_docs)]

use async_trait::async_trait;
use dashmap::DashMap;
use feast_core::{
    Candidate, CollectionObserver, CollectionSnapshot, EnrichedCandidate, EnrichmentError,
    EnrichmentOutcome, EnrichmentStatus, EntryId, FeastConfig, GenerationClient,
    GenerationError, Media, RecipeQuery, Substitution, SubstitutionRequest,
};
use feast_core::EnrichmentOrchestrator;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// How long helpers wait for an expected snapshot before failing the test
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Generation client driven entirely by the test
///
/// Candidate lists are scripted per (trimmed) query. Enrichment calls are
/// held until the test releases them by title, unless an automatic answer
/// was registered for that title. A release that arrives before the call
/// is kept and handed to the next call for that title.
#[derive(Default)]
pub struct ScriptedClient {
    suggestions: DashMap<String, Result<Vec<Candidate>, GenerationError>>,
    substitutions: DashMap<String, Substitution>,
    auto: DashMap<String, EnrichmentOutcome>,
    book: Mutex<ReleaseBook>,
    suggest_calls: AtomicUsize,
    enrich_calls: DashMap<String, usize>,
}

#[derive(Default)]
struct ReleaseBook {
    released: HashMap<String, VecDeque<EnrichmentOutcome>>,
    waiting: HashMap<String, VecDeque<oneshot::Sender<EnrichmentOutcome>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with these candidates
    pub fn with_candidates(self, query: &str, candidates: Vec<Candidate>) -> Self {
        self.suggestions.insert(query.trim().to_string(), Ok(candidates));
        self
    }

    /// Fail `query` with this error
    pub fn with_primary_error(self, query: &str, error: GenerationError) -> Self {
        self.suggestions.insert(query.trim().to_string(), Err(error));
        self
    }

    /// Answer every enrichment of `title` immediately
    pub fn with_auto_enrichment(self, title: &str, outcome: EnrichmentOutcome) -> Self {
        self.auto.insert(title.to_string(), outcome);
        self
    }

    /// Answer substitution requests for `ingredient`
    pub fn with_substitution(self, ingredient: &str, substitution: Substitution) -> Self {
        self.substitutions.insert(ingredient.to_string(), substitution);
        self
    }

    /// Resolve the oldest held enrichment of `title`, or the next one made
    pub fn release(&self, title: &str, outcome: EnrichmentOutcome) {
        let mut book = self.book.lock();
        let mut outcome = outcome;
        if let Some(waiters) = book.waiting.get_mut(title) {
            while let Some(waiter) = waiters.pop_front() {
                match waiter.send(outcome) {
                    Ok(()) => return,
                    // Caller went away (timed out); try the next one.
                    Err(returned) => outcome = returned,
                }
            }
        }
        book.released
            .entry(title.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn suggest_calls(&self) -> usize {
        self.suggest_calls.load(Ordering::SeqCst)
    }

    pub fn enrich_calls(&self, title: &str) -> usize {
        self.enrich_calls.get(title).map_or(0, |count| *count)
    }

    pub fn total_enrich_calls(&self) -> usize {
        self.enrich_calls.iter().map(|entry| *entry.value()).sum()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn suggest_candidates(
        &self,
        query: &RecipeQuery,
    ) -> Result<Vec<Candidate>, GenerationError> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        self.suggestions
            .get(query.trimmed())
            .map(|scripted| scripted.value().clone())
            .unwrap_or_else(|| {
                Err(GenerationError::Upstream(format!(
                    "unscripted query: {}",
                    query.trimmed()
                )))
            })
    }

    async fn enrich_candidate(&self, candidate: &Candidate) -> EnrichmentOutcome {
        let title = candidate.title.clone();
        *self.enrich_calls.entry(title.clone()).or_insert(0) += 1;

        if let Some(outcome) = self.auto.get(&title) {
            return outcome.value().clone();
        }

        let receiver = {
            let mut book = self.book.lock();
            if let Some(outcome) = book.released.get_mut(&title).and_then(VecDeque::pop_front) {
                return outcome;
            }
            let (sender, receiver) = oneshot::channel();
            book.waiting.entry(title).or_default().push_back(sender);
            receiver
        };

        receiver
            .await
            .unwrap_or_else(|_| Err(EnrichmentError::Aborted("script dropped".to_string())))
    }

    async fn suggest_substitution(
        &self,
        request: &SubstitutionRequest,
    ) -> Result<Substitution, GenerationError> {
        self.substitutions
            .get(&request.ingredient)
            .map(|s| s.value().clone())
            .ok_or(GenerationError::Unsupported("substitution"))
    }
}

/// Observer notification as recorded by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    BaseListReady(Vec<EntryId>),
    EntryUpdated {
        id: EntryId,
        status: EnrichmentStatus,
        media: Option<Media>,
    },
    PrimaryFailed(GenerationError),
    NoResults,
}

/// Observer that keeps every notification in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().clone()
    }

    /// Updates received for one entry
    pub fn updates_for(&self, id: &EntryId) -> Vec<EnrichmentStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::EntryUpdated {
                    id: updated,
                    status,
                    ..
                } if updated == id => Some(*status),
                _ => None,
            })
            .collect()
    }
}

impl CollectionObserver for RecordingObserver {
    fn on_base_list_ready(&self, entries: &[EnrichedCandidate]) {
        let ids = entries.iter().map(|e| e.id().clone()).collect();
        self.events.lock().push(ObserverEvent::BaseListReady(ids));
    }

    fn on_entry_updated(&self, id: &EntryId, status: EnrichmentStatus, media: Option<&Media>) {
        self.events.lock().push(ObserverEvent::EntryUpdated {
            id: id.clone(),
            status,
            media: media.cloned(),
        });
    }

    fn on_primary_failed(&self, reason: &GenerationError) {
        self.events
            .lock()
            .push(ObserverEvent::PrimaryFailed(reason.clone()));
    }

    fn on_no_results(&self) {
        self.events.lock().push(ObserverEvent::NoResults);
    }
}

pub fn candidates(titles: &[&str]) -> Vec<Candidate> {
    titles
        .iter()
        .map(|title| {
            Candidate::new(*title, format!("A quick {}", title.to_lowercase()))
                .with_steps(["Prepare", "Cook", "Serve"])
        })
        .collect()
}

pub fn media_for(title: &str) -> Media {
    Media::generated(format!("data:image/png;base64,{}", title.replace(' ', "_")))
}

pub fn entry_id(raw: &str) -> EntryId {
    EntryId::from_raw(raw)
}

/// Orchestrator wired to a scripted client and a recording observer
pub fn setup_orchestrator(
    client: ScriptedClient,
    config: FeastConfig,
) -> (EnrichmentOrchestrator, Arc<ScriptedClient>, Arc<RecordingObserver>) {
    let client = Arc::new(client);
    let observer = Arc::new(RecordingObserver::new());
    let orchestrator = EnrichmentOrchestrator::new(
        Arc::clone(&client) as Arc<dyn GenerationClient>,
        Arc::clone(&observer) as Arc<dyn CollectionObserver>,
        config,
    )
    .expect("test config is valid");
    (orchestrator, client, observer)
}

/// Wait until the published snapshot satisfies `predicate`
pub async fn wait_for_snapshot<F>(
    receiver: &mut watch::Receiver<Arc<CollectionSnapshot>>,
    mut predicate: F,
) -> Arc<CollectionSnapshot>
where
    F: FnMut(&CollectionSnapshot) -> bool,
{
    // Own the snapshot before matching so the error arm can borrow again
    let waited = tokio::time::timeout(WAIT_LIMIT, receiver.wait_for(|s| predicate(s)))
        .await
        .map(|result| result.map(|snapshot| Arc::clone(&snapshot)));
    match waited {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) => panic!("orchestrator dropped while waiting for snapshot"),
        Err(_) => panic!(
            "timed out waiting for snapshot; last seen: {:?}",
            receiver.borrow().entries
        ),
    }
}
