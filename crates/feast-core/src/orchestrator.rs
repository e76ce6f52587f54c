//! Enrichment orchestrator
//!
//! Runs one query end to end:
//! 1. Validate the query locally
//! 2. Await the candidate suggestion call
//! 3. Assign ids and publish the base list (all entries pending)
//! 4. Fan out one enrichment task per entry
//! 5. Funnel completions through the query's coordinator, the only writer
//!    of that query's store
//!
//! Each `start()` takes a fresh [`StoreTag`]. Publication to the consumer
//! view and the observer goes through a gate that compares the store's tag
//! with the current one, so a superseded query can finish in the
//! background without ever touching what the consumer sees.

use crate::client::GenerationClient;
use crate::config::FeastConfig;
use crate::error::{EnrichmentError, FeastError, GenerationError};
use crate::identity::IdentityAssigner;
use crate::observer::CollectionObserver;
use crate::store::{ApplyResult, CollectionSnapshot, CollectionStore};
use crate::types::{
    Candidate, EnrichedCandidate, EnrichmentOutcome, EntryId, QueryId, RecipeQuery, StoreTag,
    Substitution, SubstitutionRequest,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// How a started query ended up
#[derive(Debug)]
pub enum QueryOutcome {
    /// Base list published; enrichment running in the background
    Started(QueryHandle),
    /// Candidate suggestion returned nothing
    NoResults,
    /// A newer query started before this one published anything
    Superseded,
}

impl QueryOutcome {
    /// Handle of a started query
    #[inline]
    #[must_use]
    pub fn into_handle(self) -> Option<QueryHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::NoResults | Self::Superseded => None,
        }
    }
}

/// Handle to a query whose enrichment is in flight
#[derive(Debug)]
pub struct QueryHandle {
    query_id: QueryId,
    tag: StoreTag,
    entry_ids: Vec<EntryId>,
    coordinator: JoinHandle<CollectionStore>,
}

impl QueryHandle {
    /// Query identifier (log correlation)
    #[inline]
    #[must_use]
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Generation of this query's store
    #[inline]
    #[must_use]
    pub fn tag(&self) -> StoreTag {
        self.tag
    }

    /// Entry ids in display order
    #[inline]
    #[must_use]
    pub fn entry_ids(&self) -> &[EntryId] {
        &self.entry_ids
    }

    /// Wait until every entry of this query is terminal
    ///
    /// Returns the query's own store, which keeps recording results even
    /// after a newer query has superseded it.
    ///
    /// # Errors
    /// `FeastError::Coordinator` if the coordinator task panicked or was
    /// cancelled by runtime shutdown
    pub async fn settled(self) -> Result<CollectionSnapshot, FeastError> {
        self.coordinator
            .await
            .map(|store| store.snapshot())
            .map_err(|e| FeastError::Coordinator(e.to_string()))
    }
}

/// The central orchestrator
///
/// Cheap to clone; clones share the same current store and observer.
#[derive(Clone)]
pub struct EnrichmentOrchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    client: Arc<dyn GenerationClient>,
    observer: Arc<dyn CollectionObserver>,
    config: FeastConfig,
    /// Cap on simultaneous enrichment calls, shared by all queries;
    /// superseded queries release their permits
    limiter: Option<Arc<Semaphore>>,
    /// Publication gate: tag of the store the consumer may see
    current: Mutex<StoreTag>,
    view: watch::Sender<Arc<CollectionSnapshot>>,
}

impl EnrichmentOrchestrator {
    /// Create new orchestrator
    ///
    /// # Errors
    /// `FeastError::Config` if the configuration is inconsistent
    pub fn new(
        client: Arc<dyn GenerationClient>,
        observer: Arc<dyn CollectionObserver>,
        config: FeastConfig,
    ) -> Result<Self, FeastError> {
        config.validate()?;
        let limiter = config
            .enrichment
            .max_concurrent
            .map(|max| Arc::new(Semaphore::new(max)));
        let (view, _) = watch::channel(Arc::new(CollectionSnapshot::empty(StoreTag::INITIAL)));

        Ok(Self {
            shared: Arc::new(Shared {
                client,
                observer,
                config,
                limiter,
                current: Mutex::new(StoreTag::INITIAL),
                view,
            }),
        })
    }

    /// Execute one query
    ///
    /// Returns once the base list is published; enrichment continues in
    /// the background and is reported through the observer and
    /// [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    /// - `FeastError::InvalidQuery` before any generation call
    /// - `FeastError::PrimaryGenerationFailed` if candidate suggestion fails
    ///   (the observer is told first)
    pub async fn start(&self, query: RecipeQuery) -> Result<QueryOutcome, FeastError> {
        self.validate_query(&query)?;

        let query_id = QueryId::new();
        let tag = self.shared.begin();
        tracing::info!(%query_id, %tag, "Starting query: {}", query.trimmed());

        let candidates = match self.shared.suggest(&query).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(%query_id, "Candidate suggestion failed: {}", err);
                let shared = &self.shared;
                if !shared.publish(tag, || shared.observer.on_primary_failed(&err)) {
                    return Ok(self.superseded(query_id));
                }
                return Err(FeastError::PrimaryGenerationFailed(err));
            }
        };

        if candidates.is_empty() {
            let shared = &self.shared;
            if !shared.publish(tag, || shared.observer.on_no_results()) {
                return Ok(self.superseded(query_id));
            }
            tracing::info!(%query_id, "No candidates returned");
            return Ok(QueryOutcome::NoResults);
        }

        let ids = IdentityAssigner::assign_batch(&candidates);
        let entries: Vec<EnrichedCandidate> = ids
            .iter()
            .cloned()
            .zip(candidates)
            .map(|(id, candidate)| EnrichedCandidate::pending(id, candidate))
            .collect();
        let store = CollectionStore::new(tag, entries)?;

        let shared = &self.shared;
        let published = shared.publish(tag, || {
            shared.view.send_replace(Arc::new(store.snapshot()));
            shared.observer.on_base_list_ready(store.entries());
        });
        if !published {
            return Ok(self.superseded(query_id));
        }
        tracing::info!(%query_id, "Base list ready with {} entries", store.len());

        let tasks = self.fan_out(tag, &store);
        let coordinator = tokio::spawn(coordinate(Arc::clone(&self.shared), query_id, store, tasks));

        Ok(QueryOutcome::Started(QueryHandle {
            query_id,
            tag,
            entry_ids: ids,
            coordinator,
        }))
    }

    /// Latest snapshot of the active store
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<CollectionSnapshot> {
        self.shared.view.borrow().clone()
    }

    /// Receive every snapshot published for the active store
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CollectionSnapshot>> {
        self.shared.view.subscribe()
    }

    /// Tag of the active store
    #[inline]
    #[must_use]
    pub fn current_tag(&self) -> StoreTag {
        *self.shared.current.lock()
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &FeastConfig {
        &self.shared.config
    }

    /// Suggest a replacement ingredient for an entry of the active store
    ///
    /// # Errors
    /// - `FeastError::InvalidIngredient` for a blank ingredient (no call made)
    /// - `FeastError::UnknownEntry` if the id is not in the active store
    /// - `FeastError::SubstitutionFailed` if the client call fails
    pub async fn suggest_substitution(
        &self,
        id: &EntryId,
        ingredient: &str,
    ) -> Result<Substitution, FeastError> {
        let ingredient = ingredient.trim();
        if ingredient.is_empty() {
            return Err(FeastError::InvalidIngredient(
                "enter an ingredient to find a swap for".to_string(),
            ));
        }

        let request = {
            let snapshot = self.snapshot();
            let entry = snapshot
                .get(id)
                .ok_or_else(|| FeastError::UnknownEntry(id.clone()))?;
            SubstitutionRequest::for_entry(entry, ingredient)
        };

        tracing::debug!(entry = %id, "Requesting substitution for {}", ingredient);
        self.shared
            .client
            .suggest_substitution(&request)
            .await
            .map_err(|err| {
                tracing::warn!(entry = %id, "Substitution failed: {}", err);
                FeastError::SubstitutionFailed(err)
            })
    }

    fn validate_query(&self, query: &RecipeQuery) -> Result<(), FeastError> {
        let limits = self.shared.config.query;
        let text = query.trimmed();
        if text.is_empty() {
            return Err(FeastError::InvalidQuery("query is empty".to_string()));
        }
        let len = text.chars().count();
        if len < limits.min_chars {
            return Err(FeastError::InvalidQuery(format!(
                "list at least {} characters of ingredients (got {len})",
                limits.min_chars
            )));
        }
        if len > limits.max_chars {
            return Err(FeastError::InvalidQuery(format!(
                "ingredient list is too long: {len} characters (max {})",
                limits.max_chars
            )));
        }
        Ok(())
    }

    /// Spawn one enrichment task per entry
    ///
    /// Each call runs in its own task so a panicking client only fails
    /// its own entry; the join set then sees a plain `(id, outcome)`.
    fn fan_out(
        &self,
        tag: StoreTag,
        store: &CollectionStore,
    ) -> JoinSet<(EntryId, EnrichmentOutcome)> {
        let mut tasks = JoinSet::new();
        for entry in store.entries() {
            let shared = Arc::clone(&self.shared);
            let id = entry.id().clone();
            let candidate = entry.candidate().clone();
            tasks.spawn(async move {
                let call = tokio::spawn(async move { shared.enrich(tag, &candidate).await });
                let outcome = match call.await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(EnrichmentError::Aborted(err.to_string())),
                };
                (id, outcome)
            });
        }
        tasks
    }

    fn superseded(&self, query_id: QueryId) -> QueryOutcome {
        tracing::info!(%query_id, "Query superseded before its base list was published");
        QueryOutcome::Superseded
    }
}

impl fmt::Debug for EnrichmentOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentOrchestrator")
            .field("config", &self.shared.config)
            .field("current", &self.current_tag())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Take the next tag and show an empty store for it
    fn begin(&self) -> StoreTag {
        let mut current = self.current.lock();
        let tag = current.next();
        *current = tag;
        self.view
            .send_replace(Arc::new(CollectionSnapshot::empty(tag)));
        tag
    }

    /// Run `f` only while `tag` is the active store
    ///
    /// Returns whether `f` ran.
    fn publish(&self, tag: StoreTag, f: impl FnOnce()) -> bool {
        let current = self.current.lock();
        if *current != tag {
            return false;
        }
        f();
        true
    }

    fn is_current(&self, tag: StoreTag) -> bool {
        *self.current.lock() == tag
    }

    async fn suggest(&self, query: &RecipeQuery) -> Result<Vec<Candidate>, GenerationError> {
        let call = self.client.suggest_candidates(query);
        match self.config.primary_timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(GenerationError::Timeout {
                    timeout_ms: millis(limit),
                })),
            None => call.await,
        }
    }

    /// Resolves once a newer query has taken over from `tag`
    ///
    /// The view always carries the active tag, so it doubles as the
    /// supersession signal.
    async fn superseded(&self, tag: StoreTag) {
        let mut view = self.view.subscribe();
        let changed = view.wait_for(|snapshot| snapshot.tag != tag).await.is_ok();
        if !changed {
            // Sender lives in `self`; never reached while we are borrowed
            std::future::pending::<()>().await;
        }
    }

    /// Enrich one candidate, retrying retryable failures per policy
    ///
    /// Retries stop once `tag` is superseded, including mid-backoff.
    async fn enrich(&self, tag: StoreTag, candidate: &Candidate) -> EnrichmentOutcome {
        let retry = self.config.enrichment.retry;
        let mut attempt = 1;
        loop {
            match self.enrich_once(tag, candidate).await {
                Err(err)
                    if err.is_retryable()
                        && attempt < retry.max_attempts
                        && self.is_current(tag) =>
                {
                    attempt += 1;
                    let delay = retry.backoff_before(attempt);
                    tracing::debug!(
                        "Enrichment of '{}' failed ({}), attempt {} in {:?}",
                        candidate.title,
                        err,
                        attempt,
                        delay
                    );
                    tokio::select! {
                        biased;
                        () = self.superseded(tag) => {
                            tracing::debug!(
                                "Dropping retry of '{}', store {} superseded",
                                candidate.title,
                                tag
                            );
                            return Err(err);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// One enrichment call, bounded by the cap and the timeout if set
    ///
    /// Under a cap, both the wait for a permit and the call itself give
    /// way to supersession so a stale query cannot hold permits the active
    /// one needs. Uncapped calls run to completion and land in their own
    /// store.
    async fn enrich_once(&self, tag: StoreTag, candidate: &Candidate) -> EnrichmentOutcome {
        let Some(limiter) = &self.limiter else {
            return self.call_enrichment(candidate).await;
        };

        let permit = tokio::select! {
            biased;
            () = self.superseded(tag) => {
                return Err(EnrichmentError::Aborted("superseded before dispatch".to_string()));
            }
            permit = Arc::clone(limiter).acquire_owned() => {
                permit.map_err(|e| EnrichmentError::Aborted(e.to_string()))?
            }
        };

        let outcome = tokio::select! {
            biased;
            () = self.superseded(tag) => {
                Err(EnrichmentError::Aborted("superseded during call".to_string()))
            }
            outcome = self.call_enrichment(candidate) => outcome,
        };
        drop(permit);
        outcome
    }

    async fn call_enrichment(&self, candidate: &Candidate) -> EnrichmentOutcome {
        let call = self.client.enrich_candidate(candidate);
        match self.config.enrichment.timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(EnrichmentError::Timeout {
                    timeout_ms: millis(limit),
                })),
            None => call.await,
        }
    }

    /// Surface an applied update if `store` is still the active one
    fn publish_update(&self, store: &CollectionStore, entry: &EnrichedCandidate) -> bool {
        self.publish(store.tag(), || {
            self.view.send_replace(Arc::new(store.snapshot()));
            self.observer
                .on_entry_updated(entry.id(), entry.status(), entry.media());
        })
    }
}

/// Single writer for one query's store
async fn coordinate(
    shared: Arc<Shared>,
    query_id: QueryId,
    mut store: CollectionStore,
    mut tasks: JoinSet<(EntryId, EnrichmentOutcome)>,
) -> CollectionStore {
    while let Some(joined) = tasks.join_next().await {
        let (id, outcome) = match joined {
            Ok(result) => result,
            Err(err) => {
                // The wrapper task only awaits the inner call; reaching this
                // means the runtime is shutting down.
                tracing::error!(%query_id, "Enrichment wrapper task failed: {}", err);
                continue;
            }
        };

        if let Err(err) = &outcome {
            tracing::warn!(%query_id, entry = %id, "Enrichment failed: {}", err);
        }

        match store.apply(&id, outcome) {
            ApplyResult::Applied(entry) => {
                if shared.publish_update(&store, &entry) {
                    tracing::debug!(%query_id, entry = %id, "Entry {}", entry.status());
                } else {
                    tracing::debug!(
                        %query_id,
                        entry = %id,
                        "Store {} superseded, update kept off the active view",
                        store.tag()
                    );
                }
            }
            ApplyResult::AlreadySettled(status) => {
                tracing::debug!(%query_id, entry = %id, "Discarding late result, already {}", status);
            }
            ApplyResult::UnknownEntry => {
                tracing::warn!(%query_id, entry = %id, "Discarding result for unknown entry");
            }
        }
    }

    let counts = store.counts();
    tracing::info!(
        %query_id,
        "Enrichment settled: {} ready, {} failed",
        counts.ready,
        counts.failed
    );
    store
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockGenerationClient;
    use crate::config::RetryPolicy;
    use crate::observer::NoopObserver;
    use crate::types::{EnrichmentStatus, Media};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl CollectionObserver for Recorder {
        fn on_base_list_ready(&self, entries: &[EnrichedCandidate]) {
            self.events.lock().push(format!("base:{}", entries.len()));
        }

        fn on_entry_updated(&self, id: &EntryId, status: EnrichmentStatus, _media: Option<&Media>) {
            self.events.lock().push(format!("update:{id}:{status}"));
        }

        fn on_primary_failed(&self, _reason: &GenerationError) {
            self.events.lock().push("primary-failed".to_string());
        }

        fn on_no_results(&self) {
            self.events.lock().push("no-results".to_string());
        }
    }

    /// Suggests fixed titles; enrichment sleeps, then fails the first
    /// `flaky` attempts with an upstream error
    struct SleepyClient {
        titles: Vec<&'static str>,
        delay: Duration,
        flaky: usize,
        attempts: AtomicUsize,
    }

    impl SleepyClient {
        fn new(titles: Vec<&'static str>, delay: Duration) -> Self {
            Self {
                titles,
                delay,
                flaky: 0,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for SleepyClient {
        async fn suggest_candidates(
            &self,
            _query: &RecipeQuery,
        ) -> Result<Vec<Candidate>, GenerationError> {
            Ok(self
                .titles
                .iter()
                .map(|t| Candidate::new(*t, "tasty"))
                .collect())
        }

        async fn enrich_candidate(&self, candidate: &Candidate) -> EnrichmentOutcome {
            tokio::time::sleep(self.delay).await;
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.flaky {
                return Err(EnrichmentError::Upstream("busy".to_string()));
            }
            Ok(Media::generated(format!("data:image/png;base64,{}", candidate.title)))
        }
    }

    fn orchestrator_with(
        client: impl GenerationClient + 'static,
        observer: Arc<Recorder>,
        config: FeastConfig,
    ) -> EnrichmentOrchestrator {
        EnrichmentOrchestrator::new(Arc::new(client), observer, config).unwrap()
    }

    #[tokio::test]
    async fn invalid_query_makes_no_calls() {
        let mut client = MockGenerationClient::new();
        client.expect_suggest_candidates().never();
        client.expect_enrich_candidate().never();
        let recorder = Arc::new(Recorder::default());
        let orchestrator = orchestrator_with(client, Arc::clone(&recorder), FeastConfig::new());

        let too_long = "x".repeat(501);
        for query in ["", "   ", "ab", too_long.as_str()] {
            let result = orchestrator.start(RecipeQuery::new(query)).await;
            assert!(matches!(result, Err(FeastError::InvalidQuery(_))), "{query:?}");
        }
        assert!(recorder.events().is_empty());
        assert_eq!(orchestrator.current_tag(), StoreTag::INITIAL);
    }

    #[tokio::test]
    async fn query_length_counts_characters() {
        let mut client = MockGenerationClient::new();
        client
            .expect_suggest_candidates()
            .times(1)
            .returning(|_| Ok(Vec::new()));
        let orchestrator =
            orchestrator_with(client, Arc::default(), FeastConfig::new().with_query_limits(3, 4));

        // Four multi-byte characters fit a four-character limit.
        let outcome = orchestrator.start(RecipeQuery::new(" ñañá ")).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::NoResults));
    }

    #[tokio::test]
    async fn primary_failure_notifies_and_errors() {
        let mut client = MockGenerationClient::new();
        client
            .expect_suggest_candidates()
            .times(1)
            .returning(|_| Err(GenerationError::Upstream("model offline".to_string())));
        client.expect_enrich_candidate().never();
        let recorder = Arc::new(Recorder::default());
        let orchestrator = orchestrator_with(client, Arc::clone(&recorder), FeastConfig::new());

        let err = orchestrator
            .start(RecipeQuery::new("eggs, flour"))
            .await
            .unwrap_err();

        assert!(matches!(err, FeastError::PrimaryGenerationFailed(_)));
        assert_eq!(recorder.events(), vec!["primary-failed".to_string()]);
        assert!(orchestrator.snapshot().is_empty());
    }

    #[tokio::test]
    async fn no_results_is_not_an_error() {
        let mut client = MockGenerationClient::new();
        client
            .expect_suggest_candidates()
            .returning(|_| Ok(Vec::new()));
        client.expect_enrich_candidate().never();
        let recorder = Arc::new(Recorder::default());
        let orchestrator = orchestrator_with(client, Arc::clone(&recorder), FeastConfig::new());

        let outcome = orchestrator.start(RecipeQuery::new("gravel")).await.unwrap();

        assert!(matches!(outcome, QueryOutcome::NoResults));
        assert_eq!(recorder.events(), vec!["no-results".to_string()]);
        assert!(orchestrator.snapshot().is_empty());
        assert_eq!(orchestrator.snapshot().tag, StoreTag(1));
    }

    #[tokio::test]
    async fn base_list_precedes_updates() {
        let mut client = MockGenerationClient::new();
        client.expect_suggest_candidates().returning(|_| {
            Ok(vec![
                Candidate::new("Pancakes", "Fluffy"),
                Candidate::new("Crepes", "Thin"),
            ])
        });
        client
            .expect_enrich_candidate()
            .times(2)
            .returning(|c| Ok(Media::generated(format!("data:image/png;base64,{}", c.title))));
        let recorder = Arc::new(Recorder::default());
        let orchestrator = orchestrator_with(client, Arc::clone(&recorder), FeastConfig::new());

        let handle = orchestrator
            .start(RecipeQuery::new("eggs, flour"))
            .await
            .unwrap()
            .into_handle()
            .unwrap();
        let ids: Vec<&str> = handle.entry_ids().iter().map(EntryId::as_str).collect();
        assert_eq!(ids, vec!["pancakes-0", "crepes-0"]);

        let settled = handle.settled().await.unwrap();
        assert!(settled.is_settled());

        let events = recorder.events();
        assert_eq!(events[0], "base:2");
        assert_eq!(events.len(), 3);
        assert!(events[1..].iter().all(|e| e.ends_with(":ready")));
    }

    #[tokio::test(start_paused = true)]
    async fn enrichment_timeout_marks_failed() {
        let client = SleepyClient::new(vec!["Slow Roast"], Duration::from_secs(60));
        let config = FeastConfig::new().with_enrichment_timeout(Duration::from_secs(5));
        let orchestrator = orchestrator_with(client, Arc::default(), config);

        let handle = orchestrator
            .start(RecipeQuery::new("beef, thyme"))
            .await
            .unwrap()
            .into_handle()
            .unwrap();
        let settled = handle.settled().await.unwrap();

        assert_eq!(
            settled.status_of(&EntryId::from_raw("slow-roast-0")),
            Some(EnrichmentStatus::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn primary_timeout_is_primary_failure() {
        struct Stalled;

        #[async_trait]
        impl GenerationClient for Stalled {
            async fn suggest_candidates(
                &self,
                _query: &RecipeQuery,
            ) -> Result<Vec<Candidate>, GenerationError> {
                std::future::pending().await
            }

            async fn enrich_candidate(&self, _candidate: &Candidate) -> EnrichmentOutcome {
                Err(EnrichmentError::NoMedia)
            }
        }

        let config = FeastConfig::new().with_primary_timeout(Duration::from_secs(30));
        let orchestrator =
            EnrichmentOrchestrator::new(Arc::new(Stalled), Arc::new(NoopObserver), config).unwrap();

        let err = orchestrator
            .start(RecipeQuery::new("rice"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FeastError::PrimaryGenerationFailed(GenerationError::Timeout { timeout_ms: 30_000 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_flaky_enrichment() {
        let mut client = SleepyClient::new(vec!["Risotto"], Duration::from_millis(10));
        client.flaky = 2;
        let config = FeastConfig::new().with_retry(RetryPolicy::attempts(3, Duration::from_millis(50)));
        let orchestrator = orchestrator_with(client, Arc::default(), config);

        let handle = orchestrator
            .start(RecipeQuery::new("rice, stock"))
            .await
            .unwrap()
            .into_handle()
            .unwrap();
        let settled = handle.settled().await.unwrap();

        assert_eq!(
            settled.status_of(&EntryId::from_raw("risotto-0")),
            Some(EnrichmentStatus::Ready)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_by_default() {
        let mut client = SleepyClient::new(vec!["Risotto"], Duration::from_millis(10));
        client.flaky = 1;
        let orchestrator = orchestrator_with(client, Arc::default(), FeastConfig::new());

        let handle = orchestrator
            .start(RecipeQuery::new("rice, stock"))
            .await
            .unwrap()
            .into_handle()
            .unwrap();
        let settled = handle.settled().await.unwrap();

        assert_eq!(
            settled.status_of(&EntryId::from_raw("risotto-0")),
            Some(EnrichmentStatus::Failed)
        );
    }

    #[tokio::test]
    async fn substitution_validates_before_calling() {
        let mut client = MockGenerationClient::new();
        client.expect_suggest_substitution().never();
        let orchestrator = orchestrator_with(client, Arc::default(), FeastConfig::new());

        let err = orchestrator
            .suggest_substitution(&EntryId::from_raw("pancakes-0"), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, FeastError::InvalidIngredient(_)));

        let err = orchestrator
            .suggest_substitution(&EntryId::from_raw("pancakes-0"), "milk")
            .await
            .unwrap_err();
        assert!(matches!(err, FeastError::UnknownEntry(_)));
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let client = MockGenerationClient::new();
        let result = EnrichmentOrchestrator::new(
            Arc::new(client),
            Arc::new(NoopObserver),
            FeastConfig::new().with_max_concurrent(0),
        );
        assert!(matches!(result, Err(FeastError::Config(_))));
    }
}
