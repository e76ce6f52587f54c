//! Feast simulator
//!
//! Plays a plan of queries against an orchestrator backed by
//! [`SimulatedClient`], then checks what the consumer saw:
//! 1. Snapshots never go back to an older store
//! 2. Within a store, entries stay fixed and statuses never revert
//! 3. Notifications only ever concern the active base list
//! 4. Every started query settles
//! 5. The final view is the newest store
//!
//! Each entry of the final view is also asked for one ingredient swap.

use crate::audit::{AuditObserver, ObserverTally, ViewAudit, Violation};
use crate::client::{ClientCalls, ClientProfile, SimulatedClient};
use feast_core::{
    CollectionObserver, CollectionSnapshot, EnrichmentOrchestrator, EnrichmentStatus, EntryId,
    FeastConfig, FeastError, GenerationClient, QueryHandle, QueryOutcome, RecipeQuery, StoreTag,
};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};

const PANTRY: &[&str] = &[
    "eggs", "flour", "milk", "rice", "leeks", "potatoes", "chickpeas", "spinach", "lemon",
    "garlic", "tomatoes", "feta", "mushrooms", "tofu", "pasta",
];

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Simulated backend behaviour
    pub profile: ClientProfile,
    /// Orchestrator configuration
    pub feast: FeastConfig,
    /// Log every notification
    pub verbose: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            profile: ClientProfile::default(),
            feast: FeastConfig::default(),
            verbose: false,
        }
    }
}

/// One query of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    /// Ingredient list
    pub query: String,
    /// Pause before starting it
    pub delay_before: Duration,
}

impl PlannedQuery {
    /// Query started without delay
    #[must_use]
    pub fn immediate(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            delay_before: Duration::ZERO,
        }
    }

    /// Query started after `delay`
    #[must_use]
    pub fn after(delay: Duration, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            delay_before: delay,
        }
    }
}

/// Two queries, the second starting `overlap` after the first
#[must_use]
pub fn supersede_plan(first: &str, second: &str, overlap: Duration) -> Vec<PlannedQuery> {
    vec![
        PlannedQuery::immediate(first),
        PlannedQuery::after(overlap, second),
    ]
}

/// Random pantry queries with random gaps
///
/// About one query in twenty is blank, to exercise local rejection.
#[must_use]
pub fn stress_plan(seed: u64, queries: usize, max_gap: Duration) -> Vec<PlannedQuery> {
    let mut rng = StdRng::seed_from_u64(seed);
    let max_gap_ms = u64::try_from(max_gap.as_millis()).unwrap_or(u64::MAX);

    (0..queries)
        .map(|_| {
            let delay = Duration::from_millis(rng.random_range(0..=max_gap_ms));
            if rng.random_bool(0.05) {
                return PlannedQuery::after(delay, "  ");
            }
            let count = rng.random_range(1..=3);
            let ingredients: Vec<&str> = (0..count)
                .map(|_| PANTRY[rng.random_range(0..PANTRY.len())])
                .collect();
            PlannedQuery::after(delay, ingredients.join(", "))
        })
        .collect()
}

/// Statistics for simulation
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SimulatorStats {
    pub queries: u64,
    pub rejected: u64,
    pub primary_failures: u64,
    pub no_results: u64,
    /// Superseded before publishing a base list
    pub superseded_early: u64,
    pub started: u64,
    /// Started, then superseded by a newer query
    pub superseded_late: u64,
    pub entries: u64,
    pub ready: u64,
    pub failed: u64,
    pub snapshots_seen: u64,
    /// Ingredient swaps answered for the final view
    pub substitutions: u64,
}

/// Entry of the final view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub id: EntryId,
    pub title: String,
    pub status: EnrichmentStatus,
    /// Shown media (generated or placeholder)
    pub media: Option<String>,
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub seed: u64,
    pub elapsed_ms: u64,
    pub stats: SimulatorStats,
    pub observer: ObserverTally,
    pub calls: ClientCalls,
    pub final_view: Vec<EntrySummary>,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let s = &self.stats;
        let mut report = String::new();

        report.push_str("=== Feast Simulator Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.seed);
        let _ = writeln!(report, "Elapsed: {}ms", self.elapsed_ms);
        let _ = writeln!(report, "Queries: {}", s.queries);
        let _ = writeln!(report, "  Rejected: {}", s.rejected);
        let _ = writeln!(report, "  Primary Failures: {}", s.primary_failures);
        let _ = writeln!(report, "  No Results: {}", s.no_results);
        let _ = writeln!(report, "  Superseded Before Base List: {}", s.superseded_early);
        let _ = writeln!(report, "  Started: {}", s.started);
        let _ = writeln!(report, "  Superseded After Start: {}", s.superseded_late);
        let _ = writeln!(
            report,
            "Entries: {} ({} ready, {} failed)",
            s.entries, s.ready, s.failed
        );
        let _ = writeln!(
            report,
            "Client Calls: {} suggest, {} enrich, {} substitution",
            self.calls.suggest, self.calls.enrich, self.calls.substitution
        );
        let _ = writeln!(report, "Substitutions Answered: {}", s.substitutions);
        let _ = writeln!(
            report,
            "Notifications: {} base lists, {} updates",
            self.observer.base_lists, self.observer.updates
        );
        let _ = writeln!(report, "Snapshots Audited: {}", s.snapshots_seen);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.final_view.is_empty() {
            report.push_str("\n=== Final View ===\n");
            for entry in &self.final_view {
                let _ = writeln!(report, "[{:<7}] {} ({})", entry.status, entry.title, entry.id);
            }
        }

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {:?}", i + 1, v);
            }
        }

        let _ = write!(
            report,
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Run a plan of queries and audit the result
///
/// # Errors
/// `FeastError::Config` if the orchestrator configuration is invalid
pub async fn run_plan(
    config: &SimulatorConfig,
    plan: Vec<PlannedQuery>,
) -> Result<SimulatorReport, FeastError> {
    let client = Arc::new(SimulatedClient::new(config.seed, config.profile.clone()));
    let observer = Arc::new(AuditObserver::new(config.verbose));
    let orchestrator = EnrichmentOrchestrator::new(
        Arc::clone(&client) as Arc<dyn GenerationClient>,
        Arc::clone(&observer) as Arc<dyn CollectionObserver>,
        config.feast.clone(),
    )?;

    let started_at = Instant::now();
    let (stop, stopped) = oneshot::channel();
    let auditor = tokio::spawn(audit_view(orchestrator.subscribe(), stopped));

    tracing::info!(seed = config.seed, "Running plan of {} queries", plan.len());
    let mut starts = Vec::with_capacity(plan.len());
    for planned in plan {
        if !planned.delay_before.is_zero() {
            tokio::time::sleep(planned.delay_before).await;
        }
        let orchestrator = orchestrator.clone();
        let query = planned.query;
        starts.push(tokio::spawn(async move {
            let outcome = orchestrator.start(RecipeQuery::new(query.clone())).await;
            (query, outcome)
        }));
    }

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    let mut handles = Vec::new();
    let mut newest_query: Option<(StoreTag, String)> = None;
    for joined in join_all(starts).await {
        stats.queries += 1;
        match joined {
            Ok((query, Ok(QueryOutcome::Started(handle)))) => {
                stats.started += 1;
                if newest_query.as_ref().map_or(true, |(tag, _)| handle.tag() > *tag) {
                    newest_query = Some((handle.tag(), query));
                }
                handles.push(handle);
            }
            Ok((_, Ok(QueryOutcome::NoResults))) => stats.no_results += 1,
            Ok((_, Ok(QueryOutcome::Superseded))) => stats.superseded_early += 1,
            Ok((_, Err(FeastError::InvalidQuery(_)))) => stats.rejected += 1,
            Ok((_, Err(FeastError::PrimaryGenerationFailed(_)))) => stats.primary_failures += 1,
            Ok((_, Err(err))) => violations.push(Violation::UnexpectedError {
                message: err.to_string(),
            }),
            Err(err) => violations.push(Violation::UnexpectedError {
                message: format!("start task failed: {err}"),
            }),
        }
    }

    let current = orchestrator.current_tag();
    let newest = settle_all(handles, current, &mut stats, &mut violations).await;

    let view = orchestrator.snapshot();
    match newest {
        Some(expected) if *view != expected => violations.push(Violation::StaleFinalView {
            expected: expected.tag,
            actual: view.tag,
        }),
        None if view.tag != current || !view.is_empty() => {
            violations.push(Violation::StaleFinalView {
                expected: current,
                actual: view.tag,
            });
        }
        _ => {}
    }

    if let Some((tag, query)) = &newest_query {
        if *tag == view.tag {
            request_substitutions(&orchestrator, &view, query, &mut stats, &mut violations).await;
        }
    }

    let _ = stop.send(());
    match auditor.await {
        Ok(audit) => {
            stats.snapshots_seen = audit.snapshots_seen();
            violations.extend(audit.into_violations());
        }
        Err(err) => violations.push(Violation::UnexpectedError {
            message: format!("view auditor failed: {err}"),
        }),
    }
    violations.extend(observer.violations());

    let report = SimulatorReport {
        seed: config.seed,
        elapsed_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        stats,
        observer: observer.tally(),
        calls: client.calls(),
        final_view: summarize(&view),
        violations,
    };
    tracing::info!(
        passed = report.passed(),
        "Plan finished: {} started, {} violations",
        report.stats.started,
        report.violations.len()
    );
    Ok(report)
}

/// Wait for every started query; returns the store tagged `current`
async fn settle_all(
    handles: Vec<QueryHandle>,
    current: StoreTag,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) -> Option<CollectionSnapshot> {
    let settled = join_all(handles.into_iter().map(|handle| async move {
        let tag = handle.tag();
        (tag, handle.settled().await)
    }))
    .await;

    let mut newest = None;
    for (tag, result) in settled {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                violations.push(Violation::UnexpectedError {
                    message: err.to_string(),
                });
                continue;
            }
        };
        if !snapshot.is_settled() {
            violations.push(Violation::Unsettled { tag });
        }
        for entry in &snapshot.entries {
            stats.entries += 1;
            match entry.status() {
                EnrichmentStatus::Ready => stats.ready += 1,
                EnrichmentStatus::Failed => stats.failed += 1,
                EnrichmentStatus::Pending => {}
            }
        }
        if tag == current {
            newest = Some(snapshot);
        } else {
            stats.superseded_late += 1;
        }
    }
    newest
}

/// Ask for a swap of the query's first ingredient in every entry
async fn request_substitutions(
    orchestrator: &EnrichmentOrchestrator,
    view: &CollectionSnapshot,
    query: &str,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) {
    let Some(ingredient) = query
        .split(|c: char| c == ',' || c == ';')
        .map(str::trim)
        .find(|part| !part.is_empty())
    else {
        return;
    };

    for entry in &view.entries {
        match orchestrator.suggest_substitution(entry.id(), ingredient).await {
            Ok(swap) => {
                tracing::debug!(
                    entry = %entry.id(),
                    "Swap {} for {}",
                    swap.original,
                    swap.alternative
                );
                stats.substitutions += 1;
            }
            Err(err) => violations.push(Violation::UnexpectedError {
                message: format!("substitution for {} failed: {err}", entry.id()),
            }),
        }
    }
}

/// Feed every published snapshot to a [`ViewAudit`] until told to stop
async fn audit_view(
    mut view: watch::Receiver<Arc<CollectionSnapshot>>,
    mut stop: oneshot::Receiver<()>,
) -> ViewAudit {
    let mut audit = ViewAudit::new();
    audit.observe(view.borrow_and_update().clone());

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                audit.observe(view.borrow_and_update().clone());
            }
            _ = &mut stop => break,
        }
    }

    if view.has_changed().unwrap_or(false) {
        audit.observe(view.borrow_and_update().clone());
    }
    audit
}

fn summarize(view: &CollectionSnapshot) -> Vec<EntrySummary> {
    view.entries
        .iter()
        .map(|entry| EntrySummary {
            id: entry.id().clone(),
            title: entry.title().to_string(),
            status: entry.status(),
            media: entry.display_media().map(|m| m.uri),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            seed,
            profile: ClientProfile {
                primary_latency_ms: (1, 5),
                enrich_latency_ms: (1, 20),
                ..ClientProfile::default()
            },
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn stress_plan_is_reproducible() {
        let a = stress_plan(9, 20, Duration::from_millis(10));
        let b = stress_plan(9, 20, Duration::from_millis(10));
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
        assert!(a.iter().all(|q| q.delay_before <= Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn single_query_passes() {
        let report = run_plan(&quick_config(1), vec![PlannedQuery::immediate("eggs, flour")])
            .await
            .unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.started, 1);
        assert!(!report.final_view.is_empty());

        let entries = u64::try_from(report.final_view.len()).unwrap();
        assert_eq!(report.stats.substitutions, entries);
        assert_eq!(report.calls.substitution, entries);
        assert!(report
            .final_view
            .iter()
            .all(|e| e.status != EnrichmentStatus::Pending && e.media.is_some()));
    }

    #[tokio::test]
    async fn overlapping_queries_pass() {
        let plan = supersede_plan("eggs, flour", "rice, leeks", Duration::from_millis(2));
        let report = run_plan(&quick_config(2), plan).await.unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.queries, 2);
    }

    #[tokio::test]
    async fn stress_run_passes() {
        let mut config = quick_config(3);
        config.profile = config.profile.with_primary_rates(0.1, 0.1);
        let plan = stress_plan(3, 25, Duration::from_millis(5));

        let report = run_plan(&config, plan).await.unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.queries, 25);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = quick_config(4);
        config.feast = FeastConfig::new().with_max_concurrent(0);

        let result = run_plan(&config, Vec::new()).await;
        assert!(matches!(result, Err(FeastError::Config(_))));
    }

    #[test]
    fn text_report_shows_result() {
        let report = SimulatorReport {
            seed: 5,
            elapsed_ms: 12,
            stats: SimulatorStats::default(),
            observer: ObserverTally::default(),
            calls: ClientCalls::default(),
            final_view: Vec::new(),
            violations: vec![Violation::Unsettled {
                tag: StoreTag(1),
            }],
        };
        let text = report.generate_text();
        assert!(text.contains("Seed: 5"));
        assert!(text.contains("0 substitution"));
        assert!(text.contains("=== Violations ==="));
        assert!(text.ends_with("=== Result: FAIL ===\n"));
    }
}
