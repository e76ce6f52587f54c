//! Seeded stand-in for a generation backend
//!
//! Latencies, failures, and candidate lists are drawn from a seeded RNG,
//! so a run with the same seed asks the orchestrator the same questions.
//! Completion order still depends on the scheduler.

use async_trait::async_trait;
use feast_core::{
    Candidate, EnrichmentError, EnrichmentOutcome, GenerationClient, GenerationError, Media,
    RecipeQuery, Substitution, SubstitutionRequest,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const DISHES: &[&str] = &[
    "Skillet",
    "Soup",
    "Tart",
    "Stir-Fry",
    "Salad",
    "Frittata",
    "Curry",
    "Gratin",
    "Pancakes",
    "Risotto",
];

/// Behaviour of the simulated backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProfile {
    /// Primary call latency bounds (ms)
    pub primary_latency_ms: (u64, u64),
    /// Enrichment call latency bounds (ms)
    pub enrich_latency_ms: (u64, u64),
    /// Probability that the primary call fails
    pub primary_failure_rate: f64,
    /// Probability that the primary call returns no candidates
    pub no_results_rate: f64,
    /// Probability that one enrichment call fails
    pub enrich_failure_rate: f64,
    /// Most candidates returned for one query
    pub max_candidates: usize,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            primary_latency_ms: (20, 120),
            enrich_latency_ms: (30, 400),
            primary_failure_rate: 0.0,
            no_results_rate: 0.0,
            enrich_failure_rate: 0.1,
            max_candidates: 5,
        }
    }
}

impl ClientProfile {
    /// With enrichment failure probability (clamped to 0..=1)
    #[must_use]
    pub fn with_enrich_failure_rate(mut self, rate: f64) -> Self {
        self.enrich_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// With primary failure and empty-result probabilities (clamped to 0..=1)
    #[must_use]
    pub fn with_primary_rates(mut self, failure: f64, no_results: f64) -> Self {
        self.primary_failure_rate = failure.clamp(0.0, 1.0);
        self.no_results_rate = no_results.clamp(0.0, 1.0);
        self
    }
}

/// Calls served so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientCalls {
    /// `suggest_candidates` calls
    pub suggest: u64,
    /// `enrich_candidate` calls
    pub enrich: u64,
    /// `suggest_substitution` calls
    pub substitution: u64,
}

/// Generation client backed by a seeded RNG
pub struct SimulatedClient {
    profile: ClientProfile,
    rng: Mutex<StdRng>,
    suggest_calls: AtomicU64,
    enrich_calls: AtomicU64,
    substitution_calls: AtomicU64,
}

impl SimulatedClient {
    /// Create new client
    #[must_use]
    pub fn new(seed: u64, profile: ClientProfile) -> Self {
        Self {
            profile,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            suggest_calls: AtomicU64::new(0),
            enrich_calls: AtomicU64::new(0),
            substitution_calls: AtomicU64::new(0),
        }
    }

    /// Calls served so far
    #[must_use]
    pub fn calls(&self) -> ClientCalls {
        ClientCalls {
            suggest: self.suggest_calls.load(Ordering::Relaxed),
            enrich: self.enrich_calls.load(Ordering::Relaxed),
            substitution: self.substitution_calls.load(Ordering::Relaxed),
        }
    }

    fn latency(&self, bounds: (u64, u64)) -> Duration {
        let (low, high) = bounds;
        Duration::from_millis(self.rng.lock().random_range(ordered(low, high)))
    }

    fn roll(&self, probability: f64) -> bool {
        probability > 0.0 && self.rng.lock().random_bool(probability.min(1.0))
    }

    fn invent_candidates(&self, query: &RecipeQuery) -> Vec<Candidate> {
        let ingredients: Vec<&str> = query
            .trimmed()
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if ingredients.is_empty() {
            return Vec::new();
        }

        let mut rng = self.rng.lock();
        let count = rng.random_range(1..=self.profile.max_candidates.max(1));
        (0..count)
            .map(|_| {
                let main = ingredients[rng.random_range(0..ingredients.len())];
                let dish = DISHES[rng.random_range(0..DISHES.len())];
                let title = format!("{} {dish}", capitalize(main));
                Candidate::new(
                    title,
                    format!("A simple {} built around {main}.", dish.to_lowercase()),
                )
                .with_steps([
                    format!("Prepare the {main}"),
                    format!("Cook the {}", dish.to_lowercase()),
                    "Season and serve".to_string(),
                ])
            })
            .collect()
    }
}

#[async_trait]
impl GenerationClient for SimulatedClient {
    async fn suggest_candidates(
        &self,
        query: &RecipeQuery,
    ) -> Result<Vec<Candidate>, GenerationError> {
        self.suggest_calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency(self.profile.primary_latency_ms)).await;

        if self.roll(self.profile.primary_failure_rate) {
            return Err(GenerationError::Upstream("simulated outage".to_string()));
        }
        if self.roll(self.profile.no_results_rate) {
            return Ok(Vec::new());
        }
        Ok(self.invent_candidates(query))
    }

    async fn enrich_candidate(&self, candidate: &Candidate) -> EnrichmentOutcome {
        self.enrich_calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency(self.profile.enrich_latency_ms)).await;

        if self.roll(self.profile.enrich_failure_rate) {
            return Err(EnrichmentError::Upstream("simulated image failure".to_string()));
        }
        Ok(Media::generated(format!(
            "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg'><text>{}</text></svg>",
            candidate.title
        )))
    }

    async fn suggest_substitution(
        &self,
        request: &SubstitutionRequest,
    ) -> Result<Substitution, GenerationError> {
        self.substitution_calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency(self.profile.primary_latency_ms)).await;
        Ok(Substitution {
            original: request.ingredient.clone(),
            alternative: format!("more of whatever else goes into {}", request.recipe_title),
            notes: None,
        })
    }
}

fn ordered(a: u64, b: u64) -> RangeInclusive<u64> {
    if a <= b {
        a..=b
    } else {
        b..=a
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> ClientProfile {
        ClientProfile {
            primary_latency_ms: (0, 0),
            enrich_latency_ms: (0, 0),
            ..ClientProfile::default()
        }
    }

    #[tokio::test]
    async fn same_seed_same_candidates() {
        let query = RecipeQuery::new("eggs, flour, milk");
        let a = SimulatedClient::new(7, instant());
        let b = SimulatedClient::new(7, instant());

        let first = a.suggest_candidates(&query).await.unwrap();
        let second = b.suggest_candidates(&query).await.unwrap();

        assert!(!first.is_empty());
        assert!(first.len() <= 5);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn titles_use_query_ingredients() {
        let client = SimulatedClient::new(1, instant());
        let candidates = client
            .suggest_candidates(&RecipeQuery::new("leeks; potatoes"))
            .await
            .unwrap();

        assert!(candidates
            .iter()
            .all(|c| c.title.starts_with("Leeks") || c.title.starts_with("Potatoes")));
    }

    #[tokio::test]
    async fn certain_failure_always_fails() {
        let client = SimulatedClient::new(3, instant().with_enrich_failure_rate(1.0));
        let outcome = client
            .enrich_candidate(&Candidate::new("Leek Soup", "Warm"))
            .await;

        assert!(matches!(outcome, Err(EnrichmentError::Upstream(_))));
        assert_eq!(client.calls().enrich, 1);
    }

    #[tokio::test]
    async fn no_results_rate_empties_the_list() {
        let client = SimulatedClient::new(3, instant().with_primary_rates(0.0, 1.0));
        let candidates = client
            .suggest_candidates(&RecipeQuery::new("eggs"))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn substitution_names_the_recipe() {
        let client = SimulatedClient::new(5, instant());
        let entry = feast_core::EnrichedCandidate::pending(
            feast_core::EntryId::from_raw("leek-soup-0"),
            Candidate::new("Leek Soup", "Warm"),
        );
        let swap = client
            .suggest_substitution(&SubstitutionRequest::for_entry(&entry, "leeks"))
            .await
            .unwrap();

        assert_eq!(swap.original, "leeks");
        assert!(swap.alternative.contains("Leek Soup"));
        assert_eq!(client.calls().substitution, 1);
    }

    #[test]
    fn capitalize_handles_unicode() {
        assert_eq!(capitalize("élan"), "Élan");
        assert_eq!(capitalize(""), "");
    }
}
