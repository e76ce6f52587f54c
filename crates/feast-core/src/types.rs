//! Core types for Feast
//!
//! Defines the fundamental types for the orchestrator:
//! - Query and store identifiers
//! - Recipe candidates as produced by the generation client
//! - Enriched entries as held by the collection store
//! - Substitution requests and answers

use crate::error::EnrichmentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;
use url::Url;

/// Base URL for placeholder images shown for failed entries
pub const PLACEHOLDER_BASE_URL: &str = "https://picsum.photos/";

/// Unique query identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Ulid);

impl QueryId {
    /// Generate new query ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation marker of a collection store
///
/// Every `start()` takes the next tag. Results carrying an older tag
/// belong to a superseded store and are never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTag(pub u64);

impl StoreTag {
    /// Tag of the empty store that exists before any query
    pub const INITIAL: StoreTag = StoreTag(0);

    /// Following generation
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StoreTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Identifier of an entry within one collection store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap an already-assigned identifier (lookups, deserialized input)
    #[inline]
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// User query (free-text ingredient list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeQuery {
    /// Ingredients as typed by the user
    pub ingredients: String,
}

impl RecipeQuery {
    /// Create new query
    #[inline]
    #[must_use]
    pub fn new(ingredients: impl Into<String>) -> Self {
        Self {
            ingredients: ingredients.into(),
        }
    }

    /// Query text with surrounding whitespace removed
    #[inline]
    #[must_use]
    pub fn trimmed(&self) -> &str {
        self.ingredients.trim()
    }
}

/// Recipe suggestion as returned by the primary generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Recipe title
    pub title: String,
    /// Short description
    pub description: String,
    /// Preparation steps in order
    #[serde(default)]
    pub steps: Vec<String>,
    /// Link to the full recipe, when the model provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Candidate {
    /// Create new candidate
    #[inline]
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            steps: Vec::new(),
            link: None,
        }
    }

    /// With preparation steps
    #[inline]
    #[must_use]
    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// With link to the full recipe
    #[inline]
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Where a piece of media came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSource {
    /// Produced by the enrichment call
    Generated,
    /// Deterministic stand-in for a failed enrichment
    Placeholder,
}

/// Illustrative media attached to an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Image location (usually a `data:` URI)
    pub uri: String,
    /// Origin of the image
    pub source: MediaSource,
}

impl Media {
    /// Media produced by the enrichment call
    #[inline]
    #[must_use]
    pub fn generated(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            source: MediaSource::Generated,
        }
    }

    /// Placeholder image seeded by the recipe title
    ///
    /// The title is percent-encoded as a single path segment, so the same
    /// title always maps to the same picture.
    #[must_use]
    pub fn placeholder_for(title: &str) -> Option<Self> {
        let mut url = Url::parse(PLACEHOLDER_BASE_URL).ok()?;
        url.path_segments_mut()
            .ok()?
            .clear()
            .push("seed")
            .push(title)
            .push("400")
            .push("300");
        Some(Self {
            uri: url.into(),
            source: MediaSource::Placeholder,
        })
    }

    /// Check if the URI carries the image inline
    #[inline]
    #[must_use]
    pub fn is_data_uri(&self) -> bool {
        self.uri.starts_with("data:")
    }
}

/// Result of one enrichment call
pub type EnrichmentOutcome = Result<Media, EnrichmentError>;

/// Enrichment state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnrichmentStatus {
    /// Enrichment outstanding
    Pending,
    /// Media attached
    Ready,
    /// Enrichment failed or timed out
    Failed,
}

impl EnrichmentStatus {
    /// Ready and Failed accept no further transition
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.pad(label)
    }
}

/// Entry held by the collection store
///
/// Fields are private so `media` can only be present when the status is
/// `Ready`, and the status can only leave `Pending` once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedCandidate {
    id: EntryId,
    candidate: Candidate,
    status: EnrichmentStatus,
    media: Option<Media>,
}

impl EnrichedCandidate {
    /// Create a pending entry
    #[inline]
    #[must_use]
    pub fn pending(id: EntryId, candidate: Candidate) -> Self {
        Self {
            id,
            candidate,
            status: EnrichmentStatus::Pending,
            media: None,
        }
    }

    /// Entry identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &EntryId {
        &self.id
    }

    /// Candidate data as returned by the generation client
    #[inline]
    #[must_use]
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    /// Recipe title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.candidate.title
    }

    /// Current enrichment status
    #[inline]
    #[must_use]
    pub fn status(&self) -> EnrichmentStatus {
        self.status
    }

    /// Generated media, present only when `Ready`
    #[inline]
    #[must_use]
    pub fn media(&self) -> Option<&Media> {
        self.media.as_ref()
    }

    /// Media a renderer should show for this entry
    ///
    /// Pending entries have nothing to show yet. Failed entries get a
    /// placeholder so they stay distinguishable without breaking the list.
    #[must_use]
    pub fn display_media(&self) -> Option<Media> {
        match self.status {
            EnrichmentStatus::Pending => None,
            EnrichmentStatus::Ready => self.media.clone(),
            EnrichmentStatus::Failed => Media::placeholder_for(&self.candidate.title),
        }
    }

    /// Apply an enrichment outcome
    ///
    /// Returns `false` without touching the entry if it is already terminal.
    pub(crate) fn settle(&mut self, outcome: EnrichmentOutcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match outcome {
            Ok(media) => {
                self.status = EnrichmentStatus::Ready;
                self.media = Some(media);
            }
            Err(_) => {
                self.status = EnrichmentStatus::Failed;
                self.media = None;
            }
        }
        true
    }
}

/// Substitution request for one ingredient of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRequest {
    /// Recipe title
    pub recipe_title: String,
    /// Recipe description
    pub recipe_description: String,
    /// Recipe steps
    pub recipe_steps: Vec<String>,
    /// Ingredient the user is missing
    pub ingredient: String,
}

impl SubstitutionRequest {
    /// Build a request for an entry's recipe
    #[must_use]
    pub fn for_entry(entry: &EnrichedCandidate, ingredient: impl Into<String>) -> Self {
        let candidate = entry.candidate();
        Self {
            recipe_title: candidate.title.clone(),
            recipe_description: candidate.description.clone(),
            recipe_steps: candidate.steps.clone(),
            ingredient: ingredient.into(),
        }
    }
}

/// Suggested replacement for a missing ingredient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    /// Ingredient that was asked about
    pub original: String,
    /// Replacement, with quantity when relevant
    pub alternative: String,
    /// Impact on flavour or preparation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
