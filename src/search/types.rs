//! Core search data model.
//!
//! Scores are deliberately a tagged type: cosine similarity and full-text
//! rank live on different scales, and results produced by different
//! methods must never be compared numerically. Only identifier sets and
//! relative rankings are comparable across methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Collection;

/// One immutable MedQuAD question/answer record.
///
/// Created during bulk load and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, unique per store.
    pub id: u64,
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Category label (e.g. "Symptoms", "Treatment").
    pub category: String,
    /// Question-type label from the source dataset.
    pub qtype: String,
    /// Source attribution.
    pub source: String,
    /// Unix timestamp recorded when the document was loaded.
    pub created_at: Option<u64>,
}

impl Document {
    /// Create a document with the default source attribution.
    pub fn new(
        id: u64,
        question: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
        qtype: impl Into<String>,
    ) -> Self {
        Self {
            id,
            question: question.into(),
            answer: answer.into(),
            category: category.into(),
            qtype: qtype.into(),
            source: "MedQuAD".to_string(),
            created_at: None,
        }
    }

    /// Question and answer joined for lexical indexing and embedding input.
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.question, self.answer)
    }
}

/// Which scale a score lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Cosine similarity in [-1, 1]; higher is better.
    Similarity,
    /// Non-negative full-text rank statistic; higher is better.
    Rank,
}

/// A relevance score tagged with its scale.
///
/// Two scores are only comparable when they share a kind; [`Score::cmp_same_kind`]
/// is the single place that ordering happens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Cosine similarity.
    Similarity(f32),
    /// Full-text rank.
    Rank(f32),
}

impl Score {
    /// The scale this score lives on.
    pub fn kind(&self) -> ScoreKind {
        match self {
            Score::Similarity(_) => ScoreKind::Similarity,
            Score::Rank(_) => ScoreKind::Rank,
        }
    }

    /// Raw numeric value. Only meaningful relative to other scores of the
    /// same kind.
    pub fn value(&self) -> f32 {
        match self {
            Score::Similarity(v) | Score::Rank(v) => *v,
        }
    }

    /// Total order between two scores of the same kind; higher is better
    /// for both scales.
    ///
    /// Returns `None` when the kinds differ, which callers must treat as
    /// a programming error rather than pick an arbitrary order.
    pub fn cmp_same_kind(&self, other: &Score) -> Option<std::cmp::Ordering> {
        if self.kind() != other.kind() {
            return None;
        }
        Some(self.value().total_cmp(&other.value()))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Similarity(v) => write!(f, "similarity {:.4}", v),
            Score::Rank(v) => write!(f, "rank {:.4}", v),
        }
    }
}

/// The three retrieval methods the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMethod {
    /// Full-text keyword ranking.
    Keyword,
    /// General-purpose sentence embeddings.
    SemanticGeneral,
    /// Higher-capacity embeddings for the medical collection.
    SemanticMedical,
}

impl SearchMethod {
    /// The vector collection this method queries, if it is semantic.
    pub fn collection(&self) -> Option<Collection> {
        match self {
            SearchMethod::Keyword => None,
            SearchMethod::SemanticGeneral => Some(Collection::General),
            SearchMethod::SemanticMedical => Some(Collection::Medical),
        }
    }

    /// The score scale this method produces.
    pub fn score_kind(&self) -> ScoreKind {
        match self {
            SearchMethod::Keyword => ScoreKind::Rank,
            SearchMethod::SemanticGeneral | SearchMethod::SemanticMedical => ScoreKind::Similarity,
        }
    }

    /// Short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            SearchMethod::Keyword => "keyword",
            SearchMethod::SemanticGeneral => "semantic-general",
            SearchMethod::SemanticMedical => "semantic-medical",
        }
    }

    /// All supported methods, in comparison order.
    pub const ALL: [SearchMethod; 3] = [
        SearchMethod::Keyword,
        SearchMethod::SemanticGeneral,
        SearchMethod::SemanticMedical,
    ];
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SearchMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" | "fulltext" | "lexical" => Ok(SearchMethod::Keyword),
            "semantic-general" | "general" | "minilm" => Ok(SearchMethod::SemanticGeneral),
            "semantic-medical" | "medical" => Ok(SearchMethod::SemanticMedical),
            other => Err(Error::InvalidQuery(format!(
                "unknown search method '{}'",
                other
            ))),
        }
    }
}

/// One search request. Constructed per request and discarded after use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Free-text query.
    pub query: String,
    /// Retrieval method.
    pub method: SearchMethod,
    /// Requested result count.
    pub top_k: usize,
    /// Optional exact-match category restriction, applied before ranking.
    pub category: Option<String>,
    /// Optional similarity floor for semantic methods.
    pub min_similarity: Option<f32>,
}

impl QuerySpec {
    /// Create a spec with no filters.
    pub fn new(query: impl Into<String>, method: SearchMethod, top_k: usize) -> Self {
        Self {
            query: query.into(),
            method,
            top_k,
            category: None,
            min_similarity: None,
        }
    }

    /// Restrict results to an exact category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Drop semantic results below a similarity floor.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    /// Reject unusable requests: empty/whitespace query text, or k = 0.
    ///
    /// A query with no matches returns an empty list; a query with no
    /// text is an error. The two cases are never conflated.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".to_string()));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// A document with the score and method that retrieved it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    /// The retrieved document.
    pub document: Document,
    /// Relevance score, tagged with its scale.
    pub score: Score,
    /// The method that produced this result.
    pub method: SearchMethod,
}

/// Wall-clock timing for one search, in float milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SearchTiming {
    /// Time spent encoding the query; `None` for keyword searches.
    pub embed_ms: Option<f64>,
    /// Time spent in the retrieval store.
    pub retrieval_ms: f64,
    /// Total elapsed time including conversion and post-processing.
    pub total_ms: f64,
}

/// The outcome of one search: an ordered result list plus timing.
///
/// An empty result list is a valid terminal state, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The method that ran.
    pub method: SearchMethod,
    /// Results, sorted by score descending, at most k entries, all
    /// identifiers distinct.
    pub results: Vec<ScoredResult>,
    /// Phase timing.
    pub timing: SearchTiming,
    /// Whether this response was served from the query cache.
    pub from_cache: bool,
}

impl SearchResponse {
    /// Identifiers of the returned documents, in rank order.
    pub fn ids(&self) -> Vec<u64> {
        self.results.iter().map(|r| r.document.id).collect()
    }

    /// Average score over the result list, tagged with the method's
    /// scale. An empty list averages to 0.0 in that scale; this value is
    /// only produced from a successful search, never substituted for a
    /// failed one.
    pub fn avg_score(&self) -> Score {
        let mean = if self.results.is_empty() {
            0.0
        } else {
            let sum: f32 = self.results.iter().map(|r| r.score.value()).sum();
            sum / self.results.len() as f32
        };
        match self.method.score_kind() {
            ScoreKind::Similarity => Score::Similarity(mean),
            ScoreKind::Rank => Score::Rank(mean),
        }
    }
}
