//! Ranked retrieval store.
//!
//! The store answers two shapes of query:
//! - `nearest`: top-k by ascending cosine distance against one vector
//!   collection;
//! - `rank`: top-k by descending full-text rank over the keyword index.
//!
//! Every backend speaks one dialect: cosine distance for vectors,
//! converted to similarity only by the coordinator, and Okapi BM25 for
//! keyword rank. Collections are addressed by [`Collection`], never by
//! raw strings.

mod bm25;
mod memory;
mod qdrant;

pub use bm25::Bm25Index;
pub use memory::MemoryStore;
pub use qdrant::{QdrantStore, QdrantStoreConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::types::Document;

/// The vector collections the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// General-purpose embeddings (384 dimensions by default).
    General,
    /// Higher-capacity medical embeddings (768 dimensions by default).
    Medical,
}

impl Collection {
    /// Backend collection name.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::General => "medquad_general",
            Collection::Medical => "medquad_medical",
        }
    }

    /// All known collections.
    pub const ALL: [Collection; 2] = [Collection::General, Collection::Medical];
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A document paired with the vector stored for one collection.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// The document itself.
    pub document: Document,
    /// Unit-normalized embedding for the target collection.
    pub vector: Vec<f32>,
}

/// One hit from a vector query. Distance is cosine distance; lower is
/// closer.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The stored document.
    pub document: Document,
    /// Cosine distance to the query vector.
    pub distance: f32,
}

/// One hit from a keyword query. Rank is a BM25 statistic; higher is
/// better.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    /// The stored document.
    pub document: Document,
    /// Full-text rank score.
    pub rank: f32,
}

/// Corpus statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total stored documents.
    pub documents: usize,
    /// Category names with their document counts, largest first.
    pub categories: Vec<(String, usize)>,
}

/// A ranked retrieval backend.
///
/// Query operations are read-only: no search mutates store state.
/// Category filters restrict the candidate set before ranking, so they
/// change which k survive; an unrecognized category yields an empty list,
/// not an error.
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Insert or replace records in one vector collection, also feeding
    /// the keyword index.
    async fn upsert(&self, collection: Collection, records: Vec<StoredRecord>) -> Result<()>;

    /// Top-k documents by ascending cosine distance to `vector`.
    async fn nearest(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<VectorHit>>;

    /// Top-k documents by descending full-text rank for `query`.
    ///
    /// Returns an empty list when no token matches.
    async fn rank(&self, query: &str, k: usize, category: Option<&str>) -> Result<Vec<LexicalHit>>;

    /// Distinct category labels, sorted.
    async fn categories(&self) -> Result<Vec<String>>;

    /// Document count and per-category distribution.
    async fn stats(&self) -> Result<StoreStats>;
}
