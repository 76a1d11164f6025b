//! Dual-model semantic search and comparison engine for the MedQuAD
//! medical question/answer dataset.
//!
//! The engine retrieves question/answer documents three ways (two
//! sentence-embedding models with different capacity, plus BM25 keyword
//! ranking) and can compare any two methods on the same query:
//! result overlap, timing, and per-method average scores.
//!
//! The two building blocks are injected rather than global: a
//! [`search::Embedder`] per vector collection and one
//! [`store::RetrievalStore`]. [`store::MemoryStore`] runs everything
//! in-process; [`store::QdrantStore`] keeps the vector collections in a
//! Qdrant deployment.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medquad_search::{
//!     Collection, HashEmbedder, QuerySpec, SearchCoordinator, SearchMethod,
//!     MemoryStore,
//! };
//!
//! # async fn run() -> medquad_search::Result<()> {
//! let coordinator = SearchCoordinator::builder(Arc::new(MemoryStore::new()))
//!     .embedder(Collection::General, Arc::new(HashEmbedder::new(384)))
//!     .build();
//!
//! let spec = QuerySpec::new("symptoms of diabetes", SearchMethod::SemanticGeneral, 5);
//! let response = coordinator.search(&spec).await?;
//! for result in &response.results {
//!     println!("{}: {}", result.score, result.document.question);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod search;
pub mod store;

pub use config::{IngestConfig, ModelSlot, SearchConfig, SearchDefaults, StoreConfig};
pub use error::{Error, Result};
pub use ingest::{IngestRecord, IngestSummary, Ingestor};
pub use search::{
    ComparisonEvaluator, ComparisonReport, Document, Embedder, EmbeddingService,
    EmbeddingServiceConfig, HashEmbedder, MethodRun, Overlap, QuerySpec, Score, ScoreKind,
    ScoredResult, SearchCoordinator, SearchLimits, SearchMethod, SearchResponse, SearchTiming,
    ThreeWayReport,
};
pub use store::{
    Collection, LexicalHit, MemoryStore, QdrantStore, QdrantStoreConfig, RetrievalStore,
    StoreStats, StoredRecord, VectorHit,
};
