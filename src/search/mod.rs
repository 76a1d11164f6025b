//! Search core: coordination, comparison, and embeddings.
//!
//! Provides dual-model semantic search over the MedQuAD corpus using:
//! - FastEmbed for embedding generation (ONNX-based, lightweight)
//! - a ranked retrieval store for vector similarity and keyword rank
//! - a comparison evaluator for side-by-side method analysis
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Query text    │────▶│ SearchCoordinator│
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!                   semantic       │       keyword
//!                  ┌───────────────┴──────────────┐
//!                  ▼                              ▼
//!          ┌──────────────┐               ┌──────────────┐
//!          │   Embedder   │               │  BM25 Index  │
//!          │ (unit vector)│               │  (keyword)   │
//!          └──────┬───────┘               └──────┬───────┘
//!                 ▼                              │
//!          ┌──────────────┐                      │
//!          │ Vector Index │                      │
//!          │  (cosine)    │                      │
//!          └──────┬───────┘                      │
//!                 └──────────────┬───────────────┘
//!                                ▼
//!                       ┌────────────────┐
//!                       │ ScoredResults  │
//!                       │  + timing      │
//!                       └────────┬───────┘
//!                                ▼
//!                       ┌────────────────┐
//!                       │  Comparison    │
//!                       │  Evaluator     │
//!                       └────────────────┘
//! ```

pub mod compare;
pub mod coordinator;
pub mod embedding;
pub mod types;

pub use compare::{ComparisonEvaluator, ComparisonReport, MethodRun, Overlap, ThreeWayReport};
pub use coordinator::{SearchCoordinator, SearchCoordinatorBuilder, SearchLimits};
pub use embedding::{Embedder, EmbeddingService, EmbeddingServiceConfig, HashEmbedder};
pub use types::{
    Document, QuerySpec, Score, ScoreKind, ScoredResult, SearchMethod, SearchResponse,
    SearchTiming,
};

/// Default general-purpose model (good balance of speed and quality).
pub const DEFAULT_GENERAL_MODEL: &str = "all-MiniLM-L6-v2";

/// Embedding dimension of the default general model.
pub const DEFAULT_GENERAL_DIM: usize = 384;

/// Default model for the medical collection (higher capacity; the slot
/// accepts any configured model with a matching collection dimension).
pub const DEFAULT_MEDICAL_MODEL: &str = "bge-base-en-v1.5";

/// Embedding dimension of the default medical model.
pub const DEFAULT_MEDICAL_DIM: usize = 768;
