//! Engine configuration.
//!
//! Loaded from a TOML file with sensible defaults for every section, so a
//! missing config file is never fatal. The defaults reproduce the layout
//! the MedQuAD corpus was indexed with: a general-purpose 384-dimension
//! model and a higher-capacity 768-dimension model in separate
//! collections, plus a shared keyword index.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::search::{
    DEFAULT_GENERAL_DIM, DEFAULT_GENERAL_MODEL, DEFAULT_MEDICAL_DIM, DEFAULT_MEDICAL_MODEL,
};

/// Default number of results per search.
pub const DEFAULT_TOP_K: usize = 5;

/// Hard cap on requested result counts; larger values are clamped.
pub const DEFAULT_MAX_TOP_K: usize = 100;

/// Default bound on a single embedding call.
pub const DEFAULT_EMBED_TIMEOUT_MS: u64 = 30_000;

/// Default bound on a single retrieval call.
pub const DEFAULT_RETRIEVAL_TIMEOUT_MS: u64 = 10_000;

/// Top-level configuration for the search engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Retrieval store settings.
    pub store: StoreConfig,
    /// Embedding model slots.
    pub models: ModelsConfig,
    /// Query-time defaults and limits.
    pub search: SearchDefaults,
    /// Bulk-load batch sizes.
    pub ingest: IngestConfig,
}

/// Retrieval store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Qdrant endpoint URL (gRPC port).
    pub url: String,
    /// Optional API key for managed Qdrant deployments.
    pub api_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        }
    }
}

/// One embedding model slot: which model fills it and the dimension its
/// collection was created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSlot {
    /// Model name as understood by the embedding backend.
    pub model: String,
    /// Expected vector dimension; vectors of any other length are rejected.
    pub dimension: usize,
}

/// The two semantic model slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// General-purpose model (fast, broad coverage).
    pub general: ModelSlot,
    /// Higher-capacity model for the medical collection.
    pub medical: ModelSlot,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            general: ModelSlot {
                model: DEFAULT_GENERAL_MODEL.to_string(),
                dimension: DEFAULT_GENERAL_DIM,
            },
            medical: ModelSlot {
                model: DEFAULT_MEDICAL_MODEL.to_string(),
                dimension: DEFAULT_MEDICAL_DIM,
            },
        }
    }
}

/// Query-time defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    /// Default result count when the caller does not specify one.
    pub top_k: usize,
    /// Requested result counts above this are clamped, not errored.
    pub max_top_k: usize,
    /// Bound on a single embedding call, in milliseconds.
    pub embed_timeout_ms: u64,
    /// Bound on a single retrieval call, in milliseconds.
    pub retrieval_timeout_ms: u64,
    /// Capacity of the optional query cache; 0 disables it.
    pub cache_capacity: u64,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_top_k: DEFAULT_MAX_TOP_K,
            embed_timeout_ms: DEFAULT_EMBED_TIMEOUT_MS,
            retrieval_timeout_ms: DEFAULT_RETRIEVAL_TIMEOUT_MS,
            cache_capacity: 0,
        }
    }
}

impl SearchDefaults {
    /// Embedding time bound as a [`Duration`].
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    /// Retrieval time bound as a [`Duration`].
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

/// Bulk-load batch sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Documents embedded per model call.
    pub embedding_batch_size: usize,
    /// Records upserted per store call.
    pub upsert_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: 32,
            upsert_batch_size: 100,
        }
    }
}

impl SearchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SearchConfig =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that every section holds usable values.
    pub fn validate(&self) -> Result<()> {
        if self.models.general.dimension == 0 || self.models.medical.dimension == 0 {
            return Err(Error::Config(
                "model dimensions must be greater than 0".to_string(),
            ));
        }
        if self.search.top_k == 0 {
            return Err(Error::Config("search.top_k must be at least 1".to_string()));
        }
        if self.search.max_top_k < self.search.top_k {
            return Err(Error::Config(
                "search.max_top_k must be >= search.top_k".to_string(),
            ));
        }
        if self.search.embed_timeout_ms == 0 || self.search.retrieval_timeout_ms == 0 {
            return Err(Error::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.ingest.embedding_batch_size == 0 || self.ingest.upsert_batch_size == 0 {
            return Err(Error::Config(
                "ingest batch sizes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
