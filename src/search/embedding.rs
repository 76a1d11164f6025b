//! Embedding providers.
//!
//! Maps query and document text to unit-length vectors:
//! - [`EmbeddingService`]: FastEmbed-backed ONNX models (downloads the
//!   model on first use)
//! - [`HashEmbedder`]: deterministic FNV-1a feature hashing, used as an
//!   offline fallback and as the test double
//!
//! Every provider L2-normalizes its output and validates it before
//! returning: wrong dimension, NaN components, or a norm outside the
//! unit tolerance are embedding failures, never silently passed through
//! to similarity ranking.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{Error, Result};

/// Tolerance on the L2 norm of a vector entering similarity computation.
pub const NORM_TOLERANCE: f32 = 1e-5;

/// An embedding provider: text in, unit vector out.
///
/// Deterministic for identical input and model version; no side effects.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider identity, used in error context.
    fn id(&self) -> &str;

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embed one text into a unit-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. The default defers to [`Embedder::embed`]
    /// one text at a time; backends with native batching override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Scale a vector to unit length in place. Returns the norm the vector
/// had before scaling; a zero norm leaves the vector untouched.
pub fn l2_normalize(vector: &mut [f32]) -> f32 {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    norm
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Check the postconditions on a vector produced for similarity search:
/// expected dimension, finite components, unit norm within
/// [`NORM_TOLERANCE`].
pub fn validate_unit_vector(provider: &str, vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::Embedding {
            provider: provider.to_string(),
            reason: format!("expected {} dimensions, got {}", dimension, vector.len()),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::Embedding {
            provider: provider.to_string(),
            reason: "vector contains non-finite components".to_string(),
        });
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if (norm - 1.0).abs() > NORM_TOLERANCE {
        return Err(Error::Embedding {
            provider: provider.to_string(),
            reason: format!("vector norm {} is not unit length", norm),
        });
    }
    Ok(())
}

/// Configuration for [`EmbeddingService`].
#[derive(Debug, Clone)]
pub struct EmbeddingServiceConfig {
    /// Model name (e.g. "all-MiniLM-L6-v2").
    pub model: String,
    /// Expected output dimension.
    pub dimension: usize,
    /// Show the model download progress bar on first use.
    pub show_download_progress: bool,
}

impl EmbeddingServiceConfig {
    /// Config for a named model slot.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            show_download_progress: false,
        }
    }
}

/// FastEmbed-backed embedding provider.
pub struct EmbeddingService {
    model: Arc<TextEmbedding>,
    config: EmbeddingServiceConfig,
}

impl EmbeddingService {
    /// Load the configured model. Downloads it (~90MB for the default
    /// models) on first use, so construction can take a while; callers
    /// decide when that cost is paid.
    pub fn new(config: EmbeddingServiceConfig) -> Result<Self> {
        let model_id = parse_model_name(&config.model)?;
        let options =
            InitOptions::new(model_id).with_show_download_progress(config.show_download_progress);
        let model = TextEmbedding::try_new(options).map_err(|e| Error::Embedding {
            provider: config.model.clone(),
            reason: format!("model load failed: {}", e),
        })?;
        Ok(Self {
            model: Arc::new(model),
            config,
        })
    }

    /// Run inference off the async runtime and normalize the outputs.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let provider = self.config.model.clone();
        let dimension = self.config.dimension;

        let vectors = tokio::task::spawn_blocking(move || {
            model.embed(texts, None).map_err(|e| Error::Embedding {
                provider: provider.clone(),
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| Error::Embedding {
            provider: self.config.model.clone(),
            reason: format!("embedding task failed: {}", e),
        })??;

        let mut out = Vec::with_capacity(vectors.len());
        for mut vector in vectors {
            let norm = l2_normalize(&mut vector);
            if norm == 0.0 {
                return Err(Error::Embedding {
                    provider: self.config.model.clone(),
                    reason: "model produced a zero vector".to_string(),
                });
            }
            validate_unit_vector(&self.config.model, &vector, dimension)?;
            out.push(vector);
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    fn id(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(vec![text.to_string()]).await?;
        vectors.pop().ok_or_else(|| Error::Embedding {
            provider: self.config.model.clone(),
            reason: "model returned no vector".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_texts(texts.to_vec()).await
    }
}

/// Map a configured model name onto FastEmbed's model set.
fn parse_model_name(name: &str) -> Result<EmbeddingModel> {
    let short = name.rsplit('/').next().unwrap_or(name);
    match short {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(Error::Config(format!(
            "unsupported embedding model '{}'",
            other
        ))),
    }
}

/// Deterministic feature-hashing embedder.
///
/// Buckets FNV-1a hashes of lowercased tokens into a fixed number of
/// dimensions and normalizes. No model download, no I/O; useful offline
/// and as a test double. Semantic quality is limited to token overlap.
pub struct HashEmbedder {
    id: String,
    dimension: usize,
}

impl HashEmbedder {
    /// Create a hash embedder with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            id: format!("fnv1a-hash-{}", dimension),
            dimension,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(token.to_lowercase().as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = l2_normalize(&mut vector);
        if norm == 0.0 {
            return Err(Error::Embedding {
                provider: self.id.clone(),
                reason: "text contains no tokens".to_string(),
            });
        }
        validate_unit_vector(&self.id, &vector, self.dimension)?;
        Ok(vector)
    }
}
