//! Search coordination.
//!
//! The coordinator owns the encode → retrieve → score cycle for a single
//! query. It is constructed with its collaborators (one embedder per
//! vector collection, one retrieval store) rather than reaching for
//! globals, validates every request, bounds every external call with a
//! timeout, and enforces the result-list invariants regardless of what
//! the store returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use moka::future::Cache;
use tracing::{debug, warn};

use crate::config::SearchDefaults;
use crate::error::{Error, Result};
use crate::search::embedding::{validate_unit_vector, Embedder};
use crate::search::types::{
    QuerySpec, Score, ScoredResult, SearchMethod, SearchResponse, SearchTiming,
};
use crate::store::{Collection, RetrievalStore};

/// Operational bounds for the coordinator.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Requested result counts above this are clamped.
    pub max_top_k: usize,
    /// Bound on one embedding call.
    pub embed_timeout: std::time::Duration,
    /// Bound on one retrieval call.
    pub retrieval_timeout: std::time::Duration,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits::from(&SearchDefaults::default())
    }
}

impl From<&SearchDefaults> for SearchLimits {
    fn from(defaults: &SearchDefaults) -> Self {
        Self {
            max_top_k: defaults.max_top_k,
            embed_timeout: defaults.embed_timeout(),
            retrieval_timeout: defaults.retrieval_timeout(),
        }
    }
}

/// Cache key covering every field of the spec that changes results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    method: SearchMethod,
    top_k: usize,
    category: Option<String>,
    min_similarity_bits: Option<u32>,
}

impl CacheKey {
    fn new(spec: &QuerySpec, effective_k: usize) -> Self {
        Self {
            query: spec.query.clone(),
            method: spec.method,
            top_k: effective_k,
            category: spec.category.clone(),
            min_similarity_bits: spec.min_similarity.map(f32::to_bits),
        }
    }
}

/// Builder for [`SearchCoordinator`].
pub struct SearchCoordinatorBuilder {
    store: Arc<dyn RetrievalStore>,
    embedders: HashMap<Collection, Arc<dyn Embedder>>,
    limits: SearchLimits,
    cache_capacity: u64,
}

impl SearchCoordinatorBuilder {
    /// Register the embedder serving one vector collection.
    pub fn embedder(mut self, collection: Collection, embedder: Arc<dyn Embedder>) -> Self {
        self.embedders.insert(collection, embedder);
        self
    }

    /// Override the operational bounds.
    pub fn limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Enable the query cache with the given capacity. The cache keys on
    /// the full query spec; call [`SearchCoordinator::invalidate_cache`]
    /// after rebuilding the store.
    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Build the coordinator.
    pub fn build(self) -> SearchCoordinator {
        SearchCoordinator {
            store: self.store,
            embedders: self.embedders,
            limits: self.limits,
            cache: (self.cache_capacity > 0).then(|| Cache::new(self.cache_capacity)),
        }
    }
}

/// Orchestrates encode → retrieve → score for one query at a time.
///
/// Stateless between requests apart from the optional response cache;
/// safe to share behind an [`Arc`].
pub struct SearchCoordinator {
    store: Arc<dyn RetrievalStore>,
    embedders: HashMap<Collection, Arc<dyn Embedder>>,
    limits: SearchLimits,
    cache: Option<Cache<CacheKey, Arc<SearchResponse>>>,
}

impl SearchCoordinator {
    /// Start building a coordinator around a retrieval store.
    pub fn builder(store: Arc<dyn RetrievalStore>) -> SearchCoordinatorBuilder {
        SearchCoordinatorBuilder {
            store,
            embedders: HashMap::new(),
            limits: SearchLimits::default(),
            cache_capacity: 0,
        }
    }

    /// The store this coordinator queries.
    pub fn store(&self) -> &Arc<dyn RetrievalStore> {
        &self.store
    }

    /// Run one search.
    ///
    /// Returns at most k results, sorted by score descending with ties
    /// broken by ascending id, identifiers distinct. An empty list is a
    /// valid outcome; an unusable request is an [`Error::InvalidQuery`].
    pub async fn search(&self, spec: &QuerySpec) -> Result<SearchResponse> {
        spec.validate()?;

        let mut k = spec.top_k;
        if k > self.limits.max_top_k {
            debug!(
                requested = spec.top_k,
                clamped = self.limits.max_top_k,
                "clamping requested result count"
            );
            k = self.limits.max_top_k;
        }

        let cache_key = CacheKey::new(spec, k);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key).await {
                debug!(query = %spec.query, method = %spec.method, "query cache hit");
                let mut response = (*hit).clone();
                response.from_cache = true;
                return Ok(response);
            }
        }

        let request_id = uuid::Uuid::new_v4();
        debug!(%request_id, query = %spec.query, method = %spec.method, k, "search started");

        let start = Instant::now();
        let (results, embed_ms, retrieval_ms) = match spec.method.collection() {
            Some(collection) => self.semantic_search(spec, collection, k).await?,
            None => self.keyword_search(spec, k).await?,
        };

        let results = finalize(results, k);
        let response = SearchResponse {
            method: spec.method,
            results,
            timing: SearchTiming {
                embed_ms,
                retrieval_ms,
                total_ms: start.elapsed().as_secs_f64() * 1000.0,
            },
            from_cache: false,
        };
        debug!(
            %request_id,
            results = response.results.len(),
            total_ms = response.timing.total_ms,
            "search completed"
        );

        if let Some(cache) = &self.cache {
            cache.insert(cache_key, Arc::new(response.clone())).await;
        }
        Ok(response)
    }

    /// Drop every cached response. Required after the underlying store
    /// is rebuilt.
    pub async fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    async fn semantic_search(
        &self,
        spec: &QuerySpec,
        collection: Collection,
        k: usize,
    ) -> Result<(Vec<ScoredResult>, Option<f64>, f64)> {
        let embedder = self.embedders.get(&collection).ok_or_else(|| {
            Error::Config(format!(
                "no embedder configured for collection '{}'",
                collection
            ))
        })?;

        let embed_start = Instant::now();
        let vector = tokio::time::timeout(self.limits.embed_timeout, embedder.embed(&spec.query))
            .await
            .map_err(|_| Error::EmbeddingTimeout {
                provider: embedder.id().to_string(),
                timeout: self.limits.embed_timeout,
            })??;
        let embed_ms = embed_start.elapsed().as_secs_f64() * 1000.0;

        // The embedder contract says unit length; trust nothing that
        // feeds cosine ranking.
        validate_unit_vector(embedder.id(), &vector, embedder.dimension())?;

        let retrieval_start = Instant::now();
        let hits = tokio::time::timeout(
            self.limits.retrieval_timeout,
            self.store
                .nearest(collection, &vector, k, spec.category.as_deref()),
        )
        .await
        .map_err(|_| Error::RetrievalTimeout(self.limits.retrieval_timeout))??;
        let retrieval_ms = retrieval_start.elapsed().as_secs_f64() * 1000.0;

        let min_similarity = spec.min_similarity.unwrap_or(f32::MIN);
        let results = hits
            .into_iter()
            .map(|hit| ScoredResult {
                score: Score::Similarity(1.0 - hit.distance),
                document: hit.document,
                method: spec.method,
            })
            .filter(|r| r.score.value() >= min_similarity)
            .collect();

        Ok((results, Some(embed_ms), retrieval_ms))
    }

    async fn keyword_search(
        &self,
        spec: &QuerySpec,
        k: usize,
    ) -> Result<(Vec<ScoredResult>, Option<f64>, f64)> {
        let retrieval_start = Instant::now();
        let hits = tokio::time::timeout(
            self.limits.retrieval_timeout,
            self.store.rank(&spec.query, k, spec.category.as_deref()),
        )
        .await
        .map_err(|_| Error::RetrievalTimeout(self.limits.retrieval_timeout))??;
        let retrieval_ms = retrieval_start.elapsed().as_secs_f64() * 1000.0;

        if hits.is_empty() {
            debug!(query = %spec.query, "keyword search matched no tokens");
        }

        let results = hits
            .into_iter()
            .map(|hit| ScoredResult {
                score: Score::Rank(hit.rank),
                document: hit.document,
                method: spec.method,
            })
            .collect();

        Ok((results, None, retrieval_ms))
    }
}

/// Enforce the result-list invariants: sorted by score descending with
/// id tie-break, no duplicate identifiers, at most k entries.
fn finalize(mut results: Vec<ScoredResult>, k: usize) -> Vec<ScoredResult> {
    results.sort_by(|a, b| {
        b.score
            .value()
            .total_cmp(&a.score.value())
            .then_with(|| a.document.id.cmp(&b.document.id))
    });

    let mut seen = std::collections::HashSet::new();
    let before = results.len();
    results.retain(|r| seen.insert(r.document.id));
    if results.len() != before {
        warn!(
            dropped = before - results.len(),
            "store returned duplicate identifiers"
        );
    }

    results.truncate(k);
    results
}
