//! In-memory retrieval store.
//!
//! Exact cosine scan over per-collection unit vectors plus the shared
//! BM25 keyword index. Backs the test suite and the offline demo path;
//! the scan is exhaustive, so results are exact rather than approximate.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    Bm25Index, Collection, LexicalHit, RetrievalStore, StoreStats, StoredRecord, VectorHit,
};
use crate::error::{Error, Result};
use crate::search::types::Document;

#[derive(Default)]
struct Inner {
    documents: HashMap<u64, Document>,
    vectors: HashMap<Collection, HashMap<u64, Vec<f32>>>,
    keyword: Bm25Index,
}

/// Exact in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.documents.is_empty()
    }
}

#[async_trait]
impl RetrievalStore for MemoryStore {
    async fn upsert(&self, collection: Collection, records: Vec<StoredRecord>) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut inner = self.inner.write().await;
        for record in records {
            let mut document = record.document;
            if document.created_at.is_none() {
                document.created_at = Some(now);
            }
            inner.keyword.insert(document.id, &document.combined_text());
            inner
                .vectors
                .entry(collection)
                .or_default()
                .insert(document.id, record.vector);
            inner.documents.insert(document.id, document);
        }
        Ok(())
    }

    async fn nearest(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let inner = self.inner.read().await;
        let Some(vectors) = inner.vectors.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        for (id, stored) in vectors {
            let Some(document) = inner.documents.get(id) else {
                continue;
            };
            if let Some(category) = category {
                if document.category != category {
                    continue;
                }
            }
            if stored.len() != vector.len() {
                return Err(Error::Retrieval(format!(
                    "dimension mismatch in collection '{}': stored {}, query {}",
                    collection,
                    stored.len(),
                    vector.len()
                )));
            }
            let dot: f32 = stored.iter().zip(vector).map(|(a, b)| a * b).sum();
            hits.push(VectorHit {
                document: document.clone(),
                distance: 1.0 - dot,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn rank(&self, query: &str, k: usize, category: Option<&str>) -> Result<Vec<LexicalHit>> {
        let inner = self.inner.read().await;
        let documents = &inner.documents;
        let ranked = inner.keyword.search(query, k, |id| match category {
            Some(category) => documents
                .get(&id)
                .is_some_and(|d| d.category == category),
            None => true,
        });

        Ok(ranked
            .into_iter()
            .filter_map(|hit| {
                documents.get(&hit.id).map(|document| LexicalHit {
                    document: document.clone(),
                    rank: hit.score,
                })
            })
            .collect())
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut categories: Vec<String> = inner
            .documents
            .values()
            .map(|d| d.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().await;
        let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
        for document in inner.documents.values() {
            *distribution.entry(document.category.clone()).or_insert(0) += 1;
        }
        let mut categories: Vec<(String, usize)> = distribution.into_iter().collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(StoreStats {
            documents: inner.documents.len(),
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::l2_normalize;

    fn doc(id: u64, question: &str, category: &str) -> Document {
        Document::new(id, question, format!("Answer for {question}"), category, "information")
    }

    fn unit(components: &[f32]) -> Vec<f32> {
        let mut v = components.to_vec();
        l2_normalize(&mut v);
        v
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert(
                Collection::General,
                vec![
                    StoredRecord {
                        document: doc(1, "What are the symptoms of diabetes?", "Symptoms"),
                        vector: unit(&[1.0, 0.0, 0.0]),
                    },
                    StoredRecord {
                        document: doc(2, "How is diabetes treated?", "Treatment"),
                        vector: unit(&[0.9, 0.1, 0.0]),
                    },
                    StoredRecord {
                        document: doc(3, "What causes glaucoma?", "Causes"),
                        vector: unit(&[0.0, 1.0, 0.0]),
                    },
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_nearest_orders_by_ascending_distance() {
        let store = seeded_store().await;
        let hits = store
            .nearest(Collection::General, &unit(&[1.0, 0.0, 0.0]), 3, None)
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.id, 1);
        assert!(hits[0].distance.abs() < 1e-6);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn test_nearest_applies_category_filter_before_limiting() {
        let store = seeded_store().await;
        // k=1 with a filter that excludes the closest document: the
        // surviving candidate must be the best *within* the category.
        let hits = store
            .nearest(
                Collection::General,
                &unit(&[1.0, 0.0, 0.0]),
                1,
                Some("Treatment"),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, 2);
    }

    #[tokio::test]
    async fn test_unknown_category_yields_empty_not_error() {
        let store = seeded_store().await;
        let hits = store
            .nearest(
                Collection::General,
                &unit(&[1.0, 0.0, 0.0]),
                5,
                Some("Nonexistent"),
            )
            .await
            .unwrap();
        assert!(hits.is_empty());

        let hits = store.rank("diabetes", 5, Some("Nonexistent")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_nearest_on_missing_collection_is_empty() {
        let store = seeded_store().await;
        let hits = store
            .nearest(Collection::Medical, &unit(&[1.0, 0.0, 0.0]), 5, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_nearest_rejects_dimension_mismatch() {
        let store = seeded_store().await;
        let err = store
            .nearest(Collection::General, &unit(&[1.0, 0.0]), 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_rank_finds_keyword_matches() {
        let store = seeded_store().await;
        let hits = store.rank("diabetes symptoms", 5, None).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].document.id, 1);
        for pair in hits.windows(2) {
            assert!(pair[0].rank >= pair[1].rank);
        }
    }

    #[tokio::test]
    async fn test_rank_no_match_is_empty() {
        let store = seeded_store().await;
        let hits = store.rank("xyzzyqqqnonexistentterm", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_document() {
        let store = seeded_store().await;
        store
            .upsert(
                Collection::General,
                vec![StoredRecord {
                    document: doc(1, "What are the symptoms of migraine?", "Symptoms"),
                    vector: unit(&[0.0, 0.0, 1.0]),
                }],
            )
            .await
            .unwrap();

        assert_eq!(store.len().await, 3);
        let hits = store.rank("migraine", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, 1);
    }

    #[tokio::test]
    async fn test_upsert_stamps_created_at() {
        let store = MemoryStore::new();
        store
            .upsert(
                Collection::General,
                vec![StoredRecord {
                    document: doc(10, "What is anemia?", "Information"),
                    vector: unit(&[1.0]),
                }],
            )
            .await
            .unwrap();
        let hits = store
            .nearest(Collection::General, &unit(&[1.0]), 1, None)
            .await
            .unwrap();
        assert!(hits[0].document.created_at.is_some());
    }

    #[tokio::test]
    async fn test_categories_and_stats() {
        let store = seeded_store().await;
        let categories = store.categories().await.unwrap();
        assert_eq!(categories, vec!["Causes", "Symptoms", "Treatment"]);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.categories.len(), 3);
        assert!(stats.categories.iter().all(|(_, count)| *count == 1));
    }
}
