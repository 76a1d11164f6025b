//! Qdrant-backed retrieval store.
//!
//! Dense collections live in Qdrant (one per model slot, cosine
//! distance); the keyword index is mirrored in-process at upsert time,
//! the same pairing the memory store uses. Qdrant reports cosine
//! similarity natively, so the adapter converts to cosine distance at
//! the edge and the rest of the engine speaks a single dialect.
//!
//! The in-process mirror is rebuilt by ingesting; a fresh process must
//! re-ingest before keyword search and statistics are available.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;

use super::{
    Bm25Index, Collection, LexicalHit, RetrievalStore, StoreStats, StoredRecord, VectorHit,
};
use crate::error::{Error, Result};
use crate::search::types::Document;
use tokio::sync::RwLock;

/// Connection settings for [`QdrantStore`].
#[derive(Debug, Clone)]
pub struct QdrantStoreConfig {
    /// Endpoint URL (gRPC port).
    pub url: String,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Vector dimension per collection, used when creating missing
    /// collections.
    pub dimensions: HashMap<Collection, usize>,
}

#[derive(Default)]
struct Mirror {
    documents: HashMap<u64, Document>,
    keyword: Bm25Index,
}

/// Retrieval store backed by a Qdrant deployment.
pub struct QdrantStore {
    client: Qdrant,
    mirror: RwLock<Mirror>,
}

impl QdrantStore {
    /// Connect to Qdrant and create any missing collections with the
    /// configured dimensions and cosine distance.
    pub async fn connect(config: QdrantStoreConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::Retrieval(format!("qdrant connection failed: {}", e)))?;

        for collection in Collection::ALL {
            let exists = client
                .collection_exists(collection.name())
                .await
                .map_err(|e| Error::Retrieval(e.to_string()))?;
            if exists {
                continue;
            }
            let Some(&dimension) = config.dimensions.get(&collection) else {
                return Err(Error::Config(format!(
                    "no dimension configured for collection '{}'",
                    collection
                )));
            };
            info!(collection = %collection, dimension, "creating qdrant collection");
            client
                .create_collection(
                    CreateCollectionBuilder::new(collection.name()).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| Error::Retrieval(e.to_string()))?;
        }

        Ok(Self {
            client,
            mirror: RwLock::new(Mirror::default()),
        })
    }
}

#[async_trait]
impl RetrievalStore for QdrantStore {
    async fn upsert(&self, collection: Collection, records: Vec<StoredRecord>) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut points = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            let mut document = record.document;
            if document.created_at.is_none() {
                document.created_at = Some(now);
            }
            points.push(PointStruct::new(
                document.id,
                record.vector,
                payload_for_document(&document)?,
            ));
            documents.push(document);
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection.name(), points).wait(true))
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let mut mirror = self.mirror.write().await;
        for document in documents {
            mirror.keyword.insert(document.id, &document.combined_text());
            mirror.documents.insert(document.id, document);
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
        let mut request = SearchPointsBuilder::new(collection.name(), vector.to_vec(), k as u64)
            .with_payload(true);
        if let Some(category) = category {
            request = request.filter(Filter::must([Condition::matches(
                "category",
                category.to_string(),
            )]));
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let Some(id) = point_id(&point.id) else {
                continue;
            };
            let Some(document) = document_from_payload(id, &point.payload) else {
                continue;
            };
            hits.push(VectorHit {
                document,
                // Qdrant returns cosine similarity for cosine collections.
                distance: 1.0 - point.score,
            });
        }
        Ok(hits)
    }

    async fn rank(&self, query: &str, k: usize, category: Option<&str>) -> Result<Vec<LexicalHit>> {
        let mirror = self.mirror.read().await;
        let documents = &mirror.documents;
        let ranked = mirror.keyword.search(query, k, |id| match category {
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
        let mirror = self.mirror.read().await;
        let mut categories: Vec<String> = mirror
            .documents
            .values()
            .map(|d| d.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mirror = self.mirror.read().await;
        let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
        for document in mirror.documents.values() {
            *distribution.entry(document.category.clone()).or_insert(0) += 1;
        }
        let mut categories: Vec<(String, usize)> = distribution.into_iter().collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(StoreStats {
            documents: mirror.documents.len(),
            categories,
        })
    }
}

/// Extract the numeric id from a Qdrant point id.
fn point_id(id: &Option<qdrant_client::qdrant::PointId>) -> Option<u64> {
    match id.as_ref()?.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(*n),
        PointIdOptions::Uuid(_) => None,
    }
}

/// Payload schema for one document, one field per column of the source
/// dataset.
fn payload_for_document(document: &Document) -> Result<Payload> {
    Payload::try_from(serde_json::json!({
        "question": document.question,
        "answer": document.answer,
        "category": document.category,
        "qtype": document.qtype,
        "source": document.source,
        "created_at": document.created_at,
    }))
    .map_err(|e| Error::Retrieval(format!("payload conversion failed: {}", e)))
}

/// Rebuild a document from a point payload. Returns `None` when
/// required fields are missing, which indicates a foreign collection.
fn document_from_payload(id: u64, payload: &HashMap<String, Value>) -> Option<Document> {
    let text = |field: &str| {
        payload
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };
    Some(Document {
        id,
        question: text("question")?,
        answer: text("answer")?,
        category: text("category").unwrap_or_default(),
        qtype: text("qtype").unwrap_or_default(),
        source: text("source").unwrap_or_default(),
        created_at: payload
            .get("created_at")
            .and_then(|v| v.as_integer())
            .map(|v| v as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        Document {
            id: 42,
            question: "What are the symptoms of diabetes?".to_string(),
            answer: "Increased thirst and fatigue.".to_string(),
            category: "Symptoms".to_string(),
            qtype: "symptoms".to_string(),
            source: "MedQuAD".to_string(),
            created_at: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_payload_round_trip() {
        let document = sample_document();
        let payload = payload_for_document(&document).unwrap();
        let map: HashMap<String, Value> = payload.into();
        let rebuilt = document_from_payload(42, &map).unwrap();
        assert_eq!(rebuilt, document);
    }

    #[test]
    fn test_payload_missing_fields_yields_none() {
        let mut map: HashMap<String, Value> = HashMap::new();
        map.insert("question".to_string(), "only a question".into());
        assert!(document_from_payload(1, &map).is_none());
    }
}
