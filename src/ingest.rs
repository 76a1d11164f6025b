//! Bulk loading of the cleaned MedQuAD export.
//!
//! Reads one JSON record per line, embeds the combined question/answer
//! text with every configured model, and upserts into the corresponding
//! collections (the keyword index is fed as a side effect of upserting).
//! Dataset download and cleaning happen upstream; this module only
//! consumes the cleaned export.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::search::embedding::Embedder;
use crate::search::types::Document;
use crate::store::{Collection, RetrievalStore, StoredRecord};

/// One line of the cleaned dataset export.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRecord {
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Category label; falls back to `qtype` when absent.
    #[serde(default)]
    pub category: Option<String>,
    /// Question-type label.
    #[serde(default)]
    pub qtype: Option<String>,
    /// Source attribution.
    #[serde(default)]
    pub source: Option<String>,
}

impl IngestRecord {
    fn into_document(self, id: u64) -> Document {
        let qtype = self.qtype.unwrap_or_default();
        Document {
            id,
            question: self.question,
            answer: self.answer,
            category: self.category.unwrap_or_else(|| qtype.clone()),
            qtype,
            source: self.source.unwrap_or_else(|| "MedQuAD".to_string()),
            created_at: None,
        }
    }
}

/// Outcome of one bulk load.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Documents loaded.
    pub documents: usize,
    /// Vector collections populated.
    pub collections: usize,
}

/// Bulk loader wiring embedders to the retrieval store.
pub struct Ingestor {
    store: Arc<dyn RetrievalStore>,
    embedders: Vec<(Collection, Arc<dyn Embedder>)>,
    config: IngestConfig,
}

impl Ingestor {
    /// Create a loader for the given store and model slots.
    pub fn new(
        store: Arc<dyn RetrievalStore>,
        embedders: Vec<(Collection, Arc<dyn Embedder>)>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            embedders,
            config,
        }
    }

    /// Load records from a JSONL file and ingest them.
    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> Result<IngestSummary> {
        let records = read_jsonl(path.as_ref())?;
        self.ingest(records).await
    }

    /// Ingest already-parsed records. Identifiers are assigned
    /// sequentially from 1 in input order.
    pub async fn ingest(&self, records: Vec<IngestRecord>) -> Result<IngestSummary> {
        let documents: Vec<Document> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| record.into_document(i as u64 + 1))
            .collect();

        info!(
            documents = documents.len(),
            collections = self.embedders.len(),
            "starting bulk load"
        );

        for (collection, embedder) in &self.embedders {
            let mut pending: Vec<StoredRecord> = Vec::with_capacity(self.config.upsert_batch_size);
            let mut loaded = 0usize;

            for chunk in documents.chunks(self.config.embedding_batch_size) {
                let texts: Vec<String> = chunk.iter().map(|d| d.combined_text()).collect();
                let vectors = embedder.embed_batch(&texts).await?;
                if vectors.len() != chunk.len() {
                    return Err(Error::Embedding {
                        provider: embedder.id().to_string(),
                        reason: format!(
                            "batch of {} texts produced {} vectors",
                            chunk.len(),
                            vectors.len()
                        ),
                    });
                }

                for (document, vector) in chunk.iter().zip(vectors) {
                    pending.push(StoredRecord {
                        document: document.clone(),
                        vector,
                    });
                    if pending.len() >= self.config.upsert_batch_size {
                        loaded += pending.len();
                        self.store
                            .upsert(*collection, std::mem::take(&mut pending))
                            .await?;
                    }
                }
            }

            if !pending.is_empty() {
                loaded += pending.len();
                self.store.upsert(*collection, pending).await?;
            }
            info!(collection = %collection, loaded, "collection loaded");
        }

        Ok(IngestSummary {
            documents: documents.len(),
            collections: self.embedders.len(),
        })
    }
}

/// Parse a JSONL export, reporting the offending line on failure.
fn read_jsonl(path: &Path) -> Result<Vec<IngestRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IngestRecord = serde_json::from_str(&line)
            .map_err(|e| Error::Ingest(format!("line {}: {}", number + 1, e)))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::search::embedding::HashEmbedder;
    use crate::store::MemoryStore;

    fn write_dataset(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_ingest_populates_collections_and_keyword_index() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            Arc::clone(&store) as Arc<dyn RetrievalStore>,
            vec![
                (Collection::General, Arc::new(HashEmbedder::new(32))),
                (Collection::Medical, Arc::new(HashEmbedder::new(64))),
            ],
            IngestConfig {
                embedding_batch_size: 2,
                upsert_batch_size: 2,
            },
        );

        let file = write_dataset(&[
            r#"{"question": "What are the symptoms of diabetes?", "answer": "Thirst and fatigue.", "category": "Symptoms", "qtype": "symptoms"}"#,
            r#"{"question": "How is glaucoma treated?", "answer": "Eye drops or surgery.", "category": "Treatment", "qtype": "treatment"}"#,
            r#"{"question": "Is cancer hereditary?", "answer": "Some cancers are.", "qtype": "inheritance"}"#,
        ]);

        let summary = ingestor.ingest_file(file.path()).await.unwrap();
        assert_eq!(summary.documents, 3);
        assert_eq!(summary.collections, 2);
        assert_eq!(store.len().await, 3);

        // Category fell back to qtype for the third record.
        let categories = store.categories().await.unwrap();
        assert!(categories.contains(&"inheritance".to_string()));

        // Keyword index was fed during upsert.
        let hits = store.rank("glaucoma", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, 2);
    }

    #[tokio::test]
    async fn test_ids_are_sequential_from_one() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            Arc::clone(&store) as Arc<dyn RetrievalStore>,
            vec![(Collection::General, Arc::new(HashEmbedder::new(16)))],
            IngestConfig::default(),
        );

        let file = write_dataset(&[
            r#"{"question": "Q one?", "answer": "A one."}"#,
            r#"{"question": "Q two?", "answer": "A two."}"#,
        ]);
        ingestor.ingest_file(file.path()).await.unwrap();

        let hits = store.rank("one", 5, None).await.unwrap();
        assert_eq!(hits[0].document.id, 1);
        let hits = store.rank("two", 5, None).await.unwrap();
        assert_eq!(hits[0].document.id, 2);
    }

    #[tokio::test]
    async fn test_malformed_line_reports_line_number() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            Arc::clone(&store) as Arc<dyn RetrievalStore>,
            vec![(Collection::General, Arc::new(HashEmbedder::new(16)))],
            IngestConfig::default(),
        );

        let file = write_dataset(&[
            r#"{"question": "Q one?", "answer": "A one."}"#,
            r#"{"question": "broken"#,
        ]);
        let err = ingestor.ingest_file(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            Arc::clone(&store) as Arc<dyn RetrievalStore>,
            vec![(Collection::General, Arc::new(HashEmbedder::new(16)))],
            IngestConfig::default(),
        );

        let file = write_dataset(&[
            r#"{"question": "Q one?", "answer": "A one."}"#,
            "",
            r#"{"question": "Q two?", "answer": "A two."}"#,
        ]);
        let summary = ingestor.ingest_file(file.path()).await.unwrap();
        assert_eq!(summary.documents, 2);
    }
}
