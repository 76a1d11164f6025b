//! In-process Okapi BM25 keyword index.
//!
//! Serves the `rank` side of the retrieval store: case-insensitive,
//! lightly stemmed token match, scored with BM25 (Robertson & Zaragoza
//! parameters k1 = 1.2, b = 0.75). Ranking is deterministic: ties break
//! by ascending document id.

use std::collections::HashMap;

/// Term-frequency saturation parameter.
const K1: f32 = 1.2;

/// Document-length normalization parameter.
const B: f32 = 0.75;

/// A scored document id from the keyword index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedDoc {
    /// Document id.
    pub id: u64,
    /// BM25 score; higher is better.
    pub score: f32,
}

/// In-memory inverted index with BM25 scoring.
#[derive(Debug, Default)]
pub struct Bm25Index {
    /// term -> (doc id -> term frequency)
    postings: HashMap<String, HashMap<u64, u32>>,
    /// doc id -> token count
    doc_len: HashMap<u64, u32>,
    /// doc id -> distinct terms, kept for clean replacement
    doc_terms: HashMap<u64, Vec<String>>,
    /// running token total across all documents
    total_len: u64,
}

impl Bm25Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_len.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.doc_len.is_empty()
    }

    /// Index `text` under `id`, replacing any previous content for the
    /// same id.
    pub fn insert(&mut self, id: u64, text: &str) {
        self.remove(id);

        let tokens = tokenize(text);
        let len = tokens.len() as u32;
        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *tf.entry(token).or_insert(0) += 1;
        }

        let mut terms = Vec::with_capacity(tf.len());
        for (term, count) in tf {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(id, count);
            terms.push(term);
        }

        self.doc_len.insert(id, len);
        self.doc_terms.insert(id, terms);
        self.total_len += len as u64;
    }

    /// Remove a document from the index. Unknown ids are ignored.
    pub fn remove(&mut self, id: u64) {
        let Some(terms) = self.doc_terms.remove(&id) else {
            return;
        };
        for term in terms {
            if let Some(docs) = self.postings.get_mut(&term) {
                docs.remove(&id);
                if docs.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        if let Some(len) = self.doc_len.remove(&id) {
            self.total_len -= len as u64;
        }
    }

    /// Top-k documents matching `query`, restricted to ids accepted by
    /// `allow`, sorted by score descending with id tie-break.
    ///
    /// Returns an empty list when no query token matches any document.
    pub fn search<F>(&self, query: &str, k: usize, allow: F) -> Vec<RankedDoc>
    where
        F: Fn(u64) -> bool,
    {
        if self.doc_len.is_empty() || k == 0 {
            return Vec::new();
        }

        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let n = self.doc_len.len() as f32;
        let avg_len = self.total_len as f32 / n;

        let mut scores: HashMap<u64, f32> = HashMap::new();
        for term in &terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (&id, &tf) in docs {
                if !allow(id) {
                    continue;
                }
                let dl = self.doc_len[&id] as f32;
                let tf = tf as f32;
                let contribution = idf * tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * dl / avg_len));
                *scores.entry(id).or_insert(0.0) += contribution;
            }
        }

        let mut ranked: Vec<RankedDoc> = scores
            .into_iter()
            .map(|(id, score)| RankedDoc { id, score })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(k);
        ranked
    }
}

/// Lowercased alphanumeric tokens with a light suffix stemmer, so that
/// "symptoms" matches "symptom" and "treating" matches "treat".
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| stem(&t.to_lowercase()))
        .collect()
}

/// Strip the most common English inflection suffixes. Intentionally far
/// lighter than a full Porter stemmer; token match quality is bounded by
/// the corpus, not the stemmer.
fn stem(token: &str) -> String {
    if token.len() > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if token.len() > 5 && token.ends_with("ing") {
        return token[..token.len() - 3].to_string();
    }
    if token.len() > 4 && token.ends_with("ed") {
        return token[..token.len() - 2].to_string();
    }
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Bm25Index {
        let mut index = Bm25Index::new();
        index.insert(1, "What are the symptoms of diabetes? Increased thirst and fatigue.");
        index.insert(2, "How is diabetes treated? Insulin and diet changes.");
        index.insert(3, "What causes high blood pressure? Salt intake and stress.");
        index.insert(4, "What are the symptoms of glaucoma? Vision loss.");
        index
    }

    #[test]
    fn test_matches_are_case_insensitive_and_stemmed() {
        let index = sample_index();
        let hits = index.search("SYMPTOM", 10, |_| true);
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&4));
        assert!(!ids.contains(&3));
    }

    #[test]
    fn test_results_sorted_by_score_descending() {
        let index = sample_index();
        let hits = index.search("diabetes symptoms", 10, |_| true);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        // Doc 1 matches both terms; it must outrank the single-term docs.
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn test_no_token_match_returns_empty() {
        let index = sample_index();
        let hits = index.search("xyzzyqqqnonexistentterm", 5, |_| true);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_allow_filter_restricts_candidates() {
        let index = sample_index();
        let hits = index.search("symptoms", 10, |id| id == 4);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 4);
    }

    #[test]
    fn test_k_truncates() {
        let index = sample_index();
        let hits = index.search("what", 2, |_| true);
        assert!(hits.len() <= 2);
    }

    #[test]
    fn test_reinsert_replaces_document() {
        let mut index = sample_index();
        index.insert(1, "Completely unrelated content about migraines.");
        let hits = index.search("diabetes", 10, |_| true);
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert!(!ids.contains(&1));
        let hits = index.search("migraine", 10, |_| true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn test_remove_then_empty() {
        let mut index = Bm25Index::new();
        index.insert(7, "aspirin dosage");
        assert_eq!(index.len(), 1);
        index.remove(7);
        assert!(index.is_empty());
        assert!(index.search("aspirin", 5, |_| true).is_empty());
    }

    #[test]
    fn test_tie_break_by_ascending_id() {
        let mut index = Bm25Index::new();
        // Identical documents tie exactly; order must be by id.
        index.insert(9, "kidney stones");
        index.insert(3, "kidney stones");
        let hits = index.search("kidney", 10, |_| true);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 3);
        assert_eq!(hits[1].id, 9);
    }

    #[test]
    fn test_stemmer_examples() {
        assert_eq!(stem("symptoms"), "symptom");
        assert_eq!(stem("studies"), "study");
        assert_eq!(stem("treating"), "treat");
        assert_eq!(stem("treated"), "treat");
        assert_eq!(stem("stress"), "stress");
        assert_eq!(stem("gas"), "gas");
    }
}
