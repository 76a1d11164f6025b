//! Side-by-side method comparison.
//!
//! Runs the same query under two (or all three) method configurations
//! and reports result overlap, timing, and per-method average scores.
//! Averages stay tagged with their scale: a semantic similarity mean and
//! a keyword rank mean are never the same unit, and the report records
//! whether the two sides are numerically comparable at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::search::coordinator::SearchCoordinator;
use crate::search::types::{QuerySpec, Score, ScoredResult, SearchMethod, SearchResponse, SearchTiming};

/// One method's half of a comparison: the raw results are always kept
/// for side-by-side display, never just the statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodRun {
    /// The method that ran.
    pub method: SearchMethod,
    /// Full result list, in rank order.
    pub results: Vec<ScoredResult>,
    /// Phase timing for this run.
    pub timing: SearchTiming,
    /// Average score over the list, tagged with the method's scale;
    /// 0.0 in that scale when the list is empty.
    pub avg_score: Score,
}

impl From<SearchResponse> for MethodRun {
    fn from(response: SearchResponse) -> Self {
        Self {
            method: response.method,
            avg_score: response.avg_score(),
            timing: response.timing,
            results: response.results,
        }
    }
}

impl MethodRun {
    fn ids(&self) -> BTreeSet<u64> {
        self.results.iter().map(|r| r.document.id).collect()
    }
}

/// Identifier overlap between two runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overlap {
    /// The two methods compared.
    pub methods: (SearchMethod, SearchMethod),
    /// Identifiers returned by both, ascending.
    pub ids: Vec<u64>,
    /// `|ids|`.
    pub count: usize,
    /// `count / k` for the requested k.
    pub fraction: f32,
}

impl Overlap {
    fn between(a: &MethodRun, b: &MethodRun, k: usize) -> Self {
        let ids: Vec<u64> = a.ids().intersection(&b.ids()).copied().collect();
        let count = ids.len();
        Self {
            methods: (a.method, b.method),
            ids,
            count,
            fraction: count as f32 / k as f32,
        }
    }
}

/// Report from a pairwise comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// The query both methods ran.
    pub query: String,
    /// Requested result count.
    pub top_k: usize,
    /// First method's run.
    pub a: MethodRun,
    /// Second method's run.
    pub b: MethodRun,
    /// Identifier overlap between the two runs.
    pub overlap: Overlap,
    /// Whether the two average scores live on the same scale. When
    /// false, only the identifier sets and orderings may be compared.
    pub scores_comparable: bool,
}

/// Report from a three-way comparison: keyword plus both semantic
/// methods, with every pairwise overlap and the triple intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeWayReport {
    /// The query all methods ran.
    pub query: String,
    /// Requested result count.
    pub top_k: usize,
    /// One run per method, in [`SearchMethod::ALL`] order.
    pub runs: Vec<MethodRun>,
    /// Pairwise overlaps, in the same order as the method pairs.
    pub overlaps: Vec<Overlap>,
    /// Identifiers returned by all three methods, ascending.
    pub common_to_all: Vec<u64>,
}

/// Runs the coordinator under multiple method configurations against the
/// same query.
pub struct ComparisonEvaluator {
    coordinator: Arc<SearchCoordinator>,
}

impl ComparisonEvaluator {
    /// Create an evaluator around a coordinator.
    pub fn new(coordinator: Arc<SearchCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Compare two methods on one query.
    ///
    /// The sub-searches are independent and run concurrently; sequential
    /// execution would produce the identical report apart from the
    /// timing values.
    pub async fn compare(
        &self,
        query: &str,
        method_a: SearchMethod,
        method_b: SearchMethod,
        k: usize,
    ) -> Result<ComparisonReport> {
        if method_a == method_b {
            return Err(Error::InvalidQuery(format!(
                "comparing '{}' against itself",
                method_a
            )));
        }
        let spec_a = QuerySpec::new(query, method_a, k);
        let spec_b = QuerySpec::new(query, method_b, k);
        spec_a.validate()?;

        let (response_a, response_b) = tokio::join!(
            self.coordinator.search(&spec_a),
            self.coordinator.search(&spec_b)
        );
        let a = MethodRun::from(response_a?);
        let b = MethodRun::from(response_b?);

        let overlap = Overlap::between(&a, &b, k);
        let scores_comparable = a.avg_score.kind() == b.avg_score.kind();
        Ok(ComparisonReport {
            query: query.to_string(),
            top_k: k,
            a,
            b,
            overlap,
            scores_comparable,
        })
    }

    /// Compare all three methods on one query.
    pub async fn compare_all(&self, query: &str, k: usize) -> Result<ThreeWayReport> {
        let specs: Vec<QuerySpec> = SearchMethod::ALL
            .iter()
            .map(|&method| QuerySpec::new(query, method, k))
            .collect();
        specs[0].validate()?;

        let (r0, r1, r2) = tokio::join!(
            self.coordinator.search(&specs[0]),
            self.coordinator.search(&specs[1]),
            self.coordinator.search(&specs[2])
        );
        let runs: Vec<MethodRun> = vec![
            MethodRun::from(r0?),
            MethodRun::from(r1?),
            MethodRun::from(r2?),
        ];

        let overlaps = vec![
            Overlap::between(&runs[0], &runs[1], k),
            Overlap::between(&runs[0], &runs[2], k),
            Overlap::between(&runs[1], &runs[2], k),
        ];
        let common_to_all: Vec<u64> = runs[0]
            .ids()
            .intersection(&runs[1].ids())
            .copied()
            .collect::<BTreeSet<u64>>()
            .intersection(&runs[2].ids())
            .copied()
            .collect();

        Ok(ThreeWayReport {
            query: query.to_string(),
            top_k: k,
            runs,
            overlaps,
            common_to_all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::{Embedder, HashEmbedder};
    use crate::search::types::Document;
    use crate::store::{Collection, MemoryStore, RetrievalStore, StoredRecord};
    use crate::search::types::ScoreKind;

    fn doc(id: u64, question: &str, answer: &str, category: &str) -> Document {
        Document::new(id, question, answer, category, "information")
    }

    async fn seeded_evaluator() -> ComparisonEvaluator {
        let general = Arc::new(HashEmbedder::new(64));
        let medical = Arc::new(HashEmbedder::new(128));
        let store = Arc::new(MemoryStore::new());

        let documents = vec![
            doc(
                1,
                "What are the symptoms of diabetes?",
                "Increased thirst and fatigue.",
                "Symptoms",
            ),
            doc(
                2,
                "How is diabetes treated?",
                "Insulin and diet.",
                "Treatment",
            ),
            doc(
                3,
                "What is the treatment for hypertension?",
                "Blood pressure medication.",
                "Treatment",
            ),
            doc(4, "Is cancer hereditary?", "Some cancers are.", "Inheritance"),
        ];

        for (collection, embedder) in [
            (Collection::General, Arc::clone(&general) as Arc<dyn Embedder>),
            (Collection::Medical, Arc::clone(&medical) as Arc<dyn Embedder>),
        ] {
            let mut records = Vec::new();
            for document in &documents {
                let vector = embedder.embed(&document.combined_text()).await.unwrap();
                records.push(StoredRecord {
                    document: document.clone(),
                    vector,
                });
            }
            store.upsert(collection, records).await.unwrap();
        }

        let coordinator = SearchCoordinator::builder(store)
            .embedder(Collection::General, general)
            .embedder(Collection::Medical, medical)
            .build();
        ComparisonEvaluator::new(Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_overlap_bounds() {
        let evaluator = seeded_evaluator().await;
        let report = evaluator
            .compare(
                "treatment for hypertension",
                SearchMethod::SemanticGeneral,
                SearchMethod::SemanticMedical,
                3,
            )
            .await
            .unwrap();

        assert!(report.overlap.count <= 3);
        assert!(report.overlap.count <= report.a.results.len().min(report.b.results.len()));
        assert!((0.0..=1.0).contains(&report.overlap.fraction));
        assert!(report.scores_comparable);
    }

    #[tokio::test]
    async fn test_semantic_vs_keyword_scores_not_comparable() {
        let evaluator = seeded_evaluator().await;
        let report = evaluator
            .compare(
                "diabetes treatment",
                SearchMethod::Keyword,
                SearchMethod::SemanticGeneral,
                3,
            )
            .await
            .unwrap();

        assert!(!report.scores_comparable);
        assert_eq!(report.a.avg_score.kind(), ScoreKind::Rank);
        assert_eq!(report.b.avg_score.kind(), ScoreKind::Similarity);
        // Raw lists are retained on both sides.
        assert!(!report.a.results.is_empty());
        assert!(!report.b.results.is_empty());
    }

    #[tokio::test]
    async fn test_compare_is_deterministic_and_order_insensitive() {
        let evaluator = seeded_evaluator().await;

        let first = evaluator
            .compare(
                "diabetes symptoms",
                SearchMethod::SemanticGeneral,
                SearchMethod::SemanticMedical,
                3,
            )
            .await
            .unwrap();
        let second = evaluator
            .compare(
                "diabetes symptoms",
                SearchMethod::SemanticGeneral,
                SearchMethod::SemanticMedical,
                3,
            )
            .await
            .unwrap();
        assert_eq!(first.overlap.ids, second.overlap.ids);
        assert_eq!(first.a.avg_score, second.a.avg_score);
        assert_eq!(first.b.avg_score, second.b.avg_score);

        // Swapping the argument order swaps the runs but not the overlap.
        let swapped = evaluator
            .compare(
                "diabetes symptoms",
                SearchMethod::SemanticMedical,
                SearchMethod::SemanticGeneral,
                3,
            )
            .await
            .unwrap();
        assert_eq!(swapped.overlap.ids, first.overlap.ids);
        assert_eq!(swapped.a.method, first.b.method);
    }

    #[tokio::test]
    async fn test_compare_rejects_bad_input() {
        let evaluator = seeded_evaluator().await;

        let err = evaluator
            .compare("", SearchMethod::Keyword, SearchMethod::SemanticGeneral, 3)
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());

        let err = evaluator
            .compare(
                "diabetes",
                SearchMethod::Keyword,
                SearchMethod::SemanticGeneral,
                0,
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());

        let err = evaluator
            .compare("diabetes", SearchMethod::Keyword, SearchMethod::Keyword, 3)
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[tokio::test]
    async fn test_empty_side_reports_zero_average_not_error() {
        let evaluator = seeded_evaluator().await;
        // A term no document contains: the keyword side comes back
        // empty, which is a valid outcome rather than a failure.
        let report = evaluator
            .compare(
                "xyzzyqqqnonexistentterm",
                SearchMethod::Keyword,
                SearchMethod::SemanticGeneral,
                3,
            )
            .await
            .unwrap();
        assert!(report.a.results.is_empty());
        assert_eq!(report.a.avg_score, Score::Rank(0.0));
        assert_eq!(report.overlap.count, 0);
    }

    #[tokio::test]
    async fn test_compare_all_covers_every_pair() {
        let evaluator = seeded_evaluator().await;
        let report = evaluator.compare_all("diabetes treatment", 3).await.unwrap();

        assert_eq!(report.runs.len(), 3);
        assert_eq!(report.overlaps.len(), 3);
        for overlap in &report.overlaps {
            assert!(overlap.count <= 3);
        }
        // The triple intersection can never exceed any pairwise one.
        for overlap in &report.overlaps {
            assert!(report.common_to_all.len() <= overlap.count);
        }
    }

    #[test]
    fn test_overlap_example_one_common_of_three() {
        let make_run = |ids: &[u64], method: SearchMethod| MethodRun {
            method,
            results: ids
                .iter()
                .map(|&id| ScoredResult {
                    document: doc(id, "q", "a", "c"),
                    score: Score::Similarity(0.8),
                    method,
                })
                .collect(),
            timing: SearchTiming::default(),
            avg_score: Score::Similarity(0.8),
        };
        let a = make_run(&[1, 2, 3], SearchMethod::SemanticGeneral);
        let b = make_run(&[3, 4, 5], SearchMethod::SemanticMedical);

        let overlap = Overlap::between(&a, &b, 3);
        assert_eq!(overlap.count, 1);
        assert_eq!(overlap.ids, vec![3]);
        assert!((overlap.fraction - 1.0 / 3.0).abs() < 1e-6);
    }
}
