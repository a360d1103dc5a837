//! Hybrid retrieval over a lexical and a vector index.
//!
//! A query runs through both channels independently:
//!
//! 1. BM25 scores every document; the `kb` best positions form the lexical
//!    pool.
//! 2. The query embedding (unit-normalized) retrieves the `kv` nearest
//!    vectors; their positions form the vector pool.
//!
//! The pools are merged into a candidate set. Each channel is z-scored over
//! that set, blended as `alpha * z(lexical) + (1 - alpha) * z(vector)`, and
//! the `k` best candidates are returned. Candidates the vector channel did
//! not retrieve get a vector score of exactly `0.0`.
//!
//! The retriever is read-only after construction and is `Send + Sync`;
//! share it behind an `Arc` to serve concurrent queries.

use crate::normalize::z_normalize;
use crate::select::{rank_descending, top_positions};
use meeple_core::IndexBundle;
use meeple_core::config::{SearchConfig, validate_alpha};
use meeple_core::embed::{Embedder, embedder_for_model};
use meeple_core::error::RetrievalError;
use meeple_core::lexical::LexicalIndex;
use meeple_core::vector::{VectorIndex, l2_normalize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument};

pub const DEFAULT_K: usize = 10;
pub const DEFAULT_POOL: usize = 50;

/// Per-query sizes: `k` results drawn from a `kb` lexical and `kv` vector pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub k: usize,
    pub kb: usize,
    pub kv: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            kb: DEFAULT_POOL,
            kv: DEFAULT_POOL,
        }
    }
}

impl SearchParams {
    #[must_use]
    pub const fn new(k: usize, kb: usize, kv: usize) -> Self {
        Self { k, kb, kv }
    }

    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidQuery`] if any size is zero.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        for (name, value) in [("k", self.k), ("kb", self.kb), ("kv", self.kv)] {
            if value == 0 {
                return Err(RetrievalError::invalid_parameter(name));
            }
        }
        Ok(())
    }
}

impl From<&SearchConfig> for SearchParams {
    fn from(config: &SearchConfig) -> Self {
        Self::new(config.k, config.kb, config.kv)
    }
}

/// One candidate with its raw channel scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Corpus position (index into the lexical `doc_id` sequence).
    pub position: usize,
    pub lexical_score: f64,
    /// Similarity if the vector channel retrieved this candidate, else `0.0`.
    pub vector_score: f64,
    pub vector_hit: bool,
}

/// A ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub doc_id: String,
    pub fused_score: f64,
    pub lexical_score: f64,
    pub vector_score: f64,
}

/// Query-facing envelope: `{query, results}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<FusedHit>,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, results: Vec<FusedHit>) -> Self {
        Self {
            query: query.into(),
            results,
        }
    }
}

/// Blend standardized channel scores. The i-th output belongs to the i-th
/// candidate.
#[must_use]
pub fn fuse(candidates: &[Candidate], alpha: f64) -> Vec<f64> {
    let lexical: Vec<f64> = candidates.iter().map(|c| c.lexical_score).collect();
    let vector: Vec<f64> = candidates.iter().map(|c| c.vector_score).collect();
    z_normalize(&lexical)
        .into_iter()
        .zip(z_normalize(&vector))
        .map(|(zl, zv)| alpha.mul_add(zl, (1.0 - alpha) * zv))
        .collect()
}

pub struct HybridRetriever {
    lexical: LexicalIndex,
    vector: VectorIndex,
    embedder: Box<dyn Embedder>,
    alpha: f64,
    /// Vector index position to corpus position.
    vector_to_corpus: Vec<usize>,
}

impl fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("documents", &self.lexical.len())
            .field("model", &self.embedder.model_name())
            .field("alpha", &self.alpha)
            .finish_non_exhaustive()
    }
}

impl HybridRetriever {
    /// Pair two loaded indexes with the embedder that built the vector side.
    ///
    /// The vector index may list documents in any order; each vector
    /// position is mapped back to its corpus position by `doc_id`.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Configuration`] if `alpha` is outside `[0, 1]`.
    /// - [`RetrievalError::IndexLoad`] if the indexes cover different
    ///   documents, or the embedder's model or dimension differs from the
    ///   vector index.
    pub fn new(
        lexical: LexicalIndex,
        vector: VectorIndex,
        embedder: Box<dyn Embedder>,
        alpha: f64,
    ) -> Result<Self, RetrievalError> {
        validate_alpha(alpha)?;

        if lexical.len() != vector.len() {
            return Err(RetrievalError::index_inconsistent(format!(
                "lexical index has {} documents but vector index has {}",
                lexical.len(),
                vector.len()
            )));
        }
        if embedder.model_name() != vector.model() {
            return Err(RetrievalError::index_inconsistent(format!(
                "embedder model '{}' does not match vector index model '{}'",
                embedder.model_name(),
                vector.model()
            )));
        }
        if embedder.dimension() != vector.dimension() {
            return Err(RetrievalError::index_inconsistent(format!(
                "embedder dimension {} does not match vector index dimension {}",
                embedder.dimension(),
                vector.dimension()
            )));
        }

        let corpus_slots: HashMap<&str, usize> = lexical
            .doc_ids()
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect();
        let vector_to_corpus = vector
            .doc_ids()
            .iter()
            .map(|id| {
                corpus_slots.get(id.as_str()).copied().ok_or_else(|| {
                    RetrievalError::index_inconsistent(format!(
                        "vector index doc_id '{id}' is not in the lexical corpus"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            documents = lexical.len(),
            model = vector.model(),
            alpha,
            "hybrid retriever ready"
        );

        Ok(Self {
            lexical,
            vector,
            embedder,
            alpha,
            vector_to_corpus,
        })
    }

    /// Load the bundle in `dir` and rebuild the embedder it names.
    ///
    /// # Errors
    ///
    /// See [`IndexBundle::load`], [`embedder_for_model`] and [`Self::new`].
    pub fn open(dir: &Path, alpha: f64) -> Result<Self, RetrievalError> {
        let bundle = IndexBundle::load(dir)?;
        let embedder = embedder_for_model(bundle.vector.model())?;
        Self::new(bundle.lexical, bundle.vector, embedder, alpha)
    }

    /// Load the bundle in `dir`, querying it with a caller-supplied embedder.
    ///
    /// # Errors
    ///
    /// See [`IndexBundle::load`] and [`Self::new`].
    pub fn open_with_embedder(
        dir: &Path,
        embedder: Box<dyn Embedder>,
        alpha: f64,
    ) -> Result<Self, RetrievalError> {
        let bundle = IndexBundle::load(dir)?;
        Self::new(bundle.lexical, bundle.vector, embedder, alpha)
    }

    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.vector.model()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lexical.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lexical.is_empty()
    }

    #[must_use]
    pub const fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    #[must_use]
    pub const fn vector(&self) -> &VectorIndex {
        &self.vector
    }

    /// Run both channels and return the merged candidate set in ascending
    /// corpus position.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InvalidQuery`] for a blank query, a zero size in
    ///   `params`, or an empty corpus.
    /// - [`RetrievalError::Embedding`] if the query cannot be embedded.
    pub fn candidates(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        params.validate()?;
        if query.trim().is_empty() {
            return Err(RetrievalError::empty_query());
        }
        if self.lexical.is_empty() {
            return Err(RetrievalError::empty_corpus());
        }

        let lexical_scores = self.lexical.score_text(query);
        let lexical_pool = top_positions(&lexical_scores, params.kb);

        let unit = l2_normalize(&self.embedder.embed(query)?);
        let vector_hits = self.vector.search(&unit, params.kv)?;
        let similarity: HashMap<usize, f64> = vector_hits
            .iter()
            .map(|hit| {
                (
                    self.vector_to_corpus[hit.position],
                    f64::from(hit.similarity),
                )
            })
            .collect();

        let pool: BTreeSet<usize> = lexical_pool
            .iter()
            .copied()
            .chain(similarity.keys().copied())
            .collect();

        let candidates: Vec<Candidate> = pool
            .into_iter()
            .map(|position| {
                let vector = similarity.get(&position).copied();
                Candidate {
                    position,
                    lexical_score: lexical_scores[position],
                    vector_score: vector.unwrap_or(0.0),
                    vector_hit: vector.is_some(),
                }
            })
            .collect();

        debug!(
            lexical_pool = lexical_pool.len(),
            vector_pool = vector_hits.len(),
            candidates = candidates.len(),
            "assembled candidate set"
        );
        Ok(candidates)
    }

    /// Rank the corpus against `query`.
    ///
    /// Returns at most `params.k` hits ordered by fused score descending;
    /// equal fused scores keep ascending corpus position.
    ///
    /// # Errors
    ///
    /// See [`Self::candidates`].
    #[instrument(skip(self, params), fields(k = params.k, kb = params.kb, kv = params.kv, alpha = self.alpha))]
    pub fn search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<FusedHit>, RetrievalError> {
        let candidates = self.candidates(query, params)?;
        let fused = fuse(&candidates, self.alpha);

        let hits: Vec<FusedHit> = rank_descending(&fused)
            .into_iter()
            .take(params.k)
            .map(|idx| {
                let candidate = &candidates[idx];
                FusedHit {
                    doc_id: self.lexical.doc_ids()[candidate.position].clone(),
                    fused_score: fused[idx],
                    lexical_score: candidate.lexical_score,
                    vector_score: candidate.vector_score,
                }
            })
            .collect();

        debug!(
            results = hits.len(),
            top = hits.first().map(|h| h.doc_id.as_str()),
            "fused results"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meeple_core::error::ErrorCode;
    use meeple_core::lexical::{Bm25, Bm25Params};
    use meeple_core::tokenize::tokenize;
    use meeple_core::vector::FlatIpIndex;

    struct FixedEmbedder(Vec<f32>);

    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Ok(self.0.clone())
        }
    }

    fn lexical(ids: &[&str], texts: &[&str]) -> LexicalIndex {
        let tokens: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        LexicalIndex::new(
            ids.iter().map(ToString::to_string).collect(),
            Bm25::from_tokenized(&tokens, Bm25Params::default()),
        )
        .expect("lexical index")
    }

    fn vector(ids: &[&str], rows: &[Vec<f32>]) -> VectorIndex {
        let dim = rows.first().map_or(2, Vec::len);
        VectorIndex::new(
            ids.iter().map(ToString::to_string).collect(),
            "fixed",
            FlatIpIndex::from_rows(dim, rows).expect("flat"),
        )
        .expect("vector index")
    }

    fn retriever(alpha: f64) -> HybridRetriever {
        HybridRetriever::new(
            lexical(&["A", "B", "C"], &["dice trading", "deck building", "worker placement"]),
            vector(
                &["A", "B", "C"],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]],
            ),
            Box::new(FixedEmbedder(vec![0.0, 2.0])),
            alpha,
        )
        .expect("retriever")
    }

    #[test]
    fn retriever_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HybridRetriever>();
    }

    #[test]
    fn candidates_merge_both_pools() {
        let r = retriever(0.5);
        let candidates = r
            .candidates("dice", &SearchParams::new(5, 1, 1))
            .expect("candidates");
        let positions: Vec<usize> = candidates.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert!(!candidates[0].vector_hit);
        assert_eq!(candidates[0].vector_score.to_bits(), 0.0_f64.to_bits());
        assert!(candidates[1].vector_hit);
        assert!((candidates[1].vector_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_positions_map_through_doc_ids() {
        let r = HybridRetriever::new(
            lexical(&["A", "B", "C"], &["dice", "deck", "tile"]),
            vector(
                &["C", "A", "B"],
                &[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]],
            ),
            Box::new(FixedEmbedder(vec![0.0, 1.0])),
            0.0,
        )
        .expect("retriever");

        let hits = r
            .search("tile", &SearchParams::new(1, 1, 1))
            .expect("search");
        assert_eq!(hits[0].doc_id, "C");
        assert!((hits[0].vector_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fuse_blends_standardized_channels() {
        let candidates = [
            Candidate {
                position: 0,
                lexical_score: 2.0,
                vector_score: 0.0,
                vector_hit: false,
            },
            Candidate {
                position: 1,
                lexical_score: 0.0,
                vector_score: 1.0,
                vector_hit: true,
            },
        ];
        // Each channel standardizes to [+1, -1] or [-1, +1].
        let fused = fuse(&candidates, 0.75);
        assert!((fused[0] - 0.5).abs() < 1e-6);
        assert!((fused[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        for alpha in [-0.1, 1.01, f64::NAN] {
            let err = HybridRetriever::new(
                lexical(&["A"], &["x"]),
                vector(&["A"], &[vec![1.0, 0.0]]),
                Box::new(FixedEmbedder(vec![1.0, 0.0])),
                alpha,
            )
            .expect_err("alpha must be rejected");
            assert_eq!(err.code(), ErrorCode::ConfigInvalid);
        }
    }

    #[test]
    fn rejects_unknown_vector_doc_id() {
        let err = HybridRetriever::new(
            lexical(&["A", "B"], &["x", "y"]),
            vector(&["A", "Z"], &[vec![1.0, 0.0], vec![0.0, 1.0]]),
            Box::new(FixedEmbedder(vec![1.0, 0.0])),
            0.5,
        )
        .expect_err("must reject");
        assert_eq!(err.code(), ErrorCode::IndexInconsistent);
        assert!(err.to_string().contains("'Z'"));
    }

    #[test]
    fn rejects_embedder_dimension_mismatch() {
        let err = HybridRetriever::new(
            lexical(&["A"], &["x"]),
            vector(&["A"], &[vec![1.0, 0.0]]),
            Box::new(FixedEmbedder(vec![1.0, 0.0, 0.0])),
            0.5,
        )
        .expect_err("must reject");
        assert_eq!(err.code(), ErrorCode::IndexInconsistent);
    }

    #[test]
    fn rejects_blank_query_and_zero_sizes() {
        let r = retriever(0.5);
        let err = r
            .search(" \t ", &SearchParams::default())
            .expect_err("blank query");
        assert_eq!(err.code(), ErrorCode::EmptyQuery);

        for params in [
            SearchParams::new(0, 5, 5),
            SearchParams::new(5, 0, 5),
            SearchParams::new(5, 5, 0),
        ] {
            let err = r.search("dice", &params).expect_err("zero size");
            assert_eq!(err.code(), ErrorCode::InvalidQueryParameter);
        }
    }

    #[test]
    fn params_follow_config() {
        let config = SearchConfig {
            alpha: 0.3,
            k: 4,
            kb: 20,
            kv: 30,
        };
        assert_eq!(SearchParams::from(&config), SearchParams::new(4, 20, 30));
    }

    #[test]
    fn response_serializes_envelope() {
        let response = SearchResponse::new(
            "dice",
            vec![FusedHit {
                doc_id: "A".into(),
                fused_score: 0.5,
                lexical_score: 1.25,
                vector_score: 0.0,
            }],
        );
        let json = serde_json::to_value(&response).expect("encode");
        assert_eq!(json["query"], "dice");
        assert_eq!(json["results"][0]["doc_id"], "A");
        assert_eq!(json["results"][0]["lexical_score"], 1.25);
    }
}
