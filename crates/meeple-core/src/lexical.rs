//! Okapi BM25 lexical index.
//!
//! Scores every corpus document against a token sequence:
//!
//! ```text
//! score(d, q) = Σ_{t ∈ q} idf(t) · f(t,d)·(k1 + 1) / (f(t,d) + k1·(1 − b + b·|d|/avgdl))
//! idf(t)      = ln(N − n_t + 0.5) − ln(n_t + 0.5)
//! ```
//!
//! Terms whose raw IDF is negative (present in more than half the corpus) are
//! floored to `epsilon · mean_idf`, where the mean runs over the whole
//! vocabulary. Query tokens absent from the vocabulary contribute nothing;
//! repeated query tokens contribute once per occurrence.

use crate::error::RetrievalError;
use crate::tokenize::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;
pub const DEFAULT_EPSILON: f64 = 0.25;

/// Per-document term frequencies.
pub type TermCounts = BTreeMap<String, u32>;

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// BM25 scorer over a fixed corpus.
///
/// Only the per-document term counts are persisted; document lengths,
/// average length and IDF are derived on construction.
#[derive(Debug, Clone)]
pub struct Bm25 {
    params: Bm25Params,
    documents: Vec<TermCounts>,
    doc_len: Vec<f64>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25 {
    /// Build from already-tokenized documents.
    #[must_use]
    pub fn from_tokenized<S: AsRef<str>>(docs: &[Vec<S>], params: Bm25Params) -> Self {
        let documents = docs
            .iter()
            .map(|tokens| {
                let mut counts = TermCounts::new();
                for token in tokens {
                    *counts.entry(token.as_ref().to_owned()).or_insert(0) += 1;
                }
                counts
            })
            .collect();
        Self::from_term_counts(documents, params)
    }

    /// Build from per-document term counts (the persisted form).
    #[must_use]
    pub fn from_term_counts(documents: Vec<TermCounts>, params: Bm25Params) -> Self {
        let doc_len: Vec<f64> = documents
            .iter()
            .map(|counts| counts.values().map(|&c| f64::from(c)).sum())
            .collect();
        let corpus_size = documents.len() as f64;
        let avgdl = if documents.is_empty() {
            0.0
        } else {
            doc_len.iter().sum::<f64>() / corpus_size
        };

        // First-appearance order keeps the IDF sum, and so the floor,
        // bit-identical across loads.
        let mut doc_freq: Vec<(&str, f64)> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        for counts in &documents {
            for term in counts.keys() {
                let idx = *slot.entry(term.as_str()).or_insert_with(|| {
                    doc_freq.push((term.as_str(), 0.0));
                    doc_freq.len() - 1
                });
                doc_freq[idx].1 += 1.0;
            }
        }

        let mut idf = HashMap::with_capacity(doc_freq.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, freq) in doc_freq {
            let value = (corpus_size - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.to_owned());
            }
            idf.insert(term.to_owned(), value);
        }

        if !idf.is_empty() {
            let floor = params.epsilon * (idf_sum / idf.len() as f64);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            params,
            documents,
            doc_len,
            avgdl,
            idf,
        }
    }

    #[must_use]
    pub const fn params(&self) -> Bm25Params {
        self.params
    }

    #[must_use]
    pub fn term_counts(&self) -> &[TermCounts] {
        &self.documents
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[must_use]
    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    /// IDF for a term, or `0.0` when the term is not in the vocabulary.
    #[must_use]
    pub fn idf(&self, term: &str) -> f64 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    /// Score every document; the i-th score belongs to the i-th document.
    #[must_use]
    pub fn score_all<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        let weighted: Vec<(&str, f64)> = tokens
            .iter()
            .map(|t| (t.as_ref(), self.idf(t.as_ref())))
            .collect();

        self.documents
            .iter()
            .zip(&self.doc_len)
            .map(|(counts, &len)| {
                let mut score = 0.0;
                for &(term, idf) in &weighted {
                    let Some(&tf) = counts.get(term) else {
                        continue;
                    };
                    let tf = f64::from(tf);
                    score += idf * (tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * len / self.avgdl)));
                }
                score
            })
            .collect()
    }
}

/// BM25 scorer paired with the corpus-ordered `doc_id` sequence.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    doc_ids: Vec<String>,
    bm25: Bm25,
}

impl LexicalIndex {
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexLoad`] if the id and document counts
    /// differ or a `doc_id` repeats.
    pub fn new(doc_ids: Vec<String>, bm25: Bm25) -> Result<Self, RetrievalError> {
        if doc_ids.len() != bm25.len() {
            return Err(RetrievalError::index_inconsistent(format!(
                "lexical index has {} doc_ids but {} scored documents",
                doc_ids.len(),
                bm25.len()
            )));
        }
        ensure_unique(&doc_ids, "lexical")?;
        Ok(Self { doc_ids, bm25 })
    }

    #[must_use]
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    #[must_use]
    pub const fn bm25(&self) -> &Bm25 {
        &self.bm25
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    #[must_use]
    pub fn score_all<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<f64> {
        self.bm25.score_all(tokens)
    }

    /// Tokenize `text` with the build-time scheme and score every document.
    #[must_use]
    pub fn score_text(&self, text: &str) -> Vec<f64> {
        self.bm25.score_all(&tokenize(text))
    }
}

pub(crate) fn ensure_unique(doc_ids: &[String], index: &str) -> Result<(), RetrievalError> {
    let mut seen = HashSet::with_capacity(doc_ids.len());
    for id in doc_ids {
        if !seen.insert(id.as_str()) {
            return Err(RetrievalError::index_inconsistent(format!(
                "{index} index lists doc_id '{id}' more than once"
            )));
        }
    }
    Ok(())
}
