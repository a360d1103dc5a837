//! Exact inner-product vector index.
//!
//! Stored vectors are unit length, so the inner product with a unit query is
//! the cosine similarity. Search is a brute-force scan; corpora here are
//! small enough that an approximate structure buys nothing.

use crate::error::RetrievalError;
use crate::lexical::ensure_unique;
use std::cmp::Ordering;

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    /// Position in the vector index (not necessarily the corpus position).
    pub position: usize,
    /// Inner product with the query.
    pub similarity: f32,
}

/// Scale `vector` to unit L2 norm. A zero vector is returned unchanged.
#[must_use]
pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let mut out = vector.to_vec();
    l2_normalize_in_place(&mut out);
    out
}

pub fn l2_normalize_in_place(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Row-major flat index of fixed-dimension vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexLoad`] if any row has the wrong length.
    pub fn from_rows(dimension: usize, rows: &[Vec<f32>]) -> Result<Self, RetrievalError> {
        let mut index = Self::new(dimension);
        index.data.reserve(dimension * rows.len());
        for (position, row) in rows.iter().enumerate() {
            if row.len() != dimension {
                return Err(RetrievalError::index_inconsistent(format!(
                    "vector {position} has dimension {} (expected {dimension})",
                    row.len()
                )));
            }
            index.data.extend_from_slice(row);
        }
        Ok(index)
    }

    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] on a dimension mismatch.
    pub fn add(&mut self, vector: &[f32]) -> Result<(), RetrievalError> {
        if vector.len() != self.dimension {
            return Err(RetrievalError::embedding(format!(
                "vector has dimension {} (index expects {})",
                vector.len(),
                self.dimension
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Return up to `top_n` hits ordered by similarity descending, ties going
    /// to the lower position.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] when the query dimension differs
    /// from the index dimension.
    pub fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<VectorHit>, RetrievalError> {
        if query.len() != self.dimension {
            return Err(RetrievalError::embedding(format!(
                "query vector has dimension {} (index expects {})",
                query.len(),
                self.dimension
            )));
        }

        let mut hits: Vec<VectorHit> = self
            .rows()
            .enumerate()
            .map(|(position, row)| VectorHit {
                position,
                // A sum of `-0.0` products is `-0.0`; `+ 0.0` makes every zero tie.
                similarity: row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>() + 0.0,
            })
            .collect();

        let by_similarity = |a: &VectorHit, b: &VectorHit| -> Ordering {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.position.cmp(&b.position))
        };

        if top_n == 0 {
            return Ok(Vec::new());
        }
        if top_n < hits.len() {
            hits.select_nth_unstable_by(top_n - 1, by_similarity);
            hits.truncate(top_n);
        }
        hits.sort_by(by_similarity);
        Ok(hits)
    }
}

/// Flat index paired with its `doc_id` sequence and the embedding model
/// that produced its vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    doc_ids: Vec<String>,
    model: String,
    index: FlatIpIndex,
}

impl VectorIndex {
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexLoad`] if the id and vector counts
    /// differ or a `doc_id` repeats.
    pub fn new(
        doc_ids: Vec<String>,
        model: impl Into<String>,
        index: FlatIpIndex,
    ) -> Result<Self, RetrievalError> {
        if doc_ids.len() != index.len() {
            return Err(RetrievalError::index_inconsistent(format!(
                "vector index has {} doc_ids but {} vectors",
                doc_ids.len(),
                index.len()
            )));
        }
        ensure_unique(&doc_ids, "vector")?;
        Ok(Self {
            doc_ids,
            model: model.into(),
            index,
        })
    }

    #[must_use]
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn index(&self) -> &FlatIpIndex {
        &self.index
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// See [`FlatIpIndex::search`]. `unit_query` must already be normalized.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] on a dimension mismatch.
    pub fn search(
        &self,
        unit_query: &[f32],
        top_n: usize,
    ) -> Result<Vec<VectorHit>, RetrievalError> {
        self.index.search(unit_query, top_n)
    }
}
