//! Embedding capability.
//!
//! The retriever never loads a model itself; it is handed an [`Embedder`].
//! Index bundles record the embedder's [`Embedder::model_name`] so that
//! [`embedder_for_model`] can rebuild an identical embedder at query time.

use crate::error::RetrievalError;
use crate::minilm;
use crate::tokenize::tokenize;

/// Prefix of the built-in hashing model names (`hashing-v1-<dimension>`).
pub const HASHING_MODEL_PREFIX: &str = "hashing-v1-";

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "hashing-v1-384";

const BIGRAM_WEIGHT: f32 = 0.5;

/// Text to vector. Output need not be normalized.
///
/// Implementations must be shareable across threads. A backend that cannot
/// run concurrently must serialize calls internally (e.g. behind a `Mutex`).
pub trait Embedder: Send + Sync {
    /// Stable identifier recorded in index bundles.
    fn model_name(&self) -> &str;

    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] if inference fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// Batch inference; the default embeds one text at a time.
    ///
    /// # Errors
    ///
    /// Returns the first embedding failure.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase token (weight 1.0) and each adjacent token pair (weight
/// 0.5) is hashed with BLAKE3 into a signed bucket. Texts sharing
/// vocabulary land close together; no model files are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    /// # Errors
    ///
    /// Returns [`RetrievalError::Configuration`] for a zero dimension.
    pub fn new(dimension: usize) -> Result<Self, RetrievalError> {
        if dimension == 0 {
            return Err(RetrievalError::configuration(
                "hashing embedder dimension must be at least 1",
            ));
        }
        Ok(Self {
            dimension,
            model_name: format!("{HASHING_MODEL_PREFIX}{dimension}"),
        })
    }

    fn accumulate(&self, feature: &str, weight: f32, out: &mut [f32]) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut bucket_bytes = [0_u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = u64::from_le_bytes(bucket_bytes) % self.dimension as u64;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        // bucket < dimension, so the narrowing is lossless.
        #[allow(clippy::cast_possible_truncation)]
        let slot = bucket as usize;
        out[slot] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let tokens = tokenize(text);
        let mut out = vec![0.0_f32; self.dimension];
        for token in &tokens {
            self.accumulate(token, 1.0, &mut out);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT, &mut out);
        }
        Ok(out)
    }
}

/// Rebuild the embedder named in an index bundle.
///
/// # Errors
///
/// Returns [`RetrievalError::IndexLoad`] for names no embedder is known for,
/// and [`RetrievalError::Embedding`] when MiniLM is named but cannot be
/// loaded (or the `semantic-ort` feature is off).
pub fn embedder_for_model(model: &str) -> Result<Box<dyn Embedder>, RetrievalError> {
    if minilm::is_minilm(model) {
        return load_minilm();
    }
    let dimension = model
        .strip_prefix(HASHING_MODEL_PREFIX)
        .and_then(|dim| dim.parse::<usize>().ok())
        .filter(|&dim| dim > 0)
        .ok_or_else(|| RetrievalError::unknown_model(model))?;
    Ok(Box::new(HashingEmbedder::new(dimension)?))
}

#[cfg(feature = "semantic-ort")]
fn load_minilm() -> Result<Box<dyn Embedder>, RetrievalError> {
    let embedder = minilm::MiniLmEmbedder::load()
        .map_err(|err| RetrievalError::embedding(format!("{err:#}")))?;
    Ok(Box::new(embedder))
}

#[cfg(not(feature = "semantic-ort"))]
fn load_minilm() -> Result<Box<dyn Embedder>, RetrievalError> {
    Err(RetrievalError::embedding(format!(
        "{} needs ONNX Runtime: rebuild meeple with the `semantic-ort` feature",
        minilm::MINILM_MODEL
    )))
}
