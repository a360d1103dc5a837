//! Offline construction of an [`IndexBundle`] from corpus documents.

use crate::bundle::IndexBundle;
use crate::corpus::{Document, corpus_digest};
use crate::embed::Embedder;
use crate::error::RetrievalError;
use crate::lexical::{Bm25, Bm25Params, LexicalIndex};
use crate::tokenize::tokenize;
use crate::vector::{FlatIpIndex, VectorIndex, l2_normalize_in_place};
use tracing::{info, instrument, warn};

const EMBED_BATCH_SIZE: usize = 64;

/// Builds both indexes over the same corpus, in corpus order.
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    params: Bm25Params,
}

impl<'a> IndexBuilder<'a> {
    #[must_use]
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            params: Bm25Params::default(),
        }
    }

    #[must_use]
    pub const fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    /// Tokenize, score-prepare and embed every document.
    ///
    /// Vectors are stored unit-normalized; a document that embeds to the zero
    /// vector keeps it and matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] if the embedder fails or returns
    /// vectors of the wrong dimension, and [`RetrievalError::IndexLoad`] if
    /// document ids repeat.
    #[instrument(skip_all, fields(documents = docs.len(), model = self.embedder.model_name()))]
    pub fn build(&self, docs: &[Document]) -> Result<IndexBundle, RetrievalError> {
        if docs.is_empty() {
            warn!("building index bundle over an empty corpus");
        }

        let doc_ids: Vec<String> = docs.iter().map(|d| d.doc_id.clone()).collect();

        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(&d.text)).collect();
        let bm25 = Bm25::from_tokenized(&tokenized, self.params);
        let lexical = LexicalIndex::new(doc_ids.clone(), bm25)?;

        let dimension = self.embedder.dimension();
        let mut flat = FlatIpIndex::new(dimension);
        for batch in docs.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|d| d.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts)?;
            if embeddings.len() != texts.len() {
                return Err(RetrievalError::embedding(format!(
                    "embedding batch length mismatch: expected {}, got {}",
                    texts.len(),
                    embeddings.len()
                )));
            }
            for mut embedding in embeddings {
                l2_normalize_in_place(&mut embedding);
                flat.add(&embedding)?;
            }
        }
        let vector = VectorIndex::new(doc_ids, self.embedder.model_name(), flat)?;

        info!(
            documents = lexical.len(),
            avgdl = lexical.bm25().avgdl(),
            dimension,
            "built index bundle"
        );

        Ok(IndexBundle {
            lexical,
            vector,
            corpus_digest: corpus_digest(docs),
        })
    }
}
