//! Persisted index bundle.
//!
//! A bundle is a directory holding two co-located JSON artifacts:
//!
//! - `lexical.json`: BM25 state plus the corpus-ordered `doc_id` list.
//! - `vector.json`: unit vectors, their `doc_id` list, and the embedding
//!   model name.
//!
//! Both carry a `format_version` and the digest of the corpus they were
//! built from. A bundle only loads when both artifacts parse, agree on the
//! digest, and are internally consistent.

use crate::error::RetrievalError;
use crate::lexical::{Bm25, Bm25Params, LexicalIndex, TermCounts};
use crate::vector::{FlatIpIndex, VectorIndex};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Version written by this build and the only one it reads.
pub const FORMAT_VERSION: u32 = 1;

pub const LEXICAL_ARTIFACT: &str = "lexical.json";
pub const VECTOR_ARTIFACT: &str = "vector.json";

/// On-disk form of the lexical index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalArtifact {
    pub format_version: u32,
    pub corpus_digest: String,
    pub doc_ids: Vec<String>,
    pub bm25: Bm25State,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25State {
    #[serde(flatten)]
    pub params: Bm25Params,
    pub documents: Vec<TermCounts>,
}

/// On-disk form of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorArtifact {
    pub format_version: u32,
    pub corpus_digest: String,
    pub model: String,
    pub dimension: usize,
    pub doc_ids: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

/// Both indexes, loaded and cross-checked.
#[derive(Debug, Clone)]
pub struct IndexBundle {
    pub lexical: LexicalIndex,
    pub vector: VectorIndex,
    pub corpus_digest: String,
}

impl IndexBundle {
    /// Load and validate both artifacts from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexLoad`] if either artifact is missing,
    /// unparseable, of another format version, internally inconsistent, or
    /// built from a different corpus than the other.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self, RetrievalError> {
        let lexical_path = dir.join(LEXICAL_ARTIFACT);
        let vector_path = dir.join(VECTOR_ARTIFACT);

        let lexical: LexicalArtifact = read_artifact(&lexical_path)?;
        check_version(&lexical_path, lexical.format_version)?;
        let vector: VectorArtifact = read_artifact(&vector_path)?;
        check_version(&vector_path, vector.format_version)?;

        if lexical.corpus_digest != vector.corpus_digest {
            return Err(RetrievalError::index_inconsistent(format!(
                "{LEXICAL_ARTIFACT} and {VECTOR_ARTIFACT} were built from different corpora"
            )));
        }

        let bundle = Self::from_artifacts(lexical, vector)?;
        info!(
            documents = bundle.lexical.len(),
            model = bundle.vector.model(),
            dimension = bundle.vector.dimension(),
            "loaded index bundle"
        );
        Ok(bundle)
    }

    /// Rebuild in-memory indexes from parsed artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexLoad`] when either artifact is
    /// internally inconsistent.
    pub fn from_artifacts(
        lexical: LexicalArtifact,
        vector: VectorArtifact,
    ) -> Result<Self, RetrievalError> {
        let bm25 = Bm25::from_term_counts(lexical.bm25.documents, lexical.bm25.params);
        let lexical_index = LexicalIndex::new(lexical.doc_ids, bm25)?;

        let flat = FlatIpIndex::from_rows(vector.dimension, &vector.vectors)?;
        let vector_index = VectorIndex::new(vector.doc_ids, vector.model, flat)?;

        Ok(Self {
            lexical: lexical_index,
            vector: vector_index,
            corpus_digest: lexical.corpus_digest,
        })
    }

    #[must_use]
    pub fn lexical_artifact(&self) -> LexicalArtifact {
        let bm25 = self.lexical.bm25();
        LexicalArtifact {
            format_version: FORMAT_VERSION,
            corpus_digest: self.corpus_digest.clone(),
            doc_ids: self.lexical.doc_ids().to_vec(),
            bm25: Bm25State {
                params: bm25.params(),
                documents: bm25.term_counts().to_vec(),
            },
        }
    }

    #[must_use]
    pub fn vector_artifact(&self) -> VectorArtifact {
        VectorArtifact {
            format_version: FORMAT_VERSION,
            corpus_digest: self.corpus_digest.clone(),
            model: self.vector.model().to_owned(),
            dimension: self.vector.dimension(),
            doc_ids: self.vector.doc_ids().to_vec(),
            vectors: self.vector.index().rows().map(<[f32]>::to_vec).collect(),
        }
    }

    /// Write both artifacts into `dir`, creating it if needed.
    ///
    /// Each artifact is written to a temporary file and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a write fails.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create index directory {}", dir.display()))?;

        write_artifact(&dir.join(LEXICAL_ARTIFACT), &self.lexical_artifact())?;
        write_artifact(&dir.join(VECTOR_ARTIFACT), &self.vector_artifact())?;

        info!(documents = self.lexical.len(), "saved index bundle");
        Ok(())
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, RetrievalError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(RetrievalError::index_missing(path));
        }
        Err(err) => return Err(RetrievalError::index_corrupt(path, err)),
    };
    debug!(path = %path.display(), bytes = bytes.len(), "read index artifact");
    serde_json::from_slice(&bytes).map_err(|err| RetrievalError::index_corrupt(path, err))
}

fn check_version(path: &Path, found: u32) -> Result<(), RetrievalError> {
    if found == FORMAT_VERSION {
        Ok(())
    } else {
        Err(RetrievalError::version_mismatch(path, found, FORMAT_VERSION))
    }
}

fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_vec(value)
        .with_context(|| format!("failed to encode {}", path.display()))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, encoded)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
