//! Corpus records and JSONL loading.
//!
//! A corpus file holds one JSON object per line. Every record must carry a
//! string `doc_id` and a string `text`; any other fields (name, year,
//! mechanics, ...) are preserved untouched in [`Document::extra`].

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// A single corpus document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique, stable identifier (e.g. `"G042"`).
    pub doc_id: String,
    /// Body used both for tokenization and for embedding.
    pub text: String,
    /// Remaining record fields, carried opaquely.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Read a JSONL corpus from disk.
///
/// # Errors
///
/// Fails if the file cannot be read, a line is not a valid document record,
/// or a `doc_id` appears twice.
pub fn read_corpus_jsonl(path: &Path) -> Result<Vec<Document>> {
    let file =
        File::open(path).with_context(|| format!("failed to open corpus {}", path.display()))?;
    let docs = parse_corpus_jsonl(BufReader::new(file))
        .with_context(|| format!("failed to parse corpus {}", path.display()))?;
    info!(documents = docs.len(), path = %path.display(), "loaded corpus");
    Ok(docs)
}

/// Parse JSONL corpus records from any buffered reader.
///
/// # Errors
///
/// See [`read_corpus_jsonl`].
pub fn parse_corpus_jsonl(reader: impl BufRead) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    let mut seen = HashSet::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let doc: Document = serde_json::from_str(&line)
            .with_context(|| format!("invalid document record on line {line_no}"))?;
        if !seen.insert(doc.doc_id.clone()) {
            bail!("duplicate doc_id '{}' on line {line_no}", doc.doc_id);
        }
        docs.push(doc);
    }

    Ok(docs)
}

/// SHA-256 fingerprint of the `(doc_id, text)` sequence, in corpus order.
///
/// Both index artifacts record this digest so that a lexical artifact and a
/// vector artifact built from different corpora are detected at load time.
#[must_use]
pub fn corpus_digest(docs: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in docs {
        for field in [doc.doc_id.as_bytes(), doc.text.as_bytes()] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
    }
    format!("{:x}", hasher.finalize())
}
