//! `sentence-transformers/all-MiniLM-L6-v2` sentence embeddings.
//!
//! Inference runs on ONNX Runtime and is only compiled with the
//! `semantic-ort` feature. Model files are read from `$MEEPLE_MODEL_DIR`, or
//! `<cache_dir>/meeple/models/all-MiniLM-L6-v2`, and fetched from the
//! Hugging Face hub on first use.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "semantic-ort")]
pub use runtime::MiniLmEmbedder;

/// Model name recorded in index bundles.
pub const MINILM_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Width of the pooled sentence vector.
pub const MINILM_DIMENSION: usize = 384;

/// Overrides the model directory.
pub const MODEL_DIR_ENV: &str = "MEEPLE_MODEL_DIR";

const MODEL_DIR_NAME: &str = "all-MiniLM-L6-v2";

/// Tokens past this are truncated, matching the model's `max_seq_length`.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

/// Whether `name` selects this model, by hub id or bare repository name.
#[must_use]
pub fn is_minilm(name: &str) -> bool {
    name == MINILM_MODEL || name == MODEL_DIR_NAME
}

/// Directory holding `model.onnx` and `tokenizer.json`.
///
/// # Errors
///
/// Returns an error if neither `$MEEPLE_MODEL_DIR` nor an OS cache
/// directory is available.
pub fn model_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let cache = dirs::cache_dir().context("unable to determine OS cache directory")?;
    Ok(cached_model_dir(&cache))
}

fn cached_model_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("meeple").join("models").join(MODEL_DIR_NAME)
}

/// Attention-masked mean of one sequence of token states.
///
/// `states` is row-major `[seq_len, hidden]`. Padding tokens (mask 0) are
/// skipped; a fully masked sequence pools to the zero vector.
#[must_use]
pub fn mean_pool(states: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0_f32; hidden];
    if hidden == 0 {
        return pooled;
    }
    let mut count = 0_u32;
    for (token, row) in states.chunks_exact(hidden).enumerate() {
        if mask.get(token).copied().unwrap_or(0) == 0 {
            continue;
        }
        count += 1;
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
    }
    if count > 0 {
        let denom = count as f32;
        for value in &mut pooled {
            *value /= denom;
        }
    }
    pooled
}

#[cfg(feature = "semantic-ort")]
mod runtime {
    use super::{MAX_SEQUENCE_LENGTH, MINILM_DIMENSION, MINILM_MODEL, mean_pool, model_dir};
    use crate::embed::Embedder;
    use crate::error::RetrievalError;
    use anyhow::{Context, Result, anyhow, bail};
    use ort::session::Session;
    use ort::value::Tensor;
    use std::fmt;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tokenizers::Tokenizer;
    use tracing::{debug, info};

    const HUB_BASE_URL: &str =
        "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";
    const ONNX_FILENAME: &str = "model.onnx";
    const TOKENIZER_FILENAME: &str = "tokenizer.json";

    /// MiniLM-L6-v2 behind an ONNX Runtime session.
    ///
    /// The session is not reentrant, so inference is serialized on a mutex.
    pub struct MiniLmEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
    }

    impl fmt::Debug for MiniLmEmbedder {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MiniLmEmbedder")
                .field("model", &MINILM_MODEL)
                .finish_non_exhaustive()
        }
    }

    impl MiniLmEmbedder {
        /// Load from [`model_dir`], downloading missing files.
        ///
        /// # Errors
        ///
        /// Returns an error if the files cannot be fetched or loaded.
        pub fn load() -> Result<Self> {
            Self::load_from(&model_dir()?)
        }

        /// Load from `dir`, downloading missing files into it.
        ///
        /// # Errors
        ///
        /// Returns an error if the files cannot be fetched or loaded.
        pub fn load_from(dir: &Path) -> Result<Self> {
            let model_path = ensure_file(dir, ONNX_FILENAME, "onnx/model.onnx")?;
            let tokenizer_path = ensure_file(dir, TOKENIZER_FILENAME, TOKENIZER_FILENAME)?;

            let session = Session::builder()
                .context("failed to create ONNX Runtime session builder")?
                .commit_from_file(&model_path)
                .with_context(|| {
                    format!("failed to load embedding model from {}", model_path.display())
                })?;
            let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|err| {
                anyhow!(
                    "failed loading tokenizer from {}: {err}",
                    tokenizer_path.display()
                )
            })?;

            info!(dir = %dir.display(), "loaded MiniLM embedding model");
            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
            })
        }

        fn infer(&self, text: &str) -> Result<Vec<f32>> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|err| anyhow!("tokenization failed: {err}"))?;

            let seq_len = encoding.get_ids().len().clamp(1, MAX_SEQUENCE_LENGTH);
            let mut input_ids = vec![0_i64; seq_len];
            let mut attention_mask = vec![0_i64; seq_len];
            for (slot, (&id, &mask)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .take(seq_len)
                .enumerate()
            {
                input_ids[slot] = i64::from(id);
                attention_mask[slot] = i64::from(mask);
            }

            let shape = vec![1_i64, i64::try_from(seq_len)?];
            let ids_tensor = Tensor::<i64>::from_array((shape.clone(), input_ids))?;
            let mask_tensor = Tensor::<i64>::from_array((shape.clone(), attention_mask.clone()))?;
            let type_tensor = Tensor::<i64>::from_array((shape, vec![0_i64; seq_len]))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow!("embedding session lock poisoned"))?;
            let mut outputs = session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])?;

            let first_key = outputs
                .keys()
                .next()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("embedding model returned no outputs"))?;
            let output = outputs
                .remove(first_key)
                .ok_or_else(|| anyhow!("embedding model output extraction failed"))?;
            let (shape, states) = output
                .try_extract_tensor::<f32>()
                .map_err(|err| anyhow!("embedding output decode failed: {err}"))?;

            if shape.len() != 3 {
                bail!("expected [batch, seq, hidden] output, got rank {}", shape.len());
            }
            let hidden = usize::try_from(shape[2]).unwrap_or(0);
            if hidden != MINILM_DIMENSION {
                bail!("model produced {hidden}-dimensional states (expected {MINILM_DIMENSION})");
            }
            debug!(tokens = seq_len, "embedded text");
            Ok(mean_pool(states, &attention_mask, hidden))
        }
    }

    impl Embedder for MiniLmEmbedder {
        fn model_name(&self) -> &str {
            MINILM_MODEL
        }

        fn dimension(&self) -> usize {
            MINILM_DIMENSION
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
            self.infer(text)
                .map_err(|err| RetrievalError::embedding(format!("{err:#}")))
        }
    }

    fn ensure_file(dir: &Path, name: &str, remote: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            return Ok(path);
        }

        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create model directory {}", dir.display()))?;

        let url = format!("{HUB_BASE_URL}/{remote}");
        info!(%url, "downloading model file");
        let response = ureq::get(&url)
            .call()
            .with_context(|| format!("failed to download {url}"))?;

        let temp_path = dir.join(format!("{name}.tmp"));
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        io::copy(&mut response.into_reader(), &mut file)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &path).with_context(|| {
            format!(
                "failed to move downloaded file from {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_uses_expected_suffix() {
        let path = cached_model_dir(Path::new("/tmp/cache"));
        assert!(path.ends_with(Path::new("meeple").join("models").join("all-MiniLM-L6-v2")));
    }

    #[test]
    fn model_name_aliases() {
        assert!(is_minilm("sentence-transformers/all-MiniLM-L6-v2"));
        assert!(is_minilm("all-MiniLM-L6-v2"));
        assert!(!is_minilm("all-MiniLM-L12-v2"));
        assert!(!is_minilm("hashing-v1-384"));
    }

    #[test]
    fn mean_pool_skips_padding() {
        let states = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let pooled = mean_pool(&states, &[1, 1, 0], 2);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn mean_pool_of_fully_masked_sequence_is_zero() {
        assert_eq!(mean_pool(&[5.0, 6.0], &[0], 2), vec![0.0, 0.0]);
        assert!(mean_pool(&[], &[], 0).is_empty());
    }
}
