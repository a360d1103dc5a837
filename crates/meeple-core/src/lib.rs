#![forbid(unsafe_code)]
//! meeple-core library.
//!
//! Corpus records, the BM25 lexical index, the flat inner-product vector
//! index, the [`embed::Embedder`] capability (with an optional MiniLM
//! backend behind the `semantic-ort` feature), and the versioned index bundle
//! that persists both indexes together.
//!
//! # Conventions
//!
//! - **Errors**: [`error::RetrievalError`] for index and query failures,
//!   `anyhow::Result` for file I/O and config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod builder;
pub mod bundle;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod error;
pub mod lexical;
pub mod minilm;
pub mod tokenize;
pub mod vector;

pub use builder::IndexBuilder;
pub use bundle::IndexBundle;
pub use corpus::Document;
pub use embed::{Embedder, HashingEmbedder, embedder_for_model};
pub use error::{ErrorCode, ErrorKind, RetrievalError};
pub use lexical::LexicalIndex;
#[cfg(feature = "semantic-ort")]
pub use minilm::MiniLmEmbedder;
pub use vector::{VectorHit, VectorIndex};
