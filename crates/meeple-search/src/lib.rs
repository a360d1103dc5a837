#![forbid(unsafe_code)]
//! meeple-search library.
//!
//! The hybrid fusion engine ([`HybridRetriever`]), the z-score normalization
//! it blends with, and recall/MRR evaluation over gold query sets.
//!
//! # Conventions
//!
//! - **Errors**: [`meeple_core::RetrievalError`] from query paths,
//!   `anyhow::Result` where files are read.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod eval;
pub mod normalize;
pub mod retriever;
pub mod select;

pub use eval::{EvalReport, GoldQuery, evaluate, mrr_at_k, recall_at_k};
pub use retriever::{FusedHit, HybridRetriever, SearchParams, SearchResponse};
