//! `meeple search`: hybrid retrieval over an index bundle.
//!
//! Blends BM25 and embedding similarity after z-scoring each channel over the
//! merged candidate pool. `--alpha 1` is lexical-only ranking, `--alpha 0`
//! vector-only.

use crate::cmd::project_path;
use crate::output::{OutputMode, render_mode, report_retrieval_error};
use crate::trace::{TraceRecord, log_query};
use clap::Args;
use meeple_core::config::ProjectConfig;
use meeple_search::{HybridRetriever, SearchParams, SearchResponse};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Args, Debug)]
#[command(
    about = "Search the corpus with hybrid lexical + vector ranking",
    long_about = "Rank documents by a blend of BM25 and embedding similarity.\n\n\
                  The top --kb lexical and top --kv vector hits form the candidate pool; each \
                  channel is z-scored over that pool and blended with --alpha (lexical share).",
    after_help = "EXAMPLES:\n    # Search with configured defaults\n    meeple search \"dice trading\"\n\n\
                  # Favour lexical matches and return five results\n    meeple search \"deck building\" --alpha 0.8 -k 5\n\n\
                  # Machine-readable output\n    meeple search \"hidden roles\" --format json"
)]
pub struct SearchArgs {
    /// Free-text query.
    pub query: String,

    /// Number of results (defaults to `[search] k`).
    #[arg(short = 'k', long = "k")]
    pub k: Option<usize>,

    /// Lexical candidate pool size (defaults to `[search] kb`).
    #[arg(long)]
    pub kb: Option<usize>,

    /// Vector candidate pool size (defaults to `[search] kv`).
    #[arg(long)]
    pub kv: Option<usize>,

    /// Lexical share of the fused score, in [0, 1] (defaults to `[search] alpha`).
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Index bundle directory (defaults to `[index] dir`).
    #[arg(long)]
    pub indices: Option<PathBuf>,
}

impl SearchArgs {
    fn params(&self, config: &ProjectConfig) -> SearchParams {
        let defaults = SearchParams::from(&config.search);
        SearchParams::new(
            self.k.unwrap_or(defaults.k),
            self.kb.unwrap_or(defaults.kb),
            self.kv.unwrap_or(defaults.kv),
        )
    }
}

/// Execute `meeple search <query>`.
///
/// # Errors
///
/// Returns an error if the bundle cannot be opened, the query or parameters
/// are invalid, or output rendering fails. A failed trace write is logged
/// and does not fail the search.
pub fn run_search(
    args: &SearchArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let dir = project_path(
        project_root,
        args.indices.as_deref().unwrap_or(&config.index.dir),
    );
    let alpha = args.alpha.unwrap_or(config.search.alpha);
    let params = args.params(config);

    let retriever =
        HybridRetriever::open(&dir, alpha).map_err(|e| report_retrieval_error(output, e))?;
    let results = retriever
        .search(&args.query, &params)
        .map_err(|e| report_retrieval_error(output, e))?;

    if config.trace.enabled {
        let now = chrono::Local::now();
        let trace_dir = project_path(project_root, &config.trace.dir);
        let record = TraceRecord::new(now, &args.query, params.k, alpha, &results);
        if let Err(err) = log_query(&trace_dir, &now, &record) {
            warn!("query trace not written: {err:#}");
        }
    }

    let response = SearchResponse::new(args.query.clone(), results);
    render_mode(output, &response, render_search_text, render_search_human)
}

fn render_search_human(out: &SearchResponse, w: &mut dyn Write) -> std::io::Result<()> {
    if out.results.is_empty() {
        writeln!(w, "No results for '{}'", out.query)?;
        return Ok(());
    }

    writeln!(w, "{} result(s) for '{}':", out.results.len(), out.query)?;
    writeln!(w, "{:-<72}", "")?;
    writeln!(
        w,
        "{:>4}  {:<16}  {:>8}  {:>9}  {:>8}",
        "#", "DOC", "FUSED", "LEXICAL", "VECTOR"
    )?;
    writeln!(w, "{:-<72}", "")?;

    for (rank, hit) in out.results.iter().enumerate() {
        writeln!(
            w,
            "{:>4}  {:<16}  {:>8.3}  {:>9.3}  {:>8.3}",
            rank + 1,
            hit.doc_id,
            hit.fused_score,
            hit.lexical_score,
            hit.vector_score
        )?;
    }
    Ok(())
}

fn render_search_text(out: &SearchResponse, w: &mut dyn Write) -> std::io::Result<()> {
    if out.results.is_empty() {
        writeln!(w, "advice  no-results  query={}", out.query)?;
        return Ok(());
    }

    for hit in &out.results {
        writeln!(
            w,
            "{}  fused={:.3}  lexical={:.3}  vector={:.3}",
            hit.doc_id, hit.fused_score, hit.lexical_score, hit.vector_score
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
