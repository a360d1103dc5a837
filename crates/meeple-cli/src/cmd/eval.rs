//! `meeple eval`: recall/MRR over a gold query set.

use crate::cmd::project_path;
use crate::output::{OutputMode, render_mode, report_retrieval_error};
use anyhow::Context;
use clap::Args;
use meeple_core::config::ProjectConfig;
use meeple_search::eval::{EvalReport, read_gold_jsonl};
use meeple_search::{HybridRetriever, SearchParams, evaluate};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
#[command(
    about = "Evaluate retrieval quality against gold queries",
    long_about = "Run every query of a JSONL gold set ({\"query\", \"gold_doc_ids\"} per line) and \
                  report Recall@k and MRR@k.",
    after_help = "EXAMPLES:\n    # Evaluate and write a markdown report\n    meeple eval --gold eval/gold.jsonl --report eval/report.md\n\n\
                  # Evaluate at k=5 with a lexical-heavy blend\n    meeple eval --gold eval/gold.jsonl -k 5 --alpha 0.7"
)]
pub struct EvalArgs {
    /// JSONL gold query file.
    #[arg(long)]
    pub gold: PathBuf,

    /// Write the markdown report to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Cutoff for both metrics (defaults to `[search] k`).
    #[arg(short = 'k', long = "k")]
    pub k: Option<usize>,

    /// Lexical share of the fused score (defaults to `[search] alpha`).
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Index bundle directory (defaults to `[index] dir`).
    #[arg(long)]
    pub indices: Option<PathBuf>,
}

/// Execute `meeple eval`.
///
/// # Errors
///
/// Returns an error if the gold set or bundle cannot be read, a query fails,
/// or the report cannot be written.
pub fn run_eval(
    args: &EvalArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let dir = project_path(
        project_root,
        args.indices.as_deref().unwrap_or(&config.index.dir),
    );
    let alpha = args.alpha.unwrap_or(config.search.alpha);
    let mut params = SearchParams::from(&config.search);
    if let Some(k) = args.k {
        params.k = k;
    }

    let gold = read_gold_jsonl(&project_path(project_root, &args.gold))?;
    let retriever =
        HybridRetriever::open(&dir, alpha).map_err(|e| report_retrieval_error(output, e))?;
    let report =
        evaluate(&retriever, &gold, &params).map_err(|e| report_retrieval_error(output, e))?;

    if let Some(path) = &args.report {
        let path = project_path(project_root, path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, report.to_markdown())
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!(path = %path.display(), "wrote evaluation report");
    }

    render_mode(output, &report, render_eval_text, render_eval_human)
}

fn render_eval_human(report: &EvalReport, w: &mut dyn Write) -> std::io::Result<()> {
    write!(w, "{}", report.to_markdown())
}

fn render_eval_text(report: &EvalReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "eval  n={}  recall@{k}={:.3}  mrr@{k}={:.3}",
        report.queries,
        report.recall,
        report.mrr,
        k = report.k
    )?;
    for row in &report.per_query {
        if row.recall < 1.0 {
            writeln!(w, "miss  query={}", row.query)?;
        }
    }
    Ok(())
}
