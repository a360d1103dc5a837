//! `meeple build`: index a JSONL corpus.
//!
//! Builds the BM25 lexical index and the embedding vector index over the same
//! corpus and writes both artifacts into one bundle directory.

use crate::cmd::project_path;
use crate::output::{OutputMode, pretty_kv, pretty_rule, render_mode, report_retrieval_error};
use anyhow::Context;
use clap::Args;
use meeple_core::config::ProjectConfig;
use meeple_core::corpus::read_corpus_jsonl;
use meeple_core::{IndexBuilder, embedder_for_model};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
#[command(
    about = "Build the lexical and vector indexes from a corpus",
    long_about = "Build both indexes from a JSONL corpus (one {\"doc_id\", \"text\", ...} object per line) \
                  and write lexical.json and vector.json into the index directory.",
    after_help = "EXAMPLES:\n    # Build into the configured index directory\n    meeple build --corpus data/games.jsonl\n\n\
                  # Build with a smaller hashing model into a custom directory\n    meeple build --corpus data/games.jsonl --out /tmp/idx --model hashing-v1-128"
)]
pub struct BuildArgs {
    /// JSONL corpus file.
    #[arg(long)]
    pub corpus: PathBuf,

    /// Output directory (defaults to `[index] dir`).
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Embedding model name (defaults to `[index] model`).
    #[arg(long)]
    pub model: Option<String>,
}

/// Summary of a finished build.
#[derive(Debug, Serialize)]
pub struct BuildOutput {
    pub documents: usize,
    pub model: String,
    pub dimension: usize,
    pub corpus_digest: String,
    pub out: PathBuf,
}

/// Execute `meeple build`.
///
/// # Errors
///
/// Returns an error if the corpus cannot be read, the model is unknown,
/// embedding fails, or the artifacts cannot be written.
pub fn run_build(
    args: &BuildArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let corpus_path = project_path(project_root, &args.corpus);
    let out_dir = project_path(
        project_root,
        args.out.as_deref().unwrap_or(&config.index.dir),
    );
    let model = args.model.as_deref().unwrap_or(&config.index.model);

    let docs = read_corpus_jsonl(&corpus_path)?;
    let embedder = embedder_for_model(model).map_err(|e| report_retrieval_error(output, e))?;
    let bundle = IndexBuilder::new(embedder.as_ref())
        .build(&docs)
        .map_err(|e| report_retrieval_error(output, e))?;
    bundle
        .save(&out_dir)
        .with_context(|| format!("failed to save index bundle to {}", out_dir.display()))?;

    let summary = BuildOutput {
        documents: bundle.lexical.len(),
        model: bundle.vector.model().to_string(),
        dimension: bundle.vector.dimension(),
        corpus_digest: bundle.corpus_digest,
        out: out_dir,
    };

    render_mode(output, &summary, render_build_text, render_build_human)
}

fn render_build_human(out: &BuildOutput, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "✓ indexed {} document(s)", out.documents)?;
    pretty_rule(w)?;
    pretty_kv(w, "model", &out.model)?;
    pretty_kv(w, "dimension", out.dimension.to_string())?;
    pretty_kv(w, "digest", &out.corpus_digest)?;
    pretty_kv(w, "output", out.out.display().to_string())
}

fn render_build_text(out: &BuildOutput, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "built  documents={}  model={}  dimension={}  out={}",
        out.documents,
        out.model,
        out.dimension,
        out.out.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildOutput {
        BuildOutput {
            documents: 3,
            model: "hashing-v1-384".into(),
            dimension: 384,
            corpus_digest: "abc123".into(),
            out: PathBuf::from("indices"),
        }
    }

    #[test]
    fn text_output_is_one_line() {
        let mut buf = Vec::new();
        render_build_text(&sample(), &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            text,
            "built  documents=3  model=hashing-v1-384  dimension=384  out=indices\n"
        );
    }

    #[test]
    fn human_output_lists_details() {
        let mut buf = Vec::new();
        render_build_human(&sample(), &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("indexed 3 document(s)"));
        assert!(text.contains("abc123"));
    }
}
