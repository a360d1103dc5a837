//! Retrieval quality against labelled gold queries.
//!
//! # Metrics
//!
//! - **Recall@k**: 1.0 if any gold `doc_id` appears in the top `k`
//!   predictions, else 0.0. Averaged over queries.
//! - **MRR@k**: reciprocal rank of the first gold `doc_id` within the top
//!   `k`, 0.0 if none. Averaged over queries.
//!
//! Gold files are JSONL, one `{"query": ..., "gold_doc_ids": [...]}` per
//! line.

use crate::retriever::{HybridRetriever, SearchParams};
use anyhow::{Context, Result};
use meeple_core::error::RetrievalError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, instrument};

/// A query with the documents that count as correct answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldQuery {
    pub query: String,
    pub gold_doc_ids: Vec<String>,
}

/// Outcome of one gold query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEval {
    pub query: String,
    pub recall: f64,
    pub reciprocal_rank: f64,
    pub predicted: Vec<String>,
}

/// Averaged metrics over a gold set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub queries: usize,
    pub k: usize,
    pub recall: f64,
    pub mrr: f64,
    pub per_query: Vec<QueryEval>,
}

impl EvalReport {
    /// Markdown summary followed by a per-query table.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "# Eval Report\n\nN={}  \nRecall@{k}: {:.3}  \nMRR@{k}: {:.3}\n",
            self.queries,
            self.recall,
            self.mrr,
            k = self.k
        );
        if self.per_query.is_empty() {
            return out;
        }

        out.push_str("\n| query | recall | rr | top |\n|---|---|---|---|\n");
        for row in &self.per_query {
            let _ = writeln!(
                out,
                "| {} | {:.0} | {:.3} | {} |",
                row.query.replace('|', "\\|"),
                row.recall,
                row.reciprocal_rank,
                row.predicted.first().map_or("-", String::as_str)
            );
        }
        out
    }
}

/// 1.0 if any of `gold` is among the first `k` of `predicted`.
#[must_use]
pub fn recall_at_k<S: AsRef<str>>(gold: &[S], predicted: &[S], k: usize) -> f64 {
    let hit = predicted
        .iter()
        .take(k)
        .any(|p| gold.iter().any(|g| g.as_ref() == p.as_ref()));
    if hit { 1.0 } else { 0.0 }
}

/// `1 / rank` of the first of `gold` among the first `k` of `predicted`.
#[must_use]
pub fn mrr_at_k<S: AsRef<str>>(gold: &[S], predicted: &[S], k: usize) -> f64 {
    predicted
        .iter()
        .take(k)
        .position(|p| gold.iter().any(|g| g.as_ref() == p.as_ref()))
        .map_or(0.0, |idx| 1.0 / (idx + 1) as f64)
}

/// Run every gold query with `params` and average the metrics at
/// `params.k`.
///
/// # Errors
///
/// Returns [`RetrievalError::Configuration`] for an empty gold set and
/// propagates the first search failure.
#[instrument(skip_all, fields(queries = gold.len(), k = params.k))]
pub fn evaluate(
    retriever: &HybridRetriever,
    gold: &[GoldQuery],
    params: &SearchParams,
) -> Result<EvalReport, RetrievalError> {
    if gold.is_empty() {
        return Err(RetrievalError::configuration(
            "gold set contains no queries",
        ));
    }

    let mut per_query = Vec::with_capacity(gold.len());
    for example in gold {
        let predicted: Vec<String> = retriever
            .search(&example.query, params)?
            .into_iter()
            .map(|hit| hit.doc_id)
            .collect();
        per_query.push(QueryEval {
            query: example.query.clone(),
            recall: recall_at_k(&example.gold_doc_ids, &predicted, params.k),
            reciprocal_rank: mrr_at_k(&example.gold_doc_ids, &predicted, params.k),
            predicted,
        });
    }

    let n = per_query.len() as f64;
    let recall = per_query.iter().map(|q| q.recall).sum::<f64>() / n;
    let mrr = per_query.iter().map(|q| q.reciprocal_rank).sum::<f64>() / n;
    info!(recall, mrr, "evaluation complete");

    Ok(EvalReport {
        queries: per_query.len(),
        k: params.k,
        recall,
        mrr,
        per_query,
    })
}

/// Read a JSONL gold file.
///
/// # Errors
///
/// Fails if the file cannot be read or a line is not a gold record.
pub fn read_gold_jsonl(path: &Path) -> Result<Vec<GoldQuery>> {
    let file =
        File::open(path).with_context(|| format!("failed to open gold set {}", path.display()))?;
    parse_gold_jsonl(BufReader::new(file))
        .with_context(|| format!("failed to parse gold set {}", path.display()))
}

/// Parse JSONL gold records, skipping blank lines.
///
/// # Errors
///
/// See [`read_gold_jsonl`].
pub fn parse_gold_jsonl(reader: impl BufRead) -> Result<Vec<GoldQuery>> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: GoldQuery = serde_json::from_str(&line)
            .with_context(|| format!("invalid gold record on line {line_no}"))?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_counts_any_gold_hit_in_top_k() {
        let gold = ["G3", "G9"];
        assert!((recall_at_k(&gold, &["G1", "G9", "G3"], 2) - 1.0).abs() < f64::EPSILON);
        assert!(recall_at_k(&gold, &["G1", "G2", "G3"], 2).abs() < f64::EPSILON);
        assert!(recall_at_k(&gold, &[], 5).abs() < f64::EPSILON);
    }

    #[test]
    fn mrr_uses_first_gold_rank() {
        let gold = ["G3", "G9"];
        assert!((mrr_at_k(&gold, &["G1", "G9", "G3"], 10) - 0.5).abs() < f64::EPSILON);
        assert!((mrr_at_k(&gold, &["G3"], 10) - 1.0).abs() < f64::EPSILON);
        assert!(mrr_at_k(&gold, &["G1", "G2", "G3"], 2).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_gold_lines_and_skips_blanks() {
        let input = "{\"query\":\"dice\",\"gold_doc_ids\":[\"G000\"]}\n\n{\"query\":\"deck\",\"gold_doc_ids\":[]}\n";
        let gold = parse_gold_jsonl(input.as_bytes()).expect("parse");
        assert_eq!(gold.len(), 2);
        assert_eq!(gold[0].gold_doc_ids, vec!["G000".to_string()]);
        assert!(gold[1].gold_doc_ids.is_empty());
    }

    #[test]
    fn bad_gold_line_names_the_line() {
        let input = "{\"query\":\"dice\",\"gold_doc_ids\":[]}\n{\"query\":1}\n";
        let err = parse_gold_jsonl(input.as_bytes()).expect_err("must fail");
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn markdown_has_summary_and_rows() {
        let report = EvalReport {
            queries: 2,
            k: 10,
            recall: 0.5,
            mrr: 0.25,
            per_query: vec![QueryEval {
                query: "a|b".into(),
                recall: 1.0,
                reciprocal_rank: 0.5,
                predicted: vec!["G1".into(), "G2".into()],
            }],
        };
        let md = report.to_markdown();
        assert!(md.starts_with("# Eval Report\n\nN=2  \nRecall@10: 0.500  \nMRR@10: 0.250\n"));
        assert!(md.contains("| a\\|b | 1 | 0.500 | G1 |"));
    }
}
