//! Append-only query traces.
//!
//! Each traced search appends one JSON line to
//! `<dir>/trace_<YYYYmmdd-HHMMSS>.jsonl`, named after the local time of the
//! query. Queries landing in the same second share a file.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use meeple_search::FusedHit;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct TraceRecord<'a> {
    pub ts: String,
    pub query: &'a str,
    pub k: usize,
    pub alpha: f64,
    pub results: &'a [FusedHit],
}

impl<'a> TraceRecord<'a> {
    pub fn new(
        now: DateTime<Local>,
        query: &'a str,
        k: usize,
        alpha: f64,
        results: &'a [FusedHit],
    ) -> Self {
        Self {
            ts: now.to_rfc3339(),
            query,
            k,
            alpha,
            results,
        }
    }
}

pub fn trace_file_name(now: &DateTime<Local>) -> String {
    format!("trace_{}.jsonl", now.format("%Y%m%d-%H%M%S"))
}

/// Append `record` to the trace file for `now`, creating `dir` if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn log_query(dir: &Path, now: &DateTime<Local>, record: &TraceRecord<'_>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;

    let path = dir.join(trace_file_name(now));
    let mut line = serde_json::to_string(record).context("failed to encode trace record")?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open trace file {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))?;

    debug!(path = %path.display(), "appended query trace");
    Ok(path)
}
