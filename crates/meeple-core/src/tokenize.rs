//! Query and document tokenization.
//!
//! Index build and query time must use exactly this scheme: BM25 scores are
//! keyed by token identity, so any drift silently zeroes matches.

/// Lowercase, whitespace-split tokens. Punctuation is kept attached.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}
