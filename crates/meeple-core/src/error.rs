use std::fmt;
use std::path::Path;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalid,
    ConfigParseError,
    IndexMissing,
    IndexCorrupt,
    IndexInconsistent,
    IndexVersionMismatch,
    UnknownEmbeddingModel,
    EmptyQuery,
    InvalidQueryParameter,
    EmptyCorpus,
    EmbeddingFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "E1001",
            Self::ConfigParseError => "E1002",
            Self::IndexMissing => "E3001",
            Self::IndexCorrupt => "E3002",
            Self::IndexInconsistent => "E3003",
            Self::IndexVersionMismatch => "E3004",
            Self::UnknownEmbeddingModel => "E3005",
            Self::EmptyQuery => "E4001",
            Self::InvalidQueryParameter => "E4002",
            Self::EmptyCorpus => "E4003",
            Self::EmbeddingFailed => "E6001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Invalid retrieval configuration",
            Self::ConfigParseError => "Config file parse error",
            Self::IndexMissing => "Index artifact missing",
            Self::IndexCorrupt => "Index artifact corrupt",
            Self::IndexInconsistent => "Index artifacts inconsistent",
            Self::IndexVersionMismatch => "Unsupported index format version",
            Self::UnknownEmbeddingModel => "Unknown embedding model",
            Self::EmptyQuery => "Empty query",
            Self::InvalidQueryParameter => "Invalid query parameter",
            Self::EmptyCorpus => "Empty corpus",
            Self::EmbeddingFailed => "Embedding failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid => Some("Use alpha in [0, 1] and k/kb/kv of at least 1."),
            Self::ConfigParseError => Some("Fix syntax in meeple.toml and retry."),
            Self::IndexMissing => Some("Run `meeple build --corpus <file>` to create the index."),
            Self::IndexCorrupt | Self::IndexVersionMismatch => {
                Some("Rebuild the index with `meeple build`.")
            }
            Self::IndexInconsistent => {
                Some("Rebuild both index artifacts together from the same corpus.")
            }
            Self::UnknownEmbeddingModel => {
                Some(
                    "Rebuild the index with `hashing-v1-<dim>` or `sentence-transformers/all-MiniLM-L6-v2`.",
                )
            }
            Self::EmptyQuery => Some("Provide a non-empty query string."),
            Self::InvalidQueryParameter => Some("Use k, kb and kv of at least 1."),
            Self::EmptyCorpus => Some("Build the index from a corpus with at least one document."),
            Self::EmbeddingFailed => Some(
                "Check the model files, or rebuild with the `semantic-ort` feature for MiniLM models.",
            ),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Broad error category, used by callers to tell client mistakes from
/// server-side faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    IndexLoad,
    InvalidQuery,
    Embedding,
}

/// Errors raised by index loading, construction and querying.
///
/// None of these are transient; they are reported to the caller as-is and
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    /// Invalid blend weight or parameter range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persisted index artifacts missing, corrupt, or mutually inconsistent.
    #[error("index load error: {message}")]
    IndexLoad { code: ErrorCode, message: String },

    /// Empty query, zero `k`/`kb`/`kv`, or empty corpus.
    #[error("invalid query: {message}")]
    InvalidQuery { code: ErrorCode, message: String },

    /// The embedder failed or produced a vector of the wrong shape.
    #[error("embedding failed: {0}")]
    Embedding(String),
}

impl RetrievalError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn index_missing(path: &Path) -> Self {
        Self::IndexLoad {
            code: ErrorCode::IndexMissing,
            message: format!("{} does not exist", path.display()),
        }
    }

    pub fn index_corrupt(path: &Path, detail: impl fmt::Display) -> Self {
        Self::IndexLoad {
            code: ErrorCode::IndexCorrupt,
            message: format!("{}: {detail}", path.display()),
        }
    }

    pub fn index_inconsistent(message: impl Into<String>) -> Self {
        Self::IndexLoad {
            code: ErrorCode::IndexInconsistent,
            message: message.into(),
        }
    }

    pub fn version_mismatch(path: &Path, found: u32, expected: u32) -> Self {
        Self::IndexLoad {
            code: ErrorCode::IndexVersionMismatch,
            message: format!(
                "{}: format version {found} (expected {expected})",
                path.display()
            ),
        }
    }

    pub fn unknown_model(model: &str) -> Self {
        Self::IndexLoad {
            code: ErrorCode::UnknownEmbeddingModel,
            message: format!("no embedder available for model '{model}'"),
        }
    }

    #[must_use]
    pub fn empty_query() -> Self {
        Self::InvalidQuery {
            code: ErrorCode::EmptyQuery,
            message: "query text must not be empty".to_string(),
        }
    }

    #[must_use]
    pub fn invalid_parameter(name: &str) -> Self {
        Self::InvalidQuery {
            code: ErrorCode::InvalidQueryParameter,
            message: format!("{name} must be at least 1"),
        }
    }

    #[must_use]
    pub fn empty_corpus() -> Self {
        Self::InvalidQuery {
            code: ErrorCode::EmptyCorpus,
            message: "corpus contains no documents".to_string(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::IndexLoad { .. } => ErrorKind::IndexLoad,
            Self::InvalidQuery { .. } => ErrorKind::InvalidQuery,
            Self::Embedding(_) => ErrorKind::Embedding,
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
            Self::IndexLoad { code, .. } | Self::InvalidQuery { code, .. } => *code,
            Self::Embedding(_) => ErrorCode::EmbeddingFailed,
        }
    }

    /// `true` when the caller supplied bad input (as opposed to a broken
    /// deployment or index).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidQuery)
    }
}
