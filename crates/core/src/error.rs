use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error in {document}: {details}")]
    PdfParse { document: String, details: String },

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

/// Failure classes that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    RateLimited,
    Server,
    Network,
    Timeout,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::Server => "server error",
            Self::Network => "network error",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} {kind} after {attempts} attempt(s): {details}")]
    Transient {
        provider: &'static str,
        kind: TransientKind,
        attempts: u32,
        details: String,
    },

    #[error("{provider} rejected the credentials: {details}")]
    Auth {
        provider: &'static str,
        details: String,
    },

    #[error("{provider} quota exhausted: {details}")]
    Quota {
        provider: &'static str,
        details: String,
    },

    #[error("{provider} refused the content: {details}")]
    ContentPolicy {
        provider: &'static str,
        details: String,
    },

    #[error("invalid response from {provider}: {details}")]
    BackendResponse {
        provider: &'static str,
        details: String,
    },

    #[error("invalid provider config: {0}")]
    Config(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            Self::Transient { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.transient_kind() == Some(TransientKind::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("nothing to index: the uploaded documents produced no text")]
    NothingToIndex,

    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    EmbeddingCount { chunks: usize, embeddings: usize },

    #[error("embedding dimension {found} != {expected} at chunk {chunk_index}")]
    DimensionMismatch {
        chunk_index: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("question embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("chat completion failed: {0}")]
    Chat(#[source] ProviderError),
}
