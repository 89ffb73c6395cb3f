use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Expected PDF, got {0}")]
    UnsupportedContentType(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("No extractable text found in PDF")]
    NoExtractableText,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] SearchError),
}

impl IngestError {
    /// Whether the failure was caused by the caller's input rather than by a
    /// backend or its configuration.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedContentType(_)
                | Self::PdfParse(_)
                | Self::NoExtractableText
                | Self::InvalidArgument(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

impl SearchError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model '{model}' is not supported by the {backend} backend")]
    UnsupportedModel { backend: String, model: String },

    #[error("embedding backend {backend} failed: {details}")]
    Backend { backend: String, details: String },

    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
