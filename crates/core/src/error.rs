use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("no text could be extracted from the document")]
    NoTextExtracted,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index build failed: {0}")]
    Index(#[from] IndexError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    Backend { backend: String, details: String },

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("requested {requested} embeddings but received {received}")]
    CountMismatch { requested: usize, received: usize },

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("vector dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector {0} contains NaN or infinite values")]
    NonFinite(usize),

    #[error("cannot build an index without vectors")]
    Empty,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    Backend { backend: String, details: String },

    #[error("completion response had no text")]
    EmptyCompletion,

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no document has been ingested yet")]
    NotInitialized,

    #[error("{0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Generation(#[from] GenerationError),
}
