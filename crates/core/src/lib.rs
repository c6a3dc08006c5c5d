pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod hosted;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

pub use chunking::{ChunkingConfig, TextSplitter, DEFAULT_SEPARATORS};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HostedEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{ChatError, EmbeddingError, GenerationError, IndexError, IngestError};
pub use extractor::{extract_document_text, join_pages, LopdfExtractor, PageText, PdfExtractor};
pub use hosted::{http_client, HostedApi, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use ingest::{build_document_index, document_checksum, DocumentIndex};
pub use llm::{CompletionSettings, HostedCompletionModel, DEFAULT_CHAT_MODEL};
pub use memory::ConversationMemory;
pub use models::{
    Chunk, ConversationTurn, IngestSummary, RetrievalOptions, ScoredChunk, SessionOptions,
    SessionStatus,
};
pub use orchestrator::{ChainOutput, RetrievalChain};
pub use session::{DocumentSession, SessionController, NOT_READY_MESSAGE};
pub use store::InMemoryVectorIndex;
pub use traits::{LanguageModel, VectorIndex};
