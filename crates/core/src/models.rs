use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_MEMORY_WINDOW: usize = 2;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// One question/answer exchange held in conversation memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionStatus {
    pub initialized: bool,
    pub has_index: bool,
    pub has_pipeline: bool,
}

/// What a successful ingestion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub session_id: uuid::Uuid,
    pub checksum: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Rephrase follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            condense_question: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
    pub memory_window: usize,
    pub clear_memory_on_ingest: bool,
    pub retrieval: RetrievalOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            memory_window: DEFAULT_MEMORY_WINDOW,
            clear_memory_on_ingest: false,
            retrieval: RetrievalOptions::default(),
        }
    }
}

impl SessionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding batch size must be positive".to_string(),
            ));
        }
        if self.memory_window == 0 {
            return Err(IngestError::InvalidArgument(
                "memory window must hold at least one turn".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(IngestError::InvalidArgument(
                "top_k must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
