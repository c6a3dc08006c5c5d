use crate::error::{GenerationError, IndexError};
use crate::models::ScoredChunk;
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The `top_k` most similar chunks, best first.
    async fn search(&self, query_vector: &[f32], top_k: usize)
        -> Result<Vec<ScoredChunk>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}
