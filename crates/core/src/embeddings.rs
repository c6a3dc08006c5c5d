use crate::error::EmbeddingError;
use crate::hosted::{failure_details, HostedApi};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const DEFAULT_EMBEDDING_MODEL: &str = "togethercomputer/m2-bert-80M-8k-retrieval";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                requested: 1,
                received: vectors.len(),
            });
        }
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            requested: 1,
            received: 0,
        })
    }
}

/// Hashed character-trigram embedder. Deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Embeddings from the hosted `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HostedEmbedder {
    api: HostedApi,
    model: String,
}

impl HostedEmbedder {
    pub fn new(api: HostedApi, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for HostedEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.api.endpoint("embeddings")?;
        let response = self
            .api
            .post_json(
                url,
                &EmbeddingRequest {
                    model: &self.model,
                    input: texts,
                },
            )
            .await?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Backend {
                backend: "embeddings".to_string(),
                details: failure_details(response).await,
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        order_embeddings(payload, texts.len())
    }
}

fn order_embeddings(
    payload: EmbeddingResponse,
    requested: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if payload.data.len() != requested {
        return Err(EmbeddingError::CountMismatch {
            requested,
            received: payload.data.len(),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; requested];
    for (position, item) in payload.data.into_iter().enumerate() {
        let index = item.index.unwrap_or(position);
        let slot = slots.get_mut(index).ok_or_else(|| {
            EmbeddingError::Malformed(format!("index {index} out of range for {requested} inputs"))
        })?;
        if slot.is_some() {
            return Err(EmbeddingError::Malformed(format!("duplicate index {index}")));
        }
        *slot = Some(item.embedding);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| EmbeddingError::Malformed(format!("missing index {index}")))
        })
        .collect()
}
