use crate::error::IndexError;
use crate::models::{Chunk, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;

/// Exact cosine-similarity index held in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryVectorIndex {
    dimensions: usize,
    entries: Vec<IndexedChunk>,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

impl InMemoryVectorIndex {
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimensions = match embeddings.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => {
                return Err(IndexError::DimensionMismatch {
                    expected: 1,
                    actual: 0,
                })
            }
            None => return Err(IndexError::Empty),
        };

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (chunk, vector))| {
                if vector.len() != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                if vector.iter().any(|value| !value.is_finite()) {
                    return Err(IndexError::NonFinite(position));
                }
                Ok(IndexedChunk {
                    chunk,
                    vector: normalized(vector),
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(Self {
            dimensions,
            entries,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }
        if query_vector.iter().any(|value| !value.is_finite()) {
            return Err(IndexError::NonFinite(0));
        }

        let query = normalized(query_vector.to_vec());
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, dot(&query, &entry.vector)))
            .collect();

        // stable sort keeps insertion order among equal scores
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn normalized(mut vector: Vec<f32>) -> Vec<f32> {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut vector {
            *value /= magnitude;
        }
    }
    vector
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}
