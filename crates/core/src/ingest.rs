use crate::chunking::{ChunkingConfig, TextSplitter};
use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, IngestError};
use crate::extractor::{extract_document_text, PdfExtractor};
use crate::models::{Chunk, SessionOptions};
use crate::store::InMemoryVectorIndex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Everything the build phase derives from one PDF.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    pub checksum: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub index: InMemoryVectorIndex,
}

pub fn document_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn make_chunk_id(checksum: &str, ordinal: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(checksum.as_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn chunk_text(text: &str, checksum: &str, splitter: &TextSplitter) -> Vec<Chunk> {
    splitter
        .split(text)
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .enumerate()
        .map(|(ordinal, piece)| Chunk {
            chunk_id: make_chunk_id(checksum, ordinal, &piece),
            text: piece,
        })
        .collect()
}

pub async fn build_document_index(
    pdf: Vec<u8>,
    extractor: Arc<dyn PdfExtractor>,
    embedder: &dyn Embedder,
    options: &SessionOptions,
) -> Result<DocumentIndex, IngestError> {
    options.validate()?;
    let splitter = TextSplitter::new(ChunkingConfig::from(options))?;
    let checksum = document_checksum(&pdf);

    let (text, page_count) =
        tokio::task::spawn_blocking(move || extract_document_text(extractor.as_ref(), &pdf))
            .await??;

    let chunks = chunk_text(&text, &checksum, &splitter);
    if chunks.is_empty() {
        return Err(IngestError::NoTextExtracted);
    }
    debug!(pages = page_count, chunks = chunks.len(), "split document text");

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(options.embed_batch_size) {
        let vectors = embedder.embed_documents(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                requested: batch.len(),
                received: vectors.len(),
            }
            .into());
        }
        embeddings.extend(vectors);
    }

    let chunk_count = chunks.len();
    let index = InMemoryVectorIndex::build(chunks, embeddings)?;
    debug!(chunks = chunk_count, dimensions = index.dimensions(), "built vector index");

    Ok(DocumentIndex {
        checksum,
        page_count,
        chunk_count,
        index,
    })
}
