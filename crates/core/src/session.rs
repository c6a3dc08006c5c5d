use crate::embeddings::Embedder;
use crate::error::{ChatError, IngestError};
use crate::extractor::PdfExtractor;
use crate::ingest::build_document_index;
use crate::memory::ConversationMemory;
use crate::models::{ConversationTurn, IngestSummary, SessionOptions, SessionStatus};
use crate::orchestrator::RetrievalChain;
use crate::traits::{LanguageModel, VectorIndex};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const NOT_READY_MESSAGE: &str = "Please upload a PDF document first to initialize the chatbot.";

/// State derived from the most recently ingested PDF.
pub struct DocumentSession {
    pub id: Uuid,
    pub checksum: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    chain: RetrievalChain,
}

impl DocumentSession {
    pub fn chain(&self) -> &RetrievalChain {
        &self.chain
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.chain.index()
    }
}

/// Owns the single active document session and the shared conversation
/// memory. A new session is built completely before it replaces the old
/// one, so a failed ingest leaves the previous session in place and an
/// in-flight answer keeps the session it started with.
pub struct SessionController {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    options: SessionOptions,
    session: RwLock<Option<Arc<DocumentSession>>>,
    memory: Mutex<ConversationMemory>,
}

impl SessionController {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        options: SessionOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;
        let memory = ConversationMemory::new(options.memory_window);
        Ok(Self {
            extractor,
            embedder,
            model,
            options,
            session: RwLock::new(None),
            memory: Mutex::new(memory),
        })
    }

    pub async fn current(&self) -> Option<Arc<DocumentSession>> {
        self.session.read().await.clone()
    }

    /// Returns whether the document is now the active session. The failure
    /// reason is logged; use [`SessionController::try_ingest`] to inspect it.
    pub async fn ingest(&self, pdf: Vec<u8>) -> bool {
        match self.try_ingest(pdf).await {
            Ok(_) => true,
            Err(error) => {
                error!(%error, "failed to ingest document");
                false
            }
        }
    }

    pub async fn try_ingest_path(&self, path: &Path) -> Result<IngestSummary, IngestError> {
        let pdf = tokio::fs::read(path).await?;
        self.try_ingest(pdf).await
    }

    pub async fn try_ingest(&self, pdf: Vec<u8>) -> Result<IngestSummary, IngestError> {
        info!(bytes = pdf.len(), "processing document");

        let built = build_document_index(
            pdf,
            Arc::clone(&self.extractor),
            self.embedder.as_ref(),
            &self.options,
        )
        .await?;

        let index: Arc<dyn VectorIndex> = Arc::new(built.index);
        let chain = RetrievalChain::new(
            index,
            Arc::clone(&self.embedder),
            Arc::clone(&self.model),
            self.options.retrieval,
        );
        let session = Arc::new(DocumentSession {
            id: Uuid::new_v4(),
            checksum: built.checksum,
            page_count: built.page_count,
            chunk_count: built.chunk_count,
            created_at: Utc::now(),
            chain,
        });

        let summary = IngestSummary {
            session_id: session.id,
            checksum: session.checksum.clone(),
            page_count: session.page_count,
            chunk_count: session.chunk_count,
            ingested_at: session.created_at,
        };

        *self.session.write().await = Some(session);
        if self.options.clear_memory_on_ingest {
            self.memory.lock().await.clear();
        }

        info!(
            session_id = %summary.session_id,
            checksum = %summary.checksum,
            pages = summary.page_count,
            chunks = summary.chunk_count,
            "document indexed and session ready"
        );
        Ok(summary)
    }

    /// Always yields text: the answer, the not-ready message, or a
    /// description of what went wrong.
    pub async fn answer(&self, question: &str) -> String {
        match self.try_answer(question).await {
            Ok(answer) => answer,
            Err(ChatError::NotInitialized) => NOT_READY_MESSAGE.to_string(),
            Err(error) => {
                warn!(%error, "answer generation failed");
                format!("Sorry, I encountered an error: {error}")
            }
        }
    }

    pub async fn try_answer(&self, question: &str) -> Result<String, ChatError> {
        let session = self.current().await.ok_or(ChatError::NotInitialized)?;
        let history = self.memory.lock().await.as_messages();

        let output = session.chain().run(question, &history).await?;
        info!(
            session_id = %session.id,
            sources = output.sources.len(),
            "answered question"
        );

        self.memory
            .lock()
            .await
            .append(ConversationTurn::new(question, output.answer.clone()));
        Ok(output.answer)
    }

    /// Clears conversation memory; the active session is kept.
    pub async fn reset(&self) {
        self.memory.lock().await.clear();
        info!("conversation memory cleared");
    }

    pub async fn status(&self) -> SessionStatus {
        match self.current().await {
            Some(session) => SessionStatus {
                initialized: true,
                has_index: !session.index().is_empty(),
                has_pipeline: true,
            },
            None => SessionStatus::default(),
        }
    }

    pub async fn memory_len(&self) -> usize {
        self.memory.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::LopdfExtractor;
    use crate::fixtures::{pdf_with_pages, EchoModel, FailingModel};

    fn controller_with(
        model: Arc<dyn LanguageModel>,
        options: SessionOptions,
    ) -> SessionController {
        match SessionController::new(
            Arc::new(LopdfExtractor),
            Arc::new(CharacterNgramEmbedder::default()),
            model,
            options,
        ) {
            Ok(controller) => controller,
            Err(error) => panic!("controller construction failed: {error}"),
        }
    }

    fn controller() -> SessionController {
        controller_with(Arc::new(EchoModel::default()), SessionOptions::default())
    }

    #[tokio::test]
    async fn answer_before_ingest_is_the_not_ready_message() {
        let controller = controller();
        assert_eq!(controller.answer("Hello?").await, NOT_READY_MESSAGE);
        assert!(matches!(
            controller.try_answer("Hello?").await,
            Err(ChatError::NotInitialized)
        ));
        assert_eq!(controller.status().await, SessionStatus::default());
        assert_eq!(controller.memory_len().await, 0);
    }

    #[tokio::test]
    async fn readable_pdf_initializes_the_session() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller();
        assert!(controller.ingest(pdf_with_pages(&["Some lecture notes."])?).await);

        let status = controller.status().await;
        assert!(status.initialized);
        assert!(status.has_index);
        assert!(status.has_pipeline);
        Ok(())
    }

    #[tokio::test]
    async fn capital_of_france_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller();
        controller
            .try_ingest(pdf_with_pages(&["The capital of France is Paris."])?)
            .await?;

        let response = controller.answer("What is the capital of France?").await;
        assert!(response.contains("Paris"), "unexpected answer: {response}");
        assert_eq!(controller.memory_len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn textless_pdf_leaves_state_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller();
        assert!(!controller.ingest(pdf_with_pages(&[""])?).await);
        assert_eq!(controller.status().await, SessionStatus::default());

        let first = controller
            .try_ingest(pdf_with_pages(&["Original document text."])?)
            .await?;
        let result = controller.try_ingest(pdf_with_pages(&[""])?).await;
        assert!(matches!(result, Err(IngestError::NoTextExtracted)));

        let current = controller.current().await.map(|session| session.id);
        assert_eq!(current, Some(first.session_id));
        Ok(())
    }

    #[tokio::test]
    async fn reset_clears_memory_but_keeps_the_index() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller();
        controller
            .try_ingest(pdf_with_pages(&["The capital of France is Paris."])?)
            .await?;
        controller.answer("What is the capital of France?").await;
        controller.answer("Which country is Paris in?").await;
        assert_eq!(controller.memory_len().await, 2);

        controller.reset().await;
        controller.reset().await;
        assert_eq!(controller.memory_len().await, 0);
        assert!(controller.status().await.initialized);

        let response = controller.answer("What is the capital of France?").await;
        assert!(response.contains("Paris"));
        Ok(())
    }

    #[tokio::test]
    async fn memory_window_is_bounded() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller();
        controller
            .try_ingest(pdf_with_pages(&["Photosynthesis happens in chloroplasts."])?)
            .await?;
        for round in 0..5 {
            controller.answer(&format!("Question {round}?")).await;
        }
        assert_eq!(controller.memory_len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn generation_errors_become_text() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller_with(Arc::new(FailingModel), SessionOptions::default());
        controller.try_ingest(pdf_with_pages(&["Some text."])?).await?;

        let response = controller.answer("What now?").await;
        assert!(response.starts_with("Sorry, I encountered an error: "));
        assert!(response.contains("503"));
        assert_eq!(controller.memory_len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn reingest_keeps_memory_by_default() -> Result<(), Box<dyn std::error::Error>> {
        let controller = controller();
        controller.try_ingest(pdf_with_pages(&["First document."])?).await?;
        controller.answer("What is in the first document?").await;

        controller.try_ingest(pdf_with_pages(&["Second document."])?).await?;
        assert_eq!(controller.memory_len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn reingest_can_clear_memory() -> Result<(), Box<dyn std::error::Error>> {
        let options = SessionOptions {
            clear_memory_on_ingest: true,
            ..SessionOptions::default()
        };
        let controller = controller_with(Arc::new(EchoModel::default()), options);
        controller.try_ingest(pdf_with_pages(&["First document."])?).await?;
        controller.answer("What is in the first document?").await;

        controller.try_ingest(pdf_with_pages(&["Second document."])?).await?;
        assert_eq!(controller.memory_len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn spooled_upload_is_ingested_from_disk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("upload.pdf");
        std::fs::write(&path, pdf_with_pages(&["Notes kept on disk."])?)?;

        let controller = controller();
        let summary = controller.try_ingest_path(&path).await?;
        assert_eq!(summary.page_count, 1);
        assert!(controller.status().await.initialized);
        Ok(())
    }

    #[test]
    fn invalid_options_are_rejected() {
        let result = SessionController::new(
            Arc::new(LopdfExtractor),
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(EchoModel::default()),
            SessionOptions {
                chunk_overlap: 600,
                ..SessionOptions::default()
            },
        );
        assert!(result.is_err());
    }
}
