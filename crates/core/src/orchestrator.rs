use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::models::{ConversationTurn, RetrievalOptions, ScoredChunk};
use crate::traits::{LanguageModel, VectorIndex};
use std::sync::Arc;
use tracing::debug;

pub const SYSTEM_INSTRUCTION: &str = "You are StudyMate, a study assistant answering questions \
about the document the user uploaded. Provide accurate and concise information based on the \
user's questions. Do not generate your own questions and answers. Adhere strictly to the \
instructions provided, using the relevant context from the document while avoiding unnecessary \
details. Your responses will be brief, professional, and contextually relevant. If the context \
does not contain the answer, say that the document does not cover it.";

pub fn format_history(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn answer_prompt(context: &str, history: &str, question: &str) -> String {
    format!(
        "<s>[INST]{SYSTEM_INSTRUCTION}\nCONTEXT: {context}\nCHAT HISTORY: {history}\n\
         QUESTION: {question}\nANSWER: </s>[INST] "
    )
}

pub fn condense_prompt(history: &str, question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language.\n\n\
         Chat History:\n{history}\nFollow Up Input: {question}\nStandalone question:"
    )
}

#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub answer: String,
    /// The question retrieval ran with, after condensing.
    pub standalone_question: String,
    pub sources: Vec<ScoredChunk>,
}

/// Conversational retrieval over one document's index.
#[derive(Clone)]
pub struct RetrievalChain {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    options: RetrievalOptions,
}

impl RetrievalChain {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            options,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn run(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<ChainOutput, ChatError> {
        let history_text = format_history(history);

        let standalone_question = if self.options.condense_question && !history.is_empty() {
            let rephrased = self
                .model
                .complete(&condense_prompt(&history_text, question))
                .await?;
            let rephrased = rephrased.trim();
            if rephrased.is_empty() {
                question.to_string()
            } else {
                rephrased.to_string()
            }
        } else {
            question.to_string()
        };

        let query_vector = self.embedder.embed_query(&standalone_question).await?;
        let sources = self.index.search(&query_vector, self.options.top_k).await?;
        debug!(hits = sources.len(), question = %standalone_question, "retrieved context");

        let context = sources
            .iter()
            .map(|hit| hit.chunk.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = answer_prompt(&context, &history_text, &standalone_question);
        let answer = self.model.complete(&prompt).await?;

        Ok(ChainOutput {
            answer: answer.trim().to_string(),
            standalone_question,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::fixtures::{EchoModel, FailingEmbedder, FailingModel};
    use crate::models::Chunk;
    use crate::error::GenerationError;
    use crate::store::InMemoryVectorIndex;
    use async_trait::async_trait;

    /// Rewrites every follow-up into a fixed standalone question.
    struct RewritingModel {
        standalone: &'static str,
    }

    #[async_trait]
    impl LanguageModel for RewritingModel {
        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            if prompt.trim_end().ends_with("Standalone question:") {
                Ok(format!(" {} ", self.standalone))
            } else {
                Ok("done".to_string())
            }
        }
    }

    fn index_of(texts: &[&str]) -> Arc<dyn VectorIndex> {
        let embedder = CharacterNgramEmbedder::default();
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                chunk_id: format!("chunk-{position}"),
                text: text.to_string(),
            })
            .collect();
        let vectors = chunks
            .iter()
            .map(|chunk| embedder.embed_text(&chunk.text))
            .collect();
        match InMemoryVectorIndex::build(chunks, vectors) {
            Ok(index) => Arc::new(index),
            Err(error) => panic!("fixture index failed to build: {error}"),
        }
    }

    fn chain(model: Arc<dyn LanguageModel>, options: RetrievalOptions) -> RetrievalChain {
        RetrievalChain::new(
            index_of(&[
                "The capital of France is Paris.",
                "Mitochondria are the powerhouse of the cell.",
            ]),
            Arc::new(CharacterNgramEmbedder::default()),
            model,
            options,
        )
    }

    #[tokio::test]
    async fn answer_prompt_carries_context_and_question() -> Result<(), ChatError> {
        let model = Arc::new(EchoModel::default());
        let chain = chain(model.clone(), RetrievalOptions::default());

        let output = chain.run("What is the capital of France?", &[]).await?;

        assert!(output.answer.contains("Paris"));
        assert_eq!(output.sources[0].chunk.text, "The capital of France is Paris.");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("<s>[INST]You are StudyMate"));
        assert!(prompts[0].contains("QUESTION: What is the capital of France?"));
        assert!(prompts[0].contains("CHAT HISTORY: \n"));
        Ok(())
    }

    #[tokio::test]
    async fn follow_ups_are_condensed_with_history() -> Result<(), ChatError> {
        let model = Arc::new(EchoModel::default());
        let chain = chain(model.clone(), RetrievalOptions::default());
        let history = vec![ConversationTurn::new("What is the capital of France?", "Paris.")];

        let output = chain.run("And what powers the cell?", &history).await?;

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Follow Up Input: And what powers the cell?"));
        assert!(prompts[0].contains("Human: What is the capital of France?\nAssistant: Paris."));
        assert!(prompts[1].contains("CHAT HISTORY: Human: What is the capital of France?"));
        assert_eq!(output.standalone_question, "And what powers the cell?");
        Ok(())
    }

    #[tokio::test]
    async fn retrieval_follows_the_condensed_question() -> Result<(), ChatError> {
        let chain = chain(
            Arc::new(RewritingModel {
                standalone: "Mitochondria are the powerhouse of the cell.",
            }),
            RetrievalOptions {
                top_k: 1,
                condense_question: true,
            },
        );
        let history = vec![ConversationTurn::new("What do cells need?", "Energy.")];

        let output = chain
            .run("The capital of France is Paris. What else?", &history)
            .await?;

        assert_eq!(
            output.standalone_question,
            "Mitochondria are the powerhouse of the cell."
        );
        assert_eq!(
            output.sources[0].chunk.text,
            "Mitochondria are the powerhouse of the cell."
        );
        assert_eq!(output.answer, "done");
        Ok(())
    }

    #[tokio::test]
    async fn condensing_can_be_disabled() -> Result<(), ChatError> {
        let model = Arc::new(EchoModel::default());
        let chain = chain(
            model.clone(),
            RetrievalOptions {
                top_k: 1,
                condense_question: false,
            },
        );
        let history = vec![ConversationTurn::new("q", "a")];

        let output = chain.run("What is the capital of France?", &history).await?;

        assert_eq!(model.prompts().len(), 1);
        assert_eq!(output.sources.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn generation_failures_are_typed() {
        let chain = chain(Arc::new(FailingModel), RetrievalOptions::default());
        let result = chain.run("anything", &[]).await;
        assert!(matches!(result, Err(ChatError::Generation(_))));
    }

    #[tokio::test]
    async fn embedding_failures_are_typed() {
        let chain = RetrievalChain::new(
            index_of(&["text"]),
            Arc::new(FailingEmbedder),
            Arc::new(EchoModel::default()),
            RetrievalOptions::default(),
        );
        let result = chain.run("anything", &[]).await;
        assert!(matches!(result, Err(ChatError::Embedding(_))));
    }

    #[test]
    fn history_is_rendered_oldest_first() {
        let turns = vec![ConversationTurn::new("q1", "a1"), ConversationTurn::new("q2", "a2")];
        assert_eq!(
            format_history(&turns),
            "Human: q1\nAssistant: a1\nHuman: q2\nAssistant: a2"
        );
    }
}
