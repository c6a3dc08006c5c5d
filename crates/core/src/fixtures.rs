//! Test doubles shared by this crate's tests and the server's router tests.

use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, GenerationError};
use crate::traits::LanguageModel;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Mutex;

/// A PDF with one page per entry, each page drawing its string with a
/// standard Type1 font. An empty string yields a page with no text layer.
pub fn pdf_with_pages(pages: &[&str]) -> Result<Vec<u8>, lopdf::Error> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Answers with the retrieved context it was given, so a test can check
/// what retrieval fed the model. Condense prompts are answered with the
/// follow-up question unchanged. Every prompt is recorded.
#[derive(Debug, Default)]
pub struct EchoModel {
    prompts: Mutex<Vec<String>>,
}

impl EchoModel {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl LanguageModel for EchoModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        if let Some(rest) = prompt.split("Follow Up Input: ").nth(1) {
            return Ok(rest.lines().next().unwrap_or_default().to_string());
        }

        let context = prompt
            .split("CONTEXT: ")
            .nth(1)
            .and_then(|rest| rest.split("\nCHAT HISTORY:").next())
            .unwrap_or_default();
        Ok(format!(" Based on the document: {context} "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Backend {
            backend: "fixture".to_string(),
            details: "503 Service Unavailable".to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Backend {
            backend: "fixture".to_string(),
            details: "embedding service unreachable".to_string(),
        })
    }
}
