use crate::error::GenerationError;
use crate::hosted::{failure_details, HostedApi};
use crate::traits::LanguageModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}

/// Text completion against the hosted `/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HostedCompletionModel {
    api: HostedApi,
    settings: CompletionSettings,
}

impl HostedCompletionModel {
    pub fn new(api: HostedApi, settings: CompletionSettings) -> Self {
        Self { api, settings }
    }
}

#[async_trait]
impl LanguageModel for HostedCompletionModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = self.api.endpoint("completions")?;
        let response = self
            .api
            .post_json(
                url,
                &CompletionRequest {
                    model: &self.settings.model,
                    prompt,
                    temperature: self.settings.temperature,
                    max_tokens: self.settings.max_tokens,
                },
            )
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::Backend {
                backend: self.settings.model.clone(),
                details: failure_details(response).await,
            });
        }

        let payload: CompletionResponse = response.json().await?;
        first_completion(payload)
    }
}

fn first_completion(payload: CompletionResponse) -> Result<String, GenerationError> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.text)
        .ok_or(GenerationError::EmptyCompletion)
}
