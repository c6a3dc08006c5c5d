mod api;

use anyhow::Context;
use api::{ApiSettings, AppState};
use axum::http::HeaderValue;
use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use studymate_core::models::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBED_BATCH_SIZE, DEFAULT_MEMORY_WINDOW,
    DEFAULT_TOP_K,
};
use studymate_core::{
    http_client, CharacterNgramEmbedder, CompletionSettings, Embedder, HostedApi,
    HostedCompletionModel, HostedEmbedder, LopdfExtractor, RetrievalOptions, SessionController,
    SessionOptions, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbeddingProvider {
    /// Embeddings from the hosted inference API.
    Hosted,
    /// Offline hashed character trigrams.
    Local,
}

#[derive(Debug, Parser)]
#[command(name = "studymate-server", version, about = "Upload a PDF and chat with it")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "STUDYMATE_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Origins allowed to call the API from a browser
    #[arg(
        long = "cors-origin",
        env = "STUDYMATE_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:8080,http://127.0.0.1:8080"
    )]
    cors_origins: Vec<String>,

    /// Key for the hosted inference API
    #[arg(long, env = "TOGETHER_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL of the hosted inference API
    #[arg(long, env = "STUDYMATE_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    api_base_url: String,

    /// Completion model used to answer questions
    #[arg(long, env = "STUDYMATE_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, env = "STUDYMATE_TEMPERATURE", default_value_t = 0.5)]
    temperature: f32,

    /// Upper bound on tokens generated per answer
    #[arg(long, env = "STUDYMATE_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: u32,

    /// Where chunk and question embeddings come from
    #[arg(long, env = "STUDYMATE_EMBEDDINGS", value_enum, default_value_t = EmbeddingProvider::Hosted)]
    embeddings: EmbeddingProvider,

    /// Hosted embedding model
    #[arg(long, env = "STUDYMATE_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Chunks sent per embedding request
    #[arg(long, env = "STUDYMATE_EMBEDDING_BATCH_SIZE", default_value_t = DEFAULT_EMBED_BATCH_SIZE)]
    embedding_batch_size: usize,

    /// Maximum characters per chunk
    #[arg(long, env = "STUDYMATE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, env = "STUDYMATE_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "STUDYMATE_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Question/answer exchanges remembered
    #[arg(long, env = "STUDYMATE_MEMORY_WINDOW", default_value_t = DEFAULT_MEMORY_WINDOW)]
    memory_window: usize,

    /// Rephrase follow-up questions into standalone ones before retrieval
    #[arg(long, env = "STUDYMATE_CONDENSE_QUESTION", default_value_t = true, action = ArgAction::Set)]
    condense_question: bool,

    /// Forget the conversation whenever a new PDF is uploaded
    #[arg(long, env = "STUDYMATE_CLEAR_MEMORY_ON_UPLOAD", default_value_t = false)]
    clear_memory_on_upload: bool,

    /// Timeout for each call to the hosted API, in seconds
    #[arg(long, env = "STUDYMATE_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,

    /// Largest accepted upload body, in bytes
    #[arg(long, env = "STUDYMATE_MAX_UPLOAD_BYTES", default_value_t = api::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Directory uploads are written to while they are ingested
    #[arg(long, env = "STUDYMATE_SPOOL_DIR")]
    spool_dir: Option<PathBuf>,
}

impl Cli {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            embed_batch_size: self.embedding_batch_size,
            memory_window: self.memory_window,
            clear_memory_on_ingest: self.clear_memory_on_upload,
            retrieval: RetrievalOptions {
                top_k: self.top_k,
                condense_question: self.condense_question,
            },
        }
    }

    fn api_settings(&self) -> anyhow::Result<ApiSettings> {
        let cors_origins = self
            .cors_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("invalid CORS origin: {origin}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ApiSettings {
            cors_origins,
            max_upload_bytes: self.max_upload_bytes,
            spool_dir: self.spool_dir.clone(),
        })
    }

    fn build_controller(&self) -> anyhow::Result<SessionController> {
        let client = http_client(Duration::from_secs(self.request_timeout_secs))
            .context("failed to build http client")?;
        let api = HostedApi::new(client, &self.api_base_url, self.api_key.clone())
            .with_context(|| format!("invalid api base url: {}", self.api_base_url))?;
        info!(base_url = %api.base_url(), "using hosted inference api");

        let embedder: Arc<dyn Embedder> = match self.embeddings {
            EmbeddingProvider::Hosted => {
                Arc::new(HostedEmbedder::new(api.clone(), self.embedding_model.clone()))
            }
            EmbeddingProvider::Local => Arc::new(CharacterNgramEmbedder::default()),
        };
        let model = Arc::new(HostedCompletionModel::new(
            api,
            CompletionSettings {
                model: self.chat_model.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
        ));

        SessionController::new(
            Arc::new(LopdfExtractor),
            embedder,
            model,
            self.session_options(),
        )
        .context("invalid session options")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.api_settings()?;
    let controller = cli.build_controller()?;

    let app = api::create_app(
        AppState::new(Arc::new(controller)),
        &settings,
    );

    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        bind = %cli.bind,
        chat_model = %cli.chat_model,
        embeddings = ?cli.embeddings,
        "studymate-server boot"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("studymate-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_observed_service() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["studymate-server", "--api-key", "test-key"])?;
        let options = cli.session_options();
        assert_eq!(options.chunk_size, 500);
        assert_eq!(options.chunk_overlap, 50);
        assert_eq!(options.retrieval.top_k, 4);
        assert_eq!(options.memory_window, 2);
        assert!(options.retrieval.condense_question);
        assert_eq!(cli.bind.port(), 8000);
        assert_eq!(cli.api_settings()?.cors_origins.len(), 2);
        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "studymate-server",
            "--api-key",
            "test-key",
            "--embeddings",
            "local",
            "--condense-question",
            "false",
            "--cors-origin",
            "http://example.test:3000",
            "--top-k",
            "2",
        ])?;
        assert_eq!(cli.embeddings, EmbeddingProvider::Local);
        assert!(!cli.session_options().retrieval.condense_question);
        assert_eq!(cli.session_options().retrieval.top_k, 2);
        assert_eq!(cli.api_settings()?.cors_origins.len(), 1);
        assert!(cli.build_controller().is_ok());
        Ok(())
    }

    #[test]
    fn generation_settings_fall_back_to_environment() -> anyhow::Result<()> {
        std::env::set_var("STUDYMATE_MAX_TOKENS", "256");
        let cli = Cli::try_parse_from(["studymate-server", "--api-key", "test-key"]);
        std::env::remove_var("STUDYMATE_MAX_TOKENS");

        let cli = cli?;
        assert_eq!(cli.max_tokens, 256);
        assert!(cli.spool_dir.is_none());
        Ok(())
    }
}
