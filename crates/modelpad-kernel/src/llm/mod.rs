//! Generation provider abstraction.
//!
//! A provider turns a prompt into a stream of [`ProviderEvent`]s. The kernel
//! never talks HTTP itself: [`StreamingProvider`] speaks the newline-delimited
//! JSON protocol over an injected [`Transport`], [`OpenAiProvider`] speaks
//! OpenAI-style server-sent events over the same transport, and
//! [`ScriptedProvider`] replays canned tokens for tests and offline use.

mod config;
mod ndjson;
mod scripted;
mod sse;
mod stream;

pub use config::{ModelSettings, ServerConfig};
pub use ndjson::{ByteStream, NdjsonDecoder, StreamChunk, StreamingProvider, Transport};
pub use scripted::ScriptedProvider;
pub use sse::{OpenAiProvider, SseDecoder, SseEvent};
pub use stream::{GenerateRequest, ProviderEvent};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use modelpad_types::GenerationStatus;

/// Error type for provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The backend could not be reached at all.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The backend answered with a non-success status.
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// The response stream broke off or reported an error.
    #[error("stream error: {0}")]
    Stream(String),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// No provider registered under this key.
    #[error("provider not available: {0}")]
    Unavailable(String),

    /// The provider task died before finishing.
    #[error("provider task interrupted: {0}")]
    Interrupted(String),
}

impl ProviderError {
    /// The document status this fault should surface as.
    pub fn generation_status(&self) -> GenerationStatus {
        match self {
            ProviderError::Connect(_) => GenerationStatus::NoConnection,
            _ => GenerationStatus::Error,
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A generation backend.
///
/// `generate` sends `Started` before the first token, any number of `Token`s
/// in order, and `Completed` exactly once at the end, including when
/// `cancel` fires. A transport fault returns `Err` instead of completing.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider key, e.g. `"ollama"`.
    fn name(&self) -> &str;

    /// Models the backend at `host` can serve.
    async fn list_models(&self, host: &str) -> ProviderResult<Vec<String>>;

    /// Default sampling settings the backend reports for `model`.
    async fn model_settings(&self, host: &str, model: &str) -> ProviderResult<ModelSettings>;

    /// Stream a completion for `request` into `events`.
    async fn generate(
        &self,
        request: GenerateRequest,
        events: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> ProviderResult<()>;
}

/// Providers by key.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>) {
        let name = provider.name().to_string();
        self.providers.insert(name, provider);
    }

    /// Register a provider under an explicit key.
    pub fn register_as(&mut self, key: impl Into<String>, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(key.into(), provider);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(key).cloned()
    }

    /// Registered keys, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
