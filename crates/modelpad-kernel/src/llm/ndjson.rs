//! Newline-delimited JSON generation streams.
//!
//! Backends of the Ollama family answer `/api/generate` with one JSON object
//! per line:
//!
//! ```text
//! {"response":"Hel","done":false}
//! {"response":"lo","done":false}
//! {"response":"","done":true,"context":[1,2,3]}
//! ```
//!
//! Transport chunks do not respect line or UTF-8 boundaries, so
//! [`NdjsonDecoder`] buffers raw bytes and only decodes complete lines.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{GenerateRequest, GenerationProvider, ModelSettings, ProviderError, ProviderEvent, ProviderResult};

/// Raw response body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// One decoded line of a generation stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Stateful line decoder. Safe to feed arbitrary byte splits.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(chunk) = self.decode_line(&line[..line.len() - 1]) {
                out.push(chunk);
            }
        }
        out
    }

    /// Decode whatever is left once the transport is exhausted.
    pub fn finish(&mut self) -> Option<StreamChunk> {
        let rest = std::mem::take(&mut self.buf);
        self.decode_line(&rest)
    }

    /// Lines dropped because they did not decode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<StreamChunk> {
        let text = match std::str::from_utf8(line) {
            Ok(t) => t.trim(),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, "skipping non-utf8 stream line");
                return None;
            }
        };
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str(text) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, line = text, "skipping malformed stream line");
                None
            }
        }
    }
}

/// Byte-level access to a backend. The HTTP client lives outside the kernel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` and stream the response body.
    async fn post_stream(&self, url: &str, body: Value) -> ProviderResult<ByteStream>;

    async fn get_json(&self, url: &str) -> ProviderResult<Value>;

    async fn post_json(&self, url: &str, body: Value) -> ProviderResult<Value>;
}

/// One client shared by several providers.
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post_stream(&self, url: &str, body: Value) -> ProviderResult<ByteStream> {
        (**self).post_stream(url, body).await
    }

    async fn get_json(&self, url: &str) -> ProviderResult<Value> {
        (**self).get_json(url).await
    }

    async fn post_json(&self, url: &str, body: Value) -> ProviderResult<Value> {
        (**self).post_json(url, body).await
    }
}

/// A provider speaking the NDJSON generate protocol over a [`Transport`].
pub struct StreamingProvider<T> {
    name: String,
    transport: T,
}

impl<T: Transport> StreamingProvider<T> {
    pub fn new(transport: T) -> Self {
        Self {
            name: "ollama".to_string(),
            transport,
        }
    }

    /// Register under a different key.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn endpoint(host: &str, path: &str) -> String {
        format!("{}/api/{}", host.trim_end_matches('/'), path)
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[async_trait]
impl<T: Transport> GenerationProvider for StreamingProvider<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self, host: &str) -> ProviderResult<Vec<String>> {
        let value = self.transport.get_json(&Self::endpoint(host, "tags")).await?;
        let tags: TagsResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn model_settings(&self, host: &str, model: &str) -> ProviderResult<ModelSettings> {
        let value = self
            .transport
            .post_json(&Self::endpoint(host, "show"), json!({ "name": model }))
            .await?;
        Ok(value
            .get("parameters")
            .and_then(Value::as_str)
            .map(ModelSettings::from_parameters)
            .unwrap_or_default())
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        events: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> ProviderResult<()> {
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "system": request.system,
            "context": request.context,
            "options": request.options,
            "useRag": request.use_rag,
        });
        let url = Self::endpoint(&request.host, "generate");

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = events.send(ProviderEvent::Completed { context: Vec::new() }).await;
                return Ok(());
            }
            res = self.transport.post_stream(&url, body) => res?,
        };

        if events.send(ProviderEvent::Started).await.is_err() {
            return Ok(());
        }

        let mut decoder = NdjsonDecoder::new();
        let mut context = Vec::new();
        let mut done = false;

        while !done {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("generation stream aborted");
                    break;
                }
                next = stream.next() => next,
            };
            let (chunks, exhausted) = match next {
                Some(Ok(bytes)) => (decoder.push(&bytes), false),
                Some(Err(e)) => return Err(e),
                None => (decoder.finish().into_iter().collect(), true),
            };
            for chunk in chunks {
                if let Some(err) = chunk.error {
                    return Err(ProviderError::Stream(err));
                }
                if !chunk.response.is_empty()
                    && events.send(ProviderEvent::Token(chunk.response)).await.is_err()
                {
                    return Ok(());
                }
                if chunk.done {
                    context = chunk.context.unwrap_or_default();
                    done = true;
                    break;
                }
            }
            if exhausted {
                break;
            }
        }

        let _ = events.send(ProviderEvent::Completed { context }).await;
        Ok(())
    }
}
