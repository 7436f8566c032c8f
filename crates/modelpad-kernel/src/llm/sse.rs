//! OpenAI-compatible chat completion streams.
//!
//! `/v1/chat/completions` with `stream: true` answers with server-sent
//! events, one JSON delta per `data:` line and a `[DONE]` sentinel:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Some servers drop the `data:` prefix and send bare JSON lines; those are
//! accepted too. Comment lines (`:`) and blank separators are ignored.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    ByteStream, GenerateRequest, GenerationProvider, ModelSettings, ProviderError, ProviderEvent,
    ProviderResult, Transport,
};

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text of every choice in the delta, concatenated.
    Text(String),
    /// The backend reported an error in-band.
    Error(String),
    /// `[DONE]`.
    Done,
}

/// Line decoder for SSE bodies. Safe to feed arbitrary byte splits.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                out.push(event);
            }
        }
        out
    }

    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buf);
        self.decode_line(&rest)
    }

    /// Lines dropped because they did not decode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<SseEvent> {
        let text = match std::str::from_utf8(line) {
            Ok(t) => t.trim(),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, "skipping non-utf8 event line");
                return None;
            }
        };
        if text.is_empty() || text.starts_with(':') {
            return None;
        }
        let data = match text.strip_prefix("data:") {
            Some(data) => data.trim(),
            // `event:`, `id:` and `retry:` carry nothing we use.
            None if text.starts_with('{') => text,
            None => return None,
        };
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Some(Self::event_from(&value)),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, line = data, "skipping malformed event");
                None
            }
        }
    }

    fn event_from(value: &Value) -> SseEvent {
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return SseEvent::Error(message);
        }
        let text = value
            .get("choices")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|choice| {
                choice
                    .pointer("/delta/content")
                    .and_then(Value::as_str)
                    .or_else(|| choice.get("text").and_then(Value::as_str))
            })
            .collect();
        SseEvent::Text(text)
    }
}

/// A provider speaking the OpenAI chat completion protocol over a
/// [`Transport`]. Registers as `"openai"`.
pub struct OpenAiProvider<T> {
    name: String,
    transport: T,
}

impl<T: Transport> OpenAiProvider<T> {
    pub fn new(transport: T) -> Self {
        Self {
            name: "openai".to_string(),
            transport,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn endpoint(host: &str, path: &str) -> String {
        format!("{}/v1/{}", host.trim_end_matches('/'), path)
    }

    /// Chat body. Only the sampling settings the protocol knows are mapped.
    fn body(request: &GenerateRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert("stream".into(), json!(true));
        body.insert(
            "messages".into(),
            json!([
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ]),
        );
        let options = &request.options;
        if let Some(t) = options.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = options.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if !options.stop.is_empty() {
            body.insert("stop".into(), json!(options.stop));
        }
        if let Some(n) = options.num_predict.filter(|n| *n > 0) {
            body.insert("max_tokens".into(), json!(n));
        }
        if let Some(seed) = options.seed {
            body.insert("seed".into(), json!(seed));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl<T: Transport> GenerationProvider for OpenAiProvider<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self, host: &str) -> ProviderResult<Vec<String>> {
        let value = self.transport.get_json(&Self::endpoint(host, "models")).await?;
        let models = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Decode("model list has no data array".into()))?;
        Ok(models
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// The protocol has no per-model defaults.
    async fn model_settings(&self, _host: &str, _model: &str) -> ProviderResult<ModelSettings> {
        Ok(ModelSettings::default())
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        events: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> ProviderResult<()> {
        let url = Self::endpoint(&request.host, "chat/completions");
        let body = Self::body(&request);

        let mut stream: ByteStream = tokio::select! {
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

        let mut decoder = SseDecoder::new();
        'read: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("chat stream aborted");
                    break 'read;
                }
                next = stream.next() => next,
            };
            let (decoded, exhausted) = match next {
                Some(Ok(bytes)) => (decoder.push(&bytes), false),
                Some(Err(e)) => return Err(e),
                None => (decoder.finish().into_iter().collect(), true),
            };
            for event in decoded {
                match event {
                    SseEvent::Text(text) if text.is_empty() => {}
                    SseEvent::Text(text) => {
                        if events.send(ProviderEvent::Token(text)).await.is_err() {
                            return Ok(());
                        }
                    }
                    SseEvent::Error(message) => return Err(ProviderError::Stream(message)),
                    SseEvent::Done => break 'read,
                }
            }
            if exhausted {
                break;
            }
        }

        let _ = events.send(ProviderEvent::Completed { context: Vec::new() }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_decoder_handles_split_events_and_utf8() {
        let mut d = SseDecoder::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"na\u{ef}ve\"}}]}\n\n".as_bytes();
        let cut = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(d.push(&line[..cut]).is_empty());
        assert_eq!(d.push(&line[cut..]), vec![SseEvent::Text("naïve".into())]);
    }

    #[test]
    fn test_decoder_sentinel_comments_and_bare_json() {
        let mut d = SseDecoder::new();
        let events = d.push(
            b": keep-alive\nevent: message\n{\"choices\":[{\"text\":\"a\"}]}\ndata: [DONE]\n",
        );
        assert_eq!(events, vec![SseEvent::Text("a".into()), SseEvent::Done]);
    }

    #[test]
    fn test_decoder_skips_malformed_data() {
        let mut d = SseDecoder::new();
        let events = d.push(b"data: {oops\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n");
        assert_eq!(events, vec![SseEvent::Text("b".into())]);
        assert_eq!(d.skipped(), 1);
    }

    #[test]
    fn test_decoder_reports_inband_errors() {
        let mut d = SseDecoder::new();
        let events = d.push(b"data: {\"error\":{\"message\":\"rate limited\"}}");
        assert!(events.is_empty());
        assert_eq!(d.finish(), Some(SseEvent::Error("rate limited".into())));
    }

    struct FakeTransport {
        chunks: Vec<&'static str>,
        json: Value,
        requests: Mutex<Vec<(String, Value)>>,
    }

    impl FakeTransport {
        fn streaming(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                json: Value::Null,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post_stream(&self, url: &str, body: Value) -> ProviderResult<ByteStream> {
            self.requests.lock().push((url.to_string(), body));
            let chunks: Vec<Result<Vec<u8>, ProviderError>> =
                self.chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
            Ok(stream::iter(chunks).boxed())
        }

        async fn get_json(&self, url: &str) -> ProviderResult<Value> {
            self.requests.lock().push((url.to_string(), Value::Null));
            Ok(self.json.clone())
        }

        async fn post_json(&self, _url: &str, _body: Value) -> ProviderResult<Value> {
            Ok(self.json.clone())
        }
    }

    async fn collect(provider: &OpenAiProvider<FakeTransport>, req: GenerateRequest) -> (ProviderResult<()>, Vec<ProviderEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let res = provider.generate(req, tx, CancellationToken::new()).await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (res, events)
    }

    #[tokio::test]
    async fn test_generate_streams_deltas_until_done() {
        let provider = OpenAiProvider::new(FakeTransport::streaming(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"del",
            "ta\":{\"content\":\"Once\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" upon\"}}]}\n\n",
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        ]));
        let options = ModelSettings {
            temperature: Some(0.5),
            num_predict: Some(64),
            ..Default::default()
        };
        let req = GenerateRequest::new("http://localhost:8080/", "gpt", "Tell it")
            .with_system("narrate")
            .with_options(options);

        let (res, events) = collect(&provider, req).await;
        res.unwrap();
        assert_eq!(
            events,
            vec![
                ProviderEvent::Started,
                ProviderEvent::Token("Once".into()),
                ProviderEvent::Token(" upon".into()),
                ProviderEvent::Completed { context: vec![] },
            ]
        );

        let (url, body) = provider.transport.requests.lock()[0].clone();
        assert_eq!(url, "http://localhost:8080/v1/chat/completions");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0], json!({ "role": "system", "content": "narrate" }));
        assert_eq!(body["messages"][1], json!({ "role": "user", "content": "Tell it" }));
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 64);
        assert!(body.get("top_p").is_none());
    }

    #[tokio::test]
    async fn test_generate_inband_error_fails_without_completing() {
        let provider = OpenAiProvider::new(FakeTransport::streaming(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"error\":{\"message\":\"context length exceeded\"}}\n",
        ]));
        let (res, events) = collect(&provider, GenerateRequest::new("h", "m", "p")).await;
        assert_eq!(res, Err(ProviderError::Stream("context length exceeded".into())));
        assert!(!events.iter().any(ProviderEvent::is_terminal));
    }

    #[tokio::test]
    async fn test_generate_without_sentinel_completes_at_end_of_body() {
        let provider = OpenAiProvider::new(FakeTransport::streaming(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}",
        ]));
        let (res, events) = collect(&provider, GenerateRequest::new("h", "m", "p")).await;
        res.unwrap();
        assert_eq!(events.last(), Some(&ProviderEvent::Completed { context: vec![] }));
        assert!(events.contains(&ProviderEvent::Token("x".into())));
    }

    #[tokio::test]
    async fn test_list_models_reads_ids() {
        let mut transport = FakeTransport::streaming(vec![]);
        transport.json = json!({ "object": "list", "data": [{ "id": "gpt-4o" }, { "id": "local" }] });
        let provider = OpenAiProvider::new(transport);
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.list_models("h/").await.unwrap(), vec!["gpt-4o", "local"]);
        assert_eq!(provider.transport.requests.lock()[0].0, "h/v1/models");
        assert_eq!(provider.model_settings("h", "gpt-4o").await.unwrap(), ModelSettings::default());
    }
}
