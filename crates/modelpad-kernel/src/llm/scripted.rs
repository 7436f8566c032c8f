//! In-process provider that replays canned tokens.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{GenerateRequest, GenerationProvider, ModelSettings, ProviderError, ProviderEvent, ProviderResult};

/// Replays a fixed token list for every request.
///
/// Used by tests and by the CLI replay command. Every request it receives is
/// recorded and can be inspected with [`requests`](Self::requests).
pub struct ScriptedProvider {
    tokens: Vec<String>,
    context: Vec<i64>,
    models: Vec<String>,
    settings: ModelSettings,
    delay: Option<Duration>,
    yield_between: bool,
    hold_open: bool,
    refuse: Option<ProviderError>,
    break_off: Option<ProviderError>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new<I>(tokens: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            context: Vec::new(),
            models: vec!["scripted".to_string()],
            settings: ModelSettings::default(),
            delay: None,
            yield_between: false,
            hold_open: false,
            refuse: None,
            break_off: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Context reported with `Completed`.
    pub fn with_context(mut self, context: Vec<i64>) -> Self {
        self.context = context;
        self
    }

    pub fn with_models<I>(mut self, models: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Yield to the scheduler after each token so consumers interleave.
    pub fn yielding(mut self) -> Self {
        self.yield_between = true;
        self
    }

    /// Sleep between tokens.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// After the last token, wait for cancellation instead of completing.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Fail every call before anything is streamed.
    pub fn refuse_with(mut self, err: ProviderError) -> Self {
        self.refuse = Some(err);
        self
    }

    /// Fail after the scripted tokens instead of completing.
    pub fn break_with(mut self, err: ProviderError) -> Self {
        self.break_off = Some(err);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        } else if self.yield_between {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_models(&self, _host: &str) -> ProviderResult<Vec<String>> {
        match &self.refuse {
            Some(err) => Err(err.clone()),
            None => Ok(self.models.clone()),
        }
    }

    async fn model_settings(&self, _host: &str, _model: &str) -> ProviderResult<ModelSettings> {
        match &self.refuse {
            Some(err) => Err(err.clone()),
            None => Ok(self.settings.clone()),
        }
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        events: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> ProviderResult<()> {
        self.requests.lock().push(request);
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }

        let aborted = ProviderEvent::Completed { context: Vec::new() };
        if cancel.is_cancelled() || events.send(ProviderEvent::Started).await.is_err() {
            let _ = events.send(aborted).await;
            return Ok(());
        }

        for token in &self.tokens {
            if cancel.is_cancelled() {
                let _ = events.send(aborted).await;
                return Ok(());
            }
            if events.send(ProviderEvent::Token(token.clone())).await.is_err() {
                return Ok(());
            }
            self.pause().await;
        }

        if let Some(err) = &self.break_off {
            return Err(err.clone());
        }

        if self.hold_open {
            cancel.cancelled().await;
            let _ = events.send(aborted).await;
            return Ok(());
        }

        let _ = events
            .send(ProviderEvent::Completed {
                context: self.context.clone(),
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(provider: &ScriptedProvider, cancel: CancellationToken) -> Vec<ProviderEvent> {
        let (tx, mut rx) = mpsc::channel(32);
        let _ = provider
            .generate(GenerateRequest::new("h", "m", "prompt"), tx, cancel)
            .await;
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn test_replays_tokens_then_completes() {
        let provider = ScriptedProvider::new(["a", "b"]).with_context(vec![9]).yielding();
        let events = run(&provider, CancellationToken::new()).await;
        assert_eq!(
            events,
            vec![
                ProviderEvent::Started,
                ProviderEvent::Token("a".into()),
                ProviderEvent::Token("b".into()),
                ProviderEvent::Completed { context: vec![9] },
            ]
        );
        assert_eq!(provider.requests()[0].prompt, "prompt");
    }

    #[tokio::test]
    async fn test_precancelled_completes_empty() {
        let provider = ScriptedProvider::new(["a"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = run(&provider, cancel).await;
        assert_eq!(events, vec![ProviderEvent::Completed { context: vec![] }]);
    }

    #[tokio::test]
    async fn test_refusal_reports_error() {
        let provider =
            ScriptedProvider::new(["a"]).refuse_with(ProviderError::Connect("refused".into()));
        assert!(provider.list_models("h").await.is_err());
        let events = run(&provider, CancellationToken::new()).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_break_off_skips_completion() {
        let provider =
            ScriptedProvider::new(["a"]).break_with(ProviderError::Stream("reset".into()));
        let events = run(&provider, CancellationToken::new()).await;
        assert_eq!(events.len(), 2);
        assert!(!events.iter().any(ProviderEvent::is_terminal));
    }
}
