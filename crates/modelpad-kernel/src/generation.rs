//! Generation driver.
//!
//! [`Generator`] is the per-story context object: it owns the shared
//! document, session registry, status cell and model selection, and turns a
//! [`GenerateOptions`] into a running generation.
//!
//! ```text
//! generate() ──▶ provider task ──mpsc──▶ driver task ──flush──▶ Document
//!                     ▲                      │
//!                     └──── CancellationToken ┘
//! ```
//!
//! The provider streams into a channel; the driver buffers each token into an
//! [`InsertionEngine`], yields once so tokens already on their way can join,
//! drains the queue and writes the whole buffer in one document update.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modelpad_doc::{Document, NodeKey};
use modelpad_types::{
    GenerationStatus, InsertionStrategy, PromptGeneration, PromptId, SessionUpdate, StoryId,
};

use crate::config::EditorConfig;
use crate::context::{ContextDocument, ContextSource, extract_context};
use crate::error::{GenerateError, SessionResult};
use crate::insertion::{EnginePhase, InsertionEngine};
use crate::llm::{
    GenerateRequest, GenerationProvider, ModelSettings, ProviderError, ProviderEvent,
    ProviderRegistry, ProviderResult, ServerConfig,
};
use crate::prompt::{AiAction, PromptOptions, build_prompt, resolve_strategy};
use crate::session::{SharedSessions, shared_sessions};
use crate::status::StatusCell;
use crate::template::TemplateRegistry;

/// The document a generator writes into.
pub type SharedDocument = Arc<Mutex<Document>>;

const EVENT_BUFFER: usize = 64;

pub fn shared_document(doc: Document) -> SharedDocument {
    Arc::new(Mutex::new(doc))
}

/// One generate request.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub action: AiAction,
    /// Template to use for `generate`. The active template when unset.
    pub template_id: Option<String>,
    pub custom_prompt: Option<String>,
    /// Node the generation is aimed at.
    pub target: Option<NodeKey>,
    /// Overrides the template and action strategies.
    pub strategy: Option<InsertionStrategy>,
    /// Reference documents; those opted in and not this story are used.
    pub documents: Vec<ContextDocument>,
    /// Used instead of the target's text.
    pub custom_text: Option<String>,
    pub word_count: Option<usize>,
}

/// How a generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    Cancelled,
    Failed(ProviderError),
}

/// Where a driver is in its lifetime, shared with the generator that
/// spawned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Running,
    Done,
    /// The stream failed; the session is still `generating`.
    Faulted,
}

type SharedDriverState = Arc<Mutex<DriverState>>;

/// The generation a [`Generator`] last started.
#[derive(Debug)]
struct ActiveGeneration {
    cancel: CancellationToken,
    prompt_id: Option<PromptId>,
    state: SharedDriverState,
}

/// A running generation.
#[derive(Debug)]
pub struct GenerationHandle {
    prompt_id: Option<PromptId>,
    strategy: InsertionStrategy,
    cancel: CancellationToken,
    task: JoinHandle<GenerationOutcome>,
}

impl GenerationHandle {
    /// The session tracking this generation, if one was registered.
    pub fn prompt_id(&self) -> Option<PromptId> {
        self.prompt_id
    }

    pub fn strategy(&self) -> &InsertionStrategy {
        &self.strategy
    }

    /// Stop the stream. Text already buffered is still written.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the driver to finish.
    pub async fn finished(self) -> GenerationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => GenerationOutcome::Failed(ProviderError::Interrupted(e.to_string())),
        }
    }
}

/// Per-story generation context.
pub struct Generator {
    story_id: StoryId,
    doc: SharedDocument,
    sessions: SharedSessions,
    status: Arc<StatusCell>,
    providers: ProviderRegistry,
    templates: TemplateRegistry,
    servers: indexmap::IndexMap<String, ServerConfig>,
    server_key: String,
    model: Option<String>,
    available_models: Vec<String>,
    model_settings: ModelSettings,
    use_rag: bool,
    editors_note: Option<String>,
    mark_output: bool,
    story_context: Arc<Mutex<Vec<i64>>>,
    active: Option<ActiveGeneration>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("story_id", &self.story_id)
            .field("server_key", &self.server_key)
            .field("model", &self.model)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

impl Generator {
    pub fn new(
        story_id: StoryId,
        doc: SharedDocument,
        providers: ProviderRegistry,
        config: &EditorConfig,
    ) -> Self {
        Self {
            story_id,
            doc,
            sessions: shared_sessions(),
            status: Arc::new(StatusCell::default()),
            providers,
            templates: config.template_registry(),
            servers: config.servers.clone(),
            server_key: config.server_key.clone(),
            model: config.model.clone(),
            available_models: Vec::new(),
            model_settings: config.model_settings.clone(),
            use_rag: config.use_rag,
            editors_note: config.editors_note.clone(),
            mark_output: config.mark_output,
            story_context: Arc::new(Mutex::new(Vec::new())),
            active: None,
        }
    }

    /// Share a session registry with other generators.
    pub fn with_sessions(mut self, sessions: SharedSessions) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_status(mut self, status: Arc<StatusCell>) -> Self {
        self.status = status;
        self
    }

    pub fn story_id(&self) -> StoryId {
        self.story_id
    }

    pub fn document(&self) -> &SharedDocument {
        &self.doc
    }

    pub fn sessions(&self) -> &SharedSessions {
        &self.sessions
    }

    pub fn status(&self) -> &Arc<StatusCell> {
        &self.status
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.templates
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    pub fn model_settings(&self) -> &ModelSettings {
        &self.model_settings
    }

    pub fn set_use_rag(&mut self, use_rag: bool) {
        self.use_rag = use_rag;
    }

    pub fn set_editors_note(&mut self, note: Option<String>) {
        self.editors_note = note.filter(|n| !n.trim().is_empty());
    }

    /// Context tokens returned by the last completed generation.
    pub fn story_context(&self) -> Vec<i64> {
        self.story_context.lock().clone()
    }

    pub fn clear_context(&self) {
        self.story_context.lock().clear();
    }

    /// Copy the selection and template state back into `config`.
    pub fn store_into(&self, config: &mut EditorConfig) {
        config.server_key = self.server_key.clone();
        config.model = self.model.clone();
        config.model_settings = self.model_settings.clone();
        config.use_rag = self.use_rag;
        config.editors_note = self.editors_note.clone();
        config.store_templates(&self.templates);
    }

    /// Switch servers. The new backend has not been probed yet, so the
    /// status drops to `no-connection` and the model selection is cleared.
    pub fn select_server(&mut self, key: &str) -> Result<(), GenerateError> {
        if !self.servers.contains_key(key) {
            return Err(GenerateError::UnknownServer(key.to_string()));
        }
        self.cancel();
        self.server_key = key.to_string();
        self.model = None;
        self.available_models.clear();
        self.status.set(GenerationStatus::NoConnection);
        info!(server = key, "server selected");
        Ok(())
    }

    /// Select the model after the current one, wrapping around.
    pub fn cycle_model(&mut self) -> Option<&str> {
        if self.available_models.is_empty() {
            return None;
        }
        let next = match self
            .model
            .as_ref()
            .and_then(|m| self.available_models.iter().position(|a| a == m))
        {
            Some(i) => (i + 1) % self.available_models.len(),
            None => 0,
        };
        self.model = Some(self.available_models[next].clone());
        self.model.as_deref()
    }

    /// Ask the backend which models it serves.
    ///
    /// Success with at least one model leaves `no-connection`; a failure or
    /// an empty list enters it.
    pub async fn probe_models(&mut self) -> Result<Vec<String>, GenerateError> {
        let (provider, server) = self.provider()?;
        match provider.list_models(&server.host).await {
            Ok(models) => {
                self.status.probe_result(models.len());
                if self.model.is_none() {
                    self.model = models.first().cloned();
                }
                info!(server = %self.server_key, count = models.len(), "models listed");
                self.available_models = models.clone();
                Ok(models)
            }
            Err(e) => {
                warn!(server = %self.server_key, error = %e, "model probe failed");
                self.status.probe_result(0);
                self.available_models.clear();
                Err(e.into())
            }
        }
    }

    /// Replace the sampling settings with the backend's defaults for the
    /// selected model.
    pub async fn fetch_model_settings(&mut self) -> Result<ModelSettings, GenerateError> {
        let model = self.model.clone().ok_or(GenerateError::NoModel)?;
        let (provider, server) = self.provider()?;
        let settings = provider.model_settings(&server.host, &model).await?;
        self.model_settings = settings.clone();
        Ok(settings)
    }

    /// Start a generation.
    ///
    /// Fails without touching the document when another generation is in
    /// flight, no model is selected, or the template/server is unknown.
    /// Faults after this point surface through the status cell.
    pub fn generate(&mut self, options: GenerateOptions) -> Result<GenerationHandle, GenerateError> {
        let current = self.status.get();
        if current.is_busy() {
            return Err(GenerateError::Busy(current));
        }
        let model = self.model.clone().ok_or(GenerateError::NoModel)?;
        let (provider, server) = self.provider()?;

        let template = match options.action {
            AiAction::Generate => {
                let template = match &options.template_id {
                    Some(id) => self.templates.get(id),
                    None => self.templates.active(),
                };
                match template {
                    Some(t) => Some(t.clone()),
                    None => {
                        return Err(GenerateError::UnknownTemplate(
                            options.template_id.clone().unwrap_or_default(),
                        ));
                    }
                }
            }
            AiAction::Rewrite => None,
        };

        let (ctx, session) = {
            let doc = self.doc.lock();
            let tree = doc.tree();
            let source = ContextSource {
                target: options.target,
                story_id: Some(self.story_id),
                documents: &options.documents,
                custom_text: options.custom_text.as_deref(),
                editors_note: self.editors_note.as_deref(),
            };
            let ctx = extract_context(tree, &source);

            let session = match (options.action, options.target) {
                (AiAction::Generate, Some(target))
                    if tree.is_attached(target)
                        && tree.kind(target).is_some_and(|k| k.is_element()) =>
                {
                    Some(PromptGeneration::pending(
                        PromptId::new(),
                        self.story_id,
                        target,
                        tree.text_content(target),
                    ))
                }
                _ => None,
            };
            (ctx, session)
        };

        let built = build_prompt(
            &ctx,
            &PromptOptions {
                action: options.action,
                custom_prompt: options.custom_prompt.as_deref(),
                template: template.as_ref(),
                word_count: options.word_count,
            },
        );
        let strategy = resolve_strategy(
            options.action,
            options.strategy,
            template.as_ref(),
            options.target,
        );
        if let Some(t) = &template {
            self.templates.mark_used(&t.id);
        }

        let prompt_id = session.map(|s| self.sessions.lock().add(s));

        let request = GenerateRequest::new(&server.host, &model, built.prompt)
            .with_system(built.system)
            .with_options(self.model_settings.clone())
            .with_rag(self.use_rag);

        if let Some(previous) = self.active.take() {
            previous.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(DriverState::Running));
        self.active = Some(ActiveGeneration {
            cancel: cancel.clone(),
            prompt_id,
            state: Arc::clone(&state),
        });
        self.status.begin();
        info!(
            action = %options.action,
            %strategy,
            provider = provider.name(),
            %model,
            prompt_id = ?prompt_id,
            "generation started"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let provider_cancel = cancel.clone();
        let provider_task =
            tokio::spawn(async move { provider.generate(request, tx, provider_cancel).await });

        let driver = Driver {
            engine: InsertionEngine::new(strategy).with_output_marking(self.mark_output),
            doc: Arc::clone(&self.doc),
            sessions: Arc::clone(&self.sessions),
            status: Arc::clone(&self.status),
            story_context: Arc::clone(&self.story_context),
            prompt_id,
            state,
        };
        let task = tokio::spawn(driver.run(rx, provider_task, cancel.clone()));

        Ok(GenerationHandle {
            prompt_id,
            strategy,
            cancel,
            task,
        })
    }

    /// Cancel the last generation.
    ///
    /// A running stream is stopped and its driver settles the session. A
    /// stream that already failed has no driver left, so the status returns
    /// to `ready` and the session is marked cancelled here. Returns false
    /// when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        let mut state = active.state.lock();
        let current = *state;
        match current {
            DriverState::Running => {
                active.cancel.cancel();
                true
            }
            DriverState::Done => false,
            DriverState::Faulted => {
                *state = DriverState::Done;
                drop(state);
                active.cancel.cancel();
                self.status.finish();
                if let Some(id) = active.prompt_id {
                    self.sessions.lock().update(id, SessionUpdate::cancelled());
                }
                info!(prompt_id = ?active.prompt_id, "failed generation cancelled");
                true
            }
        }
    }

    /// Undo a tracked generation in this generator's document.
    pub fn revert(&self, prompt_id: PromptId) -> SessionResult<()> {
        let mut doc = self.doc.lock();
        self.sessions.lock().revert_generation(&mut doc, prompt_id)
    }

    fn provider(&self) -> Result<(Arc<dyn GenerationProvider>, ServerConfig), GenerateError> {
        let server = self
            .servers
            .get(&self.server_key)
            .cloned()
            .ok_or_else(|| GenerateError::UnknownServer(self.server_key.clone()))?;
        let provider = self
            .providers
            .get(&server.provider_key)
            .ok_or_else(|| ProviderError::Unavailable(server.provider_key.clone()))?;
        Ok((provider, server))
    }
}

/// Applies one provider stream to the document.
struct Driver {
    engine: InsertionEngine,
    doc: SharedDocument,
    sessions: SharedSessions,
    status: Arc<StatusCell>,
    story_context: Arc<Mutex<Vec<i64>>>,
    prompt_id: Option<PromptId>,
    state: SharedDriverState,
}

impl Driver {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<ProviderEvent>,
        provider: JoinHandle<ProviderResult<()>>,
        cancel: CancellationToken,
    ) -> GenerationOutcome {
        let mut deferred: Option<ProviderEvent> = None;
        loop {
            let event = match deferred.take() {
                Some(event) => Some(event),
                None => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.on_cancel(),
                    event = events.recv() => event,
                },
            };

            match event {
                Some(ProviderEvent::Started) => self.on_started(),
                Some(ProviderEvent::Token(text)) => {
                    if self.engine.phase() == EnginePhase::Idle {
                        self.on_started();
                    }
                    if !self.engine.push_token(&text) {
                        continue;
                    }
                    // Let tokens already in flight land before writing.
                    tokio::task::yield_now().await;
                    if !cancel.is_cancelled() {
                        while let Ok(next) = events.try_recv() {
                            match next {
                                ProviderEvent::Token(text) => {
                                    self.engine.push_token(&text);
                                }
                                other => {
                                    deferred = Some(other);
                                    break;
                                }
                            }
                        }
                    }
                    self.flush();
                }
                Some(ProviderEvent::Completed { context }) => return self.on_complete(context),
                None => return self.on_closed(provider, &cancel).await,
            }
        }
    }

    fn on_started(&mut self) {
        if !self.engine.on_start() {
            return;
        }
        self.status.streaming();
        self.update_session(SessionUpdate::generating());
    }

    fn flush(&mut self) {
        let outcome = {
            let mut doc = self.doc.lock();
            self.engine.flush(&mut doc)
        };
        if let Some(key) = outcome.created {
            self.update_session(SessionUpdate::generated(key));
        }
    }

    fn on_complete(&mut self, context: Vec<i64>) -> GenerationOutcome {
        {
            let mut doc = self.doc.lock();
            self.engine.complete(&mut doc);
        }
        debug!(context_len = context.len(), "storing story context");
        *self.story_context.lock() = context;
        self.status.finish();
        self.update_session(SessionUpdate {
            generated_node_keys: Some(self.engine.generated_keys().to_vec()),
            ..SessionUpdate::completed()
        });
        *self.state.lock() = DriverState::Done;
        GenerationOutcome::Completed
    }

    fn on_cancel(&mut self) -> GenerationOutcome {
        let outcome = {
            let mut doc = self.doc.lock();
            self.engine.cancel(&mut doc)
        };
        if let Some(key) = outcome.created {
            self.update_session(SessionUpdate::generated(key));
        }
        self.status.finish();
        self.update_session(SessionUpdate {
            generated_node_keys: Some(self.engine.generated_keys().to_vec()),
            ..SessionUpdate::cancelled()
        });
        *self.state.lock() = DriverState::Done;
        info!(prompt_id = ?self.prompt_id, "generation cancelled");
        GenerationOutcome::Cancelled
    }

    /// The provider dropped its sender without `Completed`.
    async fn on_closed(
        &mut self,
        provider: JoinHandle<ProviderResult<()>>,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let result = match provider.await {
            Ok(result) => result,
            Err(e) => Err(ProviderError::Interrupted(e.to_string())),
        };
        match result {
            Ok(()) => {
                warn!("provider stream ended without completion");
                self.on_complete(Vec::new())
            }
            Err(e) => {
                // Checked under the state lock so a concurrent cancel either
                // lands here or finds the driver faulted.
                let mut state = self.state.lock();
                if cancel.is_cancelled() {
                    drop(state);
                    return self.on_cancel();
                }
                warn!(error = %e, prompt_id = ?self.prompt_id, "generation failed");
                self.status.set(e.generation_status());
                *state = DriverState::Faulted;
                GenerationOutcome::Failed(e)
            }
        }
    }

    fn update_session(&self, update: SessionUpdate) {
        if let Some(id) = self.prompt_id {
            self.sessions.lock().update(id, update);
        }
    }
}
