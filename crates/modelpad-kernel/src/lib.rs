//! # modelpad-kernel
//!
//! The editor core behind ModelPad's AI writing features.
//!
//! A [`Generator`] is the per-story context object. It pulls a
//! [`PromptContext`] out of the live document, renders a prompt from a
//! [`PromptTemplate`], streams tokens from a [`GenerationProvider`], and lets
//! the [`InsertionEngine`] write them into the document while the user keeps
//! editing. Each targeted generation is tracked in the [`SessionRegistry`] so
//! it can be reverted.
//!
//! Tags live beside the document: the [`TagRegistry`] stores hierarchical
//! tags and the [`TagOverlay`] places them through `@` typeahead.

pub mod config;
pub mod context;
pub mod error;
pub mod generation;
pub mod insertion;
pub mod llm;
pub mod prompt;
pub mod session;
pub mod status;
pub mod tags;
pub mod template;

pub use config::{ConfigError, ConfigResult, EditorConfig};
pub use context::{ContextDocument, ContextSource, PromptContext, extract_context, resolve_active_node};
pub use error::{GenerateError, SessionError, SessionResult};
pub use generation::{
    GenerateOptions, GenerationHandle, GenerationOutcome, Generator, SharedDocument,
    shared_document,
};
pub use insertion::{EnginePhase, EngineStats, FlushOutcome, InsertionEngine, Placement};
pub use llm::{
    GenerateRequest, GenerationProvider, ModelSettings, NdjsonDecoder, OpenAiProvider,
    ProviderError, ProviderEvent, ProviderRegistry, ProviderResult, ScriptedProvider,
    ServerConfig, SseDecoder, StreamingProvider, Transport,
};
pub use prompt::{AiAction, BuiltPrompt, PromptOptions, build_prompt, resolve_strategy, word_count};
pub use session::{SessionRegistry, SharedSessions, shared_sessions};
pub use status::StatusCell;
pub use tags::{OverlayState, SharedTags, TagCandidate, TagError, TagOverlay, TagRegistry, TagResult, shared_tags};
pub use template::{NewTemplate, PromptTemplate, TemplatePatch, TemplateRegistry, render};
