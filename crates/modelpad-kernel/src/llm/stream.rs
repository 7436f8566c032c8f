//! Provider-agnostic streaming events and requests.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐
//! │ StreamingProvider│   │ ScriptedProvider │
//! │ (NDJSON decoder) │   │ (canned tokens)  │
//! └────────┬─────────┘   └────────┬─────────┘
//!          ▼                      ▼
//!   ┌──────────────────────────────────────┐
//!   │ ProviderEvent over mpsc              │
//!   │   Started → Token* → Completed       │
//!   └──────────────────┬───────────────────┘
//!                      ▼
//!        generation driver → insertion engine
//! ```

use serde::{Deserialize, Serialize};

use super::ModelSettings;

/// One step of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEvent {
    /// The backend accepted the request; tokens follow.
    Started,
    /// A chunk of generated text, in arrival order.
    Token(String),
    /// The stream is over. `context` is the backend's conversation state,
    /// empty when aborted.
    Completed { context: Vec<i64> },
}

impl ProviderEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            Self::Token(s) => Some(s),
            _ => None,
        }
    }
}

/// Everything a provider needs for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: String,
    pub host: String,
    pub model: String,
    /// Conversation state from a previous completion.
    #[serde(default)]
    pub context: Vec<i64>,
    #[serde(default)]
    pub options: ModelSettings,
    #[serde(default)]
    pub use_rag: bool,
}

impl GenerateRequest {
    pub fn new(host: impl Into<String>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: String::new(),
            host: host.into(),
            model: model.into(),
            context: Vec::new(),
            options: ModelSettings::default(),
            use_rag: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_options(mut self, options: ModelSettings) -> Self {
        self.options = options;
        self
    }

    pub fn with_context(mut self, context: Vec<i64>) -> Self {
        self.context = context;
        self
    }

    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_helpers() {
        assert!(ProviderEvent::Completed { context: vec![] }.is_terminal());
        assert!(!ProviderEvent::Started.is_terminal());
        assert_eq!(ProviderEvent::Token("x".into()).as_token(), Some("x"));
        assert_eq!(ProviderEvent::Started.as_token(), None);
    }

    #[test]
    fn test_request_builder() {
        let req = GenerateRequest::new("http://localhost:11434", "llama3", "hi")
            .with_system("be brief")
            .with_context(vec![1, 2])
            .with_rag(true);
        assert_eq!(req.model, "llama3");
        assert_eq!(req.system, "be brief");
        assert_eq!(req.context, vec![1, 2]);
        assert!(req.use_rag);
    }
}
