//! Kernel error types.

use thiserror::Error;

use modelpad_doc::DocError;
use modelpad_types::{GenerationStatus, PromptId};

use crate::llm::ProviderError;

/// Errors that stop a generation from starting.
///
/// Once a generation is running, faults surface through the status cell
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// Another generation holds the document.
    #[error("a generation is already {0}")]
    Busy(GenerationStatus),

    /// No model is selected.
    #[error("no model selected")]
    NoModel,

    #[error("unknown prompt template: {0}")]
    UnknownTemplate(String),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors from session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no session {0}")]
    NotFound(PromptId),

    #[error("session {0} has nothing to undo")]
    NotUndoable(PromptId),

    #[error(transparent)]
    Doc(#[from] DocError),
}

pub type SessionResult<T> = Result<T, SessionError>;
