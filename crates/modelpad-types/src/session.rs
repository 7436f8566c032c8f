//! Generation session metadata.
//!
//! A `PromptGeneration` tracks one targeted AI generation so its effect on the
//! document can be undone or retried. Sessions are created `Pending`, become
//! `Generating` on the first streamed byte, and end `Completed` or `Cancelled`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{NodeKey, PromptId, StoryId};

/// Lifecycle status of a generation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum SessionStatus {
    /// Registered, nothing streamed yet.
    #[default]
    Pending,
    /// Tokens are arriving.
    Generating,
    /// Stream ended normally.
    #[strum(serialize = "completed", serialize = "done")]
    Completed,
    /// Aborted by the user.
    #[strum(serialize = "cancelled", serialize = "canceled")]
    Cancelled,
}

impl SessionStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Generating => "generating",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Completed or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracked metadata for one targeted generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptGeneration {
    pub prompt_id: PromptId,
    pub story_id: StoryId,
    /// The element the generation was aimed at.
    pub prompt_node_key: NodeKey,
    /// Text leaves the generation created, in creation order.
    pub generated_node_keys: Vec<NodeKey>,
    /// Text of the prompt node before generation started.
    pub original_content: String,
    pub status: SessionStatus,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl PromptGeneration {
    /// A fresh pending session.
    pub fn pending(
        prompt_id: PromptId,
        story_id: StoryId,
        prompt_node_key: NodeKey,
        original_content: impl Into<String>,
    ) -> Self {
        Self {
            prompt_id,
            story_id,
            prompt_node_key,
            generated_node_keys: Vec::new(),
            original_content: original_content.into(),
            status: SessionStatus::Pending,
            can_undo: false,
            can_redo: false,
        }
    }

    /// Apply a partial update. Unset fields are left alone.
    pub fn apply(&mut self, update: SessionUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(keys) = update.generated_node_keys {
            self.generated_node_keys = keys;
        }
        if let Some(key) = update.push_generated_key
            && !self.generated_node_keys.contains(&key)
        {
            self.generated_node_keys.push(key);
        }
        if let Some(can_undo) = update.can_undo {
            self.can_undo = can_undo;
        }
        if let Some(can_redo) = update.can_redo {
            self.can_redo = can_redo;
        }
    }
}

/// Partial update for a [`PromptGeneration`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub generated_node_keys: Option<Vec<NodeKey>>,
    /// Append one key to `generated_node_keys` unless already present.
    pub push_generated_key: Option<NodeKey>,
    pub can_undo: Option<bool>,
    pub can_redo: Option<bool>,
}

impl SessionUpdate {
    /// Update only the status.
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Status `generating`.
    pub fn generating() -> Self {
        Self::status(SessionStatus::Generating)
    }

    /// Status `completed`, undo available, redo cleared.
    pub fn completed() -> Self {
        Self {
            status: Some(SessionStatus::Completed),
            can_undo: Some(true),
            can_redo: Some(false),
            ..Default::default()
        }
    }

    /// Status `cancelled`: restore-original and retry are both offered.
    pub fn cancelled() -> Self {
        Self {
            status: Some(SessionStatus::Cancelled),
            can_undo: Some(true),
            can_redo: Some(true),
            ..Default::default()
        }
    }

    /// Record a generated text leaf.
    pub fn generated(key: NodeKey) -> Self {
        Self {
            push_generated_key: Some(key),
            ..Default::default()
        }
    }
}
