//! Shared vocabulary for ModelPad.
//!
//! Everything the document substrate, the generation kernel and the CLI need
//! to agree on lives here: typed identifiers, the node kind sum type, tags,
//! generation sessions and insertion strategies. No I/O, no async.

pub mod ids;
pub mod node;
pub mod session;
pub mod status;
pub mod strategy;
pub mod tag;

pub use ids::{IdError, NodeKey, PromptId, StoryId, TagId};
pub use node::{AiGenerationData, HeadingTag, NodeKind, NodeType, PromptNodeData, TagNodeData};
pub use session::{PromptGeneration, SessionStatus, SessionUpdate};
pub use status::GenerationStatus;
pub use strategy::{InsertionStrategy, StrategyKind, TemplateStrategy};
pub use tag::{Tag, TagPatch, normalize_path};

/// Current time as an RFC 3339 string, the timestamp format used for
/// `createdAt` / `lastUsedAt` fields.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
