//! Hierarchical tags.
//!
//! [`TagRegistry`] is the store of known tags; [`TagOverlay`] is the `@`
//! typeahead and tag-editing state machine that places tag nodes into a
//! document and keeps the registry's usage counts in step.

mod overlay;
mod registry;

pub use overlay::{OverlayState, TagCandidate, TagOverlay};
pub use registry::{SharedTags, TagRegistry, shared_tags};

use modelpad_doc::DocError;
use modelpad_types::TagId;

/// Error type for tag operations.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("tag not found: {0}")]
    NotFound(TagId),

    #[error("tag path is empty")]
    EmptyPath,

    #[error("another tag already has path {0}")]
    PathTaken(String),

    #[error("cannot move a tag below itself: {0}")]
    IntoOwnSubtree(String),

    #[error("tag trigger is no longer at offset {offset}")]
    StaleTrigger { offset: usize },

    #[error("no tag interaction in progress")]
    Inactive,

    #[error(transparent)]
    Doc(#[from] DocError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TagResult<T> = Result<T, TagError>;
