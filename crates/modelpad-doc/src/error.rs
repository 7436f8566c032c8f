//! Error types for document tree operations.

use thiserror::Error;

use modelpad_types::{NodeKey, NodeType};

/// Errors that can occur while reading or mutating a document tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    /// Key does not resolve to a live node.
    #[error("node not found: {0}")]
    NodeNotFound(NodeKey),

    /// Operation needs an element (a node that owns children).
    #[error("node {key} is a {kind}, not an element")]
    NotAnElement { key: NodeKey, kind: NodeType },

    /// Operation needs a text-bearing leaf.
    #[error("node {key} is a {kind}, not a text leaf")]
    NotText { key: NodeKey, kind: NodeType },

    /// The node cannot be placed there (cycle, or the reference is detached).
    #[error("cannot place {child} under {parent}")]
    InvalidParent { parent: NodeKey, child: NodeKey },

    /// Character or child offset past the end.
    #[error("offset {offset} out of bounds for node {key} with length {len}")]
    OffsetOutOfBounds { key: NodeKey, offset: usize, len: usize },

    /// The root cannot be removed, replaced, or moved.
    #[error("the root node cannot be modified this way")]
    RootImmutable,

    /// Operation needs a selection and there is none.
    #[error("no selection")]
    NoSelection,

    /// JSON import/export failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DocError {
    fn from(e: serde_json::Error) -> Self {
        DocError::Serialization(e.to_string())
    }
}
