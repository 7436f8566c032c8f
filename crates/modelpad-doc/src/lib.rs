//! Document tree substrate for ModelPad.
//!
//! A rich-text document is a tree of typed nodes stored in a generational
//! arena. Nodes are referenced by [`NodeKey`], never by pointer; a key to a
//! removed node stops resolving instead of pointing at whatever reuses its
//! slot, so long-running writers (the streaming insertion engine) can test
//! liveness with [`DocumentTree::exists`] before touching a node.
//!
//! # Access
//!
//! - [`Document::read`] / [`Document::tree`]: read-only navigation
//! - [`Document::update`]: the only way to mutate, through a [`Transaction`]
//! - [`Document::subscribe`]: change notifications, one per update
//!
//! # Formats
//!
//! - [`DocumentTree::plain_text`]: blocks separated by blank lines
//! - [`DocumentTree::to_json`] / [`DocumentTree::from_json`]: lossless body
//!   format including tag, prompt and AI generation nodes

mod document;
mod error;
mod json;
mod selection;
mod text;
mod transaction;
mod tree;

pub use document::{Document, DocumentEvent};
pub use error::DocError;
pub use json::{TagRef, extract_tag_refs};
pub use modelpad_types::NodeKey;
pub use selection::{Point, Selection};
pub use transaction::Transaction;
pub use tree::DocumentTree;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocError>;
