//! Transactional document wrapper.

use tokio::sync::broadcast;
use tracing::trace;

use crate::Result;
use crate::transaction::Transaction;
use crate::tree::DocumentTree;

/// Events broadcast after document changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentEvent {
    /// An update transaction mutated the tree.
    Updated { version: u64 },
    /// The whole tree was swapped (load, import).
    Replaced { version: u64 },
}

/// A document tree with an update boundary.
///
/// Mutations happen only inside [`update`](Self::update). Each update that
/// changes something bumps the version once and notifies subscribers, no
/// matter how many nodes it touched.
pub struct Document {
    tree: DocumentTree,
    version: u64,
    event_tx: broadcast::Sender<DocumentEvent>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document with one empty paragraph.
    pub fn new() -> Self {
        Self::from_tree(DocumentTree::with_empty_paragraph())
    }

    pub fn from_tree(tree: DocumentTree) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            tree,
            version: 0,
            event_tx,
        }
    }

    /// Load a serialized body, recovering to an empty document when it is
    /// malformed.
    pub fn import(body: &str) -> Self {
        Self::from_tree(DocumentTree::import_or_default(body))
    }

    /// Current version. Starts at 0.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.event_tx.subscribe()
    }

    /// Read-only access to the tree.
    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    /// Run `f` against the tree without mutation.
    pub fn read<R>(&self, f: impl FnOnce(&DocumentTree) -> R) -> R {
        f(&self.tree)
    }

    /// Run `f` as one atomic update.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> R) -> R {
        let mut tx = Transaction::new(&mut self.tree);
        let out = f(&mut tx);
        if tx.changed() {
            self.version += 1;
            trace!(version = self.version, "document updated");
            // No subscribers is fine.
            let _ = self.event_tx.send(DocumentEvent::Updated {
                version: self.version,
            });
        }
        out
    }

    /// Swap in a whole new tree.
    pub fn replace_tree(&mut self, tree: DocumentTree) {
        self.tree = tree;
        self.version += 1;
        let _ = self.event_tx.send(DocumentEvent::Replaced {
            version: self.version,
        });
    }

    pub fn plain_text(&self) -> String {
        self.tree.plain_text()
    }

    pub fn to_json(&self) -> Result<String> {
        self.tree.to_json()
    }
}
