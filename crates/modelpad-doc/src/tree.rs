//! Arena storage and read-only navigation.
//!
//! # Structure
//!
//! ```text
//! slots: [ Slot { generation, node: Some(Node) }, Slot { generation, node: None }, ... ]
//!                         │
//!                         └── Node { kind, parent, children: Vec<NodeKey> }
//! free:  [ slot indices available for reuse ]
//! ```
//!
//! A `NodeKey` resolves only while its slot holds a node *and* the slot's
//! generation matches the key's. Freeing a slot bumps its generation, so
//! `exists(key)` is a bounds check plus an integer compare.

use modelpad_types::{NodeKey, NodeKind, NodeType};

use crate::selection::Selection;

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
}

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) node: Option<Node>,
}

/// A document tree: one `root` element and everything reachable from it,
/// plus nodes created but not yet attached.
#[derive(Clone, Debug)]
pub struct DocumentTree {
    pub(crate) slots: Vec<Slot>,
    pub(crate) free: Vec<u32>,
    pub(crate) root: NodeKey,
    pub(crate) selection: Option<Selection>,
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTree {
    /// A tree with a bare root and no children.
    pub fn new() -> Self {
        let root = Node {
            kind: NodeKind::Root,
            parent: None,
            children: Vec::new(),
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
            root: NodeKey::from_parts(0, 0),
            selection: None,
        }
    }

    /// A tree with one empty paragraph, the state of a fresh editor.
    pub fn with_empty_paragraph() -> Self {
        let mut tree = Self::new();
        let p = tree.alloc(NodeKind::Paragraph);
        tree.link_child(tree.root, p, None);
        tree
    }

    /// A tree of top-level paragraphs, each holding one text leaf.
    pub fn from_paragraphs<S: AsRef<str>>(texts: &[S]) -> Self {
        let mut tree = Self::new();
        for text in texts {
            let p = tree.alloc(NodeKind::Paragraph);
            let t = tree.alloc(NodeKind::text(text.as_ref()));
            tree.link_child(p, t, None);
            tree.link_child(tree.root, p, None);
        }
        tree
    }

    // =========================================================================
    // Arena internals
    // =========================================================================

    pub(crate) fn node(&self, key: NodeKey) -> Option<&Node> {
        let slot = self.slots.get(key.slot() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        let slot = self.slots.get_mut(key.slot() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    /// Allocate a detached node.
    pub(crate) fn alloc(&mut self, kind: NodeKind) -> NodeKey {
        let node = Node {
            kind,
            parent: None,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.node = Some(node);
                NodeKey::from_parts(idx, slot.generation)
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeKey::from_parts(idx, 0)
            }
        }
    }

    /// Free a node and its whole subtree. Does not touch the parent's
    /// child list; callers unlink first.
    pub(crate) fn free_subtree(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            let Some(slot) = self.slots.get_mut(k.slot() as usize) else {
                continue;
            };
            if slot.generation != k.generation() {
                continue;
            }
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(k.slot());
            }
        }
    }

    /// Attach `child` under `parent` at `index` (or at the end).
    /// Both must exist and `child` must be detached.
    pub(crate) fn link_child(&mut self, parent: NodeKey, child: NodeKey, index: Option<usize>) {
        if let Some(p) = self.node_mut(parent) {
            let at = index.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(at, child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Remove `key` from its parent's child list, leaving it alive.
    pub(crate) fn unlink(&mut self, key: NodeKey) {
        let parent = self.node(key).and_then(|n| n.parent);
        if let Some(parent) = parent
            && let Some(p) = self.node_mut(parent)
        {
            p.children.retain(|c| *c != key);
        }
        if let Some(n) = self.node_mut(key) {
            n.parent = None;
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The root element.
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// `key` resolves to a live node.
    pub fn exists(&self, key: NodeKey) -> bool {
        self.node(key).is_some()
    }

    /// Kind of a live node.
    pub fn kind(&self, key: NodeKey) -> Option<&NodeKind> {
        self.node(key).map(|n| &n.kind)
    }

    /// Discriminant of a live node.
    pub fn node_type(&self, key: NodeKey) -> Option<NodeType> {
        self.kind(key).map(NodeKind::node_type)
    }

    /// Text of a text-bearing leaf.
    pub fn text(&self, key: NodeKey) -> Option<&str> {
        self.kind(key).and_then(NodeKind::text_content)
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Only the root is alive.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Current selection, if any.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key).and_then(|n| n.parent)
    }

    /// Children of an element. Empty for leaves and stale keys.
    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.node(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Direct children of the root.
    pub fn top_level(&self) -> &[NodeKey] {
        self.children(self.root)
    }

    /// Position of `key` in its parent's child list.
    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|c| *c == key)
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let idx = self.index_in_parent(key)?;
        self.children(parent).get(idx + 1).copied()
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let idx = self.index_in_parent(key)?;
        idx.checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// The node is reachable from the root.
    pub fn is_attached(&self, key: NodeKey) -> bool {
        let mut current = key;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    /// `ancestor` is a strict ancestor of `key`.
    pub fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = self.parent(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.parent(k);
        }
        false
    }

    /// The ancestor-or-self that is a direct child of the root.
    ///
    /// `None` for the root, stale keys, and detached nodes.
    pub fn top_level_ancestor(&self, key: NodeKey) -> Option<NodeKey> {
        if key == self.root || !self.exists(key) {
            return None;
        }
        let mut current = key;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root {
                return Some(current);
            }
            current = parent;
        }
    }

    /// The nearest ancestor-or-self that is a block element (not the root,
    /// not an inline link).
    pub fn element_ancestor(&self, key: NodeKey) -> Option<NodeKey> {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == self.root {
                return None;
            }
            let kind = self.kind(k)?;
            if kind.is_element() && !kind.is_inline() {
                return Some(k);
            }
            current = self.parent(k);
        }
        None
    }

    /// The last text-bearing leaf under `key` (or `key` itself if it is one).
    pub fn last_text_descendant(&self, key: NodeKey) -> Option<NodeKey> {
        let kind = self.kind(key)?;
        if kind.is_text_bearing() {
            return Some(key);
        }
        self.children(key)
            .iter()
            .rev()
            .find_map(|c| self.last_text_descendant(*c))
    }

    /// The first text-bearing leaf under `key` (or `key` itself if it is one).
    pub fn first_text_descendant(&self, key: NodeKey) -> Option<NodeKey> {
        let kind = self.kind(key)?;
        if kind.is_text_bearing() {
            return Some(key);
        }
        self.children(key)
            .iter()
            .find_map(|c| self.first_text_descendant(*c))
    }

    /// `key` and all its descendants, pre-order.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if !self.exists(key) {
            return out;
        }
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            out.push(k);
            stack.extend(self.children(k).iter().rev());
        }
        out
    }

    /// Text-bearing leaves under `key`, in document order.
    pub fn text_leaves(&self, key: NodeKey) -> Vec<NodeKey> {
        self.descendants(key)
            .into_iter()
            .filter(|k| self.kind(*k).is_some_and(NodeKind::is_text_bearing))
            .collect()
    }

    /// Attached nodes matching `pred`, in document order.
    pub fn find_all(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeKey> {
        self.descendants(self.root)
            .into_iter()
            .filter(|k| self.kind(*k).is_some_and(&pred))
            .collect()
    }
}

/// Character count of a string.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of character offset `offset`, or `None` past the end.
pub(crate) fn byte_index(s: &str, offset: usize) -> Option<usize> {
    if offset == 0 {
        return Some(0);
    }
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(offset)
}
