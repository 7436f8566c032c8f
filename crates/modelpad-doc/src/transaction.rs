//! Mutations. Only reachable through [`Document::update`](crate::Document::update).

use std::ops::Deref;

use modelpad_types::{NodeKey, NodeKind};

use crate::selection::{Point, Selection};
use crate::tree::{DocumentTree, byte_index, char_len};
use crate::{DocError, Result};

/// Mutable access to a tree for the duration of one update.
///
/// Derefs to [`DocumentTree`] for reads.
pub struct Transaction<'a> {
    tree: &'a mut DocumentTree,
    changed: bool,
}

impl Deref for Transaction<'_> {
    type Target = DocumentTree;

    fn deref(&self) -> &DocumentTree {
        self.tree
    }
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(tree: &'a mut DocumentTree) -> Self {
        Self {
            tree,
            changed: false,
        }
    }

    /// Whether anything was mutated.
    pub(crate) fn changed(&self) -> bool {
        self.changed
    }

    // =========================================================================
    // Checks
    // =========================================================================

    fn require(&self, key: NodeKey) -> Result<&NodeKind> {
        self.tree.kind(key).ok_or(DocError::NodeNotFound(key))
    }

    fn require_element(&self, key: NodeKey) -> Result<()> {
        let kind = self.require(key)?;
        if kind.is_element() {
            Ok(())
        } else {
            Err(DocError::NotAnElement {
                key,
                kind: kind.node_type(),
            })
        }
    }

    fn require_text(&self, key: NodeKey) -> Result<()> {
        let kind = self.require(key)?;
        if kind.is_text_bearing() {
            Ok(())
        } else {
            Err(DocError::NotText {
                key,
                kind: kind.node_type(),
            })
        }
    }

    /// `child` may be placed under `parent`: not the root, not `parent`
    /// itself or one of its ancestors.
    fn check_placeable(&self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.require(child)?;
        if child == self.tree.root() {
            return Err(DocError::RootImmutable);
        }
        if child == parent || self.tree.is_ancestor(child, parent) {
            return Err(DocError::InvalidParent { parent, child });
        }
        Ok(())
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Create a detached node. Attach it with one of the insert methods.
    pub fn create(&mut self, kind: NodeKind) -> NodeKey {
        self.changed = true;
        self.tree.alloc(kind)
    }

    /// Create a paragraph holding one node.
    pub fn create_paragraph_with(&mut self, child: NodeKind) -> (NodeKey, NodeKey) {
        let p = self.create(NodeKind::Paragraph);
        let c = self.create(child);
        self.tree.link_child(p, c, None);
        (p, c)
    }

    /// Make `child` the last child of `parent`, moving it if attached.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.insert_child_at(parent, usize::MAX, child)
    }

    /// Insert `child` at `index` under `parent` (clamped to the end).
    pub fn insert_child_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> Result<()> {
        self.require_element(parent)?;
        self.check_placeable(parent, child)?;
        self.tree.unlink(child);
        let len = self.tree.children(parent).len();
        self.tree.link_child(parent, child, Some(index.min(len)));
        self.changed = true;
        Ok(())
    }

    /// Insert `node` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeKey, node: NodeKey) -> Result<()> {
        self.insert_sibling(reference, node, 1)
    }

    /// Insert `node` as the previous sibling of `reference`.
    pub fn insert_before(&mut self, reference: NodeKey, node: NodeKey) -> Result<()> {
        self.insert_sibling(reference, node, 0)
    }

    fn insert_sibling(&mut self, reference: NodeKey, node: NodeKey, shift: usize) -> Result<()> {
        self.require(reference)?;
        if reference == self.tree.root() {
            return Err(DocError::RootImmutable);
        }
        let parent = self.tree.parent(reference).ok_or(DocError::InvalidParent {
            parent: reference,
            child: node,
        })?;
        self.check_placeable(parent, node)?;
        self.tree.unlink(node);
        let idx = self
            .tree
            .index_in_parent(reference)
            .ok_or(DocError::NodeNotFound(reference))?;
        self.tree.link_child(parent, node, Some(idx + shift));
        self.changed = true;
        Ok(())
    }

    /// Put `new` where `old` is and remove `old` with its subtree.
    pub fn replace(&mut self, old: NodeKey, new: NodeKey) -> Result<()> {
        if old == self.tree.root() {
            return Err(DocError::RootImmutable);
        }
        self.insert_after(old, new)?;
        self.remove(old)
    }

    /// Remove a node and free its subtree. Keys into the subtree go stale.
    ///
    /// A selection endpoint inside the removed subtree clears the selection.
    pub fn remove(&mut self, key: NodeKey) -> Result<()> {
        self.require(key)?;
        if key == self.tree.root() {
            return Err(DocError::RootImmutable);
        }
        self.tree.unlink(key);
        self.tree.free_subtree(key);
        self.fix_selection();
        self.changed = true;
        Ok(())
    }

    /// Remove every child of an element.
    pub fn clear_children(&mut self, key: NodeKey) -> Result<()> {
        self.require_element(key)?;
        let children = self.tree.children(key).to_vec();
        for child in children {
            self.tree.unlink(child);
            self.tree.free_subtree(child);
        }
        self.fix_selection();
        self.changed = true;
        Ok(())
    }

    /// Remove `key`, then walk up removing ancestors left without children.
    /// Stops at the root and at `keep`.
    pub fn remove_pruning(&mut self, key: NodeKey, keep: Option<NodeKey>) -> Result<()> {
        let mut parent = self.tree.parent(key);
        self.remove(key)?;
        while let Some(p) = parent {
            if p == self.tree.root() || Some(p) == keep || !self.tree.children(p).is_empty() {
                break;
            }
            parent = self.tree.parent(p);
            self.remove(p)?;
        }
        Ok(())
    }

    /// Mutable node kind, for payload updates (marker status, completion
    /// flags). Must not turn an element into a leaf or back.
    pub fn kind_mut(&mut self, key: NodeKey) -> Result<&mut NodeKind> {
        self.changed = true;
        self.tree
            .node_mut(key)
            .map(|n| &mut n.kind)
            .ok_or(DocError::NodeNotFound(key))
    }

    // =========================================================================
    // Text
    // =========================================================================

    fn text_mut(&mut self, key: NodeKey) -> Result<&mut String> {
        self.require_text(key)?;
        self.changed = true;
        self.tree
            .node_mut(key)
            .and_then(|n| n.kind.text_mut())
            .ok_or(DocError::NodeNotFound(key))
    }

    pub fn set_text(&mut self, key: NodeKey, text: &str) -> Result<()> {
        let t = self.text_mut(key)?;
        t.clear();
        t.push_str(text);
        Ok(())
    }

    pub fn append_text(&mut self, key: NodeKey, text: &str) -> Result<()> {
        self.text_mut(key)?.push_str(text);
        Ok(())
    }

    /// Remove characters `[from, to)` of a text leaf.
    pub fn delete_text(&mut self, key: NodeKey, from: usize, to: usize) -> Result<()> {
        let t = self.text_mut(key)?;
        let len = char_len(t);
        let (Some(a), Some(b)) = (byte_index(t, from), byte_index(t, to)) else {
            return Err(DocError::OffsetOutOfBounds {
                key,
                offset: from.max(to),
                len,
            });
        };
        if a < b {
            t.replace_range(a..b, "");
        }
        Ok(())
    }

    /// Split a text leaf at a character offset. The left part keeps `key`;
    /// the right part becomes a new sibling of the same kind, whose key is
    /// returned.
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<NodeKey> {
        self.require_text(key)?;
        let mut right_kind = self.require(key)?.clone();
        let t = self.text_mut(key)?;
        let len = char_len(t);
        let at = byte_index(t, offset).ok_or(DocError::OffsetOutOfBounds { key, offset, len })?;
        let right_text = t.split_off(at);
        if let Some(rt) = right_kind.text_mut() {
            *rt = right_text;
        }
        let right = self.create(right_kind);
        if self.tree.parent(key).is_some() {
            self.insert_after(key, right)?;
        }
        Ok(right)
    }

    /// Merge a text leaf into its previous sibling leaf and remove it.
    /// Returns the surviving key.
    pub fn merge_into_previous_text(&mut self, key: NodeKey) -> Result<NodeKey> {
        self.require_text(key)?;
        let prev = self
            .tree
            .previous_sibling(key)
            .ok_or(DocError::NodeNotFound(key))?;
        self.require_text(prev)?;
        let text = self.tree.text(key).unwrap_or_default().to_string();
        self.append_text(prev, &text)?;
        self.remove(key)?;
        Ok(prev)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.tree.selection = selection;
    }

    fn fix_selection(&mut self) {
        if let Some(sel) = self.tree.selection
            && (!self.tree.exists(sel.anchor.key) || !self.tree.exists(sel.focus.key))
        {
            self.tree.selection = None;
        }
    }

    /// Delete the selected text and collapse the selection to where it was.
    ///
    /// When the range spans blocks, whatever remains of the end block is
    /// merged into the start block. Returns the caret point, or `None` when
    /// there is no selection.
    pub fn remove_selected_text(&mut self) -> Result<Option<Point>> {
        let Some(sel) = self.tree.selection else {
            return Ok(None);
        };
        if sel.is_collapsed() {
            return Ok(Some(sel.focus));
        }
        let Some(((start, so), (end, eo))) = self.tree.ordered_selection() else {
            return Ok(Some(sel.focus));
        };

        if start == end {
            self.delete_text(start, so, eo)?;
        } else {
            let start_len = self.tree.text(start).map(char_len).unwrap_or(0);
            self.delete_text(start, so, start_len)?;
            self.delete_text(end, 0, eo)?;
            self.remove_between(start, end)?;
            self.merge_end_block(start, end)?;
        }

        let caret = Point::new(start, so);
        self.tree.selection = Some(Selection::caret(start, so));
        Ok(Some(caret))
    }

    /// Remove every node strictly between two leaves in document order,
    /// except ancestors of `end`.
    fn remove_between(&mut self, start: NodeKey, end: NodeKey) -> Result<()> {
        let order = self.tree.descendants(self.tree.root());
        let (Some(ps), Some(pe)) = (
            order.iter().position(|k| *k == start),
            order.iter().position(|k| *k == end),
        ) else {
            return Ok(());
        };
        for key in &order[ps + 1..pe] {
            if self.tree.exists(*key) && !self.tree.is_ancestor(*key, end) {
                self.remove(*key)?;
            }
        }
        Ok(())
    }

    fn merge_end_block(&mut self, start: NodeKey, end: NodeKey) -> Result<()> {
        let start_block = self.tree.element_ancestor(start);
        let end_block = self.tree.element_ancestor(end);
        if self.tree.text(end).is_some_and(str::is_empty) {
            self.remove_pruning(end, start_block)?;
        }
        let (Some(sb), Some(eb)) = (start_block, end_block) else {
            return Ok(());
        };
        if sb == eb || !self.tree.exists(eb) {
            return Ok(());
        }
        for child in self.tree.children(eb).to_vec() {
            self.append_child(sb, child)?;
        }
        self.remove_pruning(eb, Some(sb))
    }

    /// Insert a node at the selection point and put the caret after it.
    ///
    /// A range selection inserts at its start without deleting anything;
    /// call [`remove_selected_text`](Self::remove_selected_text) first to
    /// replace it. Text splits at the caret. Elements that cannot hold text
    /// get a new paragraph wrapping the node.
    pub fn insert_at_selection(&mut self, kind: NodeKind) -> Result<NodeKey> {
        let sel = self.tree.selection.ok_or(DocError::NoSelection)?;
        let point = match self.tree.ordered_selection() {
            Some(((key, offset), _)) => Point::new(key, offset),
            None => sel.focus,
        };
        let target = self.require(point.key)?.clone();
        let caret_len = kind.text_content().map(char_len).unwrap_or(0);
        let node = self.create(kind);

        if let Some(text) = target.text_content() {
            let len = char_len(text);
            if point.offset == 0 {
                self.insert_before(point.key, node)?;
            } else if point.offset >= len {
                self.insert_after(point.key, node)?;
            } else {
                self.split_text(point.key, point.offset)?;
                self.insert_after(point.key, node)?;
            }
        } else if target.accepts_text() {
            self.insert_child_at(point.key, point.offset, node)?;
        } else if target.is_element() {
            let p = self.create(NodeKind::Paragraph);
            self.append_child(p, node)?;
            self.insert_child_at(point.key, point.offset, p)?;
        } else {
            self.insert_after(point.key, node)?;
        }

        self.tree.selection = Some(Selection::caret(node, caret_len));
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Document;

    fn leaf(doc: &Document, i: usize) -> NodeKey {
        let tree = doc.tree();
        tree.children(tree.top_level()[i])[0]
    }

    #[test]
    fn test_insert_after_and_before() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["a", "c"]));
        let first = doc.tree().top_level()[0];
        let last = doc.tree().top_level()[1];
        doc.update(|tx| {
            let (p, _) = tx.create_paragraph_with(NodeKind::text("b"));
            tx.insert_after(first, p).unwrap();
            let (p0, _) = tx.create_paragraph_with(NodeKind::text("0"));
            tx.insert_before(first, p0).unwrap();
            let (p9, _) = tx.create_paragraph_with(NodeKind::text("9"));
            tx.insert_after(last, p9).unwrap();
        });
        assert_eq!(doc.plain_text(), "0\n\na\n\nb\n\nc\n\n9");
    }

    #[test]
    fn test_root_is_immutable() {
        let mut doc = Document::new();
        let root = doc.tree().root();
        doc.update(|tx| {
            assert_eq!(tx.remove(root), Err(DocError::RootImmutable));
            let p = tx.create(NodeKind::Paragraph);
            assert_eq!(tx.insert_after(root, p), Err(DocError::RootImmutable));
        });
    }

    #[test]
    fn test_cycle_rejected() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["a"]));
        let p = doc.tree().top_level()[0];
        doc.update(|tx| {
            let quote = tx.create(NodeKind::Quote);
            tx.append_child(p, quote).unwrap();
            assert!(matches!(
                tx.append_child(quote, p),
                Err(DocError::InvalidParent { .. })
            ));
        });
    }

    #[test]
    fn test_text_leaf_rejects_children() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["a"]));
        let t = leaf(&doc, 0);
        doc.update(|tx| {
            let x = tx.create(NodeKind::text("x"));
            assert!(matches!(
                tx.append_child(t, x),
                Err(DocError::NotAnElement { .. })
            ));
        });
    }

    #[test]
    fn test_remove_stales_subtree() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["a", "b"]));
        let p = doc.tree().top_level()[0];
        let t = leaf(&doc, 0);
        doc.update(|tx| tx.remove(p)).unwrap();
        assert!(!doc.tree().exists(p));
        assert!(!doc.tree().exists(t));
        assert_eq!(doc.plain_text(), "b");
    }

    #[test]
    fn test_split_and_merge() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["Hello"]));
        let t = leaf(&doc, 0);
        let right = doc.update(|tx| tx.split_text(t, 2)).unwrap();
        assert_eq!(doc.tree().text(t), Some("He"));
        assert_eq!(doc.tree().text(right), Some("llo"));
        assert_eq!(doc.tree().next_sibling(t), Some(right));

        let survivor = doc.update(|tx| tx.merge_into_previous_text(right)).unwrap();
        assert_eq!(survivor, t);
        assert!(!doc.tree().exists(right));
        assert_eq!(doc.tree().text(t), Some("Hello"));
    }

    #[test]
    fn test_split_out_of_bounds() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["ab"]));
        let t = leaf(&doc, 0);
        assert!(matches!(
            doc.update(|tx| tx.split_text(t, 5)),
            Err(DocError::OffsetOutOfBounds { offset: 5, len: 2, .. })
        ));
    }

    #[test]
    fn test_remove_selected_text_single_leaf() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["Hello world"]));
        let t = leaf(&doc, 0);
        let caret = doc
            .update(|tx| {
                tx.set_selection(Some(Selection::range(Point::new(t, 5), Point::new(t, 11))));
                tx.remove_selected_text()
            })
            .unwrap();
        assert_eq!(caret, Some(Point::new(t, 5)));
        assert_eq!(doc.plain_text(), "Hello");
        assert!(doc.tree().selection().unwrap().is_collapsed());
    }

    #[test]
    fn test_remove_selected_text_across_blocks_merges() {
        let mut doc =
            Document::from_tree(DocumentTree::from_paragraphs(&["Hello", "middle", "World"]));
        let (a, c) = (leaf(&doc, 0), leaf(&doc, 2));
        doc.update(|tx| {
            tx.set_selection(Some(Selection::range(Point::new(a, 2), Point::new(c, 3))));
            tx.remove_selected_text()
        })
        .unwrap();
        assert_eq!(doc.plain_text(), "Held");
        assert_eq!(doc.tree().top_level().len(), 1);
    }

    #[test]
    fn test_insert_at_caret_splits_text() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["Helo"]));
        let t = leaf(&doc, 0);
        let node = doc
            .update(|tx| {
                tx.set_selection(Some(Selection::caret(t, 3)));
                tx.insert_at_selection(NodeKind::text("l"))
            })
            .unwrap();
        assert_eq!(doc.plain_text(), "Hello");
        assert_eq!(doc.tree().selection(), Some(&Selection::caret(node, 1)));
    }

    #[test]
    fn test_insert_at_root_point_wraps_in_paragraph() {
        let mut doc = Document::from_tree(DocumentTree::new());
        let root = doc.tree().root();
        let node = doc
            .update(|tx| {
                tx.set_selection(Some(Selection::caret(root, 0)));
                tx.insert_at_selection(NodeKind::text("x"))
            })
            .unwrap();
        let p = doc.tree().parent(node).unwrap();
        assert_eq!(doc.tree().parent(p), Some(root));
        assert_eq!(doc.plain_text(), "x");
    }

    #[test]
    fn test_insert_without_selection_fails() {
        let mut doc = Document::new();
        assert_eq!(
            doc.update(|tx| tx.insert_at_selection(NodeKind::text("x"))),
            Err(DocError::NoSelection)
        );
    }

    #[test]
    fn test_remove_clears_dangling_selection() {
        let mut doc = Document::from_tree(DocumentTree::from_paragraphs(&["a", "b"]));
        let p = doc.tree().top_level()[0];
        let t = leaf(&doc, 0);
        doc.update(|tx| {
            tx.set_selection(Some(Selection::caret(t, 1)));
            tx.remove(p)
        })
        .unwrap();
        assert!(doc.tree().selection().is_none());
    }
}
