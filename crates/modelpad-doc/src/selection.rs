//! Selection model.
//!
//! A point is a node key plus an offset: a character offset for text leaves,
//! a child index for elements. A selection is an anchor and a focus; it is
//! collapsed (a caret) when they are equal. The anchor may come after the
//! focus when the user selected backwards.

use serde::{Deserialize, Serialize};

use modelpad_types::NodeKey;

use crate::tree::{DocumentTree, char_len};

/// A position in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

impl Point {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

/// Anchor and focus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    /// A caret at `offset` in `key`.
    pub fn caret(key: NodeKey, offset: usize) -> Self {
        let p = Point::new(key, offset);
        Self { anchor: p, focus: p }
    }

    /// A range from `anchor` to `focus`.
    pub fn range(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Where a point falls in document order: the number of text leaves wholly
/// before it, then a character offset into the next one.
type Position = (usize, usize);

impl DocumentTree {
    /// Resolve a point to a text leaf and a character offset in it.
    ///
    /// Element points snap to the first leaf at or after the child index, or
    /// the end of the last leaf before it. `None` when no text leaf is near.
    pub fn leaf_point(&self, point: Point) -> Option<(NodeKey, usize)> {
        let kind = self.kind(point.key)?;
        if let Some(text) = kind.text_content() {
            return Some((point.key, point.offset.min(char_len(text))));
        }
        let children = self.children(point.key);
        let split = point.offset.min(children.len());
        if let Some(leaf) = children[split..]
            .iter()
            .find_map(|c| self.first_text_descendant(*c))
        {
            return Some((leaf, 0));
        }
        children[..split]
            .iter()
            .rev()
            .find_map(|c| self.last_text_descendant(*c))
            .map(|leaf| (leaf, self.text(leaf).map(char_len).unwrap_or(0)))
    }

    fn position(&self, leaves: &[NodeKey], point: Point) -> Option<Position> {
        let (leaf, offset) = self.leaf_point(point)?;
        leaves.iter().position(|l| *l == leaf).map(|i| (i, offset))
    }

    /// The selection's endpoints as leaf points, in document order.
    ///
    /// `None` without a selection or when an endpoint cannot be resolved.
    pub fn ordered_selection(&self) -> Option<((NodeKey, usize), (NodeKey, usize))> {
        let sel = self.selection?;
        let leaves = self.text_leaves(self.root);
        let a = self.position(&leaves, sel.anchor)?;
        let f = self.position(&leaves, sel.focus)?;
        let (start, end) = if a <= f { (a, f) } else { (f, a) };
        Some(((leaves[start.0], start.1), (leaves[end.0], end.1)))
    }

    /// Text covered by a non-collapsed selection, or an empty string.
    ///
    /// Leaves in different blocks are separated by a blank line, matching
    /// the plain-text serialization.
    pub fn selection_text(&self) -> String {
        let Some(sel) = self.selection else {
            return String::new();
        };
        if sel.is_collapsed() {
            return String::new();
        }
        let Some(((start, so), (end, eo))) = self.ordered_selection() else {
            return String::new();
        };
        let leaves = self.text_leaves(self.root);
        let (Some(si), Some(ei)) = (
            leaves.iter().position(|l| *l == start),
            leaves.iter().position(|l| *l == end),
        ) else {
            return String::new();
        };

        let mut out = String::new();
        let mut last_block = None;
        for (i, leaf) in leaves[si..=ei].iter().enumerate() {
            let text = self.text(*leaf).unwrap_or_default();
            let from = if i == 0 { so } else { 0 };
            let to = if si + i == ei { eo } else { char_len(text) };
            let block = self.element_ancestor(*leaf);
            if last_block.is_some() && block != last_block {
                out.push_str("\n\n");
            }
            last_block = block;
            out.extend(text.chars().skip(from).take(to.saturating_sub(from)));
        }
        out
    }
}
