//! First-token placement for each insertion strategy.

use tracing::{debug, warn};

use modelpad_doc::{DocError, NodeKey, Transaction};
use modelpad_types::{InsertionStrategy, NodeKind, NodeType};

/// Where the first chunk landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// The new live leaf.
    pub leaf: NodeKey,
    /// Block element holding it, remembered for recovery.
    pub container: NodeKey,
    /// The strategy's target was missing and the text went to the end.
    pub degraded: bool,
}

/// Create a leaf of `kind` where `strategy` says.
///
/// A target that no longer resolves (or a missing selection) degrades to
/// appending a new paragraph at the document end.
pub fn place(
    tx: &mut Transaction<'_>,
    strategy: &InsertionStrategy,
    kind: NodeKind,
) -> Result<Placement, DocError> {
    let placed = match *strategy {
        InsertionStrategy::ReplaceNode { target_node_key } => {
            replace_top_level(tx, target_node_key, &kind)?
        }
        InsertionStrategy::InsertAfterNode { target_node_key, .. } => {
            insert_block_beside(tx, target_node_key, Side::After, &kind)?
        }
        InsertionStrategy::InsertBeforeNode { target_node_key, .. } => {
            insert_block_beside(tx, target_node_key, Side::Before, &kind)?
        }
        InsertionStrategy::AppendInsideNode { target_node_key } => {
            append_inside(tx, target_node_key, &kind)?
        }
        InsertionStrategy::InsertAtCursor => insert_at_cursor(tx, &kind)?,
        InsertionStrategy::ReplaceSelection => {
            if tx.selection().is_some_and(|s| tx.is_attached(s.anchor.key) && tx.is_attached(s.focus.key)) {
                tx.remove_selected_text()?;
                insert_at_cursor(tx, &kind)?
            } else {
                None
            }
        }
        InsertionStrategy::InsertAfterSelection { .. } => match selection_focus(tx) {
            Some(focus) => insert_block_beside(tx, focus, Side::After, &kind)?,
            None => None,
        },
        InsertionStrategy::InsertBeforeSelection { .. } => match selection_focus(tx) {
            Some(focus) => insert_block_beside(tx, focus, Side::Before, &kind)?,
            None => None,
        },
        InsertionStrategy::AppendToDocumentEnd => {
            let (leaf, container) = append_paragraph(tx, kind)?;
            return Ok(Placement {
                leaf,
                container,
                degraded: false,
            });
        }
    };

    match placed {
        Some((leaf, container)) => {
            debug!(%strategy, %leaf, %container, "placed live node");
            Ok(Placement {
                leaf,
                container,
                degraded: false,
            })
        }
        None => {
            warn!(%strategy, "insertion target missing, appending at document end");
            let (leaf, container) = append_paragraph(tx, kind)?;
            Ok(Placement {
                leaf,
                container,
                degraded: true,
            })
        }
    }
}

/// Append a new paragraph holding `kind` as the last top-level node.
pub fn append_paragraph(tx: &mut Transaction<'_>, kind: NodeKind) -> Result<(NodeKey, NodeKey), DocError> {
    let (p, leaf) = tx.create_paragraph_with(kind);
    let root = tx.root();
    tx.append_child(root, p)?;
    Ok((leaf, p))
}

/// Swap the top-level block holding `target` for a new paragraph.
fn replace_top_level(
    tx: &mut Transaction<'_>,
    target: NodeKey,
    kind: &NodeKind,
) -> Result<Option<(NodeKey, NodeKey)>, DocError> {
    let Some(top) = tx.top_level_ancestor(target) else {
        return Ok(None);
    };
    let (p, leaf) = tx.create_paragraph_with(kind.clone());
    tx.replace(top, p)?;
    Ok(Some((leaf, p)))
}

#[derive(Clone, Copy)]
enum Side {
    Before,
    After,
}

/// New block next to the block element containing `target`. A list item
/// gets a list item sibling so the list stays well formed.
fn insert_block_beside(
    tx: &mut Transaction<'_>,
    target: NodeKey,
    side: Side,
    kind: &NodeKind,
) -> Result<Option<(NodeKey, NodeKey)>, DocError> {
    if !tx.is_attached(target) {
        return Ok(None);
    }
    let Some(element) = tx.element_ancestor(target) else {
        return Ok(None);
    };
    let block = if tx.node_type(element) == Some(NodeType::ListItem) {
        tx.create(NodeKind::ListItem)
    } else {
        tx.create(NodeKind::Paragraph)
    };
    let leaf = tx.create(kind.clone());
    tx.append_child(block, leaf)?;
    match side {
        Side::After => tx.insert_after(element, block)?,
        Side::Before => tx.insert_before(element, block)?,
    }
    Ok(Some((leaf, block)))
}

fn append_inside(
    tx: &mut Transaction<'_>,
    target: NodeKey,
    kind: &NodeKind,
) -> Result<Option<(NodeKey, NodeKey)>, DocError> {
    if target == tx.root() || !tx.is_attached(target) {
        return Ok(None);
    }
    let Some(element) = tx.element_ancestor(target) else {
        return Ok(None);
    };
    let accepts = tx
        .kind(element)
        .is_some_and(|k| k.accepts_text() || matches!(k, NodeKind::ListItem));
    if accepts {
        let leaf = tx.create(kind.clone());
        tx.append_child(element, leaf)?;
        Ok(Some((leaf, element)))
    } else {
        let (p, leaf) = tx.create_paragraph_with(kind.clone());
        tx.insert_after(element, p)?;
        Ok(Some((leaf, p)))
    }
}

fn insert_at_cursor(
    tx: &mut Transaction<'_>,
    kind: &NodeKind,
) -> Result<Option<(NodeKey, NodeKey)>, DocError> {
    let Some(sel) = tx.selection().copied() else {
        return Ok(None);
    };
    if !tx.is_attached(sel.anchor.key) || !tx.is_attached(sel.focus.key) {
        return Ok(None);
    }
    let leaf = tx.insert_at_selection(kind.clone())?;
    let container = tx
        .element_ancestor(leaf)
        .or_else(|| tx.parent(leaf))
        .unwrap_or_else(|| tx.root());
    Ok(Some((leaf, container)))
}

fn selection_focus(tx: &Transaction<'_>) -> Option<NodeKey> {
    tx.selection()
        .map(|s| s.focus.key)
        .filter(|k| tx.is_attached(*k))
}

#[cfg(test)]
mod tests {
    use modelpad_doc::{Document, DocumentTree, Point, Selection};
    use pretty_assertions::assert_eq;

    use super::*;

    fn doc() -> Document {
        Document::from_tree(DocumentTree::from_paragraphs(&["Hello", "World"]))
    }

    fn place_in(doc: &mut Document, strategy: InsertionStrategy) -> Placement {
        doc.update(|tx| place(tx, &strategy, NodeKind::text("New")).unwrap())
    }

    #[test]
    fn test_insert_after_and_before() {
        let mut d = doc();
        let p1 = d.tree().top_level()[0];
        let leaf = d.tree().children(p1)[0];
        place_in(
            &mut d,
            InsertionStrategy::InsertAfterNode {
                target_node_key: leaf,
                new_paragraph: true,
            },
        );
        assert_eq!(d.plain_text(), "Hello\n\nNew\n\nWorld");

        let mut d = doc();
        let p2 = d.tree().top_level()[1];
        place_in(
            &mut d,
            InsertionStrategy::InsertBeforeNode {
                target_node_key: p2,
                new_paragraph: false,
            },
        );
        assert_eq!(d.plain_text(), "Hello\n\nNew\n\nWorld");
    }

    #[test]
    fn test_replace_node_uses_top_level_ancestor() {
        let mut d = doc();
        let p1 = d.tree().top_level()[0];
        let leaf = d.tree().children(p1)[0];
        let placed = place_in(&mut d, InsertionStrategy::ReplaceNode { target_node_key: leaf });
        assert!(!d.tree().exists(p1));
        assert_eq!(d.tree().top_level()[0], placed.container);
        assert_eq!(d.plain_text(), "New\n\nWorld");
    }

    #[test]
    fn test_missing_target_degrades_to_end() {
        let mut d = doc();
        let placed = place_in(
            &mut d,
            InsertionStrategy::ReplaceNode {
                target_node_key: NodeKey::from_parts(77, 3),
            },
        );
        assert!(placed.degraded);
        assert_eq!(d.plain_text(), "Hello\n\nWorld\n\nNew");
    }

    #[test]
    fn test_degraded_replace_keeps_marked_kind() {
        let mut d = doc();
        let p1 = d.tree().top_level()[0];
        d.update(|tx| tx.remove(p1).unwrap());
        let placed = d.update(|tx| {
            place(
                tx,
                &InsertionStrategy::ReplaceNode { target_node_key: p1 },
                NodeKind::ai_generation("New"),
            )
            .unwrap()
        });
        assert!(placed.degraded);
        assert!(matches!(
            d.tree().kind(placed.leaf),
            Some(NodeKind::AiGeneration(data)) if data.text == "New" && !data.completed
        ));
        assert_eq!(d.tree().top_level().last(), Some(&placed.container));
        assert_eq!(d.plain_text(), "World\n\nNew");
    }

    #[test]
    fn test_append_inside_text_container_and_list() {
        let mut d = doc();
        let p1 = d.tree().top_level()[0];
        let placed = place_in(&mut d, InsertionStrategy::AppendInsideNode { target_node_key: p1 });
        assert_eq!(placed.container, p1);
        assert_eq!(d.plain_text(), "HelloNew\n\nWorld");

        let mut d = Document::new();
        let list = d.update(|tx| {
            let list = tx.create(NodeKind::List { ordered: false });
            let root = tx.root();
            tx.append_child(root, list).unwrap();
            list
        });
        let placed = place_in(&mut d, InsertionStrategy::AppendInsideNode { target_node_key: list });
        assert_eq!(d.tree().previous_sibling(placed.container), Some(list));
        assert_eq!(d.tree().node_type(placed.container), Some(NodeType::Paragraph));
    }

    #[test]
    fn test_list_item_gets_list_item_sibling() {
        let mut d = Document::new();
        let item_leaf = d.update(|tx| {
            let list = tx.create(NodeKind::List { ordered: true });
            let item = tx.create(NodeKind::ListItem);
            let leaf = tx.create(NodeKind::text("first"));
            tx.append_child(item, leaf).unwrap();
            tx.append_child(list, item).unwrap();
            let root = tx.root();
            tx.append_child(root, list).unwrap();
            leaf
        });
        let placed = place_in(
            &mut d,
            InsertionStrategy::InsertAfterNode {
                target_node_key: item_leaf,
                new_paragraph: true,
            },
        );
        assert_eq!(d.tree().node_type(placed.container), Some(NodeType::ListItem));
        let item = d.tree().parent(item_leaf).unwrap();
        assert_eq!(d.tree().next_sibling(item), Some(placed.container));
    }

    #[test]
    fn test_cursor_and_selection_strategies() {
        let mut d = doc();
        let hello = d.tree().children(d.tree().top_level()[0])[0];
        d.update(|tx| tx.set_selection(Some(Selection::caret(hello, 2))));
        place_in(&mut d, InsertionStrategy::InsertAtCursor);
        assert_eq!(d.plain_text(), "HeNewllo\n\nWorld");

        let mut d = doc();
        let world = d.tree().children(d.tree().top_level()[1])[0];
        d.update(|tx| {
            tx.set_selection(Some(Selection::range(
                Point::new(world, 1),
                Point::new(world, 4),
            )))
        });
        place_in(&mut d, InsertionStrategy::ReplaceSelection);
        assert_eq!(d.plain_text(), "Hello\n\nWNewd");

        let mut d = doc();
        let hello = d.tree().children(d.tree().top_level()[0])[0];
        d.update(|tx| tx.set_selection(Some(Selection::caret(hello, 0))));
        place_in(&mut d, InsertionStrategy::InsertBeforeSelection { new_paragraph: true });
        assert_eq!(d.plain_text(), "New\n\nHello\n\nWorld");
    }

    #[test]
    fn test_selection_strategies_without_selection_degrade() {
        let mut d = doc();
        let placed = place_in(&mut d, InsertionStrategy::InsertAfterSelection { new_paragraph: true });
        assert!(placed.degraded);
        assert_eq!(d.plain_text(), "Hello\n\nWorld\n\nNew");
    }
}
