//! Tag typeahead and tag editing.
//!
//! ```text
//!          caret after "@query"             confirm / close
//!   Idle ─────────────────────────▶ Typeahead ──────────────▶ Idle
//!    │                                                         ▲
//!    └── begin_edit(tag node) ──▶ Editing ── replace/delete ───┘
//! ```
//!
//! The overlay holds no document or registry; both are passed to each call
//! that needs them.

use tracing::debug;

use modelpad_doc::{DocError, Document, DocumentTree, NodeKey, Selection, Transaction};
use modelpad_types::{NodeKind, Tag, TagId};

use super::registry::TagRegistry;
use super::{TagError, TagResult};

/// One row of the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCandidate {
    pub id: TagId,
    pub name: String,
    pub is_category: bool,
}

impl From<&Tag> for TagCandidate {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            is_category: tag.is_category,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OverlayState {
    #[default]
    Idle,
    /// The caret follows an `@` in a text leaf.
    Typeahead {
        node: NodeKey,
        /// Character offset of the `@`.
        at_offset: usize,
        query: String,
        candidates: Vec<TagCandidate>,
        selected: usize,
        show_create_new: bool,
    },
    /// An existing tag node is being replaced or removed.
    Editing {
        node: NodeKey,
        tag_id: TagId,
        query: String,
        candidates: Vec<TagCandidate>,
        selected: usize,
        show_create_new: bool,
    },
}

#[derive(Debug, Default)]
pub struct TagOverlay {
    state: OverlayState,
}

impl TagOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != OverlayState::Idle
    }

    pub fn close(&mut self) {
        self.state = OverlayState::Idle;
    }

    /// Re-evaluate after the selection moved or text changed.
    ///
    /// Editing is left alone; otherwise the overlay opens when a collapsed
    /// caret in a plain text leaf follows `@` with no space or newline in
    /// between, and closes in every other case.
    pub fn on_selection_change(&mut self, tree: &DocumentTree, tags: &TagRegistry) -> &OverlayState {
        if matches!(self.state, OverlayState::Editing { .. }) {
            return &self.state;
        }
        self.state = match typeahead_trigger(tree) {
            Some((node, at_offset, query)) => {
                let (candidates, show_create_new) = candidates_for(tags, &query, None);
                OverlayState::Typeahead {
                    node,
                    at_offset,
                    query,
                    candidates,
                    selected: 0,
                    show_create_new,
                }
            }
            None => OverlayState::Idle,
        };
        &self.state
    }

    pub fn select_next(&mut self) {
        self.step(1);
    }

    pub fn select_previous(&mut self) {
        self.step(-1);
    }

    fn step(&mut self, delta: isize) {
        let (OverlayState::Typeahead {
            candidates,
            selected,
            show_create_new,
            ..
        }
        | OverlayState::Editing {
            candidates,
            selected,
            show_create_new,
            ..
        }) = &mut self.state
        else {
            return;
        };
        let total = (candidates.len() + usize::from(*show_create_new)) as isize;
        if total == 0 {
            return;
        }
        *selected = (*selected as isize + delta).rem_euclid(total) as usize;
    }

    /// The highlighted existing tag, or `None` when nothing or the
    /// create-new row is highlighted.
    pub fn selected_candidate(&self) -> Option<&TagCandidate> {
        match &self.state {
            OverlayState::Typeahead {
                candidates,
                selected,
                ..
            }
            | OverlayState::Editing {
                candidates,
                selected,
                ..
            } => candidates.get(*selected),
            OverlayState::Idle => None,
        }
    }

    /// Accept the highlighted row.
    ///
    /// In typeahead the `@query` text is replaced by a tag node; while
    /// editing, the edited tag node is swapped for the chosen tag. The
    /// create-new row registers the query as a new hierarchical tag. Usage is
    /// counted once for the placed tag.
    pub fn confirm(&mut self, doc: &mut Document, tags: &mut TagRegistry) -> TagResult<Tag> {
        match std::mem::take(&mut self.state) {
            OverlayState::Idle => Err(TagError::Inactive),
            OverlayState::Typeahead {
                node,
                at_offset,
                query,
                candidates,
                selected,
                ..
            } => {
                check_trigger(doc.tree(), node, at_offset, &query)?;
                let tag = resolve_choice(tags, &candidates, selected, &query)?;
                place_tag(doc, node, at_offset, &query, &tag)?;
                tags.increment_tag_usage(tag.id)?;
                debug!(name = %tag.name, "tag placed");
                Ok(tag)
            }
            OverlayState::Editing {
                node,
                query,
                candidates,
                selected,
                ..
            } => {
                let tag = resolve_choice(tags, &candidates, selected, &query)?;
                replace_tag_node(doc, node, &tag)?;
                tags.increment_tag_usage(tag.id)?;
                Ok(tag)
            }
        }
    }

    /// Start editing the tag node at `node`.
    pub fn begin_edit(&mut self, tree: &DocumentTree, tags: &TagRegistry, node: NodeKey) -> TagResult<()> {
        let Some(NodeKind::Tag(data)) = tree.kind(node) else {
            return Err(DocError::NodeNotFound(node).into());
        };
        let (candidates, show_create_new) = candidates_for(tags, "", Some(data.tag_id));
        self.state = OverlayState::Editing {
            node,
            tag_id: data.tag_id,
            query: String::new(),
            candidates,
            selected: 0,
            show_create_new,
        };
        Ok(())
    }

    /// Filter the edit candidates. The tag being edited is never offered.
    pub fn set_edit_query(&mut self, tags: &TagRegistry, new_query: &str) -> TagResult<()> {
        let OverlayState::Editing {
            tag_id,
            query,
            candidates,
            selected,
            show_create_new,
            ..
        } = &mut self.state
        else {
            return Err(TagError::Inactive);
        };
        let (found, create) = candidates_for(tags, new_query, Some(*tag_id));
        *query = new_query.to_string();
        *candidates = found;
        *show_create_new = create;
        *selected = 0;
        Ok(())
    }

    /// Swap the edited tag node for a fresh snapshot of tag `id`.
    pub fn replace_with(&mut self, doc: &mut Document, tags: &mut TagRegistry, id: TagId) -> TagResult<Tag> {
        let OverlayState::Editing { node, .. } = self.state else {
            return Err(TagError::Inactive);
        };
        let tag = tags.get_tag(id).cloned().ok_or(TagError::NotFound(id))?;
        replace_tag_node(doc, node, &tag)?;
        tags.increment_tag_usage(id)?;
        self.state = OverlayState::Idle;
        Ok(tag)
    }

    /// Remove the edited tag node from the document. The registry entry
    /// stays.
    pub fn delete_edited(&mut self, doc: &mut Document) -> TagResult<()> {
        let OverlayState::Editing { node, .. } = self.state else {
            return Err(TagError::Inactive);
        };
        doc.update(|tx| remove_tag_node(tx, node))?;
        self.state = OverlayState::Idle;
        Ok(())
    }

    /// Backspace handling. Returns true when a tag node was removed.
    ///
    /// While editing with an empty query the edited tag goes. Otherwise a
    /// collapsed caret inside a tag node, or at the start of a text leaf
    /// right after one, removes that tag node.
    pub fn handle_backspace(&mut self, doc: &mut Document) -> TagResult<bool> {
        if let OverlayState::Editing { query, .. } = &self.state {
            if query.is_empty() {
                self.delete_edited(doc)?;
                return Ok(true);
            }
            return Ok(false);
        }

        let Some(sel) = doc.tree().selection().copied().filter(Selection::is_collapsed) else {
            return Ok(false);
        };
        let tree = doc.tree();
        let anchor = sel.anchor;
        let victim = match tree.kind(anchor.key) {
            Some(NodeKind::Tag(_)) => Some(anchor.key),
            Some(NodeKind::Text { .. }) if anchor.offset == 0 => tree
                .previous_sibling(anchor.key)
                .filter(|p| matches!(tree.kind(*p), Some(NodeKind::Tag(_)))),
            _ => None,
        };
        let Some(victim) = victim else {
            return Ok(false);
        };
        doc.update(|tx| remove_tag_node(tx, victim))?;
        self.state = OverlayState::Idle;
        Ok(true)
    }
}

/// `(leaf, at_offset, query)` when the caret sits in an `@` query.
fn typeahead_trigger(tree: &DocumentTree) -> Option<(NodeKey, usize, String)> {
    let sel = tree.selection().filter(|s| s.is_collapsed())?;
    let node = sel.anchor.key;
    let Some(NodeKind::Text { text, .. }) = tree.kind(node) else {
        return None;
    };
    let before: Vec<char> = text.chars().take(sel.anchor.offset).collect();
    for (i, c) in before.iter().enumerate().rev() {
        match c {
            '@' => {
                let query: String = before[i + 1..].iter().collect();
                return Some((node, i, query));
            }
            ' ' | '\n' => return None,
            _ => {}
        }
    }
    None
}

fn candidates_for(tags: &TagRegistry, query: &str, exclude: Option<TagId>) -> (Vec<TagCandidate>, bool) {
    let candidates: Vec<TagCandidate> = tags
        .search_tags_by_path(query)
        .into_iter()
        .filter(|t| Some(t.id) != exclude)
        .map(TagCandidate::from)
        .collect();
    let wanted = query.trim().to_lowercase();
    let exact = candidates.iter().any(|c| c.name.to_lowercase() == wanted);
    (candidates, !wanted.is_empty() && !exact)
}

fn resolve_choice(
    tags: &mut TagRegistry,
    candidates: &[TagCandidate],
    selected: usize,
    query: &str,
) -> TagResult<Tag> {
    match candidates.get(selected) {
        Some(c) => tags.get_tag(c.id).cloned().ok_or(TagError::NotFound(c.id)),
        None => tags.add_hierarchical_tag(query.trim()),
    }
}

/// The typeahead's `@query` must still sit at `at_offset` in an attached
/// text leaf. The document may have changed since the overlay opened.
fn check_trigger(tree: &DocumentTree, leaf: NodeKey, at_offset: usize, query: &str) -> TagResult<()> {
    if !tree.is_attached(leaf) || !matches!(tree.kind(leaf), Some(NodeKind::Text { .. })) {
        return Err(DocError::NodeNotFound(leaf).into());
    }
    let text = tree.text(leaf).unwrap_or_default();
    let mut rest = text.chars().skip(at_offset);
    let intact = rest.next() == Some('@') && query.chars().all(|q| rest.next() == Some(q));
    if !intact {
        return Err(TagError::StaleTrigger { offset: at_offset });
    }
    Ok(())
}

/// Replace `@query` at `at_offset` in `leaf` with a tag node, leaving a text
/// leaf after it for the caret. Nothing is touched unless the trigger is
/// still in place.
fn place_tag(doc: &mut Document, leaf: NodeKey, at_offset: usize, query: &str, tag: &Tag) -> TagResult<()> {
    check_trigger(doc.tree(), leaf, at_offset, query)?;
    doc.update(|tx| -> TagResult<()> {
        let after = tx.split_text(leaf, at_offset)?;
        tx.delete_text(after, 0, query.chars().count() + 1)?;

        let tag_node = tx.create(NodeKind::Tag(tag.to_node_data()));
        tx.insert_before(after, tag_node)?;
        if tx.text(leaf).is_some_and(str::is_empty) {
            tx.remove(leaf)?;
        }

        if tx.text(after).is_some_and(str::is_empty) {
            tx.set_text(after, " ")?;
            tx.set_selection(Some(Selection::caret(after, 1)));
        } else {
            tx.set_selection(Some(Selection::caret(after, 0)));
        }
        Ok(())
    })
}

fn replace_tag_node(doc: &mut Document, node: NodeKey, tag: &Tag) -> TagResult<()> {
    doc.update(|tx| -> TagResult<()> {
        if !matches!(tx.kind(node), Some(NodeKind::Tag(_))) || !tx.is_attached(node) {
            return Err(DocError::NodeNotFound(node).into());
        }
        let fresh = tx.create(NodeKind::Tag(tag.to_node_data()));
        tx.insert_after(node, fresh)?;
        tx.remove(node)?;
        match tx.next_sibling(fresh) {
            Some(next) if matches!(tx.kind(next), Some(NodeKind::Text { .. })) => {
                tx.set_selection(Some(Selection::caret(next, 0)));
            }
            _ => {
                let space = tx.create(NodeKind::text(" "));
                tx.insert_after(fresh, space)?;
                tx.set_selection(Some(Selection::caret(space, 1)));
            }
        }
        Ok(())
    })
}

fn remove_tag_node(tx: &mut Transaction<'_>, node: NodeKey) -> TagResult<()> {
    let is_text = |k: &NodeKey| matches!(tx.kind(*k), Some(NodeKind::Text { .. }));
    let next = tx.next_sibling(node).filter(&is_text);
    let prev = tx.previous_sibling(node).filter(&is_text);
    tx.remove(node)?;
    if let Some(next) = next {
        tx.set_selection(Some(Selection::caret(next, 0)));
    } else if let Some(prev) = prev {
        let end = tx.text(prev).map(|t| t.chars().count()).unwrap_or(0);
        tx.set_selection(Some(Selection::caret(prev, end)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// One paragraph holding `text`, caret at `caret`.
    fn doc_with(text: &str, caret: usize) -> (Document, NodeKey) {
        let mut doc = Document::new();
        let leaf = doc.update(|tx| {
            let (p, leaf) = tx.create_paragraph_with(NodeKind::text(text));
            let root = tx.root();
            tx.append_child(root, p).unwrap();
            tx.set_selection(Some(Selection::caret(leaf, caret)));
            leaf
        });
        (doc, leaf)
    }

    fn registry() -> TagRegistry {
        let mut tags = TagRegistry::new();
        tags.add_hierarchical_tag("people/ada").unwrap();
        tags.add_hierarchical_tag("places/paris").unwrap();
        tags
    }

    #[test]
    fn test_trigger_detection() {
        let tags = registry();
        let mut overlay = TagOverlay::new();

        let (doc, leaf) = doc_with("hi @ad", 6);
        match overlay.on_selection_change(doc.tree(), &tags) {
            OverlayState::Typeahead {
                node,
                at_offset,
                query,
                candidates,
                show_create_new,
                ..
            } => {
                assert_eq!(*node, leaf);
                assert_eq!(*at_offset, 3);
                assert_eq!(query, "ad");
                assert_eq!(candidates[0].name, "people/ada");
                assert!(*show_create_new);
            }
            other => panic!("expected typeahead, got {other:?}"),
        }

        let (doc, _) = doc_with("hi @ad x", 8);
        assert_eq!(overlay.on_selection_change(doc.tree(), &tags), &OverlayState::Idle);

        let (doc, _) = doc_with("mail@", 5);
        assert!(overlay.on_selection_change(doc.tree(), &tags) != &OverlayState::Idle);
    }

    #[test]
    fn test_selection_wraps_over_create_row() {
        let tags = registry();
        let mut overlay = TagOverlay::new();
        let (doc, _) = doc_with("@pa", 3);
        overlay.on_selection_change(doc.tree(), &tags);
        assert_eq!(overlay.selected_candidate().unwrap().name, "places/paris");
        overlay.select_next();
        assert!(overlay.selected_candidate().is_none());
        overlay.select_next();
        assert_eq!(overlay.selected_candidate().unwrap().name, "places/paris");
        overlay.select_previous();
        assert!(overlay.selected_candidate().is_none());
    }

    #[test]
    fn test_confirm_existing_splits_text_and_counts_usage() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let (mut doc, leaf) = doc_with("met @ad today", 7);
        overlay.on_selection_change(doc.tree(), &tags);

        let tag = overlay.confirm(&mut doc, &mut tags).unwrap();
        assert_eq!(tag.name, "people/ada");
        assert_eq!(tags.get_tag(tag.id).unwrap().usage_count, 1);
        assert_eq!(doc.plain_text(), "met @people/ada today");
        assert!(!overlay.is_active());

        let p = doc.tree().parent(leaf).unwrap();
        let children = doc.tree().children(p).to_vec();
        assert_eq!(children.len(), 3);
        assert!(matches!(doc.tree().kind(children[1]), Some(NodeKind::Tag(_))));
        assert_eq!(doc.tree().selection().unwrap().anchor.key, children[2]);
        assert_eq!(doc.tree().selection().unwrap().anchor.offset, 0);
    }

    #[test]
    fn test_confirm_create_new_at_start_of_leaf() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let (mut doc, _) = doc_with("@lore/dragons", 13);
        overlay.on_selection_change(doc.tree(), &tags);
        overlay.select_previous();

        let tag = overlay.confirm(&mut doc, &mut tags).unwrap();
        assert_eq!(tag.name, "lore/dragons");
        assert_eq!(tag.usage_count, 0);
        assert_eq!(tags.get_tag(tag.id).unwrap().usage_count, 1);
        assert!(tags.find_by_name("lore").unwrap().is_category);
        assert_eq!(doc.plain_text(), "@lore/dragons ");

        let sel = doc.tree().selection().unwrap();
        assert_eq!(doc.tree().text(sel.anchor.key), Some(" "));
        assert_eq!(sel.anchor.offset, 1);
    }

    #[test]
    fn test_edit_replace_and_delete() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let (mut doc, _) = doc_with("@ada", 4);
        overlay.on_selection_change(doc.tree(), &tags);
        let ada = overlay.confirm(&mut doc, &mut tags).unwrap();
        let tag_node = doc.tree().find_all(|k| matches!(k, NodeKind::Tag(_)))[0];

        overlay.begin_edit(doc.tree(), &tags, tag_node).unwrap();
        match overlay.state() {
            OverlayState::Editing { candidates, .. } => {
                assert!(candidates.iter().all(|c| c.id != ada.id));
            }
            other => panic!("expected editing, got {other:?}"),
        }
        overlay.set_edit_query(&tags, "paris").unwrap();
        let paris = overlay.selected_candidate().unwrap().id;
        overlay.replace_with(&mut doc, &mut tags, paris).unwrap();
        assert_eq!(doc.plain_text(), "@places/paris ");
        assert!(!doc.tree().exists(tag_node));
        assert_eq!(tags.get_tag(paris).unwrap().usage_count, 1);

        let tag_node = doc.tree().find_all(|k| matches!(k, NodeKind::Tag(_)))[0];
        overlay.begin_edit(doc.tree(), &tags, tag_node).unwrap();
        assert!(overlay.handle_backspace(&mut doc).unwrap());
        assert_eq!(doc.plain_text(), " ");
        assert!(tags.get_tag(paris).is_some());
    }

    #[test]
    fn test_backspace_after_tag() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let (mut doc, _) = doc_with("see @ada", 8);
        overlay.on_selection_change(doc.tree(), &tags);
        overlay.confirm(&mut doc, &mut tags).unwrap();

        // caret sits at offset 1 of the trailing " "
        assert!(!overlay.handle_backspace(&mut doc).unwrap());
        let sel = doc.tree().selection().copied().unwrap();
        doc.update(|tx| tx.set_selection(Some(Selection::caret(sel.anchor.key, 0))));
        assert!(overlay.handle_backspace(&mut doc).unwrap());
        assert_eq!(doc.plain_text(), "see  ");
    }

    #[test]
    fn test_confirm_after_trigger_edited_leaves_document_alone() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let (mut doc, leaf) = doc_with("met @ad", 7);
        overlay.on_selection_change(doc.tree(), &tags);
        assert!(overlay.is_active());

        // The text shrinks under the open overlay.
        doc.update(|tx| tx.set_text(leaf, "met").unwrap());
        let nodes = doc.tree().len();
        let before = tags.len();

        let err = overlay.confirm(&mut doc, &mut tags).unwrap_err();
        assert!(matches!(err, TagError::StaleTrigger { offset: 4 }));
        assert_eq!(doc.plain_text(), "met");
        assert_eq!(doc.tree().len(), nodes);
        assert_eq!(doc.tree().text(leaf), Some("met"));
        assert_eq!(tags.len(), before);
        assert!(!overlay.is_active());
    }

    #[test]
    fn test_confirm_after_trigger_replaced_leaves_document_alone() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let (mut doc, leaf) = doc_with("met @ad today", 7);
        overlay.on_selection_change(doc.tree(), &tags);
        overlay.select_previous();

        doc.update(|tx| tx.set_text(leaf, "met #ad today").unwrap());
        assert!(matches!(
            overlay.confirm(&mut doc, &mut tags),
            Err(TagError::StaleTrigger { .. })
        ));
        assert_eq!(doc.plain_text(), "met #ad today");
        assert!(tags.find_by_name("ad").is_none());
        assert!(doc.tree().find_all(|k| matches!(k, NodeKind::Tag(_))).is_empty());
    }

    #[test]
    fn test_confirm_while_idle_fails() {
        let mut tags = registry();
        let mut overlay = TagOverlay::new();
        let mut doc = Document::new();
        assert!(matches!(overlay.confirm(&mut doc, &mut tags), Err(TagError::Inactive)));
    }
}
