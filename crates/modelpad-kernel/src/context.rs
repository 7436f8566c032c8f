//! Prompt context extraction.
//!
//! Reads a document snapshot and turns it into the fields templates can
//! reference. Extraction never fails: a fault yields an empty context and a
//! warning, so generation is never blocked by it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use modelpad_doc::{DocError, DocumentTree, NodeKey};
use modelpad_types::StoryId;

/// Everything a template can reference. Built once per generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    pub active_node_text: String,
    #[serde(default)]
    pub selection_text: String,
    #[serde(default)]
    pub context_documents: Vec<String>,
    pub current_document_text: String,
    pub text_before_active_node: String,
    pub text_after_active_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editors_note: Option<String>,
}

/// A reference document the user may opt into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDocument {
    pub story_id: StoryId,
    /// Already rendered to plain text.
    pub text: String,
    pub include_in_context: bool,
}

/// Inputs beside the tree itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSource<'a> {
    /// Explicit target; wins over the selection when it still resolves.
    pub target: Option<NodeKey>,
    /// The story being edited, excluded from the reference documents.
    pub story_id: Option<StoryId>,
    pub documents: &'a [ContextDocument],
    /// Text supplied by the caller, used instead of the resolved node text.
    pub custom_text: Option<&'a str>,
    pub editors_note: Option<&'a str>,
}

/// Extract a prompt context, falling back to an empty one on any fault.
pub fn extract_context(tree: &DocumentTree, source: &ContextSource<'_>) -> PromptContext {
    match try_extract(tree, source) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = %e, "context extraction failed, using empty context");
            PromptContext::default()
        }
    }
}

/// The top-level node a generation is about: the target's top-level
/// ancestor if the target is live, else the selection anchor's.
pub fn resolve_active_node(tree: &DocumentTree, target: Option<NodeKey>) -> Option<NodeKey> {
    target
        .and_then(|k| tree.top_level_ancestor(k))
        .or_else(|| {
            tree.selection()
                .and_then(|sel| tree.top_level_ancestor(sel.anchor.key))
        })
}

fn try_extract(tree: &DocumentTree, source: &ContextSource<'_>) -> Result<PromptContext, DocError> {
    let current_document_text = tree.plain_text();
    let selection_text = tree.selection_text();

    let mut before = String::new();
    let mut after = String::new();
    let active = resolve_active_node(tree, source.target);
    let resolved_text = match active {
        Some(node) => {
            let idx = tree.index_in_parent(node).ok_or(DocError::NodeNotFound(node))?;
            let siblings = tree.top_level();
            before = join_text(tree, &siblings[..idx]);
            after = join_text(tree, &siblings[idx + 1..]);
            Some(tree.text_content(node))
        }
        None => None,
    };

    let active_node_text = match (source.custom_text, resolved_text) {
        (Some(custom), _) => custom.to_string(),
        (None, Some(text)) => text,
        (None, None) if !selection_text.is_empty() => selection_text.clone(),
        (None, None) => current_document_text.clone(),
    };

    let context_documents = source
        .documents
        .iter()
        .filter(|d| d.include_in_context && Some(d.story_id) != source.story_id)
        .map(|d| d.text.clone())
        .collect();

    Ok(PromptContext {
        active_node_text,
        selection_text,
        context_documents,
        current_document_text,
        text_before_active_node: before,
        text_after_active_node: after,
        editors_note: source.editors_note.map(str::to_string),
    })
}

fn join_text(tree: &DocumentTree, keys: &[NodeKey]) -> String {
    keys.iter()
        .map(|k| tree.text_content(*k))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use modelpad_doc::{Document, Selection};
    use pretty_assertions::assert_eq;

    use super::*;

    fn three() -> DocumentTree {
        DocumentTree::from_paragraphs(&["One", "Two", "Three"])
    }

    #[test]
    fn test_target_resolves_neighbours() {
        let tree = three();
        let two = tree.top_level()[1];
        let leaf = tree.children(two)[0];
        let ctx = extract_context(
            &tree,
            &ContextSource {
                target: Some(leaf),
                ..Default::default()
            },
        );
        assert_eq!(ctx.active_node_text, "Two");
        assert_eq!(ctx.text_before_active_node, "One");
        assert_eq!(ctx.text_after_active_node, "Three");
        assert_eq!(ctx.current_document_text, "One\n\nTwo\n\nThree");
        assert_eq!(ctx.selection_text, "");
    }

    #[test]
    fn test_selection_anchor_used_when_target_stale() {
        let mut doc = Document::from_tree(three());
        let three_leaf = doc.tree().children(doc.tree().top_level()[2])[0];
        doc.update(|tx| tx.set_selection(Some(Selection::caret(three_leaf, 2))));
        let ctx = extract_context(
            doc.tree(),
            &ContextSource {
                target: Some(NodeKey::from_parts(999, 4)),
                ..Default::default()
            },
        );
        assert_eq!(ctx.active_node_text, "Three");
        assert_eq!(ctx.text_before_active_node, "One\nTwo");
        assert_eq!(ctx.text_after_active_node, "");
    }

    #[test]
    fn test_fallbacks_without_active_node() {
        let tree = three();
        let ctx = extract_context(&tree, &ContextSource::default());
        assert_eq!(ctx.active_node_text, "One\n\nTwo\n\nThree");

        let ctx = extract_context(
            &tree,
            &ContextSource {
                custom_text: Some("custom"),
                editors_note: Some("keep it short"),
                ..Default::default()
            },
        );
        assert_eq!(ctx.active_node_text, "custom");
        assert_eq!(ctx.editors_note.as_deref(), Some("keep it short"));
    }

    #[test]
    fn test_reference_documents_filtered() {
        let me = StoryId::new();
        let other = StoryId::new();
        let docs = vec![
            ContextDocument { story_id: me, text: "self".into(), include_in_context: true },
            ContextDocument { story_id: other, text: "lore".into(), include_in_context: true },
            ContextDocument { story_id: StoryId::new(), text: "skip".into(), include_in_context: false },
        ];
        let ctx = extract_context(
            &three(),
            &ContextSource {
                story_id: Some(me),
                documents: &docs,
                ..Default::default()
            },
        );
        assert_eq!(ctx.context_documents, vec!["lore"]);
    }
}
