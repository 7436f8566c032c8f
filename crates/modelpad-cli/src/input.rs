//! Reading documents and node targets from the command line.
//!
//! Documents are either a serialized JSON body (`.json`) or plain text, where
//! blank lines separate paragraphs. Node keys are not stable across loads, so
//! targets are given as an index into the top-level blocks.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};

use modelpad_doc::{DocumentTree, NodeKey};
use modelpad_types::{InsertionStrategy, StrategyKind};

pub fn load_document(path: &Path) -> Result<DocumentTree> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        return DocumentTree::from_json(&body)
            .with_context(|| format!("{} is not a document body", path.display()));
    }
    Ok(tree_from_text(&body))
}

/// One paragraph per blank-line separated block.
pub fn tree_from_text(text: &str) -> DocumentTree {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.is_empty() {
        DocumentTree::from_paragraphs(&[""])
    } else {
        DocumentTree::from_paragraphs(&paragraphs)
    }
}

pub fn resolve_target(tree: &DocumentTree, index: Option<usize>) -> Result<Option<NodeKey>> {
    let Some(index) = index else {
        return Ok(None);
    };
    let blocks = tree.top_level();
    blocks
        .get(index)
        .copied()
        .map(Some)
        .ok_or_else(|| anyhow!("target {index} out of range, document has {} blocks", blocks.len()))
}

/// Parse a kebab-case strategy kind and bind it to `target`.
pub fn parse_strategy(
    kind: &str,
    target: Option<NodeKey>,
    new_paragraph: bool,
) -> Result<InsertionStrategy> {
    let Some(kind) = StrategyKind::from_str(kind) else {
        bail!("unknown insertion strategy: {kind}");
    };
    if kind.is_node_targeted() && target.is_none() {
        tracing::warn!(strategy = kind.as_str(), "no --target given, appending at document end");
    }
    Ok(kind.bind(target, new_paragraph))
}

/// Split `a/b/c` into trimmed, non-empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn text_splits_on_blank_lines() {
        let tree = tree_from_text("One\nstill one\n\n\n\nTwo\n");
        assert_eq!(tree.plain_text(), "One\nstill one\n\nTwo");
        assert_eq!(tree.top_level().len(), 2);
    }

    #[test]
    fn empty_text_gets_one_paragraph() {
        assert_eq!(tree_from_text("  \n\n ").top_level().len(), 1);
    }

    #[test]
    fn json_bodies_are_parsed_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let source = DocumentTree::from_paragraphs(&["Alpha", "Beta"]);
        let path = dir.path().join("story.json");
        fs::write(&path, source.to_json().unwrap()).unwrap();

        let tree = load_document(&path).unwrap();
        assert_eq!(tree.plain_text(), "Alpha\n\nBeta");

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(load_document(&broken).is_err());
    }

    #[test]
    fn target_index_is_bounds_checked() {
        let tree = tree_from_text("a\n\nb");
        assert_eq!(resolve_target(&tree, None).unwrap(), None);
        assert_eq!(resolve_target(&tree, Some(1)).unwrap(), Some(tree.top_level()[1]));
        assert!(resolve_target(&tree, Some(2)).is_err());
    }

    #[test]
    fn strategies_bind_the_target() {
        let tree = tree_from_text("a");
        let key = tree.top_level()[0];
        assert_eq!(
            parse_strategy("replace-node", Some(key), true).unwrap(),
            InsertionStrategy::ReplaceNode { target_node_key: key }
        );
        assert_eq!(
            parse_strategy("insert-after-node", None, true).unwrap(),
            InsertionStrategy::AppendToDocumentEnd
        );
        assert!(parse_strategy("sideways", None, false).is_err());
    }

    #[test]
    fn paths_drop_empty_segments() {
        assert_eq!(split_path(" world / places//city "), vec!["world", "places", "city"]);
    }
}
