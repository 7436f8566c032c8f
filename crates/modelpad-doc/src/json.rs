//! JSON body import and export.
//!
//! ```text
//! { "root": { "type": "root", "children": [
//!     { "type": "paragraph", "children": [
//!         { "type": "text", "text": "Hello ", "format": 0 },
//!         { "type": "tag", "text": "@ai", "tagId": "…", "tagName": "ai", "tagPath": ["ai"] }
//!     ] }
//! ] } }
//! ```
//!
//! Node keys are not part of the format; import allocates fresh ones.
//! Unknown attributes are ignored, unknown node types are skipped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use modelpad_types::{NodeKey, NodeKind, TagId};

use crate::tree::DocumentTree;
use crate::{DocError, Result};

const CHILDREN: &str = "children";

impl DocumentTree {
    /// Serialize the tree to a JSON value.
    pub fn to_json_value(&self) -> Result<Value> {
        let mut obj = Map::new();
        obj.insert("root".to_string(), self.node_value(self.root)?);
        Ok(Value::Object(obj))
    }

    /// Serialize the tree to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json_value()?)?)
    }

    fn node_value(&self, key: NodeKey) -> Result<Value> {
        let kind = self.kind(key).ok_or(DocError::NodeNotFound(key))?;
        let mut value = serde_json::to_value(kind)?;
        if kind.is_element()
            && let Value::Object(obj) = &mut value
        {
            let children = self
                .children(key)
                .iter()
                .map(|c| self.node_value(*c))
                .collect::<Result<Vec<_>>>()?;
            obj.insert(CHILDREN.to_string(), Value::Array(children));
        }
        Ok(value)
    }

    /// Parse a serialized body.
    ///
    /// Fails when the body is not JSON or has no `root` object. Individual
    /// nodes that do not parse are skipped with a warning.
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self> {
        let root = value
            .get("root")
            .and_then(Value::as_object)
            .ok_or_else(|| DocError::Serialization("missing root object".to_string()))?;
        let mut tree = Self::new();
        if let Some(children) = root.get(CHILDREN).and_then(Value::as_array) {
            let root_key = tree.root;
            for child in children {
                tree.import_node(root_key, child);
            }
        }
        Ok(tree)
    }

    /// Parse a body, recovering to one empty paragraph when it is unusable.
    pub fn import_or_default(body: &str) -> Self {
        match Self::from_json(body) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, "malformed document body, starting empty");
                Self::with_empty_paragraph()
            }
        }
    }

    fn import_node(&mut self, parent: NodeKey, value: &Value) {
        let Some(obj) = value.as_object() else {
            warn!("skipping non-object node");
            return;
        };
        let mut attrs = obj.clone();
        let children = attrs.remove(CHILDREN);
        let kind: NodeKind = match serde_json::from_value(Value::Object(attrs)) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, node_type = ?obj.get("type"), "skipping unreadable node");
                return;
            }
        };
        if matches!(kind, NodeKind::Root) {
            warn!("skipping nested root node");
            return;
        }
        let is_element = kind.is_element();
        let key = self.alloc(kind);
        self.link_child(parent, key, None);
        if is_element && let Some(Value::Array(children)) = children {
            for child in &children {
                self.import_node(key, child);
            }
        }
    }
}

/// A tag reference found in a serialized body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: TagId,
    pub path: Vec<String>,
}

/// Every tag node in a serialized body, in document order.
///
/// Malformed bodies and unreadable tag nodes yield nothing for that part.
pub fn extract_tag_refs(body: &str) -> Vec<TagRef> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect_tag_refs(&value, &mut out);
    out
}

fn collect_tag_refs(value: &Value, out: &mut Vec<TagRef>) {
    match value {
        Value::Object(obj) => {
            if obj.get("type").and_then(Value::as_str) == Some("tag") {
                let id = obj
                    .get("tagId")
                    .and_then(Value::as_str)
                    .and_then(|s| TagId::parse(s).ok());
                let path = obj
                    .get("tagPath")
                    .and_then(|p| serde_json::from_value::<Vec<String>>(p.clone()).ok());
                if let (Some(id), Some(path)) = (id, path) {
                    out.push(TagRef { id, path });
                }
            }
            for v in obj.values() {
                collect_tag_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_tag_refs(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use modelpad_types::{AiGenerationData, PromptId, PromptNodeData, SessionStatus, TagNodeData};

    use super::*;

    fn rich_tree() -> (DocumentTree, TagId) {
        let mut tree = DocumentTree::from_paragraphs(&["Hello "]);
        let p = tree.top_level()[0];
        let tag_id = TagId::new();
        let tag = tree.alloc(NodeKind::Tag(TagNodeData {
            text: "@people/ada".into(),
            tag_id,
            tag_name: "people/ada".into(),
            tag_path: vec!["people".into(), "ada".into()],
            tag_color: Some("#abcdef".into()),
        }));
        tree.link_child(p, tag, None);
        let prompt = tree.alloc(NodeKind::Prompt(PromptNodeData {
            text: "write more".into(),
            prompt_id: PromptId::new(),
            status: SessionStatus::Completed,
            original_text: "write".into(),
        }));
        tree.link_child(p, prompt, None);
        let q = tree.alloc(NodeKind::Quote);
        let ai = tree.alloc(NodeKind::AiGeneration(AiGenerationData {
            text: "generated".into(),
            completed: true,
        }));
        tree.link_child(q, ai, None);
        let root = tree.root();
        tree.link_child(root, q, None);
        let hr = tree.alloc(NodeKind::HorizontalRule);
        tree.link_child(root, hr, None);
        (tree, tag_id)
    }

    fn kinds(tree: &DocumentTree) -> Vec<NodeKind> {
        tree.descendants(tree.root())
            .into_iter()
            .filter_map(|k| tree.kind(k).cloned())
            .collect()
    }

    #[test]
    fn test_custom_nodes_survive_export_import() {
        let (tree, _) = rich_tree();
        let body = tree.to_json().unwrap();
        let back = DocumentTree::from_json(&body).unwrap();
        assert_eq!(kinds(&back), kinds(&tree));
        assert_eq!(back.plain_text(), tree.plain_text());
    }

    #[test]
    fn test_export_shape() {
        let (tree, tag_id) = rich_tree();
        let v = tree.to_json_value().unwrap();
        assert_eq!(v["root"]["type"], "root");
        let tag = &v["root"]["children"][0]["children"][1];
        assert_eq!(tag["type"], "tag");
        assert_eq!(tag["tagId"], tag_id.to_string());
        assert_eq!(tag["tagColor"], "#abcdef");
        assert!(tag.get("children").is_none());
        assert_eq!(v["root"]["children"][1]["children"][0]["completed"], true);
    }

    #[test]
    fn test_import_ignores_unknown_attrs_and_types() {
        let body = json!({
            "root": { "type": "root", "direction": "ltr", "children": [
                { "type": "paragraph", "indent": 0, "children": [
                    { "type": "text", "text": "ok", "format": 1, "style": "" },
                    { "type": "sparkle", "text": "??" }
                ]},
                { "type": "widget" }
            ]}
        });
        let tree = DocumentTree::from_json_value(&body).unwrap();
        assert_eq!(tree.top_level().len(), 1);
        assert_eq!(tree.plain_text(), "ok");
    }

    #[test]
    fn test_malformed_body_recovers() {
        let tree = DocumentTree::import_or_default("{not json");
        assert_eq!(tree.top_level().len(), 1);
        assert_eq!(tree.plain_text(), "");

        let tree = DocumentTree::import_or_default(r#"{"nothing": true}"#);
        assert_eq!(tree.top_level().len(), 1);
        assert!(DocumentTree::from_json(r#"{"nothing": true}"#).is_err());
    }

    #[test]
    fn test_extract_tag_refs() {
        let (tree, tag_id) = rich_tree();
        let refs = extract_tag_refs(&tree.to_json().unwrap());
        assert_eq!(
            refs,
            vec![TagRef {
                id: tag_id,
                path: vec!["people".into(), "ada".into()],
            }]
        );
        assert!(extract_tag_refs("garbage").is_empty());
    }
}
