//! Tag registry entries.
//!
//! A tag is addressed by its path (`["project", "ai"]`); its name is always
//! the path joined with `/`. Placed tag nodes in a document carry a frozen
//! copy of these fields, not a reference.

use serde::{Deserialize, Serialize};

use crate::ids::TagId;
use crate::node::TagNodeData;

/// Split a `/`-separated path string into trimmed, non-empty segments.
///
/// `" a / /b/ "` becomes `["a", "b"]`.
pub fn normalize_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One registry entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    /// Always `path.join("/")`.
    pub name: String,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub usage_count: u64,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    /// Auto-created for a path prefix.
    #[serde(default)]
    pub is_category: bool,
}

impl Tag {
    /// A fresh leaf tag with zero usage.
    pub fn new(path: Vec<String>) -> Self {
        Self {
            id: TagId::new(),
            name: path.join("/"),
            path,
            color: None,
            usage_count: 0,
            created_at: crate::now_rfc3339(),
            last_used_at: None,
            is_category: false,
        }
    }

    /// A fresh category tag for a path prefix.
    pub fn category(path: Vec<String>) -> Self {
        Self {
            is_category: true,
            ..Self::new(path)
        }
    }

    /// Last path segment.
    pub fn leaf_name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or(&self.name)
    }

    /// Path of the parent, or `None` for a top-level tag.
    pub fn parent_path(&self) -> Option<&[String]> {
        match self.path.len() {
            0 | 1 => None,
            n => Some(&self.path[..n - 1]),
        }
    }

    /// `other` is exactly one segment below this tag.
    pub fn is_parent_of(&self, other: &Tag) -> bool {
        other.path.len() == self.path.len() + 1 && other.path.starts_with(&self.path)
    }

    /// `other` is somewhere below this tag.
    pub fn is_ancestor_of(&self, other: &Tag) -> bool {
        other.path.len() > self.path.len() && other.path.starts_with(&self.path)
    }

    /// Frozen snapshot for a tag node in a document.
    pub fn to_node_data(&self) -> TagNodeData {
        TagNodeData {
            text: format!("@{}", self.name),
            tag_id: self.id,
            tag_name: self.name.clone(),
            tag_path: self.path.clone(),
            tag_color: self.color.clone(),
        }
    }
}

/// Partial update for a [`Tag`]. `name` and `path` are two spellings of the
/// same field; when both are set, `path` wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    /// `Some(None)` clears the color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
}

impl TagPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn color(color: Option<String>) -> Self {
        Self {
            color: Some(color),
            ..Default::default()
        }
    }

    /// The new path this patch asks for, if any.
    pub fn target_path(&self) -> Option<Vec<String>> {
        match (&self.path, &self.name) {
            (Some(path), _) => Some(path.iter().flat_map(|s| normalize_path(s)).collect()),
            (None, Some(name)) => Some(normalize_path(name)),
            (None, None) => None,
        }
    }
}
