//! Insertion strategies: where streamed text lands in the document.
//!
//! A strategy is resolved once per generation call, before the first token,
//! and never changes while the stream is running.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::ids::NodeKey;

/// Placement policy for one generation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum InsertionStrategy {
    ReplaceNode {
        target_node_key: NodeKey,
    },
    InsertAfterNode {
        target_node_key: NodeKey,
        #[serde(default)]
        new_paragraph: bool,
    },
    InsertBeforeNode {
        target_node_key: NodeKey,
        #[serde(default)]
        new_paragraph: bool,
    },
    AppendInsideNode {
        target_node_key: NodeKey,
    },
    InsertAtCursor,
    ReplaceSelection,
    InsertAfterSelection {
        #[serde(default)]
        new_paragraph: bool,
    },
    InsertBeforeSelection {
        #[serde(default)]
        new_paragraph: bool,
    },
    AppendToDocumentEnd,
}

impl InsertionStrategy {
    /// Kind of this strategy, without its parameters.
    pub fn kind(&self) -> StrategyKind {
        match self {
            InsertionStrategy::ReplaceNode { .. } => StrategyKind::ReplaceNode,
            InsertionStrategy::InsertAfterNode { .. } => StrategyKind::InsertAfterNode,
            InsertionStrategy::InsertBeforeNode { .. } => StrategyKind::InsertBeforeNode,
            InsertionStrategy::AppendInsideNode { .. } => StrategyKind::AppendInsideNode,
            InsertionStrategy::InsertAtCursor => StrategyKind::InsertAtCursor,
            InsertionStrategy::ReplaceSelection => StrategyKind::ReplaceSelection,
            InsertionStrategy::InsertAfterSelection { .. } => StrategyKind::InsertAfterSelection,
            InsertionStrategy::InsertBeforeSelection { .. } => StrategyKind::InsertBeforeSelection,
            InsertionStrategy::AppendToDocumentEnd => StrategyKind::AppendToDocumentEnd,
        }
    }

    /// Node the strategy is anchored to, if it is node-targeted.
    pub fn target(&self) -> Option<NodeKey> {
        match self {
            InsertionStrategy::ReplaceNode { target_node_key }
            | InsertionStrategy::InsertAfterNode { target_node_key, .. }
            | InsertionStrategy::InsertBeforeNode { target_node_key, .. }
            | InsertionStrategy::AppendInsideNode { target_node_key } => Some(*target_node_key),
            _ => None,
        }
    }
}

impl std::fmt::Display for InsertionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target() {
            Some(key) => write!(f, "{}({})", self.kind().as_str(), key),
            None => write!(f, "{}", self.kind().as_str()),
        }
    }
}

/// Strategy kind without parameters.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    ReplaceNode,
    InsertAfterNode,
    InsertBeforeNode,
    AppendInsideNode,
    InsertAtCursor,
    ReplaceSelection,
    InsertAfterSelection,
    InsertBeforeSelection,
    AppendToDocumentEnd,
}

impl StrategyKind {
    /// Parse from the kebab-case name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Kebab-case name.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Kinds that need a target node key.
    pub fn is_node_targeted(&self) -> bool {
        matches!(
            self,
            StrategyKind::ReplaceNode
                | StrategyKind::InsertAfterNode
                | StrategyKind::InsertBeforeNode
                | StrategyKind::AppendInsideNode
        )
    }

    /// Bind this kind to a concrete strategy.
    ///
    /// Node-targeted kinds need `target`; without one they fall back to
    /// appending at the document end.
    pub fn bind(&self, target: Option<NodeKey>, new_paragraph: bool) -> InsertionStrategy {
        match (self, target) {
            (StrategyKind::ReplaceNode, Some(key)) => InsertionStrategy::ReplaceNode {
                target_node_key: key,
            },
            (StrategyKind::InsertAfterNode, Some(key)) => InsertionStrategy::InsertAfterNode {
                target_node_key: key,
                new_paragraph,
            },
            (StrategyKind::InsertBeforeNode, Some(key)) => InsertionStrategy::InsertBeforeNode {
                target_node_key: key,
                new_paragraph,
            },
            (StrategyKind::AppendInsideNode, Some(key)) => InsertionStrategy::AppendInsideNode {
                target_node_key: key,
            },
            (StrategyKind::InsertAtCursor, _) => InsertionStrategy::InsertAtCursor,
            (StrategyKind::ReplaceSelection, _) => InsertionStrategy::ReplaceSelection,
            (StrategyKind::InsertAfterSelection, _) => {
                InsertionStrategy::InsertAfterSelection { new_paragraph }
            }
            (StrategyKind::InsertBeforeSelection, _) => {
                InsertionStrategy::InsertBeforeSelection { new_paragraph }
            }
            _ => InsertionStrategy::AppendToDocumentEnd,
        }
    }
}

/// A prompt template's preferred strategy: a kind plus the paragraph flag.
/// The target node is bound at call time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStrategy {
    pub kind: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_paragraph: Option<bool>,
}

impl TemplateStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            new_paragraph: None,
        }
    }

    pub fn with_new_paragraph(kind: StrategyKind) -> Self {
        Self {
            kind,
            new_paragraph: Some(true),
        }
    }

    /// Bind to a concrete strategy for one call.
    pub fn bind(&self, target: Option<NodeKey>) -> InsertionStrategy {
        self.kind.bind(target, self.new_paragraph.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_shape_matches_editor_format() {
        let key = NodeKey::from_parts(3, 0);
        let s = InsertionStrategy::InsertAfterNode {
            target_node_key: key,
            new_paragraph: true,
        };
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["kind"], "insert-after-node");
        assert_eq!(json["targetNodeKey"], "3v0");
        assert_eq!(json["newParagraph"], true);

        let back: InsertionStrategy =
            serde_json::from_str(r#"{"kind":"append-to-document-end"}"#).unwrap();
        assert_eq!(back, InsertionStrategy::AppendToDocumentEnd);
    }

    #[test]
    fn test_bind_without_target_degrades() {
        assert_eq!(
            StrategyKind::ReplaceNode.bind(None, false),
            InsertionStrategy::AppendToDocumentEnd
        );
        assert_eq!(
            StrategyKind::InsertAfterSelection.bind(None, true),
            InsertionStrategy::InsertAfterSelection { new_paragraph: true }
        );
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(StrategyKind::AppendInsideNode.as_str(), "append-inside-node");
        assert_eq!(
            StrategyKind::from_str("insert-at-cursor"),
            Some(StrategyKind::InsertAtCursor)
        );
        assert!(StrategyKind::ReplaceNode.is_node_targeted());
        assert!(!StrategyKind::ReplaceSelection.is_node_targeted());
    }

    #[test]
    fn test_display() {
        let key = NodeKey::from_parts(9, 1);
        let s = InsertionStrategy::ReplaceNode { target_node_key: key };
        assert_eq!(s.to_string(), "replace-node(9v1)");
        assert_eq!(InsertionStrategy::InsertAtCursor.to_string(), "insert-at-cursor");
    }
}
