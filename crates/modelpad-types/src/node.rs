//! Node kinds of the document tree.
//!
//! One sum type covers every node the editor knows about. Marker nodes (tag,
//! prompt, AI generation) are text-bearing leaves like plain text, but carry
//! their own payload; code that renders or serializes nodes dispatches on the
//! variant instead of on a class hierarchy.
//!
//! The serde shape follows the editor's JSON body format: an object with a
//! `type` discriminant and camelCase attributes, e.g.
//! `{"type": "tag", "text": "@ai", "tagId": "…", "tagName": "ai", "tagPath": ["ai"]}`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ids::{PromptId, TagId};
use crate::session::SessionStatus;

/// Heading level (`h1`..`h6`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HeadingTag {
    #[default]
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

/// Payload of a tag node: a frozen snapshot of the registry entry at the time
/// the tag was placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagNodeData {
    /// Displayed text, normally `@` + the tag name.
    pub text: String,
    pub tag_id: TagId,
    pub tag_name: String,
    pub tag_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_color: Option<String>,
}

impl TagNodeData {
    /// First path segment, used for category styling.
    pub fn category(&self) -> Option<&str> {
        self.tag_path.first().map(String::as_str)
    }
}

/// Payload of a prompt marker node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptNodeData {
    pub text: String,
    pub prompt_id: PromptId,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub original_text: String,
}

/// Payload of an AI generation marker node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiGenerationData {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// A node in the document tree, minus its structural links.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum NodeKind {
    #[serde(rename = "root")]
    Root,
    #[serde(rename = "text")]
    Text {
        text: String,
        /// Bitmask of inline formats (bold, italic, ...), carried opaquely.
        #[serde(default)]
        format: u32,
    },
    #[serde(rename = "paragraph")]
    Paragraph,
    #[serde(rename = "heading")]
    Heading {
        #[serde(default)]
        tag: HeadingTag,
    },
    #[serde(rename = "list")]
    List {
        #[serde(default)]
        ordered: bool,
    },
    #[serde(rename = "listitem")]
    ListItem,
    #[serde(rename = "quote")]
    Quote,
    #[serde(rename = "code")]
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    #[serde(rename = "link")]
    Link { url: String },
    #[serde(rename = "horizontalrule")]
    HorizontalRule,
    #[serde(rename = "tag")]
    Tag(TagNodeData),
    #[serde(rename = "prompt")]
    Prompt(PromptNodeData),
    #[serde(rename = "ai-generation")]
    AiGeneration(AiGenerationData),
}

/// Discriminant of [`NodeKind`], for matching on kind alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum NodeType {
    #[strum(serialize = "root")]
    Root,
    #[strum(serialize = "text")]
    Text,
    #[strum(serialize = "paragraph")]
    Paragraph,
    #[strum(serialize = "heading")]
    Heading,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "listitem")]
    ListItem,
    #[strum(serialize = "quote")]
    Quote,
    #[strum(serialize = "code")]
    Code,
    #[strum(serialize = "link")]
    Link,
    #[strum(serialize = "horizontalrule")]
    HorizontalRule,
    #[strum(serialize = "tag")]
    Tag,
    #[strum(serialize = "prompt")]
    Prompt,
    #[strum(serialize = "ai-generation")]
    AiGeneration,
}

impl NodeType {
    /// Parse from the JSON `type` string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// The JSON `type` string.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl NodeKind {
    /// A plain text leaf.
    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text {
            text: text.into(),
            format: 0,
        }
    }

    /// An AI generation marker leaf.
    pub fn ai_generation(text: impl Into<String>) -> Self {
        NodeKind::AiGeneration(AiGenerationData {
            text: text.into(),
            completed: false,
        })
    }

    /// Discriminant of this node.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Root => NodeType::Root,
            NodeKind::Text { .. } => NodeType::Text,
            NodeKind::Paragraph => NodeType::Paragraph,
            NodeKind::Heading { .. } => NodeType::Heading,
            NodeKind::List { .. } => NodeType::List,
            NodeKind::ListItem => NodeType::ListItem,
            NodeKind::Quote => NodeType::Quote,
            NodeKind::Code { .. } => NodeType::Code,
            NodeKind::Link { .. } => NodeType::Link,
            NodeKind::HorizontalRule => NodeType::HorizontalRule,
            NodeKind::Tag(_) => NodeType::Tag,
            NodeKind::Prompt(_) => NodeType::Prompt,
            NodeKind::AiGeneration(_) => NodeType::AiGeneration,
        }
    }

    /// Element nodes own children.
    pub fn is_element(&self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Paragraph
                | NodeKind::Heading { .. }
                | NodeKind::List { .. }
                | NodeKind::ListItem
                | NodeKind::Quote
                | NodeKind::Code { .. }
                | NodeKind::Link { .. }
        )
    }

    /// Leaves that carry text content.
    pub fn is_text_bearing(&self) -> bool {
        self.text_content().is_some()
    }

    /// Elements that accept text leaves as direct children.
    pub fn accepts_text(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::Quote | NodeKind::Code { .. }
        )
    }

    /// Inline nodes flow inside a block; everything else is a block.
    pub fn is_inline(&self) -> bool {
        self.is_text_bearing() || matches!(self, NodeKind::Link { .. })
    }

    /// Text of a text-bearing leaf.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            NodeKind::Text { text, .. } => Some(text),
            NodeKind::Tag(data) => Some(&data.text),
            NodeKind::Prompt(data) => Some(&data.text),
            NodeKind::AiGeneration(data) => Some(&data.text),
            _ => None,
        }
    }

    /// Mutable text of a text-bearing leaf.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            NodeKind::Text { text, .. } => Some(text),
            NodeKind::Tag(data) => Some(&mut data.text),
            NodeKind::Prompt(data) => Some(&mut data.text),
            NodeKind::AiGeneration(data) => Some(&mut data.text),
            _ => None,
        }
    }
}
