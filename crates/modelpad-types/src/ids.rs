//! Typed identifiers for nodes, prompts, tags, and stories.
//!
//! `NodeKey` is a generational arena key: a slot index plus the generation the
//! slot had when the node was allocated. Removing a node bumps the slot's
//! generation, so a key held across a structural edit resolves to nothing
//! instead of aliasing whatever node reuses the slot.
//!
//! The remaining IDs wrap UUIDs. Prompt and tag IDs are random (v4); story IDs
//! are time-ordered (v7). The `short()` form is for logs only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors from parsing identifier strings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid node key '{0}' (expected '<slot>v<generation>')")]
    InvalidNodeKey(String),
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
}

// ── NodeKey ─────────────────────────────────────────────────────────────────

/// Key of a node in a document tree.
///
/// Valid only while the node it was issued for is alive. Displays as
/// `"{slot}v{generation}"`, e.g. `"12v3"`.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeKey {
    slot: u32,
    generation: u32,
}

impl NodeKey {
    /// Build a key from its raw parts. Only the arena should need this.
    pub fn from_parts(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot index in the arena.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation of the slot when this key was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({}v{})", self.slot, self.generation)
    }
}

impl FromStr for NodeKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slot, generation) = s
            .split_once('v')
            .ok_or_else(|| IdError::InvalidNodeKey(s.to_string()))?;
        let slot = slot
            .parse()
            .map_err(|_| IdError::InvalidNodeKey(s.to_string()))?;
        let generation = generation
            .parse()
            .map_err(|_| IdError::InvalidNodeKey(s.to_string()))?;
        Ok(Self { slot, generation })
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── UUID-backed IDs ─────────────────────────────────────────────────────────

/// Identifier of one targeted generation request.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(uuid::Uuid);

/// Identifier of a tag registry entry.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(uuid::Uuid);

/// Identifier of a story (document).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(uuid::Uuid);

macro_rules! impl_typed_id {
    ($T:ident, $name:literal, $ctor:expr) => {
        impl $T {
            /// Create a fresh ID.
            pub fn new() -> Self {
                Self($ctor)
            }

            /// First 8 hex characters, for human display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Parse from hyphenated or simple UUID text.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                uuid::Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| IdError::InvalidUuid(e.to_string()))
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl FromStr for $T {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(PromptId, "PromptId", uuid::Uuid::new_v4());
impl_typed_id!(TagId, "TagId", uuid::Uuid::new_v4());
impl_typed_id!(StoryId, "StoryId", uuid::Uuid::now_v7());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_display_and_parse() {
        let key = NodeKey::from_parts(12, 3);
        assert_eq!(key.to_string(), "12v3");
        assert_eq!("12v3".parse::<NodeKey>().unwrap(), key);
    }

    #[test]
    fn test_node_key_rejects_garbage() {
        assert!("12".parse::<NodeKey>().is_err());
        assert!("av3".parse::<NodeKey>().is_err());
        assert!("12v".parse::<NodeKey>().is_err());
        assert!("root".parse::<NodeKey>().is_err());
    }

    #[test]
    fn test_node_key_serde_is_string() {
        let key = NodeKey::from_parts(4, 0);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"4v0\"");
        let back: NodeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_same_slot_different_generation_differs() {
        assert_ne!(NodeKey::from_parts(1, 0), NodeKey::from_parts(1, 1));
    }

    #[test]
    fn test_uuid_ids_are_unique_and_parse() {
        let a = TagId::new();
        let b = TagId::new();
        assert_ne!(a, b);
        assert_eq!(TagId::parse(&a.to_string()).unwrap(), a);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_prompt_id_parse_error() {
        assert!(matches!(PromptId::parse("nope"), Err(IdError::InvalidUuid(_))));
    }
}
