//! Per-document generation status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// What the generation backend is doing for a document.
///
/// ```text
///  no-connection ──probe ok──▶ ready ──generate──▶ loading ──first token──▶ generating
///        ▲                      ▲  ▲                  │                          │
///        └──── probe failed ────┘  └──── cancel ──────┴──────── stream end ──────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum GenerationStatus {
    Ready,
    Loading,
    Generating,
    Error,
    /// The model-listing probe failed; nothing can be generated yet.
    #[default]
    #[strum(serialize = "no-connection", serialize = "noconnection")]
    NoConnection,
}

impl GenerationStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Ready => "ready",
            GenerationStatus::Loading => "loading",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Error => "error",
            GenerationStatus::NoConnection => "no-connection",
        }
    }

    /// A generation is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, GenerationStatus::Loading | GenerationStatus::Generating)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_connection() {
        assert_eq!(GenerationStatus::default(), GenerationStatus::NoConnection);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            GenerationStatus::from_str("no-connection"),
            Some(GenerationStatus::NoConnection)
        );
        assert_eq!(GenerationStatus::from_str("READY"), Some(GenerationStatus::Ready));
        let json = serde_json::to_string(&GenerationStatus::NoConnection).unwrap();
        assert_eq!(json, "\"no-connection\"");
    }

    #[test]
    fn test_busy() {
        assert!(GenerationStatus::Loading.is_busy());
        assert!(GenerationStatus::Generating.is_busy());
        assert!(!GenerationStatus::Error.is_busy());
    }
}
