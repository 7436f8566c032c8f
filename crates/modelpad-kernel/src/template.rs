//! Prompt templates.
//!
//! Placeholders come in two spellings, `<name>` and `{{name}}`, and several
//! names have a short alias:
//!
//! | Name | Alias | Value |
//! |---|---|---|
//! | `activeNodeText` | `text` | text of the active node |
//! | `selectionText` | `selection` | selected text |
//! | `contextDocuments` | | reference documents, newline-joined |
//! | `currentDocumentText` | `currentDocument` | whole document |
//! | `textBeforeActiveNode` | `textBefore` | top-level text before |
//! | `textAfterActiveNode` | `textAfter` | top-level text after |
//! | `documentContext` | | `[BEFORE]` / `[AFTER]` blocks |
//! | `editorsNote` | | the editor's note |
//!
//! Substitution is a single left-to-right pass, so substituted values are
//! never scanned again. Unknown placeholders stay as written.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use modelpad_types::{StrategyKind, TemplateStrategy};

use crate::context::PromptContext;

/// Prepended to the main template when reference documents are present.
pub const RAG_PREAMBLE: &str = "Below is a list of documents that you can use for context. You can use these documents to help you generate ideas.\n<docs>\n{{contextDocuments}}\nEND OF DOCS\n\n";

/// Render `template` against `ctx`.
pub fn render(template: &str, ctx: &PromptContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['<', '{']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let (open, close) = if tail.starts_with("{{") {
            ("{{", "}}")
        } else if tail.starts_with('<') {
            ("<", ">")
        } else {
            out.push('{');
            rest = &tail[1..];
            continue;
        };

        let inner = &tail[open.len()..];
        let value = inner
            .find(close)
            .and_then(|end| variable(&inner[..end], ctx).map(|v| (end, v)));
        match value {
            Some((end, v)) => {
                out.push_str(&v);
                rest = &inner[end + close.len()..];
            }
            None => {
                out.push_str(open);
                rest = inner;
            }
        }
    }
    out.push_str(rest);

    if out.matches("{{").count() != out.matches("}}").count() {
        warn!("template has unbalanced placeholder braces");
    }
    out
}

fn variable(name: &str, ctx: &PromptContext) -> Option<String> {
    let v = match name {
        "text" | "activeNodeText" => ctx.active_node_text.clone(),
        "selection" | "selectionText" => ctx.selection_text.clone(),
        "contextDocuments" => ctx.context_documents.join("\n"),
        "currentDocument" | "currentDocumentText" => ctx.current_document_text.clone(),
        "textBefore" | "textBeforeActiveNode" => ctx.text_before_active_node.clone(),
        "textAfter" | "textAfterActiveNode" => ctx.text_after_active_node.clone(),
        "documentContext" => document_context(ctx),
        "editorsNote" => ctx.editors_note.clone().unwrap_or_default(),
        _ => return None,
    };
    Some(v)
}

/// `[BEFORE]` and `[AFTER]` blocks separated by a blank line, omitting
/// empty sides.
pub fn document_context(ctx: &PromptContext) -> String {
    let mut parts = Vec::new();
    if !ctx.text_before_active_node.is_empty() {
        parts.push(format!("[BEFORE]\n{}", ctx.text_before_active_node));
    }
    if !ctx.text_after_active_node.is_empty() {
        parts.push(format!("[AFTER]\n{}", ctx.text_after_active_node));
    }
    parts.join("\n\n")
}

// ============================================================================
// Templates
// ============================================================================

/// A named prompt recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    pub main_prompt: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_strategy: Option<TemplateStrategy>,
}

impl PromptTemplate {
    fn builtin(
        id: &str,
        name: &str,
        emoji: &str,
        system: &str,
        strategy: TemplateStrategy,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            emoji: Some(emoji.to_string()),
            system_prompt: system.to_string(),
            main_prompt: "<text>".to_string(),
            created_at: Utc::now().to_rfc3339(),
            last_used_at: None,
            insertion_strategy: Some(strategy),
        }
    }

    /// The templates a fresh install starts with.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::builtin(
                "newScene",
                "New Scene",
                "⚡",
                "You are a researcher researching a topic and helping me collect information, and understand a topic.",
                TemplateStrategy::with_new_paragraph(StrategyKind::InsertAfterNode),
            ),
            Self::builtin(
                "rewrite",
                "Rewrite",
                "✏️",
                "You are a writer rewriting a scene. Rewrite the scene in a different style or from a different perspective.",
                TemplateStrategy::new(StrategyKind::ReplaceNode),
            ),
            Self::builtin(
                "summarize",
                "Summarize",
                "📝",
                "You are a writer summarizing a scene. Summarize the scene in a few sentences.",
                TemplateStrategy::with_new_paragraph(StrategyKind::InsertAfterNode),
            ),
        ]
    }
}

/// Fields for a new template. Missing pieces get defaults on
/// [`TemplateRegistry::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    pub main_prompt: String,
    #[serde(default)]
    pub insertion_strategy: Option<TemplateStrategy>,
}

/// Partial template edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub emoji: Option<Option<String>>,
    pub system_prompt: Option<String>,
    pub main_prompt: Option<String>,
    pub insertion_strategy: Option<Option<TemplateStrategy>>,
}

/// Templates by id, with the active and last-used selections.
///
/// Never empty: deleting the last template is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRegistry {
    templates: IndexMap<String, PromptTemplate>,
    active: String,
    #[serde(default)]
    last_used: Option<String>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::from_templates(PromptTemplate::defaults())
    }
}

impl TemplateRegistry {
    /// Build from a list. An empty list gets the defaults.
    pub fn from_templates(templates: Vec<PromptTemplate>) -> Self {
        let templates = if templates.is_empty() {
            PromptTemplate::defaults()
        } else {
            templates
        };
        let templates: IndexMap<String, PromptTemplate> =
            templates.into_iter().map(|t| (t.id.clone(), t)).collect();
        let active = templates.keys().next().cloned().unwrap_or_default();
        Self {
            templates,
            active,
            last_used: None,
        }
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn active(&self) -> Option<&PromptTemplate> {
        self.templates
            .get(&self.active)
            .or_else(|| self.templates.values().next())
    }

    pub fn last_used(&self) -> Option<&PromptTemplate> {
        self.last_used.as_ref().and_then(|id| self.templates.get(id))
    }

    /// Add a template and return its id.
    pub fn add(&mut self, new: NewTemplate) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let template = PromptTemplate {
            id: id.clone(),
            name: new.name,
            emoji: Some(new.emoji.unwrap_or_else(|| "✨".to_string())),
            system_prompt: new.system_prompt,
            main_prompt: new.main_prompt,
            created_at: now.clone(),
            last_used_at: Some(now),
            insertion_strategy: Some(new.insertion_strategy.unwrap_or_else(|| {
                TemplateStrategy::with_new_paragraph(StrategyKind::InsertAfterNode)
            })),
        };
        debug!(template_id = %id, name = %template.name, "template added");
        self.templates.insert(id.clone(), template);
        id
    }

    /// Apply a patch. Returns false for unknown ids.
    pub fn update(&mut self, id: &str, patch: TemplatePatch) -> bool {
        let Some(t) = self.templates.get_mut(id) else {
            return false;
        };
        if let Some(name) = patch.name {
            t.name = name;
        }
        if let Some(emoji) = patch.emoji {
            t.emoji = emoji;
        }
        if let Some(system) = patch.system_prompt {
            t.system_prompt = system;
        }
        if let Some(main) = patch.main_prompt {
            t.main_prompt = main;
        }
        if let Some(strategy) = patch.insertion_strategy {
            t.insertion_strategy = strategy;
        }
        true
    }

    /// Delete a template. The last one cannot be deleted. Selections that
    /// pointed at it move to the first remaining template.
    pub fn delete(&mut self, id: &str) -> bool {
        if self.templates.len() <= 1 || self.templates.shift_remove(id).is_none() {
            return false;
        }
        let first = self.templates.keys().next().cloned().unwrap_or_default();
        if self.active == id {
            self.active = first.clone();
        }
        if self.last_used.as_deref() == Some(id) {
            self.last_used = Some(first);
        }
        true
    }

    pub fn set_active(&mut self, id: &str) -> bool {
        if !self.templates.contains_key(id) {
            return false;
        }
        self.active = id.to_string();
        true
    }

    /// Remember `id` as last used and stamp it.
    pub fn mark_used(&mut self, id: &str) -> bool {
        let Some(t) = self.templates.get_mut(id) else {
            return false;
        };
        t.last_used_at = Some(Utc::now().to_rfc3339());
        self.last_used = Some(id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ctx() -> PromptContext {
        PromptContext {
            active_node_text: "X".into(),
            selection_text: "Y".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_both_placeholder_syntaxes() {
        assert_eq!(render("<activeNodeText> and {{selection}}", &ctx()), "X and Y");
        assert_eq!(render("{{text}}<selectionText>", &ctx()), "XY");
    }

    #[test]
    fn test_unknown_and_malformed_placeholders_stay() {
        assert_eq!(render("a <b> {c} {{nope}} <text", &ctx()), "a <b> {c} {{nope}} <text");
        assert_eq!(render("if 1 < 2 then <text>", &ctx()), "if 1 < 2 then X");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let c = PromptContext {
            active_node_text: "<selection>".into(),
            selection_text: "Y".into(),
            ..Default::default()
        };
        assert_eq!(render("<text>", &c), "<selection>");
    }

    #[test]
    fn test_document_context_and_lists() {
        let c = PromptContext {
            text_before_active_node: "B".into(),
            context_documents: vec!["d1".into(), "d2".into()],
            editors_note: Some("N".into()),
            ..Default::default()
        };
        assert_eq!(render("<documentContext>", &c), "[BEFORE]\nB");
        assert_eq!(render("{{contextDocuments}}|<editorsNote>", &c), "d1\nd2|N");

        let both = PromptContext {
            text_after_active_node: "A".into(),
            ..c
        };
        assert_eq!(document_context(&both), "[BEFORE]\nB\n\n[AFTER]\nA");
    }

    #[test]
    fn test_registry_defaults_and_add() {
        let mut reg = TemplateRegistry::default();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.active().unwrap().id, "newScene");
        assert_eq!(
            reg.get("rewrite").unwrap().insertion_strategy,
            Some(TemplateStrategy::new(StrategyKind::ReplaceNode))
        );

        let id = reg.add(NewTemplate {
            name: "Dialogue".into(),
            main_prompt: "<text>".into(),
            ..Default::default()
        });
        let t = reg.get(&id).unwrap();
        assert_eq!(t.emoji.as_deref(), Some("✨"));
        assert_eq!(
            t.insertion_strategy,
            Some(TemplateStrategy::with_new_paragraph(StrategyKind::InsertAfterNode))
        );
        assert!(t.last_used_at.is_some());
    }

    #[test]
    fn test_registry_delete_rules() {
        let mut reg = TemplateRegistry::default();
        reg.set_active("summarize");
        reg.mark_used("summarize");
        assert!(reg.delete("summarize"));
        assert_eq!(reg.active().unwrap().id, "newScene");
        assert_eq!(reg.last_used().unwrap().id, "newScene");

        assert!(reg.delete("rewrite"));
        assert!(!reg.delete("newScene"));
        assert_eq!(reg.len(), 1);
        assert!(!reg.delete("missing"));
    }

    #[test]
    fn test_registry_update() {
        let mut reg = TemplateRegistry::default();
        assert!(reg.update(
            "rewrite",
            TemplatePatch {
                main_prompt: Some("Rewrite: <text>".into()),
                emoji: Some(None),
                ..Default::default()
            }
        ));
        let t = reg.get("rewrite").unwrap();
        assert_eq!(t.main_prompt, "Rewrite: <text>");
        assert_eq!(t.emoji, None);
        assert!(!reg.update("missing", TemplatePatch::default()));
    }
}
