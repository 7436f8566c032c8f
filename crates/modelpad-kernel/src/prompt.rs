//! Prompt assembly and strategy resolution for one generation call.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::trace;

use modelpad_doc::NodeKey;
use modelpad_types::InsertionStrategy;

use crate::context::PromptContext;
use crate::template::{PromptTemplate, RAG_PREAMBLE, render};

const REWRITE_DEFAULT_INSTRUCTIONS: &str =
    "Improve clarity, style, and flow while maintaining the same meaning and approximate length.";

/// What the user asked the model to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AiAction {
    /// Continue or expand from a template.
    #[default]
    Generate,
    /// Replace the active text one-to-one.
    Rewrite,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptOptions<'a> {
    pub action: AiAction,
    pub custom_prompt: Option<&'a str>,
    pub template: Option<&'a PromptTemplate>,
    /// Target length for rewrites. Counted from the active text when unset.
    pub word_count: Option<usize>,
}

/// Rendered strings ready for a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuiltPrompt {
    pub prompt: String,
    pub system: String,
}

pub fn build_prompt(ctx: &PromptContext, opts: &PromptOptions<'_>) -> BuiltPrompt {
    let custom = opts
        .custom_prompt
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let built = match opts.action {
        AiAction::Generate => {
            let main = opts.template.map(|t| t.main_prompt.as_str()).unwrap_or("<text>");
            let main = if ctx.context_documents.is_empty() {
                main.to_string()
            } else {
                format!("{RAG_PREAMBLE}{main}")
            };
            let mut prompt = render(&main, ctx);
            if let Some(custom) = custom {
                prompt.push_str("\n\n");
                prompt.push_str(custom);
            }
            let system = opts
                .template
                .map(|t| render(&t.system_prompt, ctx))
                .unwrap_or_default();
            BuiltPrompt { prompt, system }
        }
        AiAction::Rewrite => {
            let words = opts
                .word_count
                .unwrap_or_else(|| word_count(&ctx.active_node_text));
            let base = format!(
                "You are rewriting text as a direct, one-to-one replacement. Your output should match the approximate length of the input ({words} words). Write ONLY the rewritten text with no additional commentary or explanation."
            );
            let instructions = match custom {
                Some(c) => format!("\n\nRewrite instructions: {c}"),
                None => format!("\n\n{REWRITE_DEFAULT_INSTRUCTIONS}"),
            };
            let template =
                format!("{base}{instructions}\n\nOriginal text to rewrite:\n{{{{activeNodeText}}}}");
            BuiltPrompt {
                prompt: render(&template, ctx),
                system: render(&base, ctx),
            }
        }
    };
    trace!(action = %opts.action, prompt_len = built.prompt.len(), "prompt built");
    built
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Pick the strategy for one call: an explicit override, else the
/// template's preference bound to `target`, else the action's default.
pub fn resolve_strategy(
    action: AiAction,
    explicit: Option<InsertionStrategy>,
    template: Option<&PromptTemplate>,
    target: Option<NodeKey>,
) -> InsertionStrategy {
    if let Some(s) = explicit {
        return s;
    }
    if let Some(ts) = template.and_then(|t| t.insertion_strategy) {
        return ts.bind(target);
    }
    match (action, target) {
        (AiAction::Generate, Some(key)) => InsertionStrategy::InsertAfterNode {
            target_node_key: key,
            new_paragraph: true,
        },
        (AiAction::Generate, None) => InsertionStrategy::AppendToDocumentEnd,
        (AiAction::Rewrite, Some(key)) => InsertionStrategy::ReplaceNode {
            target_node_key: key,
        },
        (AiAction::Rewrite, None) => InsertionStrategy::InsertAtCursor,
    }
}
