//! ModelPad developer binary.
//!
//! Runs the editor core without an editor or a model server:
//!
//!   # Preview the prompt a generate call would send for the second block
//!   modelpad render story.txt --target 1 --template summarize
//!
//!   # Stream tokens into a document and print the result
//!   modelpad replay story.json --strategy replace-node --target 0 -- "New " "text"
//!
//!   # Tag registry
//!   modelpad tags add world/places/harbor
//!   modelpad tags search har

mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use modelpad_doc::Document;
use modelpad_kernel::{
    AiAction, ContextSource, EditorConfig, GenerateOptions, GenerationOutcome, Generator,
    PromptOptions, ProviderRegistry, ScriptedProvider, TagRegistry, build_prompt,
    extract_context, resolve_strategy, shared_document,
};
use modelpad_types::{StoryId, TagPatch};

/// Offline driver for the ModelPad editor core.
#[derive(Parser, Debug)]
#[command(name = "modelpad")]
#[command(about = "Prompt preview, token replay and tag registry tools for ModelPad")]
struct Args {
    /// Editor config (TOML). Defaults apply when the file is missing.
    #[arg(long, global = true, default_value = "modelpad.toml")]
    config: PathBuf,

    /// Tag registry (JSON)
    #[arg(long, global = true, default_value = "tags.json")]
    tags: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the prompt and strategy a generation would use
    Render {
        /// Document: `.json` body or plain text
        doc: PathBuf,

        #[arg(long, default_value = "generate")]
        action: AiAction,

        /// Template id; the active template when unset
        #[arg(long)]
        template: Option<String>,

        /// Extra instructions appended to the prompt
        #[arg(long)]
        prompt: Option<String>,

        /// Index of the top-level block to aim at
        #[arg(long)]
        target: Option<usize>,

        /// Target length for rewrites
        #[arg(long)]
        words: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Stream a fixed token list into a document
    Replay {
        doc: PathBuf,

        /// Tokens, in arrival order
        #[arg(required = true)]
        tokens: Vec<String>,

        #[arg(long, default_value = "generate")]
        action: AiAction,

        /// Strategy kind, e.g. `insert-after-node`; resolved from the
        /// template and action when unset
        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        target: Option<usize>,

        /// Insert inline instead of starting a new paragraph
        #[arg(long)]
        inline: bool,

        /// Wrap streamed text in ai-generation nodes
        #[arg(long)]
        mark: bool,

        /// Print the JSON body instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// List prompt templates
    Templates,

    /// Query and edit the tag registry
    Tags {
        #[command(subcommand)]
        command: TagCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    /// Create a tag and its parent categories
    Add { path: String },
    /// Search by path, best matches first
    Search { query: String },
    List,
    /// Direct children of a category
    Children { path: String },
    Rename { path: String, to: String },
    Delete { path: String },
    /// Restore tags referenced by a document body
    Sync { doc: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = EditorConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    match args.command {
        Command::Render {
            doc,
            action,
            template,
            prompt,
            target,
            words,
            json,
        } => render(&config, &doc, action, template, prompt, target, words, json),
        Command::Replay {
            doc,
            tokens,
            action,
            strategy,
            target,
            inline,
            mark,
            json,
        } => {
            let mut config = config;
            config.mark_output |= mark;
            let options = ReplayOptions {
                action,
                strategy,
                target,
                inline,
                json,
            };
            replay(&config, &doc, tokens, options).await
        }
        Command::Templates => {
            let registry = config.template_registry();
            let active = registry.active().map(|t| t.id.clone());
            for t in registry.iter() {
                let marker = if Some(&t.id) == active.as_ref() { "*" } else { " " };
                let strategy = t
                    .insertion_strategy
                    .map(|s| s.kind.as_str())
                    .unwrap_or("-");
                let emoji = t.emoji.as_deref().unwrap_or(" ");
                println!("{marker} {:<12} {emoji} {:<20} {strategy}", t.id, t.name);
            }
            Ok(())
        }
        Command::Tags { command } => tags(&args.tags, command),
    }
}

#[allow(clippy::too_many_arguments)]
fn render(
    config: &EditorConfig,
    path: &Path,
    action: AiAction,
    template_id: Option<String>,
    custom_prompt: Option<String>,
    target: Option<usize>,
    words: Option<usize>,
    json: bool,
) -> Result<()> {
    let tree = input::load_document(path)?;
    let target = input::resolve_target(&tree, target)?;
    let registry = config.template_registry();

    let template = match (action, template_id) {
        (AiAction::Rewrite, _) => None,
        (AiAction::Generate, Some(id)) => match registry.get(&id) {
            Some(t) => Some(t),
            None => bail!("unknown template: {id}"),
        },
        (AiAction::Generate, None) => registry.active(),
    };

    let ctx = extract_context(
        &tree,
        &ContextSource {
            target,
            editors_note: config.editors_note.as_deref(),
            ..Default::default()
        },
    );
    let built = build_prompt(
        &ctx,
        &PromptOptions {
            action,
            custom_prompt: custom_prompt.as_deref(),
            template,
            word_count: words,
        },
    );
    let strategy = resolve_strategy(action, None, template, target);

    if json {
        let out = json!({
            "template": template.map(|t| &t.id),
            "strategy": strategy,
            "system": built.system,
            "prompt": built.prompt,
            "context": ctx,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("# strategy: {strategy}");
        if !built.system.is_empty() {
            println!("# system\n{}\n", built.system);
        }
        println!("# prompt\n{}", built.prompt);
    }
    Ok(())
}

struct ReplayOptions {
    action: AiAction,
    strategy: Option<String>,
    target: Option<usize>,
    inline: bool,
    json: bool,
}

async fn replay(
    config: &EditorConfig,
    path: &Path,
    tokens: Vec<String>,
    opts: ReplayOptions,
) -> Result<()> {
    let tree = input::load_document(path)?;
    let target = input::resolve_target(&tree, opts.target)?;
    let strategy = opts
        .strategy
        .as_deref()
        .map(|kind| input::parse_strategy(kind, target, !opts.inline))
        .transpose()?;

    let mut providers = ProviderRegistry::new();
    providers.register_as(
        config.server()?.provider_key.clone(),
        Arc::new(ScriptedProvider::new(tokens).yielding()),
    );

    let doc = shared_document(Document::from_tree(tree));
    let mut generator = Generator::new(StoryId::new(), doc, providers, config);
    if generator.model().is_none() {
        generator.set_model("scripted");
    }

    let handle = generator.generate(GenerateOptions {
        action: opts.action,
        target,
        strategy,
        ..Default::default()
    })?;
    info!(strategy = %handle.strategy(), "replaying");
    let prompt_id = handle.prompt_id();

    match handle.finished().await {
        GenerationOutcome::Completed => {}
        GenerationOutcome::Cancelled => bail!("replay was cancelled"),
        GenerationOutcome::Failed(e) => return Err(e.into()),
    }

    if let Some(id) = prompt_id {
        let sessions = generator.sessions().lock();
        if let Some(session) = sessions.get(id) {
            info!(
                prompt_id = %id,
                status = ?session.status,
                nodes = session.generated_node_keys.len(),
                "session recorded"
            );
        }
    }

    let doc = generator.document().lock();
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&doc.tree().to_json_value()?)?);
    } else {
        println!("{}", doc.plain_text());
    }
    Ok(())
}

fn tags(path: &Path, command: TagCommand) -> Result<()> {
    let mut registry = TagRegistry::load(path)
        .with_context(|| format!("failed to load tags {}", path.display()))?;

    let changed = match command {
        TagCommand::Add { path } => {
            let tag = registry.add_hierarchical_tag(&path)?;
            println!("{} {}", tag.id, tag.name);
            true
        }
        TagCommand::Search { query } => {
            for tag in registry.search_tags_by_path(&query) {
                println!("{:<32} {}", tag.name, registry.total_usage(tag.id));
            }
            false
        }
        TagCommand::List => {
            for tag in registry.iter() {
                let indent = "  ".repeat(tag.path.len().saturating_sub(1));
                let leaf = tag.path.last().map(String::as_str).unwrap_or_default();
                let marker = if tag.is_category { "/" } else { "" };
                println!("{indent}{leaf}{marker} ({})", registry.total_usage(tag.id));
            }
            false
        }
        TagCommand::Children { path } => {
            for tag in registry.tags_by_parent_path(&input::split_path(&path)) {
                println!("{}", tag.name);
            }
            false
        }
        TagCommand::Rename { path, to } => {
            let Some(id) = registry.find_by_name(&path).map(|t| t.id) else {
                bail!("no tag named {path}");
            };
            let tag = registry.update_tag(id, TagPatch::rename(to))?;
            println!("{} {}", tag.id, tag.name);
            true
        }
        TagCommand::Delete { path } => {
            let Some(id) = registry.find_by_name(&path).map(|t| t.id) else {
                bail!("no tag named {path}");
            };
            registry.delete_tag(id);
            true
        }
        TagCommand::Sync { doc } => {
            let body = std::fs::read_to_string(&doc)
                .with_context(|| format!("failed to read {}", doc.display()))?;
            let restored = registry.sync_from_body(&body);
            info!(count = restored.len(), "tags restored");
            !restored.is_empty()
        }
    };

    if changed {
        registry.save(path)?;
    }
    Ok(())
}
