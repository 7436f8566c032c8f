//! Editor configuration.
//!
//! Stored as TOML. A missing file means defaults; `MODELPAD_HOST` and
//! `MODELPAD_MODEL` override the selected server's host and the model.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::{ModelSettings, ServerConfig};
use crate::template::{PromptTemplate, TemplateRegistry};

pub const HOST_ENV: &str = "MODELPAD_HOST";
pub const MODEL_ENV: &str = "MODELPAD_MODEL";

/// Error type for config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown server: {0}")]
    UnknownServer(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Key into `servers`.
    #[serde(default = "default_server_key")]
    pub server_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Include opted-in reference documents in prompts.
    #[serde(default)]
    pub use_rag: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editors_note: Option<String>,

    /// Write output into `ai-generation` nodes.
    #[serde(default)]
    pub mark_output: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_template: Option<String>,

    #[serde(default = "ModelSettings::editor_defaults")]
    pub model_settings: ModelSettings,

    #[serde(default = "default_servers")]
    pub servers: IndexMap<String, ServerConfig>,

    #[serde(default = "PromptTemplate::defaults")]
    pub templates: Vec<PromptTemplate>,
}

fn default_server_key() -> String {
    "localOllama".to_string()
}

fn default_servers() -> IndexMap<String, ServerConfig> {
    let mut servers = IndexMap::new();
    servers.insert(
        "modelPadServer".to_string(),
        ServerConfig::new("Cloud", "https://modelpad.app", "claude"),
    );
    servers.insert(
        "localOllama".to_string(),
        ServerConfig::new("Local Ollama", "http://localhost:11434", "ollama"),
    );
    servers
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            server_key: default_server_key(),
            model: None,
            use_rag: false,
            editors_note: None,
            mark_output: false,
            active_template: None,
            last_used_template: None,
            model_settings: ModelSettings::editor_defaults(),
            servers: default_servers(),
            templates: PromptTemplate::defaults(),
        }
    }
}

impl EditorConfig {
    /// Load from `path`, or defaults when the file does not exist.
    /// Environment overrides are applied either way.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!(path = %path.display(), "config loaded");
            config
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MODELPAD_HOST` / `MODELPAD_MODEL` from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(HOST_ENV).filter(|h| !h.is_empty()) {
            let key = self.server_key.clone();
            match self.servers.get_mut(&key) {
                Some(server) => server.host = host,
                None => {
                    self.servers
                        .insert(key, ServerConfig::new("Custom", host, "ollama"));
                }
            }
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.is_empty()) {
            self.model = Some(model);
        }
    }

    /// The selected server.
    pub fn server(&self) -> ConfigResult<&ServerConfig> {
        self.servers
            .get(&self.server_key)
            .ok_or_else(|| ConfigError::UnknownServer(self.server_key.clone()))
    }

    /// Template registry seeded from this config.
    pub fn template_registry(&self) -> TemplateRegistry {
        let mut registry = TemplateRegistry::from_templates(self.templates.clone());
        if let Some(id) = &self.active_template {
            registry.set_active(id);
        }
        if let Some(id) = &self.last_used_template {
            registry.mark_used(id);
        }
        registry
    }

    /// Write a registry's state back into this config.
    pub fn store_templates(&mut self, registry: &TemplateRegistry) {
        self.templates = registry.iter().cloned().collect();
        self.active_template = registry.active().map(|t| t.id.clone());
        self.last_used_template = registry.last_used().map(|t| t.id.clone());
    }
}
