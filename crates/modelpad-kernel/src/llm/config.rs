//! Backend server entries and sampling settings.

use serde::{Deserialize, Serialize};

/// A generation backend the editor can talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Display name.
    pub name: String,
    /// Base URL, e.g. `http://localhost:11434`.
    pub host: String,
    /// Key of the provider that speaks this server's protocol.
    pub provider_key: String,
}

impl ServerConfig {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        provider_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            provider_key: provider_key.into(),
        }
    }
}

/// Sampling options, named as the Ollama API names them. Unset fields are
/// left to the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirostat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirostat_eta: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirostat_tau: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_gqa: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_gpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_thread: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfs_z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl ModelSettings {
    /// The editor's defaults for a fresh install.
    pub fn editor_defaults() -> Self {
        Self {
            mirostat: Some(2),
            mirostat_eta: Some(0.1),
            mirostat_tau: Some(5.0),
            temperature: Some(1.0),
            top_p: Some(0.9),
            top_k: Some(40),
            repeat_penalty: Some(1.0),
            num_predict: Some(4096),
            stop: vec!["user:".to_string()],
            ..Default::default()
        }
    }

    /// Parse a Modelfile-style parameter block, one `name value` per line.
    ///
    /// Repeated `stop` lines accumulate. Unknown names and unparsable values
    /// are ignored.
    pub fn from_parameters(block: &str) -> Self {
        let mut s = Self::default();
        for line in block.lines() {
            let Some((name, value)) = line.trim().split_once(char::is_whitespace) else {
                continue;
            };
            let value = value.trim();
            match name {
                "mirostat" => s.mirostat = value.parse().ok(),
                "mirostat_eta" => s.mirostat_eta = value.parse().ok(),
                "mirostat_tau" => s.mirostat_tau = value.parse().ok(),
                "num_ctx" => s.num_ctx = value.parse().ok(),
                "num_gqa" => s.num_gqa = value.parse().ok(),
                "num_gpu" => s.num_gpu = value.parse().ok(),
                "num_thread" => s.num_thread = value.parse().ok(),
                "repeat_last_n" => s.repeat_last_n = value.parse().ok(),
                "repeat_penalty" => s.repeat_penalty = value.parse().ok(),
                "temperature" => s.temperature = value.parse().ok(),
                "seed" => s.seed = value.parse().ok(),
                "stop" => s.stop.push(value.trim_matches('"').to_string()),
                "tfs_z" => s.tfs_z = value.parse().ok(),
                "num_predict" => s.num_predict = value.parse().ok(),
                "top_k" => s.top_k = value.parse().ok(),
                "top_p" => s.top_p = value.parse().ok(),
                _ => {}
            }
        }
        s
    }
}
