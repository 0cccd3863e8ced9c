use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::LexError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/responses";
pub const DEFAULT_MODEL: &str = "o3";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 5000;
pub const CONFIG_FILE_NAME: &str = "lexchat.toml";

/// Optional settings file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub models: Option<Vec<String>>,
    pub max_output_tokens: Option<u64>,
    pub web_search: Option<bool>,
    pub reasoning_summary: Option<String>,
    pub show_reasoning: Option<bool>,
    pub turn_timeout_secs: Option<u64>,
    pub stall_timeout_secs: Option<u64>,
}

pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Models selectable from the chat surface.
    pub models: Vec<String>,
    pub max_output_tokens: u64,
    pub web_search: bool,
    pub reasoning_summary: Option<String>,
    pub show_reasoning: bool,
    pub turn_timeout: Duration,
    pub stall_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("models", &self.models)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("web_search", &self.web_search)
            .field("reasoning_summary", &self.reasoning_summary)
            .field("show_reasoning", &self.show_reasoning)
            .field("turn_timeout", &self.turn_timeout)
            .field("stall_timeout", &self.stall_timeout)
            .finish()
    }
}

impl Config {
    /// Load from `LEXCHAT_CONFIG` (or `./lexchat.toml` if present), then
    /// apply environment overrides. A missing API key is fatal.
    pub fn load() -> Result<Self, LexError> {
        let file = match config_path() {
            Some(path) => read_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::from_parts(file, |key| env::var(key).ok())
    }

    /// Merge file settings with variables looked up through `var`.
    /// Environment wins over the file.
    pub fn from_parts(
        file: FileConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LexError> {
        let api_key = var("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LexError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let max_output_tokens = match var("LEXCHAT_MAX_OUTPUT_TOKENS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                LexError::Config(format!("LEXCHAT_MAX_OUTPUT_TOKENS={raw:?}: {e}"))
            })?,
            None => file.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        };

        let model = var("LEXCHAT_MODEL")
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut models = file
            .models
            .unwrap_or_else(|| vec!["o3".to_string(), "o4-mini-2025-04-16".to_string()]);
        if !models.contains(&model) {
            models.insert(0, model.clone());
        }

        let config = Config {
            api_key,
            base_url: var("LEXCHAT_BASE_URL")
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            models,
            max_output_tokens,
            web_search: file.web_search.unwrap_or(true),
            reasoning_summary: match file.reasoning_summary.as_deref() {
                None => Some("auto".to_string()),
                Some("" | "none") => None,
                Some(mode) => Some(mode.to_string()),
            },
            show_reasoning: file.show_reasoning.unwrap_or(true),
            turn_timeout: Duration::from_secs(file.turn_timeout_secs.unwrap_or(600)),
            stall_timeout: Duration::from_secs(file.stall_timeout_secs.unwrap_or(300)),
        };

        if config.max_output_tokens == 0 {
            return Err(LexError::Config(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(config)
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("LEXCHAT_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    local.exists().then_some(local)
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, LexError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| LexError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|e| LexError::Config(format!("invalid {}: {e}", path.display())))
}
