use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application settings
///
/// The builder UI persists these from its settings page; the chat core only
/// reads them to decide whether a stream can be opened and how to reach the
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the streaming inference endpoint
    pub endpoint_url: Option<String>,

    /// Anon key sent as the bearer token when invoking the endpoint
    pub anon_key: Option<String>,

    /// OpenRouter API key, forwarded for the endpoint's own upstream calls
    pub openrouter_api_key: Option<String>,

    /// Model selected when the caller does not pick one
    pub default_model: String,

    /// Models offered by the UI dropdown; labels pass through unchanged
    pub models: Vec<ModelInfo>,
}

/// A selectable model: wire identifier plus display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub label: String,
}

impl ModelInfo {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            endpoint_url: None,
            anon_key: None,
            openrouter_api_key: None,
            default_model: "gpt-4o".to_string(),
            models: vec![
                ModelInfo::new("gpt-4o", "GPT-4o"),
                ModelInfo::new("claude-3-opus", "Claude 3 Opus"),
                ModelInfo::new("llama-3", "Llama 3"),
            ],
        }
    }
}

impl Settings {
    /// Load settings from the default config file, falling back to defaults
    /// when none exists yet
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Save settings to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Remove the config file, resetting the stored credentials
    pub fn clear() -> Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path).context("Failed to remove config file")?;
        }
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Whether the credentials required to open a stream are present.
    /// Checked by the pipeline before any request is issued.
    pub fn is_complete(&self) -> bool {
        self.has_value(&self.endpoint_url) && self.has_value(&self.anon_key)
    }

    /// Resolve a model id against the default
    pub fn resolve_model(&self, model_id: Option<&str>) -> String {
        model_id
            .map(str::to_string)
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn has_value(&self, field: &Option<String>) -> bool {
        field.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".tansan").join("config.toml"))
    }
}
