//! Application configuration
//!
//! Loaded from YAML. Every section is optional and defaulted; secrets are
//! normally supplied through `COACHDECK_*` environment variables instead of
//! the file.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "COACHDECK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub payments: PaymentsConfig,
    pub generation: GenerationConfig,
    pub documents: DocumentsConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. https://abc.supabase.co
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub api_url: String,
    pub secret_key: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Tier name to provider price id
    pub prices: HashMap<String, String>,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.stripe.com/v1".to_string(),
            secret_key: None,
            success_url: "https://app.coachdeck.io/billing/success".to_string(),
            cancel_url: "https://app.coachdeck.io/billing".to_string(),
            prices: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub render_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between change-feed polls
    pub poll_interval_ms: u64,
    /// Row cap for initial snapshots
    pub snapshot_limit: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            snapshot_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;

        let config: AppConfig = serde_yaml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config YAML {}: {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise, then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `COACHDECK_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("COACHDECK_BACKEND_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = get("COACHDECK_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Some(key) = get("COACHDECK_STRIPE_SECRET") {
            self.payments.secret_key = Some(key);
        }
        if let Some(key) = get("COACHDECK_OPENAI_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(filter) = get("COACHDECK_LOG") {
            self.logging.filter = filter;
        }
    }

    /// Config file location: explicit path, then `COACHDECK_CONFIG`, then
    /// `~/.config/coachdeck/config.yaml` if it exists.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(env_path));
        }
        let home = std::env::var_os("HOME")?;
        let mut default_path = PathBuf::from(home);
        default_path.push(".config");
        default_path.push("coachdeck");
        default_path.push("config.yaml");
        default_path.exists().then_some(default_path)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sync.poll_interval_ms.max(100))
    }
}
