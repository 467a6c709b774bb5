//! Project configuration
//!
//! Loaded from `<project>/.tierflow/config.toml`; a missing file means
//! defaults. Environment variables override file values.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tierflow_ai::llm::{DEFAULT_TIMEOUT_SECS, HTTP_URL_ENV, OPENAI_API_KEY_ENV};
use tierflow_ai::memory::DEFAULT_PROMOTION_MIN_CHARS;
use tierflow_ai::{BackendRegistry, BackendSettings, HttpVectorIndex, InMemoryIndex, LongTermIndex};

use crate::paths;

pub const OLLAMA_URL_ENV: &str = "OLLAMA_URL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENWEBUI_URL_ENV: &str = "OPENWEBUI_URL";
pub const HTTP_API_KEY_ENV: &str = "TIERFLOW_HTTP_API_KEY";
pub const VECTOR_URL_ENV: &str = "TIERFLOW_VECTOR_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierflowConfig {
    /// Namespace for long-tier keys; defaults to the project directory name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Bound on every backend and long-tier call.
    pub timeout_secs: u64,
    pub backends: BackendSettings,
    pub memory: MemoryConfig,
}

impl Default for TierflowConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            backends: BackendSettings::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub promotion_min_chars: usize,
    pub long_tier: LongTierConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            promotion_min_chars: DEFAULT_PROMOTION_MIN_CHARS,
            long_tier: LongTierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongTierKind {
    #[default]
    None,
    Memory,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LongTierConfig {
    pub kind: LongTierKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TierflowConfig {
    /// File config for `project` plus environment overrides.
    pub fn load(project: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(&paths::config_path(project))?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse `path`, or defaults when it does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Apply overrides from `lookup` (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(OLLAMA_URL_ENV) {
            self.backends.ollama.url = url;
        }
        if let Some(key) = get(OPENAI_API_KEY_ENV) {
            self.backends.openai.api_key = Some(key);
        }
        if let Some(url) = get(OPENAI_BASE_URL_ENV) {
            self.backends.openai.base_url = url;
        }
        if let Some(url) = get(OPENWEBUI_URL_ENV) {
            self.backends.openwebui.url = url;
        }
        if let Some(url) = get(HTTP_URL_ENV) {
            self.backends.http.url = Some(url);
        }
        if let Some(key) = get(HTTP_API_KEY_ENV) {
            self.backends.http.api_key = Some(key);
        }
        if let Some(url) = get(VECTOR_URL_ENV) {
            self.memory.long_tier.url = Some(url);
            if self.memory.long_tier.kind == LongTierKind::None {
                self.memory.long_tier.kind = LongTierKind::Http;
            }
        }
    }

    pub fn resolve_project_id(&self, project: &Path) -> String {
        self.project_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| paths::default_project_id(project))
    }

    pub fn build_registry(&self) -> Result<BackendRegistry> {
        Ok(BackendRegistry::from_settings(
            &self.backends,
            self.timeout_secs,
        )?)
    }

    pub fn build_long_tier(&self, project_id: &str) -> Result<Option<Arc<dyn LongTermIndex>>> {
        let long_tier = &self.memory.long_tier;
        match long_tier.kind {
            LongTierKind::None => Ok(None),
            LongTierKind::Memory => Ok(Some(Arc::new(InMemoryIndex::new()))),
            LongTierKind::Http => {
                let Some(url) = long_tier.url.as_deref().filter(|u| !u.trim().is_empty()) else {
                    bail!("[memory.long_tier] kind = \"http\" requires a url (or {VECTOR_URL_ENV})");
                };
                let index = HttpVectorIndex::new(url, project_id, self.timeout_secs)?;
                Ok(Some(Arc::new(index)))
            }
        }
    }
}
