use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::ModelRef;
use crate::memory::StoragePolicy;

/// Placeholder substituted with the step input.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";

/// A named prompt/model binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Filled from the workflow's agent map key when omitted.
    #[serde(default)]
    pub name: String,
    /// `"<backend>:<model-id>"`
    pub model: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Memory keys rendered into a `Context:` snippet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default)]
    pub storage: StoragePolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

fn default_prompt() -> String {
    INPUT_PLACEHOLDER.to_string()
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            prompt: default_prompt(),
            context: Vec::new(),
            storage: StoragePolicy::default(),
            tools: Vec::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_storage(mut self, storage: StoragePolicy) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_context(mut self, keys: Vec<String>) -> Self {
        self.context = keys;
        self
    }

    pub fn model_ref(&self) -> Result<ModelRef> {
        ModelRef::parse(&self.model)
    }
}

/// Per-invocation replacements for an agent's settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOverride {
    pub model: Option<String>,
    pub storage: Option<StoragePolicy>,
    pub prompt: Option<String>,
}

impl AgentOverride {
    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.storage.is_none() && self.prompt.is_none()
    }

    pub fn apply(&self, base: &AgentConfig) -> AgentConfig {
        let mut agent = base.clone();
        if let Some(model) = &self.model {
            agent.model = model.clone();
        }
        if let Some(storage) = self.storage {
            agent.storage = storage;
        }
        if let Some(prompt) = &self.prompt {
            agent.prompt = prompt.clone();
        }
        agent
    }
}
