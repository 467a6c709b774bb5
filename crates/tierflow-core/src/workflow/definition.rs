//! Workflow documents: parsing and validation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tierflow_ai::AgentConfig;

use crate::error::{Result, WorkflowError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub continue_on_error: bool,
}

/// One step, identified by its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Key looked up in the project store, then the ephemeral tier, then the mid tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
}

impl WorkflowStep {
    /// Key the step output is saved under.
    pub fn output_key(&self) -> String {
        self.save_as
            .clone()
            .unwrap_or_else(|| format!("{}.output", self.agent))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Agent name to configuration. The map key is the agent's name.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Seeded into the ephemeral tier before the first step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl WorkflowDefinition {
    /// Load YAML, or JSON when the file extension is `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let workflow = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };
        tracing::debug!(
            path = %path.display(),
            name = %workflow.name,
            steps = workflow.steps.len(),
            "Loaded workflow"
        );
        Ok(workflow)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let workflow: Self =
            serde_yaml::from_str(content).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        workflow.normalized()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let workflow: Self =
            serde_json::from_str(content).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        workflow.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        for (name, agent) in self.agents.iter_mut() {
            agent.name = name.clone();
        }
        self.validate()?;
        Ok(self)
    }

    /// Structural checks; nothing runs before these pass.
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(WorkflowError::MissingAgents);
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::MissingSteps);
        }

        for (name, agent) in &self.agents {
            if let Err(e) = agent.model_ref() {
                return Err(WorkflowError::InvalidModel {
                    agent: name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if !self.agents.contains_key(&step.agent) {
                return Err(WorkflowError::UnknownAgent {
                    step: index,
                    agent: step.agent.clone(),
                });
            }
            if step.input.is_some() && step.input_from.is_some() {
                return Err(WorkflowError::ConflictingInput { step: index });
            }
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }
}
