//! Workflow engine: resolves step inputs, assembles prompts, runs steps in
//! sequence or concurrently, and saves outputs for later steps.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tierflow_ai::{AgentConfig, FlowEvent, MemoryManager, RunOutcome, StoreMeta, StreamingRunner};
use tierflow_storage::ProjectValueStorage;
use tracing::{info, warn};
use uuid::Uuid;

use super::definition::{ExecutionMode, WorkflowDefinition, WorkflowStep};
use crate::error::{Result, WorkflowError};
use crate::template::{context_snippet, render_prompt};

/// Long-tier hits added to a context snippet.
const RELATED_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub agent: String,
    pub output_key: String,
    pub text: String,
    pub meta: Option<StoreMeta>,
    pub pending: Option<Uuid>,
    pub error: Option<String>,
}

impl StepReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub name: String,
    pub mode: ExecutionMode,
    pub steps: Vec<StepReport>,
}

impl WorkflowReport {
    pub fn ok(&self) -> bool {
        self.steps.iter().all(StepReport::is_ok)
    }

    pub fn step(&self, index: usize) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.index == index)
    }
}

pub struct WorkflowEngine {
    runner: Arc<StreamingRunner>,
    values: ProjectValueStorage,
}

impl WorkflowEngine {
    pub fn new(runner: Arc<StreamingRunner>, values: ProjectValueStorage) -> Self {
        Self { runner, values }
    }

    pub fn runner(&self) -> &Arc<StreamingRunner> {
        &self.runner
    }

    fn memory(&self) -> &Arc<MemoryManager> {
        self.runner.memory()
    }

    fn emit(&self, event: FlowEvent) {
        self.runner.bus().emit(event);
    }

    pub async fn run(&self, workflow: &WorkflowDefinition) -> Result<WorkflowReport> {
        workflow.validate()?;

        let mode = workflow.execution.mode;
        self.memory().ephemeral().extend(
            workflow
                .context
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        info!(workflow = %workflow.name, %mode, steps = workflow.steps.len(), "Workflow started");
        self.emit(FlowEvent::WorkflowStarted {
            name: workflow.name.clone(),
            steps: workflow.steps.len(),
            mode: mode.to_string(),
        });

        let result = match mode {
            ExecutionMode::Sequential => self.run_sequential(workflow).await,
            ExecutionMode::Parallel => self.run_parallel(workflow).await,
        };

        let ok = matches!(&result, Ok(report) if report.ok());
        let open = self.runner.pending().len();
        if open > 0 {
            warn!(workflow = %workflow.name, open, "Store decisions left open after run");
        }
        info!(workflow = %workflow.name, ok, "Workflow finished");
        self.emit(FlowEvent::WorkflowFinished {
            name: workflow.name.clone(),
            ok,
        });
        result
    }

    async fn run_sequential(&self, workflow: &WorkflowDefinition) -> Result<WorkflowReport> {
        let mut steps = Vec::with_capacity(workflow.steps.len());
        for (index, step) in workflow.steps.iter().enumerate() {
            match self.run_step(workflow, index, step).await {
                Ok(report) => steps.push(report),
                Err(e) if workflow.execution.continue_on_error => {
                    steps.push(failed_report(index, step, &e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(WorkflowReport {
            name: workflow.name.clone(),
            mode: ExecutionMode::Sequential,
            steps,
        })
    }

    /// All steps polled together on this task; later steps must not read
    /// earlier outputs.
    async fn run_parallel(&self, workflow: &WorkflowDefinition) -> Result<WorkflowReport> {
        let results = join_all(
            workflow
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| self.run_step(workflow, index, step)),
        )
        .await;

        let mut steps = Vec::with_capacity(results.len());
        let mut first_error = None;
        for ((index, step), result) in workflow.steps.iter().enumerate().zip(results) {
            match result {
                Ok(report) => steps.push(report),
                Err(e) => {
                    steps.push(failed_report(index, step, &e));
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error
            && !workflow.execution.continue_on_error
        {
            return Err(e);
        }
        Ok(WorkflowReport {
            name: workflow.name.clone(),
            mode: ExecutionMode::Parallel,
            steps,
        })
    }

    async fn run_step(
        &self,
        workflow: &WorkflowDefinition,
        index: usize,
        step: &WorkflowStep,
    ) -> Result<StepReport> {
        let agent = workflow
            .agent(&step.agent)
            .ok_or_else(|| WorkflowError::UnknownAgent {
                step: index,
                agent: step.agent.clone(),
            })?;

        self.emit(FlowEvent::StepStarted {
            step: index,
            agent: agent.name.clone(),
        });

        let input = match self.resolve_input(index, step) {
            Ok(input) => input,
            Err(e) => {
                self.emit_step_error(agent, index, &e);
                return Err(e);
            }
        };
        let prompt = self.build_prompt(agent, &input).await;

        let outcome = self
            .runner
            .run_agent(agent, Some(index), &prompt)
            .await
            .map_err(|source| WorkflowError::StepFailed {
                step: index,
                agent: agent.name.clone(),
                source,
            })?;

        let output_key = step.output_key();
        let saved = Value::String(outcome.text.clone());
        if let Err(e) = self.values.set(&output_key, &saved) {
            let e = WorkflowError::Storage(e.context(format!("failed to save output '{output_key}'")));
            self.emit_step_error(agent, index, &e);
            return Err(e);
        }
        self.memory().ephemeral().put(output_key.clone(), saved);

        self.emit(FlowEvent::StepCompleted {
            step: index,
            agent: agent.name.clone(),
            output_key: output_key.clone(),
        });

        Ok(StepReport {
            index,
            agent: agent.name.clone(),
            output_key,
            text: outcome.text,
            meta: Some(outcome.meta),
            pending: outcome.pending,
            error: None,
        })
    }

    /// One-shot invocation of `agent` outside any step. The prompt is built
    /// the same way as for a step with inline `input`.
    pub async fn invoke(&self, agent: &AgentConfig, input: &str) -> tierflow_ai::Result<RunOutcome> {
        let prompt = self.build_prompt(agent, input).await;
        self.runner.run_agent(agent, None, &prompt).await
    }

    fn emit_step_error(&self, agent: &AgentConfig, index: usize, error: &WorkflowError) {
        self.emit(FlowEvent::Error {
            agent: Some(agent.name.clone()),
            step: Some(index),
            message: error.to_string(),
        });
    }

    fn resolve_input(&self, index: usize, step: &WorkflowStep) -> Result<String> {
        if let Some(input) = &step.input {
            return Ok(input.clone());
        }
        let Some(key) = &step.input_from else {
            return Ok(String::new());
        };

        match self.lookup(key)? {
            Some(value) => Ok(value),
            None => {
                warn!(step = index, key = %key, "Input key not found, using empty input");
                Ok(String::new())
            }
        }
    }

    /// Project store, then ephemeral tier, then mid tier.
    fn lookup(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.values.get(key)? {
            return Ok(Some(value_text(&value)));
        }
        if let Some(value) = self.memory().ephemeral().get(key) {
            return Ok(Some(value_text(&value)));
        }
        let mid = self
            .memory()
            .lookup_mid(key)
            .map_err(|e| WorkflowError::Storage(anyhow::Error::from(e)))?;
        Ok(mid.as_ref().map(value_text))
    }

    async fn build_prompt(&self, agent: &AgentConfig, input: &str) -> String {
        let prompt = render_prompt(&agent.prompt, input);
        if agent.context.is_empty() {
            return prompt;
        }

        let mut entries = Vec::new();
        for key in &agent.context {
            match self.lookup(key) {
                Ok(Some(value)) => entries.push((key.clone(), value)),
                Ok(None) => {}
                Err(e) => warn!(agent = %agent.name, key = %key, error = %e, "Context lookup failed"),
            }
        }

        let related = if self.memory().has_long_tier() && !input.trim().is_empty() {
            self.memory()
                .query_long(input, RELATED_TOP_K)
                .await
                .unwrap_or_else(|e| {
                    warn!(agent = %agent.name, error = %e, "Long-tier query failed");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        match context_snippet(&entries, &related) {
            Some(snippet) => format!("{prompt}\n\n{snippet}"),
            None => prompt,
        }
    }
}

/// Text of a stored value. Memory records yield their `text` field.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) if map.contains_key("timestamp") => match map.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn failed_report(index: usize, step: &WorkflowStep, error: &WorkflowError) -> StepReport {
    StepReport {
        index,
        agent: step.agent.clone(),
        output_key: step.output_key(),
        text: String::new(),
        meta: None,
        pending: None,
        error: Some(error.to_string()),
    }
}
