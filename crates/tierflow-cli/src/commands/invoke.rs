use anyhow::{Context, Result, anyhow};
use serde_json::json;

use crate::cli::InvokeArgs;
use crate::commands::utils::{attach_printer, resolve_pending};
use crate::output::{OutputFormat, json::print_json};
use tierflow_ai::{AgentOverride, StoragePolicy};
use tierflow_core::{Project, WorkflowDefinition};

pub async fn run(project: Project, args: InvokeArgs, format: OutputFormat) -> Result<()> {
    let workflow = WorkflowDefinition::load(&args.workflow)
        .with_context(|| format!("Failed to load workflow {}", args.workflow.display()))?;
    let base = workflow
        .agent(&args.agent)
        .ok_or_else(|| anyhow!("Unknown agent '{}' in workflow '{}'", args.agent, workflow.name))?;

    let patch = AgentOverride {
        model: args.model,
        storage: args.storage.map(StoragePolicy::from),
        prompt: args.prompt,
    };
    let agent = patch.apply(base);
    agent.model_ref()?;

    project.memory().ephemeral().extend(
        workflow
            .context
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    if !format.is_json() {
        attach_printer(project.bus());
    }

    let outcome = project.engine().invoke(&agent, &args.input).await?;
    let resolved = resolve_pending(project.runner(), outcome.pending, args.on_ask).await?;

    if format.is_json() {
        return print_json(&json!({
            "agent": agent.name,
            "model": agent.model,
            "overridden": !patch.is_empty(),
            "text": outcome.text,
            "meta": outcome.meta,
            "key": outcome.key,
            "resolved": resolved.first().map(|(_, meta)| meta),
        }));
    }
    Ok(())
}
