use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::{ModeArg, RunArgs};
use crate::commands::utils::{attach_printer, resolve_pending};
use crate::output::{OutputFormat, json::print_json};
use tierflow_core::{ExecutionMode, Project, WorkflowDefinition};

pub async fn run(project: Project, args: RunArgs, format: OutputFormat) -> Result<()> {
    let mut workflow = WorkflowDefinition::load(&args.workflow)
        .with_context(|| format!("Failed to load workflow {}", args.workflow.display()))?;
    if let Some(mode) = args.mode {
        workflow.execution.mode = match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Parallel => ExecutionMode::Parallel,
        };
    }

    if !format.is_json() {
        attach_printer(project.bus());
    }

    // Outputs of steps that finished before a failure still get resolved.
    let result = project.engine().run(&workflow).await;
    let open: Vec<_> = project
        .runner()
        .pending()
        .list()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    let resolved = resolve_pending(project.runner(), open, args.on_ask).await?;
    let report = result?;

    if format.is_json() {
        let decisions: Vec<_> = resolved
            .iter()
            .map(|(id, meta)| json!({ "id": id, "meta": meta }))
            .collect();
        return print_json(&json!({
            "report": report,
            "pending": decisions,
            "stats": project.bus().stats(),
        }));
    }

    let stats = project.bus().stats();
    println!(
        "Workflow '{}' finished: {} step(s), {} stored, {} asked, {} error(s)",
        report.name,
        report.steps.len(),
        stats.stored,
        stats.asked,
        stats.errors
    );
    if !report.ok() {
        anyhow::bail!("workflow '{}' had failing steps", report.name);
    }
    Ok(())
}
