use anyhow::Result;
use serde_json::json;

use crate::cli::AskArgs;
use crate::commands::utils::{attach_printer, resolve_pending};
use crate::output::{OutputFormat, json::print_json};
use tierflow_ai::{InvocationScope, ModelRef, StoragePolicy};
use tierflow_core::Project;

pub async fn run(project: Project, args: AskArgs, format: OutputFormat) -> Result<()> {
    let model = ModelRef::parse(&args.model)?;
    let policy = StoragePolicy::from(args.storage);

    if !format.is_json() {
        attach_printer(project.bus());
    }

    let scope = InvocationScope::agent(args.agent);
    let outcome = project
        .runner()
        .run(&scope, &model, &args.prompt, policy)
        .await?;
    let resolved = resolve_pending(project.runner(), outcome.pending, args.on_ask).await?;

    if format.is_json() {
        return print_json(&json!({
            "model": model.to_string(),
            "text": outcome.text,
            "meta": outcome.meta,
            "key": outcome.key,
            "resolved": resolved.first().map(|(_, meta)| meta),
        }));
    }
    Ok(())
}
