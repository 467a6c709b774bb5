use anyhow::Result;
use serde_json::json;

use crate::cli::MemoryCommands;
use crate::commands::utils::format_timestamp;
use crate::output::{OutputFormat, json::print_json, preview_text, table::print_rows};
use tierflow_core::Project;
use tierflow_storage::now_ms;

pub async fn run(project: Project, command: MemoryCommands, format: OutputFormat) -> Result<()> {
    match command {
        MemoryCommands::List { prefix } => list_keys(&project, prefix.as_deref(), format),
        MemoryCommands::Get { key } => get_value(&project, &key, format),
        MemoryCommands::Put { key, value, ttl } => put_value(&project, &key, &value, ttl, format),
        MemoryCommands::History { agent, limit } => history(&project, &agent, limit, format),
        MemoryCommands::Sweep => sweep(&project, format),
    }
}

fn list_keys(project: &Project, prefix: Option<&str>, format: OutputFormat) -> Result<()> {
    let storage = project.memory().storage();
    let mut entries = Vec::new();
    for key in storage.list_keys(prefix)? {
        let expires_at = storage.expiry(&key)?.map(|meta| meta.expires_at_ms);
        entries.push((key, expires_at));
    }

    if format.is_json() {
        let payload: Vec<_> = entries
            .iter()
            .map(|(key, expires_at)| json!({ "key": key, "expires_at_ms": expires_at }))
            .collect();
        return print_json(&payload);
    }

    let rows = entries
        .into_iter()
        .map(|(key, expires_at)| vec![key, format_timestamp(expires_at)])
        .collect();
    print_rows(&["Key", "Expires"], rows, "No memory entries found.")
}

fn get_value(project: &Project, key: &str, format: OutputFormat) -> Result<()> {
    let value = project
        .memory()
        .lookup_mid(key)?
        .ok_or_else(|| anyhow::anyhow!("Memory key not found: {key}"))?;

    if format.is_json() {
        return print_json(&json!({ "key": key, "value": value }));
    }

    match value {
        serde_json::Value::String(text) => println!("{text}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

fn put_value(
    project: &Project,
    key: &str,
    value: &str,
    ttl: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let storage = project.memory().storage();
    match ttl {
        Some(secs) => {
            let ttl_ms = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            storage.put_with_ttl(key, value.as_bytes(), ttl_ms)?
        }
        None => storage.put(key, value.as_bytes())?,
    }

    if format.is_json() {
        return print_json(&json!({ "key": key, "ttl_secs": ttl }));
    }
    println!("Stored {key}");
    Ok(())
}

fn history(project: &Project, agent: &str, limit: usize, format: OutputFormat) -> Result<()> {
    let records = project.memory().history(agent, limit)?;

    if format.is_json() {
        return print_json(&records);
    }

    let rows = records
        .into_iter()
        .map(|record| {
            vec![
                format_timestamp(Some(record.timestamp)),
                record.agent,
                preview_text(&record.text, 60),
            ]
        })
        .collect();
    print_rows(
        &["Stored", "Agent", "Preview"],
        rows,
        &format!("No history for {agent}."),
    )
}

fn sweep(project: &Project, format: OutputFormat) -> Result<()> {
    let removed = project.memory().storage().sweep_expired(now_ms())?;

    if format.is_json() {
        return print_json(&json!({ "removed": removed }));
    }
    println!("Removed {removed} expired entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}
