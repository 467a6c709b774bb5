use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const STATE_DIR: &str = ".tierflow";
const DB_FILE: &str = "memory.redb";
const CONFIG_FILE: &str = "config.toml";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the per-project state directory.
pub const TIERFLOW_DIR_ENV: &str = "TIERFLOW_DIR";

/// Resolve the state directory of `project`.
/// Priority: TIERFLOW_DIR env var > <project>/.tierflow/
pub fn resolve_state_dir(project: &Path) -> PathBuf {
    state_dir_with_override(project, std::env::var(TIERFLOW_DIR_ENV).ok().as_deref())
}

fn state_dir_with_override(project: &Path, override_dir: Option<&str>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => project.join(STATE_DIR),
    }
}

/// Ensure the state directory exists and return its path.
pub fn ensure_state_dir(project: &Path) -> Result<PathBuf> {
    let dir = resolve_state_dir(project);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
    Ok(dir)
}

/// Mid-tier database: <state>/memory.redb
pub fn database_path(project: &Path) -> PathBuf {
    resolve_state_dir(project).join(DB_FILE)
}

/// Project configuration: <state>/config.toml
pub fn config_path(project: &Path) -> PathBuf {
    resolve_state_dir(project).join(CONFIG_FILE)
}

/// Log directory, created on demand: <state>/logs/
pub fn logs_dir(project: &Path) -> Result<PathBuf> {
    let dir = resolve_state_dir(project).join(LOGS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok(dir)
}

/// Project id derived from the directory name, restricted to `[A-Za-z0-9_-]`.
pub fn default_project_id(project: &Path) -> String {
    let name = project
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .or_else(|| project.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();

    let id: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if id.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        id
    }
}
