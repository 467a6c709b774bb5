use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tierflow_ai::{BackendRegistry, EphemeralStore, EventBus, MemoryManager, StreamingRunner};
use tierflow_storage::ProjectStorage;
use tracing::info;

use crate::config::TierflowConfig;
use crate::paths;
use crate::workflow::WorkflowEngine;

/// Project state shared by every command: the database, the memory tiers,
/// the event bus and the runner.
pub struct Project {
    root: PathBuf,
    project_id: String,
    config: TierflowConfig,
    storage: ProjectStorage,
    runner: Arc<StreamingRunner>,
}

impl Project {
    /// Open `root` with its config file, environment overrides and the
    /// default backend registry.
    pub fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let config = TierflowConfig::load(root)?;
        let registry = config.build_registry()?;
        Self::open_with(root, config, registry)
    }

    /// Open `root` with an explicit config and backend registry.
    pub fn open_with(
        root: impl AsRef<Path>,
        config: TierflowConfig,
        registry: BackendRegistry,
    ) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        paths::ensure_state_dir(&root)?;
        let db_path = paths::database_path(&root);
        let storage = ProjectStorage::open(&db_path)
            .with_context(|| format!("Failed to open project database {}", db_path.display()))?;

        let project_id = config.resolve_project_id(&root);
        let mut memory = MemoryManager::new(
            project_id.clone(),
            storage.memory.clone(),
            Arc::new(EphemeralStore::new()),
        )
        .with_promotion_min_chars(config.memory.promotion_min_chars);
        if let Some(index) = config.build_long_tier(&project_id)? {
            memory = memory.with_long_tier(index);
        }

        let runner = Arc::new(StreamingRunner::new(
            Arc::new(registry),
            Arc::new(memory),
            Arc::new(EventBus::new()),
        ));

        info!(
            root = %root.display(),
            project_id = %project_id,
            long_tier = runner.memory().has_long_tier(),
            "Opened project"
        );

        Ok(Self {
            root,
            project_id,
            config,
            storage,
            runner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn config(&self) -> &TierflowConfig {
        &self.config
    }

    pub fn storage(&self) -> &ProjectStorage {
        &self.storage
    }

    pub fn runner(&self) -> &Arc<StreamingRunner> {
        &self.runner
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        self.runner.memory()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.runner.bus()
    }

    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(self.runner.clone(), self.storage.values.clone())
    }
}
