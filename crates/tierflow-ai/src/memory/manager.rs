//! Tiered memory manager: classify, persist to the mid tier, mirror to the
//! ephemeral tier, promote to the long tier.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tierflow_storage::{MemoryKvStorage, MonotonicClock};
use tracing::{debug, error, warn};

use super::classifier::{DEFAULT_PROMOTION_MIN_CHARS, StoreDecision, classify, should_promote};
use super::ephemeral::EphemeralStore;
use super::long_tier::{LongTermHit, LongTermIndex};
use crate::error::{AiError, Result};

/// Per-agent storage policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoragePolicy {
    #[default]
    Auto,
    Ask,
    Never,
}

impl fmt::Display for StoragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Ask => "ask",
            Self::Never => "never",
        })
    }
}

impl FromStr for StoragePolicy {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "ask" => Ok(Self::Ask),
            "never" => Ok(Self::Never),
            other => Err(AiError::Config(format!(
                "Unknown storage policy '{other}' (expected auto, ask or never)"
            ))),
        }
    }
}

/// A stored agent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub agent: String,
    pub text: String,
    pub timestamp: i64,
}

/// What happened to one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub decision: StoreDecision,
    pub stored_mid: bool,
    pub stored_long: bool,
    pub ask_required: bool,
}

impl StoreMeta {
    fn unwritten(decision: StoreDecision) -> Self {
        Self {
            decision,
            stored_mid: false,
            stored_long: false,
            ask_required: decision == StoreDecision::Ask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceOptions {
    /// Also write the long tier, when one is configured.
    pub include_long: bool,
}

impl Default for ForceOptions {
    fn default() -> Self {
        Self { include_long: true }
    }
}

/// Meta plus the record key and the first write failure, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub meta: StoreMeta,
    pub key: Option<String>,
    pub write_error: Option<String>,
}

impl StoreOutcome {
    fn unwritten(decision: StoreDecision) -> Self {
        Self {
            meta: StoreMeta::unwritten(decision),
            key: None,
            write_error: None,
        }
    }
}

enum LongWrite {
    Skip,
    IfPromoted,
    Always,
}

pub struct MemoryManager {
    project_id: String,
    storage: MemoryKvStorage,
    ephemeral: Arc<EphemeralStore>,
    long_tier: Option<Arc<dyn LongTermIndex>>,
    promotion_min_chars: usize,
    clock: MonotonicClock,
}

impl MemoryManager {
    pub fn new(
        project_id: impl Into<String>,
        storage: MemoryKvStorage,
        ephemeral: Arc<EphemeralStore>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            storage,
            ephemeral,
            long_tier: None,
            promotion_min_chars: DEFAULT_PROMOTION_MIN_CHARS,
            clock: MonotonicClock::new(),
        }
    }

    pub fn with_long_tier(mut self, index: Arc<dyn LongTermIndex>) -> Self {
        self.long_tier = Some(index);
        self
    }

    pub fn with_promotion_min_chars(mut self, min_chars: usize) -> Self {
        self.promotion_min_chars = min_chars;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn ephemeral(&self) -> &Arc<EphemeralStore> {
        &self.ephemeral
    }

    pub fn storage(&self) -> &MemoryKvStorage {
        &self.storage
    }

    pub fn has_long_tier(&self) -> bool {
        self.long_tier.is_some()
    }

    /// Store under the default `auto` policy.
    pub async fn store(&self, agent: &str, text: &str) -> StoreOutcome {
        self.store_with_policy(agent, text, StoragePolicy::Auto).await
    }

    pub async fn store_with_policy(
        &self,
        agent: &str,
        text: &str,
        policy: StoragePolicy,
    ) -> StoreOutcome {
        let classified = classify(text);
        let decision = match policy {
            StoragePolicy::Never => {
                debug!(agent, classified = %classified, "Storage policy 'never', discarding");
                return StoreOutcome::unwritten(StoreDecision::Discard);
            }
            StoragePolicy::Ask if classified == StoreDecision::Auto => StoreDecision::Ask,
            _ => classified,
        };
        debug!(agent, %policy, %classified, %decision, "Store decision");

        match decision {
            StoreDecision::Discard | StoreDecision::Ask => StoreOutcome::unwritten(decision),
            StoreDecision::Auto => self.persist(agent, text, LongWrite::IfPromoted).await,
        }
    }

    /// Write unconditionally, bypassing the classifier.
    pub async fn store_forced(&self, agent: &str, text: &str, options: ForceOptions) -> StoreOutcome {
        let long = if options.include_long {
            LongWrite::Always
        } else {
            LongWrite::Skip
        };
        self.persist(agent, text, long).await
    }

    async fn persist(&self, agent: &str, text: &str, long: LongWrite) -> StoreOutcome {
        let timestamp = self.clock.next_ms();
        let key = format!("{agent}.history:{timestamp}");
        let record = MemoryRecord {
            agent: agent.to_string(),
            text: text.to_string(),
            timestamp,
        };
        let mut outcome = StoreOutcome {
            meta: StoreMeta {
                decision: StoreDecision::Auto,
                stored_mid: false,
                stored_long: false,
                ask_required: false,
            },
            key: None,
            write_error: None,
        };

        let written = serde_json::to_vec(&record)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.storage.put(&key, &bytes));
        if let Err(e) = written {
            error!(agent, key = %key, error = %e, "Mid-tier write failed");
            outcome.write_error = Some(format!("mid-tier write failed for {key}: {e}"));
            return outcome;
        }
        outcome.meta.stored_mid = true;
        outcome.key = Some(key.clone());
        self.ephemeral.put(key.clone(), json!(record));

        let Some(index) = &self.long_tier else {
            return outcome;
        };
        let promote = match long {
            LongWrite::Skip => false,
            LongWrite::Always => true,
            LongWrite::IfPromoted => should_promote(text, self.promotion_min_chars),
        };
        if !promote {
            return outcome;
        }

        let long_key = format!("{}::{agent}::{timestamp}", self.project_id);
        let metadata = json!({
            "project": self.project_id,
            "agent": agent,
            "timestamp": timestamp,
            "mid_key": key,
        });
        match index.upsert(&long_key, text, metadata).await {
            Ok(()) => outcome.meta.stored_long = true,
            Err(e) => {
                error!(agent, key = %long_key, error = %e, "Long-tier write failed");
                outcome.write_error = Some(format!("long-tier write failed for {long_key}: {e}"));
            }
        }
        outcome
    }

    /// Audit a tool call under `"<agent>:tool:<tool>:<ms>"`.
    pub fn record_tool_usage(&self, agent: &str, tool: &str, detail: &Value) -> Result<String> {
        let timestamp = self.clock.next_ms();
        let key = format!("{agent}:tool:{tool}:{timestamp}");
        let entry = json!({
            "agent": agent,
            "tool": tool,
            "detail": detail,
            "timestamp": timestamp,
        });
        self.storage.put(&key, &serde_json::to_vec(&entry)?)?;
        Ok(key)
    }

    /// Newest records for `agent`, most recent first.
    pub fn history(&self, agent: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let prefix = format!("{agent}.history:");
        let mut records: Vec<MemoryRecord> = self
            .storage
            .list_entries(Some(prefix.as_str()))?
            .into_iter()
            .filter_map(|(key, bytes)| match serde_json::from_slice(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable memory record");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    /// Mid-tier value for `key`: JSON when it parses, text otherwise.
    pub fn lookup_mid(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.storage.get(key)?.map(|bytes| {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        }))
    }

    /// Long-tier hits for `text`; empty without a long tier.
    pub async fn query_long(&self, text: &str, top_k: usize) -> Result<Vec<LongTermHit>> {
        match &self.long_tier {
            Some(index) => index.query(text, top_k).await,
            None => Ok(Vec::new()),
        }
    }
}
