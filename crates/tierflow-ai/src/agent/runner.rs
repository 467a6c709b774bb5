//! Streaming runner: drives one model invocation, re-emits fragments, and
//! hands the accumulated text to the memory manager.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::AgentConfig;
use super::events::{EventBus, FlowEvent};
use super::pending::{PendingDecisions, PendingOutcome};
use crate::error::{AiError, Result};
use crate::llm::{BackendRegistry, ModelRef, StreamEvent};
use crate::memory::{
    ForceOptions, MemoryManager, StoragePolicy, StoreDecision, StoreMeta, StoreOutcome,
};

/// Who is being invoked; `step` is set inside a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationScope {
    pub agent: String,
    pub step: Option<usize>,
}

impl InvocationScope {
    pub fn agent(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            step: None,
        }
    }

    pub fn step(agent: impl Into<String>, step: usize) -> Self {
        Self {
            agent: agent.into(),
            step: Some(step),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub text: String,
    pub meta: StoreMeta,
    /// Mid-tier key when the text was written.
    pub key: Option<String>,
    /// Set when the store decision awaits [`StreamingRunner::resolve_pending`].
    pub pending: Option<Uuid>,
}

pub struct StreamingRunner {
    backends: Arc<BackendRegistry>,
    memory: Arc<MemoryManager>,
    bus: Arc<EventBus>,
    pending: Arc<PendingDecisions>,
}

impl StreamingRunner {
    pub fn new(
        backends: Arc<BackendRegistry>,
        memory: Arc<MemoryManager>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            backends,
            memory,
            bus,
            pending: Arc::new(PendingDecisions::new()),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn pending(&self) -> &Arc<PendingDecisions> {
        &self.pending
    }

    /// Invoke `agent` with an already assembled prompt.
    pub async fn run_agent(
        &self,
        agent: &AgentConfig,
        step: Option<usize>,
        prompt: &str,
    ) -> Result<RunOutcome> {
        let scope = InvocationScope {
            agent: agent.name.clone(),
            step,
        };
        let model = match agent.model_ref() {
            Ok(model) => model,
            Err(e) => {
                self.emit_error(&scope, &e);
                return Err(e);
            }
        };
        self.run(&scope, &model, prompt, agent.storage).await
    }

    pub async fn run(
        &self,
        scope: &InvocationScope,
        model: &ModelRef,
        prompt: &str,
        policy: StoragePolicy,
    ) -> Result<RunOutcome> {
        info!(agent = %scope.agent, step = ?scope.step, model = %model, "Invoking agent");

        let mut stream = match self.backends.open(model, prompt) {
            Ok(stream) => stream,
            Err(e) => {
                self.emit_error(scope, &e);
                return Err(e);
            }
        };

        let mut text = String::new();
        let mut fragments = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::Fragment(fragment)) => {
                    fragments += 1;
                    text.push_str(&fragment);
                    self.bus.emit(FlowEvent::Chunk {
                        agent: scope.agent.clone(),
                        step: scope.step,
                        text: fragment,
                    });
                }
                Ok(StreamEvent::End) => break,
                Err(e) => {
                    warn!(agent = %scope.agent, fragments, error = %e, "Model stream failed");
                    self.emit_error(scope, &e);
                    return Err(e);
                }
            }
        }
        debug!(agent = %scope.agent, fragments, chars = text.len(), "Model stream complete");

        let stored = self
            .memory
            .store_with_policy(&scope.agent, &text, policy)
            .await;
        self.report_store(scope, &stored, None);

        let pending = if stored.meta.ask_required {
            let entry = self
                .pending
                .register(&scope.agent, scope.step, &text, stored.meta);
            self.bus.emit(FlowEvent::AskStore {
                id: entry.id,
                agent: scope.agent.clone(),
                step: scope.step,
                text: text.clone(),
                meta: stored.meta,
            });
            Some(entry.id)
        } else {
            None
        };

        self.bus.emit(FlowEvent::Completed {
            agent: scope.agent.clone(),
            step: scope.step,
            text: text.clone(),
            meta: stored.meta,
        });

        Ok(RunOutcome {
            text,
            meta: stored.meta,
            key: stored.key,
            pending,
        })
    }

    /// Resolve a store decision left open by [`run`](Self::run).
    pub async fn resolve_pending(&self, id: Uuid, outcome: PendingOutcome) -> Result<StoreMeta> {
        let entry = self.pending.take(id).ok_or(AiError::UnknownPending(id))?;
        let scope = InvocationScope {
            agent: entry.agent.clone(),
            step: entry.step,
        };

        match outcome {
            PendingOutcome::Confirm { include_long } => {
                let stored = self
                    .memory
                    .store_forced(&entry.agent, &entry.text, ForceOptions { include_long })
                    .await;
                self.report_store(&scope, &stored, Some(id));
                Ok(stored.meta)
            }
            PendingOutcome::Skip => {
                debug!(agent = %entry.agent, %id, "Pending store skipped");
                self.bus.emit(FlowEvent::SkipStore {
                    id,
                    agent: entry.agent,
                });
                Ok(StoreMeta {
                    decision: StoreDecision::Discard,
                    stored_mid: false,
                    stored_long: false,
                    ask_required: false,
                })
            }
        }
    }

    fn report_store(&self, scope: &InvocationScope, stored: &StoreOutcome, pending: Option<Uuid>) {
        if let Some(message) = &stored.write_error {
            self.bus.emit(FlowEvent::Error {
                agent: Some(scope.agent.clone()),
                step: scope.step,
                message: message.clone(),
            });
        }
        if stored.meta.stored_mid {
            self.bus.emit(FlowEvent::Stored {
                agent: scope.agent.clone(),
                key: stored.key.clone(),
                pending,
                meta: stored.meta,
            });
        }
    }

    fn emit_error(&self, scope: &InvocationScope, error: &AiError) {
        self.bus.emit(FlowEvent::Error {
            agent: Some(scope.agent.clone()),
            step: scope.step,
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockBackend, MockStep};
    use crate::memory::{EphemeralStore, InMemoryIndex, LongTermHit, LongTermIndex};
    use async_trait::async_trait;
    use serde_json::Value;
    use tempfile::TempDir;
    use tierflow_storage::ProjectStorage;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        runner: StreamingRunner,
        events: UnboundedReceiver<FlowEvent>,
        index: Arc<InMemoryIndex>,
        _dir: TempDir,
    }

    fn harness(steps: Vec<MockStep>) -> Harness {
        let index = Arc::new(InMemoryIndex::new());
        let (runner, events, dir) = build_runner(steps, index.clone());
        Harness {
            runner,
            events,
            index,
            _dir: dir,
        }
    }

    fn build_runner(
        steps: Vec<MockStep>,
        long_tier: Arc<dyn LongTermIndex>,
    ) -> (StreamingRunner, UnboundedReceiver<FlowEvent>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = ProjectStorage::open(dir.path().join("memory.redb")).unwrap();
        let memory = MemoryManager::new("demo", storage.memory, Arc::new(EphemeralStore::new()))
            .with_long_tier(long_tier);

        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(MockBackend::from_steps(steps)));
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();

        (
            StreamingRunner::new(Arc::new(registry), Arc::new(memory), bus),
            events,
            dir,
        )
    }

    struct UnreachableIndex;

    #[async_trait]
    impl LongTermIndex for UnreachableIndex {
        async fn upsert(&self, _key: &str, _text: &str, _metadata: Value) -> Result<()> {
            Err(AiError::Transport {
                backend: "vector".into(),
                message: "connection refused".into(),
            })
        }

        async fn query(&self, _text: &str, _top_k: usize) -> Result<Vec<LongTermHit>> {
            Ok(Vec::new())
        }
    }

    fn drain(rx: &mut UnboundedReceiver<FlowEvent>) -> Vec<FlowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn mock() -> ModelRef {
        ModelRef::parse("mock:").unwrap()
    }

    #[tokio::test]
    async fn test_fragments_accumulate_in_order() {
        let mut h = harness(vec![MockStep::fragments(["Hel", "lo wor", "ld"])]);
        let scope = InvocationScope::agent("writer");
        let outcome = h
            .runner
            .run(&scope, &mock(), "greet", StoragePolicy::Auto)
            .await
            .unwrap();
        assert_eq!(outcome.text, "Hello world");

        let events = drain(&mut h.events);
        let chunks: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                FlowEvent::Chunk { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec!["Hel", "lo wor", "ld"]);

        let completed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, FlowEvent::Completed { .. }))
            .collect();
        assert_eq!(completed.len(), 1);
        assert!(matches!(
            completed[0],
            FlowEvent::Completed { text, .. } if text == "Hello world"
        ));
        assert!(matches!(events.last(), Some(FlowEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_ask_then_confirm_stores() {
        let mut h = harness(vec![MockStep::text("Lunch moved to noon")]);
        let outcome = h
            .runner
            .run(&InvocationScope::step("writer", 2), &mock(), "p", StoragePolicy::Auto)
            .await
            .unwrap();
        assert!(outcome.meta.ask_required);
        let id = outcome.pending.unwrap();
        assert!(drain(&mut h.events).iter().any(|e| matches!(
            e,
            FlowEvent::AskStore { id: got, step: Some(2), .. } if *got == id
        )));

        let meta = h
            .runner
            .resolve_pending(id, PendingOutcome::Confirm { include_long: false })
            .await
            .unwrap();
        assert!(meta.stored_mid);
        assert!(!meta.stored_long);
        assert!(h.index.is_empty());
        assert_eq!(h.runner.memory().history("writer", 5).unwrap().len(), 1);
        assert!(drain(&mut h.events).iter().any(|e| matches!(
            e,
            FlowEvent::Stored { pending: Some(got), .. } if *got == id
        )));

        let again = h.runner.resolve_pending(id, PendingOutcome::Skip).await;
        assert!(matches!(again, Err(AiError::UnknownPending(_))));
    }

    #[tokio::test]
    async fn test_skip_writes_nothing() {
        let mut h = harness(vec![MockStep::text("Lunch moved to noon")]);
        let outcome = h
            .runner
            .run(&InvocationScope::agent("writer"), &mock(), "p", StoragePolicy::Auto)
            .await
            .unwrap();
        let id = outcome.pending.unwrap();
        h.runner
            .resolve_pending(id, PendingOutcome::Skip)
            .await
            .unwrap();
        assert!(h.runner.memory().history("writer", 5).unwrap().is_empty());
        assert!(
            drain(&mut h.events)
                .iter()
                .any(|e| matches!(e, FlowEvent::SkipStore { .. }))
        );
    }

    #[tokio::test]
    async fn test_policy_overrides() {
        let code = "```rust\nfn main() {}\n```";
        let h = harness(vec![MockStep::text(code), MockStep::text(code)]);
        let scope = InvocationScope::agent("writer");

        let never = h
            .runner
            .run(&scope, &mock(), "p", StoragePolicy::Never)
            .await
            .unwrap();
        assert_eq!(never.meta.decision, StoreDecision::Discard);
        assert!(never.pending.is_none());

        let ask = h
            .runner
            .run(&scope, &mock(), "p", StoragePolicy::Ask)
            .await
            .unwrap();
        assert!(ask.meta.ask_required);
        assert!(ask.pending.is_some());
        assert!(h.runner.memory().history("writer", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_store_emits_stored() {
        let mut h = harness(vec![MockStep::text("```sh\nls\n```")]);
        let outcome = h
            .runner
            .run(&InvocationScope::agent("writer"), &mock(), "p", StoragePolicy::Auto)
            .await
            .unwrap();
        assert!(outcome.meta.stored_mid && outcome.meta.stored_long);
        assert!(outcome.pending.is_none());
        assert!(
            drain(&mut h.events)
                .iter()
                .any(|e| matches!(e, FlowEvent::Stored { pending: None, .. }))
        );
        assert_eq!(h.runner.bus().stats().stored, 1);
    }

    #[tokio::test]
    async fn test_long_tier_failure_reports_error_and_completes() {
        let code = "```rust\nfn main() {}\n```";
        let (runner, mut events, _dir) =
            build_runner(vec![MockStep::text(code)], Arc::new(UnreachableIndex));

        let outcome = runner
            .run(&InvocationScope::step("writer", 0), &mock(), "p", StoragePolicy::Auto)
            .await
            .unwrap();
        assert_eq!(outcome.text, code);
        assert_eq!(outcome.meta.decision, StoreDecision::Auto);
        assert!(outcome.meta.stored_mid);
        assert!(!outcome.meta.stored_long);

        let events = drain(&mut events);
        let error_at = events
            .iter()
            .position(|e| matches!(
                e,
                FlowEvent::Error { message, step: Some(0), .. } if message.contains("long-tier")
            ))
            .unwrap();
        let stored_at = events
            .iter()
            .position(|e| matches!(e, FlowEvent::Stored { .. }))
            .unwrap();
        assert!(error_at < stored_at);
        assert!(matches!(
            events.last(),
            Some(FlowEvent::Completed { meta, .. }) if meta.stored_mid && !meta.stored_long
        ));
    }

    #[tokio::test]
    async fn test_stream_error_keeps_emitted_fragments() {
        let mut h = harness(vec![MockStep::fail_after(["par", "tial"], "reset")]);
        let result = h
            .runner
            .run(&InvocationScope::step("writer", 1), &mock(), "p", StoragePolicy::Auto)
            .await;
        assert!(matches!(result, Err(AiError::Transport { .. })));

        let events = drain(&mut h.events);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, FlowEvent::Chunk { .. }))
                .count(),
            2
        );
        assert!(matches!(
            events.last(),
            Some(FlowEvent::Error { agent: Some(a), step: Some(1), .. }) if a == "writer"
        ));
        assert!(h.runner.memory().history("writer", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_model_emits_error() {
        let mut h = harness(vec![]);
        let agent = AgentConfig::new("writer", "  ");
        let result = h.runner.run_agent(&agent, Some(0), "p").await;
        assert!(matches!(result, Err(AiError::InvalidModel { .. })));
        assert!(matches!(
            drain(&mut h.events).as_slice(),
            [FlowEvent::Error { .. }]
        ));
    }
}
