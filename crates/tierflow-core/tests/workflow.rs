//! End-to-end workflow runs against scripted in-process backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{StreamExt, stream};
use serde_json::json;
use tempfile::TempDir;
use tierflow_ai::{
    AgentOverride, AiError, Backend, BackendRegistry, FlowEvent, FragmentStream, StoragePolicy,
    StreamBackend, StreamEvent,
};
use tierflow_core::{ExecutionMode, Project, TierflowConfig, WorkflowDefinition, WorkflowError};
use tokio::sync::mpsc::UnboundedReceiver;

/// Replies by prompt and records every prompt it receives.
#[derive(Default)]
struct ScriptedBackend {
    replies: HashMap<String, (u64, String)>,
    failing: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn reply(mut self, prompt: &str, delay_ms: u64, text: &str) -> Self {
        self.replies
            .insert(prompt.to_string(), (delay_ms, text.to_string()));
        self
    }

    fn fail_on(mut self, prompt: &str) -> Self {
        self.failing.push(prompt.to_string());
        self
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl StreamBackend for ScriptedBackend {
    fn backend(&self) -> Backend {
        Backend::Mock
    }

    fn open(&self, _model: &str, prompt: &str) -> tierflow_ai::Result<FragmentStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.failing.iter().any(|p| p == prompt) {
            return Ok(Box::pin(stream::iter(vec![Err(AiError::Transport {
                backend: "mock".into(),
                message: "connection reset".into(),
            })])));
        }

        let (delay_ms, text) = self
            .replies
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| (0, format!("echo: {prompt}")));
        let fragments: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();

        let body = stream::iter(fragments).then(move |fragment| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(StreamEvent::Fragment(fragment))
        });
        Ok(Box::pin(body.chain(stream::iter(vec![Ok(StreamEvent::End)]))))
    }
}

struct Fixture {
    project: Project,
    backend: Arc<ScriptedBackend>,
    events: UnboundedReceiver<FlowEvent>,
    _dir: TempDir,
}

fn fixture(backend: ScriptedBackend) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(backend);
    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());

    let project = Project::open_with(dir.path(), TierflowConfig::default(), registry).unwrap();
    let events = project.bus().subscribe();
    Fixture {
        project,
        backend,
        events,
        _dir: dir,
    }
}

fn drain(events: &mut UnboundedReceiver<FlowEvent>) -> Vec<FlowEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

const DRAFT_REVIEW: &str = r#"
name: draft-review
agents:
  writer:
    model: mock:writer
    prompt: "Write about {{input}}"
  reviewer:
    model: mock:reviewer
    prompt: "Review: {{input}}"
steps:
  - agent: writer
    input: streams
    save_as: draft
  - agent: reviewer
    input_from: draft
"#;

#[tokio::test]
async fn test_sequential_output_wiring() {
    let backend = ScriptedBackend::default().reply(
        "Write about streams",
        0,
        "Streams deliver text {{input}} in pieces.",
    );
    let mut fx = fixture(backend);
    let workflow = WorkflowDefinition::from_yaml_str(DRAFT_REVIEW).unwrap();

    let report = fx.project.engine().run(&workflow).await.unwrap();

    assert!(report.ok());
    assert_eq!(report.mode, ExecutionMode::Sequential);
    assert_eq!(
        report.step(0).unwrap().text,
        "Streams deliver text {{input}} in pieces."
    );
    // The saved output is substituted verbatim, placeholders included.
    assert_eq!(
        fx.backend.prompts(),
        vec![
            "Write about streams".to_string(),
            "Review: Streams deliver text {{input}} in pieces.".to_string(),
        ]
    );

    let values = &fx.project.storage().values;
    assert_eq!(
        values.get("draft").unwrap(),
        Some(json!("Streams deliver text {{input}} in pieces."))
    );
    assert!(values.get("reviewer.output").unwrap().is_some());

    let events = drain(&mut fx.events);
    assert!(matches!(events.first(), Some(FlowEvent::WorkflowStarted { steps: 2, .. })));
    assert!(matches!(events.last(), Some(FlowEvent::WorkflowFinished { ok: true, .. })));
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::Completed { agent, step, .. } => Some((agent.as_str(), *step)),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![("writer", Some(0)), ("reviewer", Some(1))]);
}

#[tokio::test]
async fn test_parallel_independent_steps_complete() {
    let backend = ScriptedBackend::default()
        .reply("slow", 40, "slow answer here")
        .reply("fast", 0, "fast answer");
    let mut fx = fixture(backend);
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "name": "fan-out",
            "agents": {"a": {"model": "mock:a"}, "b": {"model": "mock:b"}},
            "steps": [
                {"agent": "a", "input": "slow", "save_as": "left"},
                {"agent": "b", "input": "fast", "save_as": "right"}
            ],
            "execution": {"mode": "parallel"}
        }"#,
    )
    .unwrap();

    let engine = fx.project.engine();
    let report = tokio::time::timeout(Duration::from_secs(5), engine.run(&workflow))
        .await
        .expect("parallel run deadlocked")
        .unwrap();

    assert!(report.ok());
    assert_eq!(report.mode, ExecutionMode::Parallel);
    assert_eq!(report.step(0).unwrap().text, "slow answer here");
    assert_eq!(report.step(1).unwrap().text, "fast answer");

    let events = drain(&mut fx.events);
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::StepCompleted { output_key, .. } => Some(output_key.as_str()),
            _ => None,
        })
        .collect();
    // The fast step finishes first.
    assert_eq!(completed, vec!["right", "left"]);
}

#[tokio::test]
async fn test_missing_input_key_gives_empty_input() {
    let mut fx = fixture(ScriptedBackend::default());
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "name": "dangling",
            "agents": {"a": {"model": "mock:a", "prompt": "Summarize: {{input}}"}},
            "steps": [{"agent": "a", "input_from": "nowhere"}]
        }"#,
    )
    .unwrap();

    let report = fx.project.engine().run(&workflow).await.unwrap();
    assert!(report.ok());
    assert_eq!(fx.backend.prompts(), vec!["Summarize: ".to_string()]);
    drain(&mut fx.events);
}

#[tokio::test]
async fn test_input_from_seeded_context_and_context_snippet() {
    let fx = fixture(ScriptedBackend::default());
    let workflow = WorkflowDefinition::from_yaml_str(
        r#"
name: seeded
agents:
  a:
    model: mock:a
    prompt: "Answer: {{input}}"
    context: [tone, absent]
steps:
  - agent: a
    input_from: question
context:
  question: why rust
  tone: friendly
"#,
    )
    .unwrap();

    fx.project.engine().run(&workflow).await.unwrap();
    assert_eq!(
        fx.backend.prompts(),
        vec!["Answer: why rust\n\nContext:\n- tone: friendly".to_string()]
    );
}

#[tokio::test]
async fn test_failure_stops_sequential_run() {
    let backend = ScriptedBackend::default().fail_on("first");
    let mut fx = fixture(backend);
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "name": "fails",
            "agents": {"a": {"model": "mock:a"}},
            "steps": [{"agent": "a", "input": "first"}, {"agent": "a", "input": "second"}]
        }"#,
    )
    .unwrap();

    let err = fx.project.engine().run(&workflow).await.unwrap_err();
    assert!(matches!(err, WorkflowError::StepFailed { step: 0, .. }));
    assert_eq!(fx.backend.prompts(), vec!["first".to_string()]);

    let events = drain(&mut fx.events);
    assert!(events.iter().any(|e| matches!(e, FlowEvent::Error { step: Some(0), .. })));
    assert!(matches!(events.last(), Some(FlowEvent::WorkflowFinished { ok: false, .. })));
}

#[tokio::test]
async fn test_failed_run_keeps_earlier_store_decisions_open() {
    let backend = ScriptedBackend::default()
        .reply("note", 0, "Lunch moved to noon")
        .fail_on("second");
    let fx = fixture(backend);
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "name": "half",
            "agents": {"a": {"model": "mock:a"}},
            "steps": [{"agent": "a", "input": "note"}, {"agent": "a", "input": "second"}]
        }"#,
    )
    .unwrap();

    assert!(fx.project.engine().run(&workflow).await.is_err());
    let open = fx.project.runner().pending().list();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].text, "Lunch moved to noon");
    assert_eq!(open[0].step, Some(0));
}

#[tokio::test]
async fn test_continue_on_error_runs_remaining_steps() {
    let backend = ScriptedBackend::default().fail_on("first");
    let fx = fixture(backend);
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "name": "tolerant",
            "agents": {"a": {"model": "mock:a"}},
            "steps": [{"agent": "a", "input": "first"}, {"agent": "a", "input": "second"}],
            "execution": {"continue_on_error": true}
        }"#,
    )
    .unwrap();

    let report = fx.project.engine().run(&workflow).await.unwrap();
    assert!(!report.ok());
    assert!(report.step(0).unwrap().error.is_some());
    assert_eq!(report.step(1).unwrap().text, "echo: second");
}

#[tokio::test]
async fn test_outputs_land_in_mid_tier_history() {
    let backend = ScriptedBackend::default().reply(
        "explain",
        0,
        "The design uses an architecture with three memory tiers.",
    );
    let fx = fixture(backend);
    let workflow = WorkflowDefinition::from_json_str(
        r#"{
            "name": "remember",
            "agents": {"a": {"model": "mock:a"}},
            "steps": [{"agent": "a", "input": "explain"}]
        }"#,
    )
    .unwrap();

    fx.project.engine().run(&workflow).await.unwrap();
    let history = fx.project.memory().history("a", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].text.contains("three memory tiers"));
}

#[tokio::test]
async fn test_invoke_applies_agent_override() {
    let mut fx = fixture(ScriptedBackend::default());
    let workflow = WorkflowDefinition::from_yaml_str(DRAFT_REVIEW).unwrap();
    let patch = AgentOverride {
        prompt: Some("Shorten: {{input}}".into()),
        storage: Some(StoragePolicy::Never),
        ..AgentOverride::default()
    };
    let agent = patch.apply(workflow.agent("writer").unwrap());

    let outcome = fx.project.engine().invoke(&agent, "long text").await.unwrap();
    assert_eq!(outcome.text, "echo: Shorten: long text");
    assert!(!outcome.meta.stored_mid);
    assert_eq!(fx.backend.prompts(), vec!["Shorten: long text".to_string()]);

    let events = drain(&mut fx.events);
    assert!(events.iter().any(|e| matches!(e, FlowEvent::Completed { step: None, .. })));
}
