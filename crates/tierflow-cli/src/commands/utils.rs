use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use colored::Colorize;
use tierflow_ai::{
    EventBus, FlowEvent, FnSink, PendingOutcome, StoragePolicy, StoreMeta, StreamingRunner,
};
use uuid::Uuid;

use crate::cli::{OnAsk, StorageArg};

pub fn format_timestamp(timestamp: Option<i64>) -> String {
    let Some(ts) = timestamp else {
        return "-".to_string();
    };

    let datetime: DateTime<Local> = match Local.timestamp_millis_opt(ts).single() {
        Some(dt) => dt,
        None => return "-".to_string(),
    };

    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Print fragments to stdout as they arrive, and run notices to stderr.
pub fn attach_printer(bus: &EventBus) {
    bus.add_sink(Arc::new(FnSink(|event: &FlowEvent| match event {
        FlowEvent::StepStarted { step, agent } => {
            println!("{}", format!("── step {step}: {agent}").cyan().bold());
        }
        FlowEvent::Chunk { text, .. } => {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
        FlowEvent::Completed { .. } => println!(),
        FlowEvent::Stored { key: Some(key), .. } => {
            eprintln!("{} {key}", "stored".green());
        }
        FlowEvent::AskStore { agent, .. } => {
            eprintln!("{} output of {agent} needs a store decision", "ask".yellow());
        }
        FlowEvent::Error { agent, message, .. } => {
            let who = agent.as_deref().unwrap_or("workflow");
            eprintln!("{} {who}: {message}", "error".red());
        }
        _ => {}
    })));
}

impl From<StorageArg> for StoragePolicy {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Auto => StoragePolicy::Auto,
            StorageArg::Ask => StoragePolicy::Ask,
            StorageArg::Never => StoragePolicy::Never,
        }
    }
}

impl OnAsk {
    fn outcome(self) -> PendingOutcome {
        match self {
            OnAsk::Skip => PendingOutcome::Skip,
            OnAsk::Confirm => PendingOutcome::Confirm { include_long: true },
            OnAsk::ConfirmMid => PendingOutcome::Confirm {
                include_long: false,
            },
        }
    }
}

/// Resolve every open store decision the same way.
pub async fn resolve_pending(
    runner: &StreamingRunner,
    ids: impl IntoIterator<Item = Uuid>,
    on_ask: OnAsk,
) -> Result<Vec<(Uuid, StoreMeta)>> {
    let mut resolved = Vec::new();
    for id in ids {
        let meta = runner.resolve_pending(id, on_ask.outcome()).await?;
        resolved.push((id, meta));
    }
    Ok(resolved)
}
