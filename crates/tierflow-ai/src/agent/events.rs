//! Run events and the per-run event bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::memory::StoreMeta;

/// Everything a run reports to its observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    WorkflowStarted {
        name: String,
        steps: usize,
        mode: String,
    },
    WorkflowFinished {
        name: String,
        ok: bool,
    },
    StepStarted {
        step: usize,
        agent: String,
    },
    StepCompleted {
        step: usize,
        agent: String,
        output_key: String,
    },
    Chunk {
        agent: String,
        step: Option<usize>,
        text: String,
    },
    Completed {
        agent: String,
        step: Option<usize>,
        text: String,
        meta: StoreMeta,
    },
    AskStore {
        id: Uuid,
        agent: String,
        step: Option<usize>,
        text: String,
        meta: StoreMeta,
    },
    Stored {
        agent: String,
        key: Option<String>,
        pending: Option<Uuid>,
        meta: StoreMeta,
    },
    SkipStore {
        id: Uuid,
        agent: String,
    },
    Error {
        agent: Option<String>,
        step: Option<usize>,
        message: String,
    },
}

/// Receives events synchronously, in emission order.
pub trait EventSink: Send + Sync {
    /// Returns false once the sink is gone and should be dropped.
    fn send(&self, event: &FlowEvent) -> bool;
}

impl EventSink for mpsc::UnboundedSender<FlowEvent> {
    fn send(&self, event: &FlowEvent) -> bool {
        mpsc::UnboundedSender::send(self, event.clone()).is_ok()
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&FlowEvent) + Send + Sync,
{
    fn send(&self, event: &FlowEvent) -> bool {
        (self.0)(event);
        true
    }
}

/// Counters kept by the bus for the lifetime of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    chunks: AtomicUsize,
    completed: AtomicUsize,
    stored: AtomicUsize,
    asked: AtomicUsize,
    skipped: AtomicUsize,
    errors: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatsSnapshot {
    pub chunks: usize,
    pub completed: usize,
    pub stored: usize,
    pub asked: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunStats {
    fn record(&self, event: &FlowEvent) {
        let counter = match event {
            FlowEvent::Chunk { .. } => &self.chunks,
            FlowEvent::Completed { .. } => &self.completed,
            FlowEvent::Stored { .. } => &self.stored,
            FlowEvent::AskStore { .. } => &self.asked,
            FlowEvent::SkipStore { .. } => &self.skipped,
            FlowEvent::Error { .. } => &self.errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            chunks: self.chunks.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            asked: self.asked.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Fan-out of run events to any number of sinks.
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    stats: RunStats,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Channel subscription receiving every later event.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FlowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(Arc::new(tx));
        rx
    }

    pub fn emit(&self, event: FlowEvent) {
        self.stats.record(&event);
        let sinks = self.sinks.read().clone();
        let closed: Vec<_> = sinks.iter().filter(|sink| !sink.send(&event)).collect();
        if !closed.is_empty() {
            self.sinks
                .write()
                .retain(|sink| !closed.iter().any(|c| Arc::ptr_eq(c, sink)));
        }
    }

    pub fn stats(&self) -> RunStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sinks.read().len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
