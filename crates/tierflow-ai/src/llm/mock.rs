//! Deterministic offline backend for tests and demos.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, sleep};

use super::backend::{FragmentStream, StreamBackend, StreamEvent};
use super::model_ref::Backend;
use crate::error::{AiError, Result};

const ECHO_LIMIT: usize = 200;
const CODE_RESPONSE: &str = "```python\n# example generated\nprint('Hello from mock')\n```";

/// Scripted stream: fragments in order, then `End` or the error.
#[derive(Debug, Clone, Default)]
pub struct MockStep {
    pub delay_ms: u64,
    pub fragments: Vec<String>,
    pub error: Option<String>,
}

impl MockStep {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::fragments([content.into()])
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Emit `fragments`, then fail mid-stream.
    pub fn fail_after<I, S>(fragments: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            error: Some(message.into()),
            ..Self::fragments(fragments)
        }
    }

    /// Delay before each fragment.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Mock backend driven by scripted steps, falling back to a canned reply.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<VecDeque<MockStep>>>,
}

impl MockBackend {
    pub fn from_steps(steps: Vec<MockStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
        }
    }

    pub fn push_step(&self, step: MockStep) {
        self.script.lock().push_back(step);
    }

    fn next_step(&self) -> Option<MockStep> {
        self.script.lock().pop_front()
    }

    /// Canned reply: a code block when the prompt mentions code, else an echo.
    pub fn canned_reply(prompt: &str) -> String {
        if prompt.to_lowercase().contains("code") {
            return CODE_RESPONSE.to_string();
        }
        if prompt.chars().count() > ECHO_LIMIT {
            let head: String = prompt.chars().take(ECHO_LIMIT).collect();
            format!("Mock response to: {head}...")
        } else {
            format!("Mock response to: {prompt}")
        }
    }

    fn fallback_step(prompt: &str) -> MockStep {
        let reply = Self::canned_reply(prompt);
        MockStep::fragments(reply.split_inclusive(' ').map(str::to_string))
    }
}

impl StreamBackend for MockBackend {
    fn backend(&self) -> Backend {
        Backend::Mock
    }

    fn open(&self, _model: &str, prompt: &str) -> Result<FragmentStream> {
        let step = self
            .next_step()
            .unwrap_or_else(|| Self::fallback_step(prompt));

        Ok(Box::pin(async_stream::stream! {
            for fragment in step.fragments {
                if step.delay_ms > 0 {
                    sleep(Duration::from_millis(step.delay_ms)).await;
                }
                yield Ok(StreamEvent::Fragment(fragment));
            }
            match step.error {
                Some(message) => yield Err(AiError::Transport {
                    backend: Backend::Mock.to_string(),
                    message,
                }),
                None => yield Ok(StreamEvent::End),
            }
        }))
    }
}
