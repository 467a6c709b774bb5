//! OpenAI chat-completions streaming backend

use reqwest::Client;
use serde::Serialize;

use super::backend::{FragmentStream, OpenAiSettings, StreamBackend, stream_http};
use super::frame::Framing;
use super::model_ref::Backend;
use crate::error::{AiError, Result};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI (and API-compatible) backend
pub struct OpenAiBackend {
    client: Client,
    settings: OpenAiSettings,
    timeout_secs: u64,
}

impl OpenAiBackend {
    pub fn new(client: Client, settings: OpenAiSettings, timeout_secs: u64) -> Self {
        Self {
            client,
            settings,
            timeout_secs,
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: [OpenAiMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl StreamBackend for OpenAiBackend {
    fn backend(&self) -> Backend {
        Backend::OpenAi
    }

    fn open(&self, model: &str, prompt: &str) -> Result<FragmentStream> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(AiError::MissingCredential {
                backend: Backend::OpenAi.to_string(),
                env_var: OPENAI_API_KEY_ENV,
            })?;

        let model = if model.is_empty() { DEFAULT_MODEL } else { model };
        let body = OpenAiRequest {
            model,
            messages: [OpenAiMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let request = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.settings.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&body);

        Ok(stream_http(
            Backend::OpenAi,
            self.timeout_secs,
            request,
            Framing::event_stream(),
        ))
    }
}
