//! Ollama `/api/generate` streaming backend.

use reqwest::Client;
use serde_json::json;

use super::backend::{FragmentStream, OllamaSettings, StreamBackend, stream_http};
use super::frame::Framing;
use super::model_ref::Backend;
use crate::error::Result;

pub struct OllamaBackend {
    client: Client,
    settings: OllamaSettings,
    timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(client: Client, settings: OllamaSettings, timeout_secs: u64) -> Self {
        Self {
            client,
            settings,
            timeout_secs,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.settings.url.trim_end_matches('/'))
    }
}

impl StreamBackend for OllamaBackend {
    fn backend(&self) -> Backend {
        Backend::Ollama
    }

    fn open(&self, model: &str, prompt: &str) -> Result<FragmentStream> {
        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": true,
        });
        let request = self.client.post(self.endpoint()).json(&body);
        Ok(stream_http(
            Backend::Ollama,
            self.timeout_secs,
            request,
            Framing::json_lines("response"),
        ))
    }
}
