//! Plain HTTP streaming backends: OpenWebUI and the generic fallback endpoint.

use reqwest::Client;
use serde_json::json;

use super::backend::{FragmentStream, HttpSettings, OpenWebUiSettings, StreamBackend, stream_http};
use super::frame::Framing;
use super::model_ref::Backend;
use crate::error::{AiError, Result};

pub const HTTP_URL_ENV: &str = "TIERFLOW_HTTP_URL";

/// OpenWebUI generate endpoint. Streams raw text.
pub struct OpenWebUiBackend {
    client: Client,
    settings: OpenWebUiSettings,
    timeout_secs: u64,
}

impl OpenWebUiBackend {
    pub fn new(client: Client, settings: OpenWebUiSettings, timeout_secs: u64) -> Self {
        Self {
            client,
            settings,
            timeout_secs,
        }
    }
}

impl StreamBackend for OpenWebUiBackend {
    fn backend(&self) -> Backend {
        Backend::OpenWebUi
    }

    // The endpoint selects its own model; the id is not sent.
    fn open(&self, _model: &str, prompt: &str) -> Result<FragmentStream> {
        let request = self
            .client
            .post(&self.settings.url)
            .json(&json!({ "prompt": prompt, "stream": true }));
        Ok(stream_http(
            Backend::OpenWebUi,
            self.timeout_secs,
            request,
            Framing::RawText,
        ))
    }
}

/// Catch-all endpoint for unknown or unprefixed model references.
pub struct GenericHttpBackend {
    client: Client,
    settings: HttpSettings,
    timeout_secs: u64,
}

impl GenericHttpBackend {
    pub fn new(client: Client, settings: HttpSettings, timeout_secs: u64) -> Self {
        Self {
            client,
            settings,
            timeout_secs,
        }
    }
}

impl StreamBackend for GenericHttpBackend {
    fn backend(&self) -> Backend {
        Backend::Http
    }

    fn open(&self, model: &str, prompt: &str) -> Result<FragmentStream> {
        let url = self
            .settings
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AiError::Config(format!(
                    "No HTTP endpoint configured for model '{model}'; set {HTTP_URL_ENV} or [backends.http] url"
                ))
            })?;

        let mut request = self
            .client
            .post(url)
            .json(&json!({ "model": model, "prompt": prompt, "stream": true }));
        if let Some(key) = self.settings.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        Ok(stream_http(
            Backend::Http,
            self.timeout_secs,
            request,
            self.settings.framing(),
        ))
    }
}
