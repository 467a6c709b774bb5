//! Stream backend trait, registry and the shared HTTP streaming loop.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use super::frame::{Decoded, FrameDecoder, Framing};
use super::http::{GenericHttpBackend, OpenWebUiBackend};
use super::mock::MockBackend;
use super::model_ref::{Backend, ModelRef};
use super::ollama::OllamaBackend;
use super::openai::OpenAiBackend;
use crate::error::{AiError, Result};
use crate::http_client::build_http_client;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const ERROR_BODY_LIMIT: usize = 512;

/// One item of a model stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    End,
}

/// Forward-only fragment stream. Terminates with exactly one `End` or one `Err`.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A model service reachable through one wire protocol.
pub trait StreamBackend: Send + Sync {
    fn backend(&self) -> Backend;

    /// Open a stream for `model` and `prompt`.
    ///
    /// Configuration problems (missing credential or URL) are returned here,
    /// before anything is sent. Transport failures arrive as stream items.
    fn open(&self, model: &str, prompt: &str) -> Result<FragmentStream>;
}

/// Drain a stream into a single string.
pub async fn collect_text(mut stream: FragmentStream) -> Result<String> {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item? {
            StreamEvent::Fragment(fragment) => text.push_str(&fragment),
            StreamEvent::End => break,
        }
    }
    Ok(text)
}

/// Send `request` and decode its body with `framing`.
pub(crate) fn stream_http(
    backend: Backend,
    timeout_secs: u64,
    request: RequestBuilder,
    framing: Framing,
) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let name = backend.as_str();
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                yield Err(AiError::from_reqwest(name, timeout_secs, e));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            yield Err(AiError::Http {
                backend: name.to_string(),
                status: status.as_u16(),
                message: truncate(&body, ERROR_BODY_LIMIT),
            });
            return;
        }

        let mut decoder = FrameDecoder::new(framing);
        let mut byte_stream = response.bytes_stream();
        let mut fragments = 0usize;

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(AiError::from_reqwest(name, timeout_secs, e));
                    return;
                }
            };

            for decoded in decoder.push(&chunk) {
                match decoded {
                    Decoded::Fragment(text) => {
                        fragments += 1;
                        yield Ok(StreamEvent::Fragment(text));
                    }
                    Decoded::Done => {
                        tracing::debug!(backend = name, fragments, "Stream sentinel received");
                        yield Ok(StreamEvent::End);
                        return;
                    }
                }
            }
        }

        for decoded in decoder.finish() {
            if let Decoded::Fragment(text) = decoded {
                fragments += 1;
                yield Ok(StreamEvent::Fragment(text));
            }
        }
        tracing::debug!(backend = name, fragments, "Stream finished");
        yield Ok(StreamEvent::End);
    })
}

fn truncate(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Response framing of the generic HTTP backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Raw,
    JsonLines,
    EventStream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub url: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWebUiSettings {
    pub url: String,
}

impl Default for OpenWebUiSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/v1/generate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub format: WireFormat,
    /// Text field for `json_lines`.
    pub response_field: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            format: WireFormat::Raw,
            response_field: "response".to_string(),
        }
    }
}

impl HttpSettings {
    pub fn framing(&self) -> Framing {
        match self.format {
            WireFormat::Raw => Framing::RawText,
            WireFormat::JsonLines => Framing::json_lines(self.response_field.clone()),
            WireFormat::EventStream => Framing::event_stream(),
        }
    }
}

/// Endpoint settings for every backend, as found under `[backends]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub ollama: OllamaSettings,
    pub openai: OpenAiSettings,
    pub openwebui: OpenWebUiSettings,
    pub http: HttpSettings,
}

/// Maps each [`Backend`] to its implementation.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<Backend, Arc<dyn StreamBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every network backend plus the mock.
    pub fn from_settings(settings: &BackendSettings, timeout_secs: u64) -> Result<Self> {
        let client = build_http_client(Duration::from_secs(timeout_secs))?;
        let mut registry = Self::new();
        registry.register(Arc::new(OllamaBackend::new(
            client.clone(),
            settings.ollama.clone(),
            timeout_secs,
        )));
        registry.register(Arc::new(OpenAiBackend::new(
            client.clone(),
            settings.openai.clone(),
            timeout_secs,
        )));
        registry.register(Arc::new(OpenWebUiBackend::new(
            client.clone(),
            settings.openwebui.clone(),
            timeout_secs,
        )));
        registry.register(Arc::new(GenericHttpBackend::new(
            client,
            settings.http.clone(),
            timeout_secs,
        )));
        registry.register(Arc::new(MockBackend::default()));
        Ok(registry)
    }

    pub fn register(&mut self, backend: Arc<dyn StreamBackend>) {
        self.backends.insert(backend.backend(), backend);
    }

    pub fn get(&self, backend: Backend) -> Option<Arc<dyn StreamBackend>> {
        self.backends.get(&backend).cloned()
    }

    pub fn open(&self, model: &ModelRef, prompt: &str) -> Result<FragmentStream> {
        let backend = self.get(model.backend).ok_or_else(|| {
            AiError::Config(format!("No backend registered for '{}'", model.backend))
        })?;
        tracing::debug!(model = %model, prompt_len = prompt.len(), "Opening model stream");
        backend.open(&model.model, prompt)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.backends.keys().map(Backend::as_str).collect();
        names.sort_unstable();
        f.debug_struct("BackendRegistry")
            .field("backends", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn scripted(items: Vec<Result<StreamEvent>>) -> FragmentStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_collect_text_concatenates_until_end() {
        let s = scripted(vec![
            Ok(StreamEvent::Fragment("Hel".into())),
            Ok(StreamEvent::Fragment("lo".into())),
            Ok(StreamEvent::End),
        ]);
        assert_eq!(collect_text(s).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_collect_text_propagates_error() {
        let s = scripted(vec![
            Ok(StreamEvent::Fragment("partial".into())),
            Err(AiError::Timeout {
                backend: "ollama".into(),
                secs: 1,
            }),
        ]);
        assert!(matches!(
            collect_text(s).await,
            Err(AiError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_registry_without_backend_is_config_error() {
        let registry = BackendRegistry::new();
        let err = registry
            .open(&ModelRef::parse("ollama:llama3").unwrap(), "hi")
            .err()
            .unwrap();
        assert!(err.is_fatal_at_start());
    }

    #[tokio::test]
    async fn test_registry_from_settings_routes_mock() {
        let registry =
            BackendRegistry::from_settings(&BackendSettings::default(), DEFAULT_TIMEOUT_SECS)
                .unwrap();
        let stream = registry
            .open(&ModelRef::parse("mock:").unwrap(), "say hi")
            .unwrap();
        let text = collect_text(stream).await.unwrap();
        assert!(text.contains("say hi"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let body = "é".repeat(10);
        let out = truncate(&body, 5);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 8);
    }

    #[test]
    fn test_http_settings_framing() {
        let settings: HttpSettings =
            serde_json::from_str(r#"{"url":"http://x","format":"json_lines","response_field":"text"}"#)
                .unwrap();
        assert_eq!(settings.framing(), Framing::json_lines("text"));
        assert_eq!(HttpSettings::default().framing(), Framing::RawText);
    }
}
