//! LLM module - backend-qualified model references and streaming adapters

mod backend;
pub mod frame;
mod http;
mod mock;
mod model_ref;
mod ollama;
mod openai;

pub use backend::{
    BackendRegistry, BackendSettings, DEFAULT_TIMEOUT_SECS, FragmentStream, HttpSettings,
    OllamaSettings, OpenAiSettings, OpenWebUiSettings, StreamBackend, StreamEvent, WireFormat,
    collect_text,
};
pub use frame::{Decoded, FrameDecoder, Framing};
pub use http::{GenericHttpBackend, HTTP_URL_ENV, OpenWebUiBackend};
pub use mock::{MockBackend, MockStep};
pub use model_ref::{Backend, ModelRef};
pub use ollama::OllamaBackend;
pub use openai::{OPENAI_API_KEY_ENV, OpenAiBackend};
