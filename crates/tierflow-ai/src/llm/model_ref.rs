//! Backend-qualified model references (`"<backend>:<model-id>"`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AiError, Result};

/// Supported model backends. Closed set; unknown prefixes route to `Http`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Ollama,
    OpenAi,
    OpenWebUi,
    Http,
    Mock,
}

impl Backend {
    pub const ALL: [Backend; 5] = [
        Backend::Ollama,
        Backend::OpenAi,
        Backend::OpenWebUi,
        Backend::Http,
        Backend::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::OpenWebUi => "openwebui",
            Self::Http => "http",
            Self::Mock => "mock",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAi),
            "openwebui" => Some(Self::OpenWebUi),
            "http" => Some(Self::Http),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed model reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub backend: Backend,
    pub model: String,
}

impl ModelRef {
    pub fn new(backend: Backend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    /// Parse `"<backend>:<model>"`.
    ///
    /// A known prefix selects its backend. Anything else (no colon, or an
    /// unknown prefix such as `"llama3:8b"`) is kept whole as the model id of
    /// the generic HTTP backend.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AiError::InvalidModel {
                reference: reference.to_string(),
                reason: "model reference is empty".to_string(),
            });
        }

        if let Some((prefix, model)) = reference.split_once(':')
            && let Some(backend) = Backend::from_prefix(prefix)
        {
            return Ok(Self::new(backend, model.trim()));
        }

        Ok(Self::new(Backend::Http, reference))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.model.is_empty() {
            write!(f, "{}:", self.backend)
        } else {
            write!(f, "{}:{}", self.backend, self.model)
        }
    }
}

impl FromStr for ModelRef {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ModelRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_prefixes() {
        let r = ModelRef::parse("ollama:llama3").unwrap();
        assert_eq!(r.backend, Backend::Ollama);
        assert_eq!(r.model, "llama3");

        let r = ModelRef::parse("OpenAI:gpt-4o-mini").unwrap();
        assert_eq!(r.backend, Backend::OpenAi);
        assert_eq!(r.model, "gpt-4o-mini");

        let r = ModelRef::parse("mock:").unwrap();
        assert_eq!(r.backend, Backend::Mock);
        assert_eq!(r.model, "");
    }

    #[test]
    fn test_unknown_and_unprefixed_fall_back_to_http() {
        let r = ModelRef::parse("llama3").unwrap();
        assert_eq!(r.backend, Backend::Http);
        assert_eq!(r.model, "llama3");

        let r = ModelRef::parse("vendor:model-x").unwrap();
        assert_eq!(r.backend, Backend::Http);
        assert_eq!(r.model, "vendor:model-x");
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert!(ModelRef::parse("   ").is_err());
    }

    #[test]
    fn test_display_round_trips_through_serde() {
        let r: ModelRef = serde_json::from_str("\"ollama:llama3\"").unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"ollama:llama3\"");
    }
}
