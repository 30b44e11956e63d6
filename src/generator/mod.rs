//! Producing candidate source text for a declaration from a language model.

pub mod postprocess;
pub mod prompt;
pub mod transport;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use postprocess::strip_fences;
pub use transport::{OllamaTransport, DEFAULT_ENDPOINT};

pub const DEFAULT_MODEL: &str = "qwen2.5-coder";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generator unreachable: {0}")]
    Transport(String),
    #[error("generator returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("generator response is malformed: {0}")]
    MalformedResponse(String),
    #[error("generator returned no code")]
    EmptyResponse,
}

/// Turns a declaration into source text. Each call is an independent round trip
/// with no retries.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        name: &str,
        signature: &str,
        docstring: Option<&str>,
    ) -> Result<String, GenerationError>;
}

impl<F> Generator for F
where
    F: Fn(&str, &str, Option<&str>) -> Result<String, GenerationError> + Send + Sync,
{
    fn generate(
        &self,
        name: &str,
        signature: &str,
        docstring: Option<&str>,
    ) -> Result<String, GenerationError> {
        self(name, signature, docstring)
    }
}

/// Who a prompt message speaks for. Replies are read as plain text, so only the
/// outgoing roles exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One request/response exchange with a chat model, returning the reply text.
pub trait ChatTransport: Send + Sync {
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

impl<F> ChatTransport for F
where
    F: Fn(&str, &[ChatMessage]) -> Result<String, GenerationError> + Send + Sync,
{
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        self(model, messages)
    }
}

/// Prompts a chat model and strips formatting artifacts from its reply.
pub struct ModelGenerator<T> {
    transport: T,
    model: String,
}

impl<T: ChatTransport> ModelGenerator<T> {
    pub fn new(transport: T, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl ModelGenerator<OllamaTransport> {
    pub fn ollama(endpoint: &str, model: &str, timeout: Option<std::time::Duration>) -> Self {
        Self::new(OllamaTransport::new(endpoint, timeout), model)
    }
}

impl<T: ChatTransport> Generator for ModelGenerator<T> {
    fn generate(
        &self,
        name: &str,
        signature: &str,
        docstring: Option<&str>,
    ) -> Result<String, GenerationError> {
        info!(name, signature, model = %self.model, "requesting implementation");
        let messages = prompt::messages(name, signature, docstring);
        let reply = self.transport.chat(&self.model, &messages)?;
        let code = strip_fences(&reply);
        if code.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_generator_cleans_replies() -> Result<(), GenerationError> {
        let transport = |model: &str, messages: &[ChatMessage]| -> Result<String, GenerationError> {
            assert_eq!(model, "tiny");
            assert_eq!(messages.len(), 2);
            Ok("```python\ndef one():\n    return 1\n```".to_string())
        };
        let generator = ModelGenerator::new(transport, "tiny");
        assert_eq!(generator.generate("one", "()", None)?, "def one():\n    return 1");
        Ok(())
    }

    #[test]
    fn blank_replies_are_errors() {
        let transport = |_: &str, _: &[ChatMessage]| -> Result<String, GenerationError> {
            Ok("```\n```".to_string())
        };
        let generator = ModelGenerator::new(transport, DEFAULT_MODEL);
        assert_eq!(
            generator.generate("f", "()", None),
            Err(GenerationError::EmptyResponse)
        );
    }

    #[test]
    fn roles_serialize_lowercase() -> Result<(), serde_json::Error> {
        let message = ChatMessage::new(Role::System, "be brief");
        assert_eq!(
            serde_json::to_value(&message)?,
            serde_json::json!({"role": "system", "content": "be brief"})
        );
        assert_eq!(serde_json::to_string(&Role::User)?, "\"user\"");
        Ok(())
    }
}
