use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatTransport, GenerationError};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

/// Blocking client for an Ollama server's `/api/chat` endpoint.
pub struct OllamaTransport {
    endpoint: String,
    agent: ureq::Agent,
}

impl OllamaTransport {
    /// Without a timeout a stalled server blocks the caller indefinitely.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            agent: builder.build(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }
}

impl Default for OllamaTransport {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, None)
    }
}

impl ChatTransport for OllamaTransport {
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let body = serde_json::to_string(&ChatRequest {
            model,
            messages,
            stream: false,
        })
        .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let url = self.chat_url();
        debug!(%url, model, "sending chat request");
        let response = match self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                return Err(GenerationError::Status {
                    code,
                    body: response.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(GenerationError::Transport(err.to_string()));
            }
        };

        let text = response
            .into_string()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        let reply: ChatResponse = serde_json::from_str(&text)
            .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
        Ok(reply.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Role;

    #[test]
    fn request_body_matches_the_chat_api() -> Result<(), serde_json::Error> {
        let messages = vec![ChatMessage::new(Role::User, "hi")];
        let body = serde_json::to_value(ChatRequest {
            model: "qwen2.5-coder",
            messages: &messages,
            stream: false,
        })?;
        assert_eq!(
            body,
            serde_json::json!({
                "model": "qwen2.5-coder",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false,
            })
        );
        Ok(())
    }

    #[test]
    fn endpoint_trailing_slash_is_ignored() {
        let transport = OllamaTransport::new("http://127.0.0.1:9/", None);
        assert_eq!(transport.chat_url(), "http://127.0.0.1:9/api/chat");
    }
}
