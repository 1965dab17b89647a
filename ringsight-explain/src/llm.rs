// Copyright 2026 Ringsight (https://github.com/ringsight)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Language-model client abstraction
//!
//! The reasoning loop talks to a locally hosted model through this seam.
//! Only the Ollama chat endpoint is implemented; financial data never
//! leaves the local environment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// One chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Errors from language-model clients
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for chat-capable model clients
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and return the assistant's reply text
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Model name, for logging
    fn model_name(&self) -> &str;
}

/// Client for a local Ollama server
pub struct OllamaClient {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            // Low temperature for factual compliance narratives
            "options": { "temperature": 0.3 },
        });

        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        let value: serde_json::Value = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        value["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::system("you are a compliance officer");
        assert_eq!(msg.role, "system");
        assert_eq!(ChatMessage::user("hi").role, "user");
        assert_eq!(ChatMessage::assistant("ok").role, "assistant");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error_not_a_panic() {
        // Nothing listens on this port; the client must surface an error.
        let client = OllamaClient::new(
            "http://127.0.0.1:1",
            "llama3.2:1b",
            Duration::from_millis(500),
        );
        let result = client.chat(&[ChatMessage::user("hello")]).await;
        assert!(result.is_err());
    }
}
