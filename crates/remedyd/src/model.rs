//! Language-model capability.
//!
//! The rest of the daemon only depends on the `ModelClient` trait:
//! `invoke(prompt) -> content`. The HTTP implementation speaks the
//! chat-completions wire shape with an explicit timeout; replies are
//! treated as possibly slow, possibly malformed, possibly fence-wrapped
//! by the decode step at each call site.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use remedy_core::config::Config;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model request timed out")]
    Timeout,
    #[error("model returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model reply contained no content")]
    Empty,
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout
        } else {
            ModelError::Request(err.to_string())
        }
    }
}

/// The external language-model capability.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one prompt, return the raw reply text.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

/// Chat-completions HTTP client.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    http: reqwest::Client,
}

impl HttpModelClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.model_url,
            &config.model_name,
            config.model_api_key(),
            config.model_max_tokens,
            Duration::from_secs(config.model_timeout_sec),
        )
    }

    pub fn new(
        url: &str,
        model: &str,
        api_key: Option<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            model: model.to_string(),
            api_key,
            max_tokens,
            http,
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
            max_tokens: self.max_tokens,
        };

        debug!(prompt_len = prompt.len(), "invoking model");

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let excerpt: String = message.chars().take(200).collect();
            return Err(ModelError::Status {
                status: status.as_u16(),
                message: excerpt,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Request(format!("reply did not parse: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ModelError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> HttpModelClient {
        HttpModelClient::new(url, "test-model", None, 1024, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn invoke_returns_reply_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "fixed it"}}]}"#)
            .create_async()
            .await;

        let reply = client(&server.url()).invoke("fix this").await.unwrap();
        assert_eq!(reply, "fixed it");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invoke_sends_bearer_auth_when_keyed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "ok"}}]}"#)
            .create_async()
            .await;

        let keyed = HttpModelClient::new(
            &server.url(),
            "test-model",
            Some("sk-test".to_string()),
            1024,
            Duration::from_secs(5),
        )
        .unwrap();
        keyed.invoke("hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invoke_maps_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let err = client(&server.url()).invoke("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn invoke_rejects_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": ""}}]}"#)
            .create_async()
            .await;

        let err = client(&server.url()).invoke("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Empty));
    }

    #[tokio::test]
    async fn invoke_rejects_missing_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client(&server.url()).invoke("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Empty));
    }
}
