//! Groq chat-completions client (OpenAI-compatible API)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ChatCompletion, ChatMessage, ChatRequest, LlmError};
use crate::config::ServerConfig;

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  max_tokens: u32,
  temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
  message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
  #[serde(default)]
  choices: Vec<CompletionChoice>,
}

/// HTTP client for the Groq chat-completions endpoint
pub struct GroqClient {
  client: Client,
  api_url: Url,
  api_key: Option<String>,
  model: String,
}

impl GroqClient {
  pub fn new(
    api_url: impl Into<String>,
    api_key: Option<String>,
    model: impl Into<String>,
    timeout: Duration,
  ) -> Result<Self> {
    let api_url = api_url.into();
    let api_url = Url::parse(&api_url).with_context(|| format!("Invalid LLM API URL '{api_url}'"))?;
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      api_url,
      api_key: api_key.filter(|k| !k.trim().is_empty()),
      model: model.into(),
    })
  }

  pub fn from_config(config: &ServerConfig) -> Result<Self> {
    Self::new(
      config.groq_api_url.clone(),
      config.groq_api_key.clone(),
      config.groq_model.clone(),
      config.llm_timeout(),
    )
  }

  pub fn is_configured(&self) -> bool {
    self.api_key.is_some()
  }
}

#[async_trait]
impl ChatCompletion for GroqClient {
  async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
    let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;

    let body = CompletionBody {
      model: &self.model,
      messages: &request.messages,
      max_tokens: request.max_tokens,
      temperature: request.temperature,
    };

    debug!("Sending completion request to {} (model {})", self.api_url, self.model);
    let response = self
      .client
      .post(self.api_url.clone())
      .bearer_auth(api_key)
      .json(&body)
      .send()
      .await
      .map_err(map_transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(map_status(status, message));
    }

    let parsed: CompletionResponse =
      response.json().await.map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    parsed
      .choices
      .into_iter()
      .filter_map(|choice| choice.message.content)
      .map(|content| content.trim().to_string())
      .find(|content| !content.is_empty())
      .ok_or_else(|| LlmError::MalformedResponse("response contained no content".to_string()))
  }
}

fn map_transport_error(error: reqwest::Error) -> LlmError {
  if error.is_timeout() {
    LlmError::Timeout
  } else {
    LlmError::Network(error.to_string())
  }
}

fn map_status(status: StatusCode, message: String) -> LlmError {
  match status {
    StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
    s if s.is_server_error() => LlmError::Unavailable { status: s.as_u16() },
    s => LlmError::Rejected { status: s.as_u16(), message: message.chars().take(300).collect() },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_map_status() {
    assert_eq!(map_status(StatusCode::TOO_MANY_REQUESTS, String::new()), LlmError::RateLimited);
    assert_eq!(
      map_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
      LlmError::Unavailable { status: 503 }
    );
    assert_eq!(
      map_status(StatusCode::UNAUTHORIZED, "invalid key".to_string()),
      LlmError::Rejected { status: 401, message: "invalid key".to_string() }
    );
  }

  #[test]
  fn test_rejects_invalid_url() {
    assert!(GroqClient::new("no es una url", None, "m", Duration::from_secs(1)).is_err());
  }

  #[test]
  fn test_blank_key_is_not_configured() {
    let client =
      GroqClient::new("http://127.0.0.1:9", Some("  ".into()), "m", Duration::from_secs(1)).unwrap();
    assert!(!client.is_configured());
  }

  #[tokio::test]
  async fn test_complete_without_key_fails_fast() {
    let client = GroqClient::new("http://127.0.0.1:9", None, "m", Duration::from_secs(1)).unwrap();
    let result = client.complete(&ChatRequest::new("s", "u")).await;
    assert_eq!(result, Err(LlmError::NotConfigured));
  }

  #[test]
  fn test_body_serialization() {
    let request = ChatRequest::new("sys", "hola").max_tokens(42).temperature(0.5);
    let body = CompletionBody {
      model: "llama3-70b-8192",
      messages: &request.messages,
      max_tokens: request.max_tokens,
      temperature: request.temperature,
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["model"], "llama3-70b-8192");
    assert_eq!(value["max_tokens"], 42);
    assert_eq!(value["messages"][0]["role"], "system");
    assert_eq!(value["messages"][1]["content"], "hola");
  }

  #[test]
  fn test_response_parsing_tolerates_missing_content() {
    let parsed: CompletionResponse =
      serde_json::from_str(r#"{"choices":[{"message":{}},{"message":{"content":"hola"}}]}"#).unwrap();
    assert_eq!(parsed.choices.len(), 2);
    assert!(parsed.choices[0].message.content.is_none());
  }
}
