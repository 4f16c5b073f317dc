//! Chat-completion client abstraction
//!
//! Every LLM call in the service goes through the [`ChatCompletion`] trait so
//! the resolver, quiz and recommendation logic can be exercised with mocks.

pub mod groq;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use groq::GroqClient;
pub use retry::{RetryPolicy, RetryingClient};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
  #[error("LLM API key is not configured")]
  NotConfigured,

  #[error("Network error talking to the LLM: {0}")]
  Network(String),

  #[error("LLM request timed out")]
  Timeout,

  #[error("LLM rate limit reached")]
  RateLimited,

  #[error("LLM service unavailable (HTTP {status})")]
  Unavailable { status: u16 },

  #[error("LLM rejected the request (HTTP {status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("Malformed LLM response: {0}")]
  MalformedResponse(String),
}

impl LlmError {
  /// Transient failures worth another attempt
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited | LlmError::Unavailable { .. }
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
}

/// One completion request: a system prompt, a user turn and sampling limits
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
  pub messages: Vec<ChatMessage>,
  pub max_tokens: u32,
  pub temperature: f32,
}

impl ChatRequest {
  pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
    Self {
      messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
      max_tokens: 1000,
      temperature: 0.7,
    }
  }

  pub fn max_tokens(mut self, max_tokens: u32) -> Self {
    self.max_tokens = max_tokens;
    self
  }

  pub fn temperature(mut self, temperature: f32) -> Self {
    self.temperature = temperature;
    self
  }

  pub fn system_prompt(&self) -> &str {
    self
      .messages
      .iter()
      .find(|m| m.role == Role::System)
      .map(|m| m.content.as_str())
      .unwrap_or("")
  }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
  /// Return the assistant's reply text
  async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Slice out the first `{ ... }` span, tolerating prose or code fences around it
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (start < end).then(|| &text[start..=end])
}
