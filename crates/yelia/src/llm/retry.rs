//! Fixed-delay retry for LLM calls
//!
//! Only transient failures ([`LlmError::is_retryable`]) are retried; a missing
//! key or a rejected prompt fails immediately.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{ChatCompletion, ChatRequest, LlmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { attempts: 3, delay: Duration::from_secs(5) }
  }
}

impl RetryPolicy {
  pub fn new(attempts: u32, delay: Duration) -> Self {
    Self { attempts: attempts.max(1), delay }
  }

  /// Run `operation` until it succeeds, fails permanently or runs out of attempts
  pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, LlmError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
  {
    let mut attempt = 1;
    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_retryable() && attempt < self.attempts => {
          warn!("{label} failed (attempt {attempt}/{}): {e}; retrying", self.attempts);
          if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
          }
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

/// Wraps a client so every completion goes through a [`RetryPolicy`]
pub struct RetryingClient<C> {
  inner: C,
  policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
  pub fn new(inner: C, policy: RetryPolicy) -> Self {
    Self { inner, policy }
  }
}

#[async_trait]
impl<C: ChatCompletion> ChatCompletion for RetryingClient<C> {
  async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
    let inner = &self.inner;
    self.policy.run("Chat completion", move || inner.complete(request)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::llm::MockChatCompletion;
  use mockall::Sequence;

  fn no_wait(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::ZERO)
  }

  #[test]
  fn test_attempts_never_zero() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
  }

  #[tokio::test]
  async fn test_retries_transient_errors_then_succeeds() {
    let mut mock = MockChatCompletion::new();
    let mut seq = Sequence::new();
    mock
      .expect_complete()
      .times(2)
      .in_sequence(&mut seq)
      .returning(|_| Err(LlmError::Unavailable { status: 503 }));
    mock.expect_complete().times(1).in_sequence(&mut seq).returning(|_| Ok("listo".to_string()));

    let client = RetryingClient::new(mock, no_wait(3));
    let reply = client.complete(&ChatRequest::new("s", "u")).await;
    assert_eq!(reply, Ok("listo".to_string()));
  }

  #[tokio::test]
  async fn test_gives_up_after_max_attempts() {
    let mut mock = MockChatCompletion::new();
    mock.expect_complete().times(3).returning(|_| Err(LlmError::Timeout));

    let client = RetryingClient::new(mock, no_wait(3));
    assert_eq!(client.complete(&ChatRequest::new("s", "u")).await, Err(LlmError::Timeout));
  }

  #[tokio::test]
  async fn test_permanent_errors_are_not_retried() {
    let mut mock = MockChatCompletion::new();
    mock.expect_complete().times(1).returning(|_| Err(LlmError::NotConfigured));

    let client = RetryingClient::new(mock, no_wait(5));
    assert_eq!(client.complete(&ChatRequest::new("s", "u")).await, Err(LlmError::NotConfigured));
  }

  #[tokio::test(start_paused = true)]
  async fn test_waits_fixed_delay_between_attempts() {
    let policy = RetryPolicy::new(2, Duration::from_secs(5));
    let started = tokio::time::Instant::now();
    let mut calls = 0;
    let result: Result<(), LlmError> = policy
      .run("test", || {
        calls += 1;
        async { Err(LlmError::RateLimited) }
      })
      .await;

    assert_eq!(result, Err(LlmError::RateLimited));
    assert_eq!(calls, 2);
    assert!(started.elapsed() >= Duration::from_secs(5));
  }
}
