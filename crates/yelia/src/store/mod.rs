//! Persistence for progress, logs, conversations and avatars
//!
//! [`Store`] is implemented by [`PgStore`] for PostgreSQL and by
//! [`MemoryStore`] for tests and database-less runs. Both share the
//! semantics documented on the trait.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_AVATAR: &str = "default";

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Invalid stored value: {0}")]
  Corrupt(String),
}

/// Accumulated progress of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  #[serde(rename = "usuario")]
  pub user: String,
  #[serde(rename = "puntos")]
  pub points: i32,
  #[serde(rename = "temas_aprendidos")]
  pub learned: Vec<String>,
  pub avatar_id: String,
  #[serde(rename = "temas_recomendados")]
  pub recommended: Vec<String>,
}

impl Progress {
  pub fn new(user: impl Into<String>) -> Self {
    Self {
      user: user.into(),
      points: 0,
      learned: Vec::new(),
      avatar_id: DEFAULT_AVATAR.to_string(),
      recommended: Vec::new(),
    }
  }

  /// Add points; negative amounts are ignored so the total never decreases
  pub fn add_points(&mut self, points: i32) {
    self.points = self.points.saturating_add(points.max(0));
  }

  /// Record a learned topic; returns false when it was already known
  pub fn learn(&mut self, topic: &str) -> bool {
    let topic = topic.trim();
    if topic.is_empty() || topic.contains(',') || self.has_learned(topic) {
      return false;
    }
    self.learned.push(topic.to_string());
    true
  }

  pub fn has_learned(&self, topic: &str) -> bool {
    let topic = topic.trim().to_lowercase();
    self.learned.iter().any(|t| t.to_lowercase() == topic)
  }
}

/// Comma-joined list as stored in the `progreso` table
pub(crate) fn join_list(items: &[String]) -> String {
  items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(",")
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
  value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
  pub user: String,
  pub question: String,
  pub answer: String,
  pub level: String,
  pub avatar_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizRecord {
  pub user: String,
  pub question: String,
  pub answer: String,
  pub correct: bool,
  pub points: i32,
  pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
  pub id: i32,
  #[serde(rename = "usuario")]
  pub user: String,
  #[serde(rename = "nombre")]
  pub name: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  User,
  Bot,
}

impl MessageRole {
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim() {
      "user" => Some(Self::User),
      "bot" => Some(Self::Bot),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Bot => "bot",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
  pub role: MessageRole,
  pub content: String,
  pub topic: Option<String>,
}

impl NewMessage {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: MessageRole::User, content: content.into(), topic: None }
  }

  pub fn bot(content: impl Into<String>, topic: Option<String>) -> Self {
    Self { role: MessageRole::Bot, content: content.into(), topic }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
  pub id: i32,
  pub conv_id: i32,
  pub role: MessageRole,
  pub content: String,
  #[serde(rename = "tema")]
  pub topic: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Avatar {
  pub avatar_id: String,
  pub nombre: String,
  pub url: String,
  pub animation_url: String,
}

impl Avatar {
  pub fn default_avatar() -> Self {
    Self {
      avatar_id: DEFAULT_AVATAR.to_string(),
      nombre: "Avatar Predeterminado".to_string(),
      url: "/static/img/default-avatar.png".to_string(),
      animation_url: String::new(),
    }
  }
}

#[async_trait]
pub trait Store: Send + Sync {
  /// Short backend name reported by `/status`
  fn backend(&self) -> &'static str;

  async fn health(&self) -> Result<(), StoreError>;

  /// Stored progress, or a fresh default when the user has none
  async fn load_progress(&self, user: &str) -> Result<Progress, StoreError>;

  /// Insert or replace the user's progress row
  async fn save_progress(&self, progress: &Progress) -> Result<(), StoreError>;

  async fn set_avatar(&self, user: &str, avatar_id: &str) -> Result<(), StoreError>;

  async fn log_interaction(&self, record: &InteractionRecord) -> Result<(), StoreError>;

  async fn log_quiz(&self, record: &QuizRecord) -> Result<(), StoreError>;

  async fn create_conversation(&self, user: &str, name: &str) -> Result<Conversation, StoreError>;

  /// Conversations owned by `user`, newest first
  async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, StoreError>;

  async fn get_conversation(&self, user: &str, id: i32) -> Result<Option<Conversation>, StoreError>;

  /// Returns false when `user` owns no conversation with that id
  async fn rename_conversation(&self, user: &str, id: i32, name: &str) -> Result<bool, StoreError>;

  /// Delete a conversation and its messages; false when not owned
  async fn delete_conversation(&self, user: &str, id: i32) -> Result<bool, StoreError>;

  async fn append_message(&self, conv_id: i32, message: &NewMessage) -> Result<Message, StoreError>;

  /// Messages of a conversation in insertion order
  async fn list_messages(&self, conv_id: i32) -> Result<Vec<Message>, StoreError>;

  async fn list_avatars(&self) -> Result<Vec<Avatar>, StoreError>;
}
