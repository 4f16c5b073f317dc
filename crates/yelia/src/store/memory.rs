//! In-process store used by tests and when no database is configured

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
  Avatar, Conversation, InteractionRecord, Message, NewMessage, Progress, QuizRecord, Store,
  StoreError,
};

#[derive(Debug, Default)]
struct Tables {
  progress: HashMap<String, Progress>,
  interactions: Vec<InteractionRecord>,
  quizzes: Vec<QuizRecord>,
  conversations: Vec<Conversation>,
  messages: Vec<Message>,
  next_conversation_id: i32,
  next_message_id: i32,
}

#[derive(Debug)]
pub struct MemoryStore {
  tables: RwLock<Tables>,
  avatars: Vec<Avatar>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::with_avatars(vec![Avatar::default_avatar()])
  }

  pub fn with_avatars(avatars: Vec<Avatar>) -> Self {
    Self { tables: RwLock::new(Tables::default()), avatars }
  }

  pub async fn interactions(&self) -> Vec<InteractionRecord> {
    self.tables.read().await.interactions.clone()
  }

  pub async fn quiz_logs(&self) -> Vec<QuizRecord> {
    self.tables.read().await.quizzes.clone()
  }
}

#[async_trait]
impl Store for MemoryStore {
  fn backend(&self) -> &'static str {
    "memory"
  }

  async fn health(&self) -> Result<(), StoreError> {
    Ok(())
  }

  async fn load_progress(&self, user: &str) -> Result<Progress, StoreError> {
    let tables = self.tables.read().await;
    Ok(tables.progress.get(user).cloned().unwrap_or_else(|| Progress::new(user)))
  }

  async fn save_progress(&self, progress: &Progress) -> Result<(), StoreError> {
    self.tables.write().await.progress.insert(progress.user.clone(), progress.clone());
    Ok(())
  }

  async fn set_avatar(&self, user: &str, avatar_id: &str) -> Result<(), StoreError> {
    let mut tables = self.tables.write().await;
    let progress = tables.progress.entry(user.to_string()).or_insert_with(|| Progress::new(user));
    progress.avatar_id = avatar_id.to_string();
    Ok(())
  }

  async fn log_interaction(&self, record: &InteractionRecord) -> Result<(), StoreError> {
    self.tables.write().await.interactions.push(record.clone());
    Ok(())
  }

  async fn log_quiz(&self, record: &QuizRecord) -> Result<(), StoreError> {
    self.tables.write().await.quizzes.push(record.clone());
    Ok(())
  }

  async fn create_conversation(&self, user: &str, name: &str) -> Result<Conversation, StoreError> {
    let mut tables = self.tables.write().await;
    tables.next_conversation_id += 1;
    let conversation = Conversation {
      id: tables.next_conversation_id,
      user: user.to_string(),
      name: name.to_string(),
      created_at: Utc::now(),
    };
    tables.conversations.push(conversation.clone());
    Ok(conversation)
  }

  async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, StoreError> {
    let tables = self.tables.read().await;
    // Newest first; ids break ties between equal timestamps
    let mut owned: Vec<Conversation> =
      tables.conversations.iter().filter(|c| c.user == user).cloned().collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(owned)
  }

  async fn get_conversation(&self, user: &str, id: i32) -> Result<Option<Conversation>, StoreError> {
    let tables = self.tables.read().await;
    Ok(tables.conversations.iter().find(|c| c.id == id && c.user == user).cloned())
  }

  async fn rename_conversation(&self, user: &str, id: i32, name: &str) -> Result<bool, StoreError> {
    let mut tables = self.tables.write().await;
    match tables.conversations.iter_mut().find(|c| c.id == id && c.user == user) {
      Some(conversation) => {
        conversation.name = name.to_string();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn delete_conversation(&self, user: &str, id: i32) -> Result<bool, StoreError> {
    let mut tables = self.tables.write().await;
    let before = tables.conversations.len();
    tables.conversations.retain(|c| !(c.id == id && c.user == user));
    if tables.conversations.len() == before {
      return Ok(false);
    }
    tables.messages.retain(|m| m.conv_id != id);
    Ok(true)
  }

  async fn append_message(&self, conv_id: i32, message: &NewMessage) -> Result<Message, StoreError> {
    let mut tables = self.tables.write().await;
    if !tables.conversations.iter().any(|c| c.id == conv_id) {
      return Err(StoreError::Corrupt(format!("conversation {conv_id} does not exist")));
    }
    tables.next_message_id += 1;
    let stored = Message {
      id: tables.next_message_id,
      conv_id,
      role: message.role,
      content: message.content.clone(),
      topic: message.topic.clone(),
      created_at: Utc::now(),
    };
    tables.messages.push(stored.clone());
    Ok(stored)
  }

  async fn list_messages(&self, conv_id: i32) -> Result<Vec<Message>, StoreError> {
    let tables = self.tables.read().await;
    Ok(tables.messages.iter().filter(|m| m.conv_id == conv_id).cloned().collect())
  }

  async fn list_avatars(&self) -> Result<Vec<Avatar>, StoreError> {
    Ok(self.avatars.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MessageRole;

  #[tokio::test]
  async fn test_progress_round_trip() {
    let store = MemoryStore::new();
    assert_eq!(store.load_progress("ana").await.unwrap(), Progress::new("ana"));

    let mut progress = Progress::new("ana");
    progress.add_points(20);
    progress.learn("Herencia");
    progress.recommended = vec!["Hilos".into(), "Clases".into()];
    store.save_progress(&progress).await.unwrap();

    assert_eq!(store.load_progress("ana").await.unwrap(), progress);
  }

  #[tokio::test]
  async fn test_set_avatar_creates_progress() {
    let store = MemoryStore::new();
    store.set_avatar("ana", "robot").await.unwrap();
    assert_eq!(store.load_progress("ana").await.unwrap().avatar_id, "robot");
  }

  #[tokio::test]
  async fn test_conversations_are_scoped_to_owner() {
    let store = MemoryStore::new();
    let first = store.create_conversation("ana", "Herencia").await.unwrap();
    let second = store.create_conversation("ana", "Hilos").await.unwrap();
    store.create_conversation("luis", "Clases").await.unwrap();

    let listed = store.list_conversations("ana").await.unwrap();
    assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), vec![second.id, first.id]);

    assert!(store.get_conversation("luis", first.id).await.unwrap().is_none());
    assert!(!store.rename_conversation("luis", first.id, "robada").await.unwrap());
    assert!(store.rename_conversation("ana", first.id, "POO").await.unwrap());
    assert_eq!(store.get_conversation("ana", first.id).await.unwrap().unwrap().name, "POO");
  }

  #[tokio::test]
  async fn test_delete_cascades_to_messages() {
    let store = MemoryStore::new();
    let conversation = store.create_conversation("ana", "Herencia").await.unwrap();
    store.append_message(conversation.id, &NewMessage::user("¿Qué es?")).await.unwrap();
    let reply = store
      .append_message(conversation.id, &NewMessage::bot("Es...", Some("Herencia".into())))
      .await
      .unwrap();
    assert_eq!(reply.role, MessageRole::Bot);

    let messages = store.list_messages(conversation.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].id < messages[1].id);

    assert!(!store.delete_conversation("luis", conversation.id).await.unwrap());
    assert!(store.delete_conversation("ana", conversation.id).await.unwrap());
    assert!(store.list_messages(conversation.id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_logs_are_appended() {
    let store = MemoryStore::new();
    store
      .log_quiz(&QuizRecord {
        user: "ana".into(),
        question: "¿?".into(),
        answer: "Verdadero".into(),
        correct: true,
        points: 10,
        topic: "Herencia".into(),
      })
      .await
      .unwrap();
    assert_eq!(store.quiz_logs().await.len(), 1);
    assert!(store.interactions().await.is_empty());
    assert_eq!(store.list_avatars().await.unwrap()[0].avatar_id, "default");
  }
}
