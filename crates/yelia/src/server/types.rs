//! Request and response bodies
//!
//! Field names follow the Spanish wire format the web client already speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resolver::{AnswerSource, HistoryEntry};
use crate::store::{Avatar, Conversation, Message};

// Status/Version Endpoints
// =======================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
  pub status: String,
  pub version: String,
  /// Store backend and whether it answered a health check
  pub store: StoreStatus,
  /// Number of topics in the loaded catalog
  pub topics: usize,
  pub llm_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
  pub backend: String,
  pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
  pub version: String,
}

// Answer Endpoints
// ================

#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
  #[serde(default)]
  pub pregunta: String,
  pub usuario: Option<String>,
  pub nivel_explicacion: Option<String>,
  #[serde(default)]
  pub historial: Vec<HistoryEntry>,
  pub conv_id: Option<i32>,
  pub avatar_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
  pub respuesta: String,
  pub conv_id: Option<i32>,
  pub fuente: AnswerSource,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tema: Option<String>,
  pub video_url: Option<String>,
}

// Quiz Endpoints
// ==============

#[derive(Debug, Default, Deserialize)]
pub struct QuizRequest {
  pub usuario: Option<String>,
  pub tipo_quiz: Option<String>,
  pub tema: Option<String>,
  pub nivel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnswerQuizRequest {
  #[serde(default)]
  pub respuesta: String,
  #[serde(default)]
  pub respuesta_correcta: String,
  #[serde(default)]
  pub tema: String,
  pub pregunta: Option<String>,
  pub usuario: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnswerQuizResponse {
  pub es_correcta: bool,
  pub respuesta: String,
  pub explicacion: String,
  pub puntos: i32,
  pub puntos_totales: i32,
}

// Recommendation, Progress and Catalog Endpoints
// ==============================================

#[derive(Debug, Default, Deserialize)]
pub struct RecommendRequest {
  pub usuario: Option<String>,
  #[serde(default)]
  pub historial: Vec<HistoryEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
  pub usuario: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
  pub recommendation: String,
  pub tema: String,
}

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
  #[serde(default)]
  pub avatar_id: String,
  pub usuario: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvatarsResponse {
  pub avatars: Vec<Avatar>,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
  pub temas: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
  #[serde(default)]
  pub text: String,
}

// Conversation Endpoints
// ======================

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
  pub id: i32,
  pub nombre: String,
  pub created_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
  fn from(conversation: Conversation) -> Self {
    Self { id: conversation.id, nombre: conversation.name, created_at: conversation.created_at }
  }
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
  pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationRequest {
  pub nombre: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
  pub id: i32,
  pub nombre: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
  pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
  pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct NewMessageRequest {
  #[serde(default)]
  pub role: String,
  #[serde(default)]
  pub content: String,
  pub tema: Option<String>,
}
