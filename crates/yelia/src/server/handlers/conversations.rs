//! Conversation and message endpoints
//!
//! Conversations belong to the anonymous session; ids owned by another
//! session are reported as not found.

use axum::{
  extract::{
    rejection::{JsonRejection, PathRejection},
    Extension, Json, Path, State,
  },
  response::Json as ResponseJson,
};
use tracing::info;

use crate::sanitize::sanitize;
use crate::server::types::{
  ConversationRequest, ConversationResponse, ConversationsResponse, DeletedResponse,
  MessagesResponse, NewMessageRequest,
};
use crate::server::{error::AppError, middleware::RequestContext, state::AppState};
use crate::store::{Message, MessageRole, NewMessage};

const DEFAULT_NAME: &str = "Nueva conversación";
const MAX_NAME_CHARS: usize = 100;
const MAX_CONTENT_CHARS: usize = 5000;

fn not_found(id: i32) -> AppError {
  AppError::not_found(format!("Conversación {id} no encontrada"))
}

async fn require_owned(state: &AppState, owner: &str, id: i32) -> Result<(), AppError> {
  match state.store.get_conversation(owner, id).await? {
    Some(_) => Ok(()),
    None => Err(not_found(id)),
  }
}

/// GET /conversations - Conversations of the current session, newest first
pub async fn list_conversations(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Result<ResponseJson<ConversationsResponse>, AppError> {
  let owner = &context.session_id;
  let conversations = state.store.list_conversations(owner).await?;
  Ok(ResponseJson(ConversationsResponse {
    conversations: conversations.into_iter().map(Into::into).collect(),
  }))
}

/// POST /conversations - Start a conversation
pub async fn create_conversation(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<ConversationRequest>, JsonRejection>,
) -> Result<ResponseJson<ConversationResponse>, AppError> {
  let Json(request) = payload?;
  let name = request
    .nombre
    .as_deref()
    .map(|n| sanitize(n, MAX_NAME_CHARS))
    .filter(|n| !n.is_empty())
    .unwrap_or_else(|| DEFAULT_NAME.to_string());

  let owner = &context.session_id;
  let conversation = state.store.create_conversation(owner, &name).await?;
  info!(request_id = %context.request_id, "Created conversation {}", conversation.id);
  Ok(ResponseJson(ConversationResponse { id: conversation.id, nombre: conversation.name }))
}

/// PUT /conversations/{id} - Rename a conversation
pub async fn rename_conversation(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  id: Result<Path<i32>, PathRejection>,
  payload: Result<Json<ConversationRequest>, JsonRejection>,
) -> Result<ResponseJson<ConversationResponse>, AppError> {
  let Path(id) = id?;
  let Json(request) = payload?;
  let name = request.nombre.as_deref().map(|n| sanitize(n, MAX_NAME_CHARS)).unwrap_or_default();
  if name.is_empty() {
    return Err(AppError::bad_request("El nombre no puede estar vacío"));
  }

  let owner = &context.session_id;
  if !state.store.rename_conversation(owner, id, &name).await? {
    return Err(not_found(id));
  }
  Ok(ResponseJson(ConversationResponse { id, nombre: name }))
}

/// DELETE /conversations/{id} - Delete a conversation and its messages
pub async fn delete_conversation(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  id: Result<Path<i32>, PathRejection>,
) -> Result<ResponseJson<DeletedResponse>, AppError> {
  let Path(id) = id?;
  let owner = &context.session_id;
  if !state.store.delete_conversation(owner, id).await? {
    return Err(not_found(id));
  }
  info!(request_id = %context.request_id, "Deleted conversation {id}");
  Ok(ResponseJson(DeletedResponse { deleted: true }))
}

/// GET /messages/{conv_id} - Messages of a conversation in order
pub async fn list_messages(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  id: Result<Path<i32>, PathRejection>,
) -> Result<ResponseJson<MessagesResponse>, AppError> {
  let Path(conv_id) = id?;
  require_owned(&state, &context.session_id, conv_id).await?;
  let messages = state.store.list_messages(conv_id).await?;
  Ok(ResponseJson(MessagesResponse { messages }))
}

/// POST /messages/{conv_id} - Append a message
pub async fn append_message(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  id: Result<Path<i32>, PathRejection>,
  payload: Result<Json<NewMessageRequest>, JsonRejection>,
) -> Result<ResponseJson<Message>, AppError> {
  let Path(conv_id) = id?;
  let Json(request) = payload?;

  let role = MessageRole::parse(&request.role)
    .ok_or_else(|| AppError::bad_request(format!("Rol inválido: '{}'", request.role)))?;
  let content = sanitize(&request.content, MAX_CONTENT_CHARS);
  if content.is_empty() {
    return Err(AppError::bad_request("El mensaje no puede estar vacío"));
  }
  let topic = request.tema.as_deref().map(|t| sanitize(t, MAX_NAME_CHARS)).filter(|t| !t.is_empty());

  require_owned(&state, &context.session_id, conv_id).await?;
  let message = state.store.append_message(conv_id, &NewMessage { role, content, topic }).await?;
  Ok(ResponseJson(message))
}
