//! Question answering endpoint

use axum::{
  extract::{rejection::JsonRejection, Extension, Json, State},
  response::Json as ResponseJson,
};
use tracing::{error, info};

use crate::resolver::{AnswerResolver, ExplanationLevel, HistoryEntry, MAX_HISTORY};
use crate::sanitize::sanitize;
use crate::server::handlers::enforce_rate_limit;
use crate::server::types::{AskRequest, AskResponse};
use crate::server::{error::AppError, middleware::RequestContext, state::AppState};
use crate::store::{InteractionRecord, NewMessage};

const MAX_QUESTION_CHARS: usize = 500;
const MAX_HISTORY_CHARS: usize = 2000;
const CONVERSATION_NAME_CHARS: usize = 40;

fn clean_history(history: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
  let start = history.len().saturating_sub(MAX_HISTORY);
  history
    .into_iter()
    .skip(start)
    .map(|entry| HistoryEntry {
      question: sanitize(&entry.question, MAX_QUESTION_CHARS),
      answer: sanitize(&entry.answer, MAX_HISTORY_CHARS),
    })
    .collect()
}

/// Conversation the exchange belongs to, creating one when the request has none
async fn ensure_conversation(
  state: &AppState,
  owner: &str,
  requested: Option<i32>,
  question: &str,
) -> Option<i32> {
  if let Some(id) = requested {
    match state.store.get_conversation(owner, id).await {
      Ok(Some(conversation)) => return Some(conversation.id),
      Ok(None) => info!("Conversation {id} not found for this session, starting a new one"),
      Err(e) => error!("Error loading conversation {id}: {e}"),
    }
  }

  let name: String = question.chars().take(CONVERSATION_NAME_CHARS).collect();
  match state.store.create_conversation(owner, &name).await {
    Ok(conversation) => Some(conversation.id),
    Err(e) => {
      error!("Error creating conversation: {e}");
      None
    }
  }
}

/// POST /ask and /buscar_respuesta - Answer a course question
pub async fn ask(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<ResponseJson<AskResponse>, AppError> {
  enforce_rate_limit(&state, &context).await?;
  let Json(request) = payload?;

  let question = sanitize(&request.pregunta, MAX_QUESTION_CHARS);
  if question.is_empty() {
    return Err(AppError::bad_request("La pregunta no puede estar vacía"));
  }

  let user = context.user(request.usuario.as_deref());
  let level = ExplanationLevel::parse_or_default(request.nivel_explicacion.as_deref());
  let history = clean_history(request.historial);
  let avatar_id = request.avatar_id.map(|a| sanitize(&a, 50)).filter(|a| !a.is_empty());

  let catalog = state.topics.snapshot().await;
  let resolution = AnswerResolver::new(&catalog, state.llm.as_ref(), state.config.tfidf_min_score)
    .resolve(&question, &history, level)
    .await;
  info!(
    request_id = %context.request_id,
    "Answered question for {user} from {:?} at level '{}'",
    resolution.source,
    level.as_str()
  );

  let conv_id = ensure_conversation(&state, &context.session_id, request.conv_id, &question).await;
  if let Some(id) = conv_id {
    let messages =
      [NewMessage::user(question.clone()), NewMessage::bot(resolution.answer.clone(), resolution.topic.clone())];
    for message in &messages {
      if let Err(e) = state.store.append_message(id, message).await {
        error!("Error saving message in conversation {id}: {e}");
      }
    }
  }

  let record = InteractionRecord {
    user: user.clone(),
    question,
    answer: resolution.answer.clone(),
    level: level.as_str().to_string(),
    avatar_id,
  };
  if let Err(e) = state.store.log_interaction(&record).await {
    error!("Error logging interaction for {user}: {e}");
  }

  Ok(ResponseJson(AskResponse {
    respuesta: resolution.answer,
    conv_id,
    fuente: resolution.source,
    tema: resolution.topic,
    video_url: None,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clean_history_keeps_last_entries_sanitized() {
    let history: Vec<HistoryEntry> = (0..8)
      .map(|i| HistoryEntry { question: format!("<b>p{i}</b>"), answer: format!("r{i}") })
      .collect();
    let cleaned = clean_history(history);
    assert_eq!(cleaned.len(), MAX_HISTORY);
    assert_eq!(cleaned[0].question, "p3");
    assert_eq!(cleaned[4].answer, "r7");
  }
}
