//! Quiz endpoints

use axum::{
  extract::{rejection::JsonRejection, Extension, Json, State},
  response::Json as ResponseJson,
};
use tracing::{debug, error, info};

use crate::quiz::{self, Quiz, QuizKind};
use crate::sanitize::sanitize;
use crate::server::handlers::{enforce_rate_limit, load_progress, save_progress};
use crate::server::types::{AnswerQuizRequest, AnswerQuizResponse, QuizRequest};
use crate::server::{error::AppError, middleware::RequestContext, state::AppState};
use crate::store::QuizRecord;

const MAX_FIELD_CHARS: usize = 500;
const DEFAULT_QUESTION: &str = "Pregunta de quiz";

/// POST /quiz - Generate one quiz question
pub async fn generate_quiz(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<ResponseJson<Quiz>, AppError> {
  enforce_rate_limit(&state, &context).await?;
  let Json(request) = payload?;

  let kind = QuizKind::parse(&sanitize(request.tipo_quiz.as_deref().unwrap_or_default(), 50))?;
  let requested_topic = request.tema.as_deref().map(|t| sanitize(t, 100));
  let level = request.nivel.as_deref().map(|n| sanitize(n, 20)).unwrap_or_default();
  let user = context.user(request.usuario.as_deref());

  let catalog = state.topics.snapshot().await;
  let topic = quiz::choose_topic(&catalog, requested_topic.as_deref())?;

  let quiz = quiz::generate(state.llm.as_ref(), kind, &topic, &level).await;
  info!(request_id = %context.request_id, "Quiz generated for {user} on '{topic}'");
  Ok(ResponseJson(quiz))
}

/// POST /responder_quiz - Grade an answer and update progress
pub async fn answer_quiz(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<AnswerQuizRequest>, JsonRejection>,
) -> Result<ResponseJson<AnswerQuizResponse>, AppError> {
  enforce_rate_limit(&state, &context).await?;
  let Json(request) = payload?;

  let answer = sanitize(&request.respuesta, MAX_FIELD_CHARS);
  let correct_answer = sanitize(&request.respuesta_correcta, MAX_FIELD_CHARS);
  let topic = sanitize(&request.tema, 100);
  let question = request
    .pregunta
    .as_deref()
    .map(|p| sanitize(p, MAX_FIELD_CHARS))
    .filter(|p| !p.is_empty())
    .unwrap_or_else(|| DEFAULT_QUESTION.to_string());

  if answer.is_empty() || correct_answer.is_empty() || topic.is_empty() {
    return Err(AppError::bad_request(
      "Faltan datos requeridos (respuesta, respuesta_correcta o tema)",
    ));
  }

  let user = context.user(request.usuario.as_deref());
  let grade = quiz::grade(&answer, &correct_answer, state.config.quiz_points);
  let feedback =
    quiz::feedback(state.llm.as_ref(), &question, &answer, &correct_answer, &topic, &grade).await;

  let record = QuizRecord {
    user: user.clone(),
    question,
    answer,
    correct: grade.correct,
    points: grade.points,
    topic: topic.clone(),
  };
  if let Err(e) = state.store.log_quiz(&record).await {
    error!("Error logging quiz answer for {user}: {e}");
  }

  let catalog = state.topics.snapshot().await;
  let mut progress = load_progress(&state, &user).await;
  progress.add_points(grade.points);
  if grade.correct {
    match catalog.get(&topic) {
      Some(known) => {
        progress.learn(&known.name);
      }
      None => debug!(
        request_id = %context.request_id,
        "Topic '{topic}' is not in the catalog, not marking it learned"
      ),
    }
  }
  save_progress(&state, &progress).await;

  info!(
    request_id = %context.request_id,
    "Quiz answer for {user}: correct={}, points={}, total={}",
    grade.correct,
    grade.points,
    progress.points
  );

  Ok(ResponseJson(AnswerQuizResponse {
    es_correcta: grade.correct,
    respuesta: feedback.clone(),
    explicacion: feedback,
    puntos: grade.points,
    puntos_totales: progress.points,
  }))
}
