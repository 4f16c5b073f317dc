//! Recommendation endpoints

use axum::{
  extract::{
    rejection::{JsonRejection, QueryRejection},
    Extension, Json, Query, State,
  },
  response::Json as ResponseJson,
};

use crate::recommend::recommend;
use crate::resolver::{HistoryEntry, MAX_HISTORY};
use crate::server::handlers::{enforce_rate_limit, load_progress, save_progress};
use crate::server::types::{RecommendRequest, RecommendResponse, UserQuery};
use crate::server::{error::AppError, middleware::RequestContext, state::AppState};

async fn recommend_for(
  state: &AppState,
  user: &str,
  history: &[HistoryEntry],
) -> Result<ResponseJson<RecommendResponse>, AppError> {
  let catalog = state.topics.snapshot().await;
  let mut progress = load_progress(state, user).await;

  let start = history.len().saturating_sub(MAX_HISTORY);
  let recommendation = recommend(
    state.llm.as_ref(),
    &catalog,
    &progress.learned,
    &progress.recommended,
    &history[start..],
    state.config.recommendation_window(),
  )
  .await
  .ok_or_else(|| AppError::Internal("No hay temas disponibles".to_string()))?;

  progress.recommended = recommendation.history;
  save_progress(state, &progress).await;

  Ok(ResponseJson(RecommendResponse { recommendation: recommendation.text, tema: recommendation.topic }))
}

/// POST /recommend - Recommend the next topic using the recent history
pub async fn recommend_topic(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<ResponseJson<RecommendResponse>, AppError> {
  enforce_rate_limit(&state, &context).await?;
  let Json(request) = payload?;
  let user = context.user(request.usuario.as_deref());
  recommend_for(&state, &user, &request.historial).await
}

/// GET /recomendacion - Recommend the next topic without history
pub async fn recommendation(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<ResponseJson<RecommendResponse>, AppError> {
  let Query(query) = query?;
  let user = context.user(query.usuario.as_deref());
  recommend_for(&state, &user, &[]).await
}
