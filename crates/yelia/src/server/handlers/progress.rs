//! Progress, avatar and catalog endpoints

use axum::{
  extract::{
    rejection::{JsonRejection, QueryRejection},
    Extension, Json, Query, State,
  },
  response::Json as ResponseJson,
};
use tracing::info;

use crate::sanitize::sanitize;
use crate::server::handlers::load_progress;
use crate::server::types::{AvatarRequest, AvatarsResponse, TopicsResponse, UserQuery};
use crate::server::{error::AppError, middleware::RequestContext, state::AppState};
use crate::store::Progress;

/// GET /progreso - Points, learned topics and avatar of a user
pub async fn get_progress(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<ResponseJson<Progress>, AppError> {
  let Query(query) = query?;
  let user = context.user(query.usuario.as_deref());
  Ok(ResponseJson(load_progress(&state, &user).await))
}

/// PUT /progreso/avatar - Select one of the known avatars
pub async fn set_avatar(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<AvatarRequest>, JsonRejection>,
) -> Result<ResponseJson<Progress>, AppError> {
  let Json(request) = payload?;
  let avatar_id = sanitize(&request.avatar_id, 50);
  if avatar_id.is_empty() {
    return Err(AppError::bad_request("Falta avatar_id"));
  }

  let avatars = state.store.list_avatars().await?;
  if !avatars.iter().any(|a| a.avatar_id == avatar_id) {
    return Err(AppError::not_found(format!("Avatar no encontrado: {avatar_id}")));
  }

  let user = context.user(request.usuario.as_deref());
  state.store.set_avatar(&user, &avatar_id).await?;
  info!(request_id = %context.request_id, "Avatar of {user} set to '{avatar_id}'");

  Ok(ResponseJson(load_progress(&state, &user).await))
}

/// GET /avatars - Available avatars
pub async fn list_avatars(State(state): State<AppState>) -> Result<ResponseJson<AvatarsResponse>, AppError> {
  let avatars = state.store.list_avatars().await?;
  Ok(ResponseJson(AvatarsResponse { avatars }))
}

/// GET /temas - Topic names in catalog order
pub async fn list_topics(State(state): State<AppState>) -> ResponseJson<TopicsResponse> {
  let catalog = state.topics.snapshot().await;
  ResponseJson(TopicsResponse { temas: catalog.topic_names() })
}
