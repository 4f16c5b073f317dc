//! Status and version endpoint handlers

use axum::{extract::State, response::Json};
use tracing::warn;

use crate::server::state::AppState;
use crate::server::types::{StatusResponse, StoreStatus, VersionResponse};

/// GET /status - Health check endpoint
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
  let healthy = match state.store.health().await {
    Ok(()) => true,
    Err(e) => {
      warn!("Store health check failed: {e}");
      false
    }
  };
  let topics = state.topics.snapshot().await.len();

  Json(StatusResponse {
    status: if healthy { "healthy" } else { "degraded" }.to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    store: StoreStatus { backend: state.store.backend().to_string(), healthy },
    topics,
    llm_configured: state.config.groq_api_key.as_deref().is_some_and(|k| !k.trim().is_empty()),
  })
}

/// GET /version - Returns current API version
pub async fn version() -> Json<VersionResponse> {
  Json(VersionResponse { version: env!("CARGO_PKG_VERSION").to_string() })
}
