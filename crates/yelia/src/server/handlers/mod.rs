//! Endpoint handlers

pub mod ask;
pub mod conversations;
pub mod progress;
pub mod quiz;
pub mod recommend;
pub mod status;
pub mod tts;

use tracing::error;

use crate::server::{error::AppError, middleware::RequestContext, state::AppState};
use crate::store::Progress;

/// Count the request against its route's allowance for the caller
pub(crate) async fn enforce_rate_limit(state: &AppState, context: &RequestContext) -> Result<(), AppError> {
  if state.limiter.check(context.uri.path(), &context.rate_limit_key()).await {
    Ok(())
  } else {
    Err(AppError::RateLimited)
  }
}

/// Stored progress, or a fresh default when the store cannot be read
pub(crate) async fn load_progress(state: &AppState, user: &str) -> Progress {
  state.store.load_progress(user).await.unwrap_or_else(|e| {
    error!("Error loading progress for {user}: {e}");
    Progress::new(user)
  })
}

/// Persist progress; a failed write is logged and dropped
pub(crate) async fn save_progress(state: &AppState, progress: &Progress) {
  if let Err(e) = state.store.save_progress(progress).await {
    error!("Error saving progress for {}: {e}", progress.user);
  }
}
