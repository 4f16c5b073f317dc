//! Text-to-speech endpoint

use axum::{
  extract::{rejection::JsonRejection, Extension, Json, State},
  http::header::CONTENT_TYPE,
  response::{IntoResponse, Response},
};
use tracing::debug;

use crate::server::handlers::enforce_rate_limit;
use crate::server::types::TtsRequest;
use crate::server::{error::AppError, middleware::RequestContext, state::AppState};
use crate::tts::prepare_text;

pub const AUDIO_MIME: &str = "audio/mp3";

/// POST /tts - Speak a piece of text
pub async fn synthesize(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, AppError> {
  enforce_rate_limit(&state, &context).await?;
  let Json(request) = payload?;

  let text = prepare_text(&request.text)?;

  let audio = match state.tts_cache.get(&text).await {
    Some(audio) => {
      debug!(request_id = %context.request_id, "TTS cache hit");
      audio
    }
    None => {
      let audio = state.tts.synthesize(&text).await?;
      state.tts_cache.insert(text, audio.clone()).await;
      audio
    }
  };

  Ok(([(CONTENT_TYPE, AUDIO_MIME)], audio).into_response())
}
