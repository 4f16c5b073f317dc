//! Axum router configuration for all endpoints

use axum::{
  middleware,
  routing::{get, post, put},
  Router,
};

use crate::server::handlers::{ask, conversations, progress, quiz, recommend, status, tts};
use crate::server::middleware::request_context_middleware;
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
  Router::new()
    // Status and version endpoints
    .route("/status", get(status::status))
    .route("/version", get(status::version))
    // Answers
    .route("/ask", post(ask::ask))
    .route("/buscar_respuesta", post(ask::ask))
    // Quizzes
    .route("/quiz", post(quiz::generate_quiz))
    .route("/responder_quiz", post(quiz::answer_quiz))
    // Speech
    .route("/tts", post(tts::synthesize))
    // Recommendations
    .route("/recommend", post(recommend::recommend_topic))
    .route("/recomendacion", get(recommend::recommendation))
    // Progress and catalog
    .route("/progreso", get(progress::get_progress))
    .route("/progreso/avatar", put(progress::set_avatar))
    .route("/avatars", get(progress::list_avatars))
    .route("/temas", get(progress::list_topics))
    // Conversations
    .route(
      "/conversations",
      get(conversations::list_conversations).post(conversations::create_conversation),
    )
    .route(
      "/conversations/{id}",
      put(conversations::rename_conversation).delete(conversations::delete_conversation),
    )
    .route(
      "/messages/{conv_id}",
      get(conversations::list_messages).post(conversations::append_message),
    )
    .layer(middleware::from_fn_with_state(state.clone(), request_context_middleware))
    .with_state(state)
}
