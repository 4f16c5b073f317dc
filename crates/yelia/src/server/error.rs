//! Error responses
//!
//! Every failure leaves the API as `{"error": "<message>"}` with a status code
//! chosen by the variant.

use axum::{
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::quiz::QuizError;
use crate::store::StoreError;
use crate::tts::TtsError;

#[derive(Error, Debug)]
pub enum AppError {
  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  NotFound(String),

  #[error("Demasiadas solicitudes, intenta de nuevo en un minuto")]
  RateLimited,

  #[error("{0}")]
  Upstream(String),

  #[error("{0}")]
  Internal(String),
}

impl AppError {
  pub fn bad_request(message: impl Into<String>) -> Self {
    AppError::BadRequest(message.into())
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    AppError::NotFound(message.into())
  }

  pub fn status(&self) -> StatusCode {
    match self {
      AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
      AppError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("Request failed with {status}: {self}");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

impl From<JsonRejection> for AppError {
  fn from(rejection: JsonRejection) -> Self {
    AppError::BadRequest(format!("JSON inválido: {}", rejection.body_text()))
  }
}

impl From<QueryRejection> for AppError {
  fn from(rejection: QueryRejection) -> Self {
    AppError::BadRequest(format!("Parámetros inválidos: {}", rejection.body_text()))
  }
}

impl From<PathRejection> for AppError {
  fn from(rejection: PathRejection) -> Self {
    AppError::BadRequest(format!("Ruta inválida: {}", rejection.body_text()))
  }
}

impl From<StoreError> for AppError {
  fn from(e: StoreError) -> Self {
    error!("Store error: {e}");
    AppError::Internal("Error de base de datos".to_string())
  }
}

impl From<QuizError> for AppError {
  fn from(e: QuizError) -> Self {
    match e {
      QuizError::InvalidKind(_) | QuizError::UnknownTopic(_) => AppError::BadRequest(e.to_string()),
      QuizError::EmptyCatalog | QuizError::Invalid(_) => AppError::Internal(e.to_string()),
    }
  }
}

impl From<TtsError> for AppError {
  fn from(e: TtsError) -> Self {
    match e {
      TtsError::EmptyText | TtsError::InvalidCharacters => AppError::BadRequest(e.to_string()),
      TtsError::Network(_) | TtsError::Upstream { .. } => {
        AppError::Upstream(format!("Error al generar el audio: {e}"))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(AppError::bad_request("x").status(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(AppError::from(TtsError::Upstream { status: 502 }).status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(AppError::from(TtsError::EmptyText).status(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::from(QuizError::EmptyCatalog).status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(AppError::from(QuizError::UnknownTopic("x".into())).status(), StatusCode::BAD_REQUEST);
  }
}
