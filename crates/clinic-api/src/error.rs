//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use clinic_core::{Classify, FailureKind};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("authentication required")]
  Unauthorized,

  #[error("invalid username or password")]
  InvalidCredentials,

  #[error("you do not have permission to access this resource")]
  Forbidden,

  #[error("{0}")]
  Validation(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  UnsupportedMedia(String),

  /// The AI analysis service failed or could not be reached.
  #[error("{0}")]
  External(String),

  /// A persistence failure. The detail is logged, never returned.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a classified store or domain error onto its HTTP category.
  pub fn from_store<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    match e.kind() {
      FailureKind::Validation => Self::Validation(e.to_string()),
      FailureKind::NotFound => Self::NotFound(e.to_string()),
      FailureKind::Conflict => Self::Conflict(e.to_string()),
      FailureKind::Persistence => Self::Store(Box::new(e)),
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
      Self::Forbidden => StatusCode::FORBIDDEN,
      Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
      Self::External(_) => StatusCode::BAD_GATEWAY,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<clinic_core::Error> for ApiError {
  fn from(e: clinic_core::Error) -> Self { Self::from_store(e) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      Self::Store(e) => {
        tracing::error!(error = %e, "store failure");
        "an internal error occurred; no changes were saved".to_owned()
      }
      other => other.to_string(),
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if matches!(self, Self::Unauthorized | Self::InvalidCredentials) {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}
