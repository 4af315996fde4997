//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure is rendered as `{"success": false, "error": "...",
//! "details": [...]}`; `details` is only present for validation failures.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use permit_core::{store::StoreError, validate::ValidationErrors};
use serde::Serialize;
use thiserror::Error;

use crate::auth::TokenError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("validation error: {0}")]
  Validation(ValidationErrors),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("{0}")]
  Unauthorized(String),

  #[error("Insufficient permissions")]
  Forbidden,

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(String),

  /// Logged in full; the client only sees a generic message.
  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error through [`StoreError`].
  pub fn store<E: StoreError>(e: E) -> Self {
    if e.is_conflict() {
      ApiError::Conflict(e.to_string())
    } else if e.is_not_found() {
      ApiError::NotFound(e.to_string())
    } else {
      ApiError::Internal(Box::new(e))
    }
  }

  pub fn internal(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    ApiError::Internal(Box::new(e))
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden => StatusCode::FORBIDDEN,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  success: bool,
  error:   String,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<ValidationErrors>,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = match self {
      ApiError::Validation(details) => ErrorBody {
        success: false,
        error:   "Validation error".into(),
        details: Some(details),
      },
      ApiError::BadRequest(m)
      | ApiError::Unauthorized(m)
      | ApiError::NotFound(m)
      | ApiError::Conflict(m) => ErrorBody { success: false, error: m, details: None },
      ApiError::Forbidden => ErrorBody {
        success: false,
        error:   "Insufficient permissions".into(),
        details: None,
      },
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        ErrorBody {
          success: false,
          error:   "Internal server error".into(),
          details: None,
        }
      }
    };
    (status, Json(body)).into_response()
  }
}

impl From<ValidationErrors> for ApiError {
  fn from(e: ValidationErrors) -> Self { ApiError::Validation(e) }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<TokenError> for ApiError {
  fn from(e: TokenError) -> Self { ApiError::Unauthorized(e.to_string()) }
}
