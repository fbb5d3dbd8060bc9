//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use leadline_core::{ErrorKind, store::StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  /// The request itself is at fault: validation, unknown stage, bad JSON.
  #[error("{message}")]
  BadRequest { kind: ErrorKind, message: String },

  #[error("upstream unavailable: {0}")]
  Upstream(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by its [`ErrorKind`].
  pub fn from_store<E: StoreError>(e: E) -> Self {
    match e.kind() {
      ErrorKind::Store => Self::Store(Box::new(e)),
      kind => Self::classified(kind, e.to_string()),
    }
  }

  fn classified(kind: ErrorKind, message: String) -> Self {
    match kind {
      ErrorKind::NotFound => Self::NotFound(message),
      ErrorKind::UpstreamUnavailable => Self::Upstream(message),
      ErrorKind::ValidationFailed | ErrorKind::InvalidStage | ErrorKind::Malformed => {
        Self::BadRequest { kind, message }
      }
      ErrorKind::Store => Self::Store(message.into()),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::BadRequest { kind, .. } => *kind,
      Self::Upstream(_) => ErrorKind::UpstreamUnavailable,
      Self::Store(_) => ErrorKind::Store,
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
      Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<leadline_core::Error> for ApiError {
  fn from(e: leadline_core::Error) -> Self { Self::classified(e.kind(), e.to_string()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use leadline_core::{Error, error::ValidationError};

  use super::*;

  #[test]
  fn core_errors_map_to_statuses() {
    let cases = [
      (Error::from(ValidationError::MissingEmail), StatusCode::BAD_REQUEST),
      (Error::OwnerNotFound(7), StatusCode::NOT_FOUND),
      (
        Error::InvalidStage { pipeline: "sales", value: "Bogus".into() },
        StatusCode::BAD_REQUEST,
      ),
      (
        Error::UpstreamUnavailable(leadline_core::upstream::UpstreamError::Status(502)),
        StatusCode::SERVICE_UNAVAILABLE,
      ),
    ];
    for (err, status) in cases {
      let kind = err.kind();
      let api = ApiError::from(err);
      assert_eq!(api.status(), status);
      assert_eq!(api.kind(), kind);
    }
  }
}
