use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::ingest::IngestError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
  #[error("bad request {0}")]
  BadRequest(String),
  #[error("not found")]
  NotFound,
  #[error("payload too large")]
  PayloadTooLarge,
  #[error("internal server error {0}")]
  InternalServerError(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::BadRequest(msg) => {
        warn!("rejected request: {}", msg);
        (StatusCode::BAD_REQUEST, format!("{}\n", msg)).into_response()
      }
      AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
      AppError::PayloadTooLarge => {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response()
      }
      AppError::InternalServerError(msg) => {
        error!("request failed: {}", msg);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", msg)).into_response()
      }
    }
  }
}

impl From<IngestError> for AppError {
  fn from(e: IngestError) -> Self {
    match e {
      IngestError::UnsupportedFormat => AppError::BadRequest(e.to_string()),
      IngestError::Decode(_) | IngestError::Encode(_) | IngestError::Hash(_) => {
        AppError::InternalServerError(e.to_string())
      }
    }
  }
}

impl From<StorageError> for AppError {
  fn from(e: StorageError) -> Self {
    match e {
      StorageError::NotFound(_) => AppError::NotFound,
      StorageError::Write { .. } | StorageError::Read { .. } => {
        AppError::InternalServerError(e.to_string())
      }
    }
  }
}
