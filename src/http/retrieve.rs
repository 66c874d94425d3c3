use axum::{
  extract::{Path, State},
  http::header,
  response::{IntoResponse, Response},
};
use tracing::debug;

use crate::http::error::AppError;
use crate::http::AppState;
use crate::ingest::ObjectId;
use crate::storage::CANONICAL_MIME;

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

#[utoipa::path(
  get,
  path = "/{id}",
  params(("id" = String, Path, description = "Object id returned by the upload")),
  responses(
    (status = 200, description = "Stored image", body = Vec<u8>, content_type = "image/jpeg"),
    (status = 404, description = "No image stored under this id"),
    (status = 500, description = "Storage read failed")
  )
)]
pub async fn retrieve(
  Path(raw_id): Path<String>,
  State(state): State<AppState>,
) -> Result<Response, AppError> {
  // Only a well formed id may reach the storage backend
  let id = ObjectId::parse(&raw_id).map_err(|e| {
    debug!("rejected object id {:?}: {}", raw_id, e);
    AppError::NotFound
  })?;

  let data = state.storage_client.get(&id).await?;

  let headers = [
    (header::CONTENT_TYPE, CANONICAL_MIME),
    (header::CACHE_CONTROL, IMMUTABLE),
  ];

  Ok((headers, data).into_response())
}
