use axum::{
  extract::{self, State},
  http::StatusCode,
  response::Html,
};
use bytes::Bytes;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::http::error::AppError;
use crate::http::AppState;
use crate::ingest;

pub const UPLOAD_FIELD: &str = "file";

/// Multipart body accepted by [`upload`].
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
  /// PNG or JPEG image
  #[schema(value_type = String, format = Binary)]
  file: Vec<u8>,
}

#[utoipa::path(
  post,
  path = "/upload",
  request_body(content = UploadForm, content_type = "multipart/form-data"),
  responses(
    (status = 200, description = "Image stored, body links to it", body = String, content_type = "text/html"),
    (status = 400, description = "Missing file field or unsupported image format"),
    (status = 413, description = "Upload exceeds the body size limit"),
    (status = 500, description = "Decoding, encoding or storage failed")
  )
)]
pub async fn upload(
  State(state): State<AppState>,
  mut multipart: extract::Multipart,
) -> Result<Html<String>, AppError> {
  let mut uploaded_image: Option<Bytes> = None;

  while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
    if field.name() == Some(UPLOAD_FIELD) {
      uploaded_image = Some(field.bytes().await.map_err(multipart_error)?);
      break;
    }
  }

  let uploaded_image = uploaded_image.ok_or_else(|| {
    AppError::BadRequest(format!(
      "error retrieving file: missing form field \"{}\"",
      UPLOAD_FIELD
    ))
  })?;
  let upload_size = uploaded_image.len();

  // Decoding and encoding are CPU bound, keep them off the runtime
  let (send, recv) = tokio::sync::oneshot::channel();
  rayon::spawn(move || {
    let _ = send.send(ingest::ingest(uploaded_image));
  });

  let ingested = recv.await.map_err(|e| {
    error!("failed to receive: {}", e);
    AppError::InternalServerError(e.to_string())
  })??;

  metrics::counter!("stash_uploads_total", "format" => ingested.format.as_str()).increment(1);

  let passthrough = ingested.image.passthrough;
  let put = state
    .storage_client
    .put(&ingested.id, ingested.image.bytes)
    .await?;

  let outcome = if put.already_present { "existing" } else { "created" };
  metrics::counter!("stash_objects_stored_total", "outcome" => outcome).increment(1);

  info!(
    "stored {} upload ({} bytes, {}) as {} ({} bytes, {})",
    ingested.format,
    upload_size,
    if passthrough { "kept as is" } else { "re-encoded" },
    put.key,
    put.size,
    outcome
  );

  Ok(Html(format!(
    r#"<a href="/{id}">{id}</a>"#,
    id = ingested.id
  )))
}

fn multipart_error(e: extract::multipart::MultipartError) -> AppError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    return AppError::PayloadTooLarge;
  }

  AppError::BadRequest(format!("error retrieving file: {}", e.body_text()))
}
