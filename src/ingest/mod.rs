//! Upload pipeline: sniff, normalize to JPEG, then derive the object id.
//!
//! Everything in here is synchronous and CPU bound. Callers on the async
//! runtime hand the work to the rayon pool.

use std::io::{self, Cursor};

use bytes::Bytes;
use thiserror::Error;

pub mod hash;
pub mod normalize;
pub mod object_id;
pub mod sniff;

pub use normalize::CanonicalImage;
pub use object_id::{InvalidObjectId, ObjectId};
pub use sniff::DetectedFormat;

#[derive(Error, Debug)]
pub enum IngestError {
  #[error("unsupported image format, expected png or jpeg")]
  UnsupportedFormat,
  #[error("failed to decode image: {0}")]
  Decode(#[source] image::ImageError),
  #[error("failed to encode image: {0}")]
  Encode(#[source] image::ImageError),
  #[error("failed to hash image: {0}")]
  Hash(#[source] io::Error),
}

/// An upload that made it through the pipeline and is ready to be stored.
#[derive(Debug, Clone)]
pub struct IngestedImage {
  pub id: ObjectId,
  pub format: DetectedFormat,
  pub image: CanonicalImage,
}

pub fn ingest(upload: Bytes) -> Result<IngestedImage, IngestError> {
  let mut stream = Cursor::new(upload);

  let format = sniff::sniff(&mut stream);
  let image = normalize::normalize(stream, format)?;
  let id = hash::content_hash(&mut Cursor::new(image.bytes.clone())).map_err(IngestError::Hash)?;

  Ok(IngestedImage { id, format, image })
}
