use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::ingest::ObjectId;

pub mod local;
pub mod memory;
pub mod s3;

pub const CANONICAL_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
  pub key: String,
  pub size: u64,
  /// The object was already stored and no bytes were written.
  pub already_present: bool,
}

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("object not found: {0}")]
  NotFound(ObjectId),
  #[error("failed to write object {id}: {source:#}")]
  Write {
    id: ObjectId,
    #[source]
    source: anyhow::Error,
  },
  #[error("failed to read object {id}: {source:#}")]
  Read {
    id: ObjectId,
    #[source]
    source: anyhow::Error,
  },
}

/// Content addressed image store.
///
/// Keys are derived from the [`ObjectId`] alone, so writing the same id twice
/// always writes the same bytes and concurrent writers never conflict.
#[async_trait]
pub trait Storage: Send + Sync {
  /// Returns [`StorageError::NotFound`] when nothing is stored under `id`.
  async fn get(&self, id: &ObjectId) -> Result<Bytes, StorageError>;

  /// Stores `data` under `id`. Either the whole object becomes visible or
  /// nothing does.
  async fn put(&self, id: &ObjectId, data: Bytes) -> Result<PutObjectOutput, StorageError>;
}
