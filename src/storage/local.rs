use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::ingest::ObjectId;
use crate::storage::{PutObjectOutput, Storage, StorageError};

/// Flat directory of `{id}.jpeg` files. The directory listing is the catalog.
pub struct Client {
  path: PathBuf,
}

impl Client {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  fn object_path(&self, id: &ObjectId) -> PathBuf {
    self.path.join(id.file_name())
  }
}

#[async_trait]
impl Storage for Client {
  async fn get(&self, id: &ObjectId) -> Result<Bytes, StorageError> {
    let file_path = self.object_path(id);

    match tokio::fs::read(&file_path).await {
      Ok(data) => Ok(Bytes::from(data)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(id.clone())),
      Err(e) => Err(StorageError::Read {
        id: id.clone(),
        source: anyhow::Error::new(e)
          .context(format!("failed to read file: {}", file_path.display())),
      }),
    }
  }

  async fn put(&self, id: &ObjectId, data: Bytes) -> Result<PutObjectOutput, StorageError> {
    let file_path = self.object_path(id);
    let key = id.file_name();
    let size = data.len() as u64;

    // Same id means same bytes, an existing file never needs rewriting
    if tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
      debug!("object {} already stored", id);
      return Ok(PutObjectOutput {
        key,
        size,
        already_present: true,
      });
    }

    write_atomic(&self.path, &file_path, &data)
      .await
      .map_err(|source| StorageError::Write {
        id: id.clone(),
        source,
      })?;

    debug!("stored object {} ({} bytes)", id, size);

    Ok(PutObjectOutput {
      key,
      size,
      already_present: false,
    })
  }
}

/// Writes into a temporary sibling and renames it over `file_path`, so readers
/// either see the complete file or none at all.
async fn write_atomic(dir: &Path, file_path: &Path, data: &[u8]) -> anyhow::Result<()> {
  tokio::fs::create_dir_all(dir)
    .await
    .with_context(|| format!("failed to create directory: {}", dir.display()))?;

  let file_name = file_path
    .file_name()
    .and_then(|n| n.to_str())
    .context("object path has no file name")?;
  let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

  if let Err(e) = tokio::fs::write(&tmp_path, data).await {
    let _ = tokio::fs::remove_file(&tmp_path).await;
    return Err(e).with_context(|| format!("failed to write file: {}", tmp_path.display()));
  }

  if let Err(e) = tokio::fs::rename(&tmp_path, file_path).await {
    let _ = tokio::fs::remove_file(&tmp_path).await;
    return Err(e).with_context(|| format!("failed to move file into place: {}", file_path.display()));
  }

  Ok(())
}
