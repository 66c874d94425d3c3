use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::ingest::ObjectId;
use crate::storage::{PutObjectOutput, Storage, StorageError, CANONICAL_MIME};

pub struct Client {
  s3_client: aws_sdk_s3::Client,
  bucket: String,
  prefix: Option<String>,
}

impl Client {
  pub fn new(s3_client: aws_sdk_s3::Client, bucket: &str, prefix: Option<&str>) -> Self {
    Self {
      s3_client,
      bucket: bucket.to_owned(),
      prefix: prefix
        .map(|p| p.trim_matches('/').to_owned())
        .filter(|p| !p.is_empty()),
    }
  }
}

fn object_key(prefix: Option<&str>, id: &ObjectId) -> String {
  match prefix {
    Some(prefix) => format!("{}/{}", prefix, id.file_name()),
    None => id.file_name(),
  }
}

#[async_trait]
impl Storage for Client {
  async fn get(&self, id: &ObjectId) -> Result<Bytes, StorageError> {
    let key = object_key(self.prefix.as_deref(), id);

    debug!("downloading object: {} from bucket: {}", key, self.bucket);

    let object = match self
      .s3_client
      .get_object()
      .bucket(self.bucket.as_str())
      .key(key.as_str())
      .send()
      .await
    {
      Ok(object) => object,
      Err(e)
        if e
          .as_service_error()
          .map(|e| e.is_no_such_key())
          .unwrap_or(false) =>
      {
        return Err(StorageError::NotFound(id.clone()));
      }
      Err(e) => {
        return Err(StorageError::Read {
          id: id.clone(),
          source: anyhow::Error::new(e).context(format!("failed to get object: {}", key)),
        });
      }
    };

    let data = object
      .body
      .collect()
      .await
      .with_context(|| format!("failed to read object body: {}", key))
      .map_err(|source| StorageError::Read {
        id: id.clone(),
        source,
      })?;

    Ok(data.into_bytes())
  }

  async fn put(&self, id: &ObjectId, data: Bytes) -> Result<PutObjectOutput, StorageError> {
    let key = object_key(self.prefix.as_deref(), id);
    let size = data.len() as u64;

    // A PUT replaces the object in one step; identical ids carry identical bytes
    self
      .s3_client
      .put_object()
      .bucket(self.bucket.as_str())
      .key(key.as_str())
      .body(ByteStream::from(data))
      .cache_control("public, max-age=31536000, immutable".to_owned())
      .content_type(CANONICAL_MIME)
      .send()
      .await
      .with_context(|| format!("failed to upload object: {}", key))
      .map_err(|source| StorageError::Write {
        id: id.clone(),
        source,
      })?;

    debug!("uploaded object: {} to bucket: {}", key, self.bucket);

    Ok(PutObjectOutput {
      key,
      size,
      already_present: false,
    })
  }
}
