use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::ingest::ObjectId;
use crate::storage::{PutObjectOutput, Storage, StorageError};

/// Keeps objects in process memory. Contents are gone on restart.
#[derive(Default)]
pub struct Client {
  objects: RwLock<HashMap<ObjectId, Bytes>>,
}

impl Client {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.objects.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.objects.read().await.is_empty()
  }
}

#[async_trait]
impl Storage for Client {
  async fn get(&self, id: &ObjectId) -> Result<Bytes, StorageError> {
    self
      .objects
      .read()
      .await
      .get(id)
      .cloned()
      .ok_or_else(|| StorageError::NotFound(id.clone()))
  }

  async fn put(&self, id: &ObjectId, data: Bytes) -> Result<PutObjectOutput, StorageError> {
    let size = data.len() as u64;
    let mut objects = self.objects.write().await;
    let already_present = objects.contains_key(id);
    if !already_present {
      objects.insert(id.clone(), data);
    }

    Ok(PutObjectOutput {
      key: id.file_name(),
      size,
      already_present,
    })
  }
}
