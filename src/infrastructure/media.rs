use crate::domain::ports::ImageStore;
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps uploaded images in memory and serves them under `memory://images/<n>`.
#[derive(Default, Clone)]
pub struct InMemoryImageStore {
    images: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.images.read().await.get(url).cloned()
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn upload(&self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(ServiceError::invalid_field("image", "image is empty"));
        }
        let mut images = self.images.write().await;
        let url = format!("memory://images/{}", images.len() + 1);
        images.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}
