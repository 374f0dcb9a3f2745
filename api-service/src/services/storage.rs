use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::ServiceError;
use crate::config::StorageConfig;

pub const USER_LOGO_BUCKET: &str = "user-logos";
pub const ORGANIZATION_LOGO_BUCKET: &str = "organization-logos";

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), ServiceError>;
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ServiceError>;
    /// Public distribution URL for an object.
    fn url(&self, bucket: &str, key: &str) -> String;
}

/// Objects on the local filesystem under `<root>/<bucket>/<key>`.
pub struct LocalStorage {
    base_path: PathBuf,
    public_url: String,
}

impl LocalStorage {
    pub async fn new(config: &StorageConfig) -> Result<Self, ServiceError> {
        let base_path = PathBuf::from(&config.path);
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ServiceError> {
        for part in [bucket, key] {
            let plain = !part.is_empty()
                && Path::new(part)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !plain {
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "Invalid object path segment: {}",
                    part
                )));
            }
        }
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), ServiceError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        tracing::debug!(bucket = %bucket, key = %key, "Object stored");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ServiceError> {
        let path = self.object_path(bucket, key)?;
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, bucket, key)
    }
}
