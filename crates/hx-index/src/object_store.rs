//! S3-compatible object store adapter.
//!
//! Grounded on `vclip-storage/src/client.rs`'s `R2Client`: same
//! force-path-style bucket access, same error-string matching for
//! `NoSuchKey`/`NotFound`, same presigned-URL idiom.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::contracts::ObjectStore;
use crate::error::{IndexError, IndexResult};

/// Configuration for the S3-compatible bucket backing video uploads and
/// derived thumbnails.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
}

impl ObjectStoreConfig {
    pub fn from_env() -> IndexResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("OBJECT_STORE_ENDPOINT_URL")
                .map_err(|_| IndexError::config_error("OBJECT_STORE_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("OBJECT_STORE_ACCESS_KEY_ID")
                .map_err(|_| IndexError::config_error("OBJECT_STORE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("OBJECT_STORE_SECRET_ACCESS_KEY")
                .map_err(|_| IndexError::config_error("OBJECT_STORE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("OBJECT_STORE_BUCKET")
                .map_err(|_| IndexError::config_error("OBJECT_STORE_BUCKET not set"))?,
            region: std::env::var("OBJECT_STORE_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// S3-compatible object store client (R2, MinIO, or real S3).
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: ObjectStoreConfig) -> IndexResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "heimdex-object-store",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        })
    }

    pub async fn from_env() -> IndexResult<Self> {
        Self::new(ObjectStoreConfig::from_env()?).await
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> IndexResult<()> {
        debug!(key, len = bytes.len(), "uploading object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| IndexError::UploadFailed(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> IndexResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    IndexError::not_found(key)
                } else {
                    IndexError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| IndexError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();
        Ok(bytes)
    }

    async fn signed_download_url(&self, key: &str, ttl: Duration) -> IndexResult<String> {
        let presign_config =
            PresigningConfig::expires_in(ttl).map_err(|e| IndexError::PresignFailed(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| IndexError::PresignFailed(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    async fn signed_upload_url(&self, key: &str, ttl: Duration) -> IndexResult<String> {
        let presign_config =
            PresigningConfig::expires_in(ttl).map_err(|e| IndexError::PresignFailed(e.to_string()))?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| IndexError::PresignFailed(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, key: &str) -> IndexResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| IndexError::DeleteFailed(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(IndexError::AwsSdk(e.to_string()))
                }
            }
        }
    }
}

/// Object-store key conventions (§6).
pub mod keys {
    pub fn video_key(tenant_id: &str, video_id: &str, ext: &str) -> String {
        format!("{tenant_id}/{video_id}.{ext}")
    }

    pub fn thumbnail_key(tenant_id: &str, video_id: &str, scene_index: u32) -> String {
        format!("{tenant_id}/{video_id}/thumbnails/scene_{scene_index}.jpg")
    }

    pub fn poster_key(tenant_id: &str, video_id: &str) -> String {
        format!("{tenant_id}/{video_id}/thumbnail.jpg")
    }
}

#[cfg(test)]
mod tests {
    use super::keys::*;

    #[test]
    fn key_conventions_match_the_contract() {
        assert_eq!(video_key("t1", "v1", "mp4"), "t1/v1.mp4");
        assert_eq!(
            thumbnail_key("t1", "v1", 3),
            "t1/v1/thumbnails/scene_3.jpg"
        );
        assert_eq!(poster_key("t1", "v1"), "t1/v1/thumbnail.jpg");
    }
}
