// offsitebackup/src/backup/s3_upload.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;

use crate::backup::upload::{RemoteId, Uploader, content_type, remote_name};
use crate::config::SpacesConfig;
use crate::errors::UploadError;

/// Uploads to an S3-compatible object storage service (like DigitalOcean Spaces).
pub struct S3Uploader {
    client: s3::Client,
    bucket_name: String,
    folder_prefix: Option<String>,
}

impl S3Uploader {
    /// Builds the client once for the whole run from static credentials.
    pub async fn connect(spaces_config: &SpacesConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&spaces_config.endpoint_url)
            .region(Region::new(spaces_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &spaces_config.access_key_id,
                spaces_config.secret_access_key.expose(),
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        Self {
            client: s3::Client::new(&sdk_config),
            bucket_name: spaces_config.bucket_name.clone(),
            folder_prefix: spaces_config.folder_prefix.clone(),
        }
    }

    fn object_key(&self, name: &str) -> String {
        object_key(self.folder_prefix.as_deref(), name)
    }
}

fn object_key(prefix: Option<&str>, name: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{name}"),
        None => name.to_string(),
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    fn destination(&self) -> String {
        match &self.folder_prefix {
            Some(prefix) => format!("s3://{}/{}", self.bucket_name, prefix.trim_matches('/')),
            None => format!("s3://{}", self.bucket_name),
        }
    }

    async fn upload(&self, file_path: &Path) -> Result<RemoteId, UploadError> {
        let key = self.object_key(&remote_name(file_path)?);
        log::info!(
            "📤 Uploading {} to S3 bucket {} with key {}",
            file_path.display(),
            self.bucket_name,
            key
        );

        // from_path streams the file instead of reading it into memory.
        let body = ByteStream::from_path(file_path)
            .await
            .map_err(|e| UploadError::Read {
                path: file_path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type(file_path))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                UploadError::S3Sdk(format!(
                    "failed to upload {} to bucket {} with key {}: {}",
                    file_path.display(),
                    self.bucket_name,
                    key,
                    s3::error::DisplayErrorContext(&e)
                ))
            })?;

        if let Some(etag) = output.e_tag() {
            log::debug!("S3 accepted {key} with ETag {etag}");
        }
        Ok(RemoteId(format!("s3://{}/{}", self.bucket_name, key)))
    }
}
