// offsitebackup/src/backup/drive_upload.rs
//! Google Drive destination.
//!
//! Authentication exchanges a pre-provisioned refresh token for a
//! short-lived access token on first use; the token is then reused for every
//! upload of the run. Files go through a resumable upload session so the body
//! can be streamed from disk with a known length.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::fs::File;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;

use crate::backup::upload::{RemoteId, Uploader, content_type, remote_name};
use crate::config::DriveConfig;
use crate::errors::UploadError;
use crate::utils::secrets::Secret;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub token_url: String,
    pub upload_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            token_url: TOKEN_URL.to_string(),
            upload_url: UPLOAD_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Short-lived bearer credential minted from the refresh token.
#[derive(Debug)]
pub struct AuthHandle {
    access_token: Secret,
}

impl AuthHandle {
    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose())
    }
}

pub struct DriveUploader {
    http: Client,
    config: DriveConfig,
    endpoints: DriveEndpoints,
    auth: OnceCell<AuthHandle>,
}

impl DriveUploader {
    pub fn new(config: DriveConfig) -> Self {
        Self::with_endpoints(config, DriveEndpoints::default())
    }

    pub fn with_endpoints(config: DriveConfig, endpoints: DriveEndpoints) -> Self {
        Self {
            http: Client::new(),
            config,
            endpoints,
            auth: OnceCell::new(),
        }
    }

    /// Returns the run's access token, exchanging the refresh token on first call.
    pub async fn authenticate(&self) -> Result<&AuthHandle, UploadError> {
        self.auth
            .get_or_try_init(|| self.exchange_refresh_token())
            .await
    }

    async fn exchange_refresh_token(&self) -> Result<AuthHandle, UploadError> {
        log::debug!("Exchanging refresh token for a Drive access token");
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose()),
                ("refresh_token", self.config.refresh_token.expose()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Auth(format!(
                "token endpoint returned {status}: {}",
                body.trim()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Auth(format!("unreadable token response: {e}")))?;
        if let Some(expires_in) = token.expires_in {
            log::debug!("Drive access token valid for {expires_in}s");
        }
        Ok(AuthHandle {
            access_token: Secret::new(token.access_token),
        })
    }

    async fn start_session(
        &self,
        auth: &AuthHandle,
        name: &str,
        mime: &str,
        length: u64,
    ) -> Result<String, UploadError> {
        let metadata = file_metadata(name, &self.config.folder_id);
        let response = self
            .http
            .post(&self.endpoints.upload_url)
            .query(&[
                ("uploadType", "resumable"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header(AUTHORIZATION, auth.bearer())
            .header("X-Upload-Content-Type", mime)
            .header("X-Upload-Content-Length", length.to_string())
            .json(&metadata)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::MalformedResponse("upload session has no Location header".to_string())
            })
    }
}

fn file_metadata(name: &str, folder_id: &str) -> serde_json::Value {
    json!({
        "name": name,
        "parents": [folder_id],
    })
}

async fn ensure_success(response: Response) -> Result<Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UploadError::Auth(format!("access token rejected: {}", body.trim())));
    }
    Err(UploadError::Rejected {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl Uploader for DriveUploader {
    fn destination(&self) -> String {
        format!("Google Drive folder {}", self.config.folder_id)
    }

    async fn upload(&self, file_path: &Path) -> Result<RemoteId, UploadError> {
        let read_error = |source| UploadError::Read {
            path: file_path.to_path_buf(),
            source,
        };
        let name = remote_name(file_path)?;
        let mime = content_type(file_path);
        let file = File::open(file_path).await.map_err(read_error)?;
        let length = file.metadata().await.map_err(read_error)?.len();

        let auth = self.authenticate().await?;
        log::info!(
            "📤 Uploading {} ({} bytes) to {}",
            file_path.display(),
            length,
            self.destination()
        );

        let session_url = self.start_session(auth, &name, mime, length).await?;
        let response = self
            .http
            .put(&session_url)
            .header(AUTHORIZATION, auth.bearer())
            .header(CONTENT_TYPE, mime)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| UploadError::MalformedResponse(format!("missing file id: {e}")))?;
        Ok(RemoteId(created.id))
    }
}
