use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::errors::UploadError;

/// Identifier the storage provider assigned to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Off-site destination for finished artifacts.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Human readable destination, for logs.
    fn destination(&self) -> String;

    /// Streams `file_path` to the destination under its base name.
    async fn upload(&self, file_path: &Path) -> Result<RemoteId, UploadError>;
}

/// Base name used as the remote display name or key suffix.
pub(crate) fn remote_name(file_path: &Path) -> Result<String, UploadError> {
    file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| UploadError::Read {
            path: file_path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        })
}

/// Content type for the artifacts this tool produces.
pub(crate) fn content_type(file_path: &Path) -> &'static str {
    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz") {
        "application/gzip"
    } else if name.ends_with(".sql") {
        "application/sql"
    } else {
        "application/octet-stream"
    }
}
