use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Discrete steps of a backup run, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Database,
    Archive,
    Upload,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Database => "database",
            Stage::Archive => "archive",
            Stage::Upload => "upload",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unsupported database engine '{0}' (expected 'postgres' or 'mysql')")]
    UnsupportedEngine(String),

    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// An external command exited non-zero or could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{program} {}: {}", exit_description(.exit_code), diagnostics_or_placeholder(.diagnostics))]
pub struct ProcessFailure {
    pub program: String,
    /// `None` when the process never started or was terminated by a signal.
    pub exit_code: Option<i32>,
    pub diagnostics: String,
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "did not exit normally".to_string(),
    }
}

fn diagnostics_or_placeholder(diagnostics: &str) -> &str {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() { "no diagnostic output" } else { trimmed }
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Process(#[from] ProcessFailure),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("source for archival is not a directory: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to walk directory {}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive task did not complete: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to open {} for upload", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP request failed")]
    Transport(#[from] reqwest::Error),

    #[error("remote storage rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("remote storage response was malformed: {0}")]
    MalformedResponse(String),

    #[error("S3 SDK error: {0}")]
    S3Sdk(String),
}

#[derive(Error, Debug)]
#[error("{action} {}", .path.display())]
pub struct FilesystemError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Every way a stage can fail.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    #[error("external command failed")]
    Process(#[from] ProcessFailure),

    #[error("archive could not be created")]
    Archive(#[from] ArchiveError),

    #[error("upload failed")]
    Upload(#[from] UploadError),

    #[error("filesystem operation failed")]
    Filesystem(#[from] FilesystemError),
}

impl From<DumpError> for StageError {
    fn from(err: DumpError) -> Self {
        match err {
            DumpError::Configuration(e) => StageError::Configuration(e),
            DumpError::Process(e) => StageError::Process(e),
        }
    }
}

/// A failed run, attributed to the stage that aborted it.
#[derive(Error, Debug)]
#[error("{stage} stage failed")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: StageError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: impl Into<StageError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

pub type StageResult<T> = std::result::Result<T, StageFailure>;
