// offsitebackup/src/backup/logic.rs
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use crate::backup::archive::create_tar_gz_archive;
use crate::backup::context::RunContext;
use crate::backup::db_dump::{ConnectionParams, Dumper};
use crate::backup::process::CommandRunner;
use crate::backup::upload::{RemoteId, Uploader};
use crate::config::{AppConfig, Retention};
use crate::errors::{ArchiveError, FilesystemError, Stage, StageFailure, StageResult};

/// Linear progression of a run. `Aborted` can follow any state before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    DirectoryEnsured,
    Dumped,
    Archived,
    UploadedDump,
    UploadedArchive,
    CleanedUp,
    Kept,
    Done,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub context: RunContext,
    pub dump_id: RemoteId,
    pub archive_id: RemoteId,
    pub states: Vec<PipelineState>,
}

struct StateTrail(Vec<PipelineState>);

impl StateTrail {
    fn new() -> Self {
        Self(vec![PipelineState::Init])
    }

    fn current(&self) -> PipelineState {
        self.0.last().copied().unwrap_or(PipelineState::Init)
    }

    fn advance(&mut self, next: PipelineState) {
        log::debug!("Pipeline state {} -> {}", self.current(), next);
        self.0.push(next);
    }
}

/// Runs dump, archive, upload and cleanup strictly in order, stopping at the first failure.
pub struct BackupPipeline<'a, R> {
    config: &'a AppConfig,
    dumper: Dumper<R>,
    uploader: &'a dyn Uploader,
}

impl<'a, R: CommandRunner> BackupPipeline<'a, R> {
    pub fn new(config: &'a AppConfig, dumper: Dumper<R>, uploader: &'a dyn Uploader) -> Self {
        Self {
            config,
            dumper,
            uploader,
        }
    }

    /// Executes one run named by `timestamp`.
    ///
    /// Artifacts of stages that completed before a failure stay on disk.
    pub async fn run(&self, timestamp: String) -> StageResult<RunReport> {
        let mut trail = StateTrail::new();
        match self.run_stages(timestamp, &mut trail).await {
            Ok((context, dump_id, archive_id)) => {
                trail.advance(PipelineState::Done);
                Ok(RunReport {
                    context,
                    dump_id,
                    archive_id,
                    states: trail.0,
                })
            }
            Err(failure) => {
                log::debug!(
                    "Pipeline aborted after {} in {} stage",
                    trail.current(),
                    failure.stage
                );
                trail.advance(PipelineState::Aborted);
                Err(failure)
            }
        }
    }

    async fn run_stages(
        &self,
        timestamp: String,
        trail: &mut StateTrail,
    ) -> StageResult<(RunContext, RemoteId, RemoteId)> {
        let context = RunContext::new(self.config, timestamp)
            .map_err(|e| StageFailure::new(Stage::Setup, e))?;
        log::info!(
            "🚀 Starting backup run {} ({} database, uploading to {})",
            context.timestamp,
            context.engine,
            self.uploader.destination()
        );

        self.ensure_backup_dir(&context.backup_dir).await?;
        trail.advance(PipelineState::DirectoryEnsured);

        self.dump_database(&context).await?;
        trail.advance(PipelineState::Dumped);

        self.archive_directory(&context).await?;
        trail.advance(PipelineState::Archived);

        let dump_id = self.upload(&context.dump_path).await?;
        trail.advance(PipelineState::UploadedDump);

        let archive_id = self.upload(&context.archive_path).await?;
        trail.advance(PipelineState::UploadedArchive);

        match context.retention {
            Retention::Keep => {
                log::info!(
                    "📂 Keeping local copies in {}",
                    context.backup_dir.display()
                );
                trail.advance(PipelineState::Kept);
            }
            Retention::Delete => {
                self.remove_local_artifacts(&context).await?;
                trail.advance(PipelineState::CleanedUp);
            }
        }

        Ok((context, dump_id, archive_id))
    }

    async fn ensure_backup_dir(&self, backup_dir: &Path) -> StageResult<()> {
        tokio::fs::create_dir_all(backup_dir).await.map_err(|source| {
            StageFailure::new(
                Stage::Setup,
                FilesystemError {
                    action: "failed to create backup directory",
                    path: backup_dir.to_path_buf(),
                    source,
                },
            )
        })?;
        log::debug!("Backup directory ready at {}", backup_dir.display());
        Ok(())
    }

    async fn dump_database(&self, context: &RunContext) -> StageResult<()> {
        let params = ConnectionParams::from(&self.config.database);
        self.dumper
            .dump(&self.config.database.client, &params, &context.dump_path)
            .await
            .map_err(|e| StageFailure::new(Stage::Database, e))
    }

    async fn archive_directory(&self, context: &RunContext) -> StageResult<()> {
        let source = self.config.source_dir.clone();
        let dest = context.archive_path.clone();
        tokio::task::spawn_blocking(move || create_tar_gz_archive(&source, &dest))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))
            .and_then(|result| result)
            .map(|_| ())
            .map_err(|e| StageFailure::new(Stage::Archive, e))
    }

    async fn upload(&self, file_path: &Path) -> StageResult<RemoteId> {
        let remote_id = self
            .uploader
            .upload(file_path)
            .await
            .map_err(|e| StageFailure::new(Stage::Upload, e))?;
        log::info!("✅ Uploaded {} (File Id: {})", file_path.display(), remote_id);
        Ok(remote_id)
    }

    /// Deletes both local artifacts. Every deletion is attempted; the first failure is reported.
    async fn remove_local_artifacts(&self, context: &RunContext) -> StageResult<()> {
        let mut first_failure = None;
        for path in [&context.dump_path, &context.archive_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => log::info!("🗑 Deleted local copy {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::warn!("Local copy {} was already gone", path.display());
                }
                Err(source) => {
                    log::error!("❌ Failed to delete {}: {}", path.display(), source);
                    if first_failure.is_none() {
                        first_failure = Some(FilesystemError {
                            action: "failed to delete local copy",
                            path: path.clone(),
                            source,
                        });
                    }
                }
            }
        }

        match first_failure {
            None => Ok(()),
            Some(failure) => {
                log::warn!("Both artifacts were uploaded, but local cleanup did not complete");
                Err(StageFailure::new(Stage::Cleanup, failure))
            }
        }
    }
}
