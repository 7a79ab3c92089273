// offsitebackup/src/backup/mod.rs
pub(crate) mod archive; // tarball creation
pub(crate) mod context; // per-run artifact names
pub(crate) mod db_dump; // engine-specific dump commands
pub(crate) mod drive_upload;
pub(crate) mod logic; // stage orchestration
pub(crate) mod process; // external command runner
pub(crate) mod s3_upload;
pub(crate) mod upload;

use crate::config::{AppConfig, UploadConfig};
use crate::errors::{StageFailure, StageResult};
use crate::utils::naming::current_token;
use db_dump::Dumper;
use drive_upload::DriveUploader;
use logic::{BackupPipeline, RunReport};
use process::ProcessRunner;
use s3_upload::S3Uploader;
use upload::Uploader;

/// Exit status for a finished run: 0 on success, 1 on any failure.
pub fn exit_code<T>(result: &StageResult<T>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Renders a failure as one line that starts with the failing stage's name.
pub fn failure_message(failure: StageFailure) -> String {
    format!("{:#}", anyhow::Error::new(failure))
}

/// Public entry point for the backup process.
/// Wires the real process runner and the configured uploader into one pipeline run.
pub async fn run_backup_flow(app_config: &AppConfig) -> StageResult<RunReport> {
    let uploader: Box<dyn Uploader> = match &app_config.upload {
        UploadConfig::Drive(drive_config) => Box::new(DriveUploader::new(drive_config.clone())),
        UploadConfig::Spaces(spaces_config) => Box::new(S3Uploader::connect(spaces_config).await),
    };
    let dumper = Dumper::new(
        ProcessRunner,
        app_config.dump_tools.clone(),
        Box::new(app_config.database.password.clone()),
    );

    BackupPipeline::new(app_config, dumper, uploader.as_ref())
        .run(current_token())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConfigurationError, ProcessFailure, Stage};

    #[test]
    fn test_exit_code_mapping() {
        let ok: StageResult<()> = Ok(());
        let failed: StageResult<()> = Err(StageFailure::new(
            Stage::Setup,
            ConfigurationError::Missing {
                key: "DIRECTORY_TO_BACKUP",
            },
        ));
        assert_eq!(exit_code(&ok), 0);
        assert_eq!(exit_code(&failed), 1);
    }

    #[test]
    fn test_failure_message_starts_with_stage_name() {
        let failure = StageFailure::new(
            Stage::Database,
            ProcessFailure {
                program: "pg_dump".to_string(),
                exit_code: Some(2),
                diagnostics: "connection refused\n".to_string(),
            },
        );

        let message = failure_message(failure);

        assert_eq!(
            message,
            "database stage failed: external command failed: \
             pg_dump exited with status 2: connection refused"
        );
    }
}
