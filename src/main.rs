//! Off-site Backup Tool
//!
//! Dumps a database, archives a directory and ships both artifacts to remote storage.

// offsitebackup/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use config::AppConfig;
use errors::{Stage, StageFailure, StageResult};
use std::process::ExitCode;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_config = match load_config() {
        Ok(config) => config,
        Err(failure) => {
            log::error!("❌ {}", backup::failure_message(failure));
            return ExitCode::FAILURE;
        }
    };

    let result = backup::run_backup_flow(&app_config).await;
    let code = backup::exit_code(&result);
    match result {
        Ok(report) => {
            log::info!(
                "✅ Backup completed successfully. Dump uploaded as {}, archive uploaded as {}.",
                report.dump_id,
                report.archive_id
            );
            log::debug!("Run {} passed through {:?}", report.context.timestamp, report.states);
        }
        Err(failure) => {
            log::error!("❌ {}", backup::failure_message(failure));
        }
    }
    ExitCode::from(code)
}

fn load_config() -> StageResult<AppConfig> {
    AppConfig::from_env().map_err(|e| StageFailure::new(Stage::Setup, e))
}
