use std::path::PathBuf;

use crate::backup::db_dump::DatabaseEngine;
use crate::config::{AppConfig, Retention};
use crate::errors::ConfigurationError;

/// Everything fixed for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub timestamp: String,
    pub engine: DatabaseEngine,
    pub backup_dir: PathBuf,
    pub dump_path: PathBuf,
    pub archive_path: PathBuf,
    pub retention: Retention,
}

impl RunContext {
    /// Resolves engine and artifact paths. Fails on an unsupported engine.
    pub fn new(config: &AppConfig, timestamp: String) -> Result<Self, ConfigurationError> {
        let engine: DatabaseEngine = config.database.client.parse()?;
        let backup_dir = config.backup_dir.clone();
        let dump_path = backup_dir.join(format!("{timestamp}_db.{}", engine.dump_extension()));
        let archive_path = backup_dir.join(format!("{timestamp}_public.tar.gz"));

        Ok(Self {
            timestamp,
            engine,
            backup_dir,
            dump_path,
            archive_path,
            retention: config.retention,
        })
    }
}
