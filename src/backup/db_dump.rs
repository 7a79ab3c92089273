// offsitebackup/src/backup/db_dump.rs
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::backup::process::{CommandInvocation, CommandRunner};
use crate::config::{DatabaseConfig, DumpTools};
use crate::errors::{ConfigurationError, DumpError};
use crate::utils::secrets::{Secret, SecretSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    Postgres,
    MySql,
}

impl DatabaseEngine {
    /// Extension of the dump artifact: custom-format archive for Postgres, plain SQL for MySQL.
    pub fn dump_extension(self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "pgdump",
            DatabaseEngine::MySql => "sql",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DatabaseEngine::Postgres => 5432,
            DatabaseEngine::MySql => 3306,
        }
    }

    /// The environment variable the engine's dump tool reads its password from.
    pub fn password_env_var(self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "PGPASSWORD",
            DatabaseEngine::MySql => "MYSQL_PWD",
        }
    }
}

impl FromStr for DatabaseEngine {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "postgres" => Ok(DatabaseEngine::Postgres),
            "mysql" => Ok(DatabaseEngine::MySql),
            other => Err(ConfigurationError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseEngine::Postgres => f.write_str("postgres"),
            DatabaseEngine::MySql => f.write_str("mysql"),
        }
    }
}

/// Where and as whom to connect. User and database name are passed through unchecked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub database: String,
}

impl From<&DatabaseConfig> for ConnectionParams {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            database: config.name.clone(),
        }
    }
}

/// Builds the dump command for `engine`. The password only ever lands in the env overlay.
pub fn build_dump_invocation(
    engine: DatabaseEngine,
    tools: &DumpTools,
    params: &ConnectionParams,
    password: Option<Secret>,
    output_path: &Path,
) -> CommandInvocation {
    let port = params.port.unwrap_or(engine.default_port()).to_string();
    let output = output_path.to_string_lossy().into_owned();

    let invocation = match engine {
        DatabaseEngine::Postgres => CommandInvocation::new(&tools.pg_dump)
            .arg("--format=custom")
            .arg("--no-password")
            .arg("--host")
            .arg(&params.host)
            .arg("--port")
            .arg(port)
            .arg("--username")
            .arg(&params.user)
            .arg("--dbname")
            .arg(&params.database)
            .arg("--file")
            .arg(output),
        DatabaseEngine::MySql => CommandInvocation::new(&tools.mysqldump)
            .arg("--single-transaction")
            .arg("--host")
            .arg(&params.host)
            .arg("--port")
            .arg(port)
            .arg("--user")
            .arg(&params.user)
            .arg(format!("--result-file={output}"))
            .arg(&params.database),
    };

    match password {
        Some(password) => invocation.env(engine.password_env_var(), password),
        None => invocation,
    }
}

/// Dumps a database by delegating to the engine's client tool.
pub struct Dumper<R> {
    runner: R,
    tools: DumpTools,
    secrets: Box<dyn SecretSource>,
}

impl<R: CommandRunner> Dumper<R> {
    pub fn new(runner: R, tools: DumpTools, secrets: Box<dyn SecretSource>) -> Self {
        Self {
            runner,
            tools,
            secrets,
        }
    }

    /// Dumps into `output_path`. An unknown `engine` fails before anything is spawned.
    pub async fn dump(
        &self,
        engine: &str,
        params: &ConnectionParams,
        output_path: &Path,
    ) -> Result<(), DumpError> {
        let engine: DatabaseEngine = engine.parse()?;
        log::info!(
            "🔍 Dumping {engine} database '{}' on {}:{} to {}",
            params.database,
            params.host,
            params.port.unwrap_or(engine.default_port()),
            output_path.display()
        );
        log::debug!("Using database user '{}'", params.user);

        let invocation = build_dump_invocation(
            engine,
            &self.tools,
            params,
            self.secrets.database_password(),
            output_path,
        );
        self.runner.run(&invocation).await?;

        log::info!("✅ Database dumped successfully to {}", output_path.display());
        Ok(())
    }
}
