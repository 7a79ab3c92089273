// Runtime configuration, read once from environment-style key/value pairs.
use std::env;
use std::path::PathBuf;

use crate::errors::ConfigurationError;
use crate::utils::secrets::Secret;

const DEFAULT_BACKUP_DIR: &str = "./backups";
const DEFAULT_DB_CLIENT: &str = "mysql";
const DEFAULT_DB_HOST: &str = "localhost";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Engine selector as configured; resolved when the run starts.
    pub client: String,
    pub name: String,
    pub user: String,
    pub password: Option<Secret>,
    pub host: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct DumpTools {
    pub pg_dump: String,
    pub mysqldump: String,
}

impl Default for DumpTools {
    fn default() -> Self {
        Self {
            pg_dump: "pg_dump".to_string(),
            mysqldump: "mysqldump".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Keep,
    Delete,
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub client_id: String,
    pub client_secret: Secret,
    pub refresh_token: Secret,
    pub folder_id: String,
}

#[derive(Debug, Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: Secret,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub enum UploadConfig {
    Drive(DriveConfig),
    Spaces(SpacesConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub dump_tools: DumpTools,
    pub source_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub retention: Retention,
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Reads the process environment. Call after `.env` has been loaded.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigurationError::Missing { key });

        let port = match get("DB_PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                ConfigurationError::Invalid {
                    key: "DB_PORT",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let database = DatabaseConfig {
            client: get("DB_CLIENT").unwrap_or_else(|| DEFAULT_DB_CLIENT.to_string()),
            name: lookup("DB_NAME").unwrap_or_default(),
            user: lookup("DB_USER").unwrap_or_default(),
            password: get("DB_PASSWORD").map(Secret::new),
            host: get("DB_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            port,
        };

        let defaults = DumpTools::default();
        let dump_tools = DumpTools {
            pg_dump: get("PG_DUMP_BIN").unwrap_or(defaults.pg_dump),
            mysqldump: get("MYSQLDUMP_BIN").unwrap_or(defaults.mysqldump),
        };

        let retention = match get("KEEP_LOCAL_BACKUPS") {
            Some(raw) => parse_retention(&raw)?,
            None => Retention::Delete,
        };

        let upload = match get("UPLOAD_BACKEND").as_deref().map(str::trim) {
            None | Some("drive") => UploadConfig::Drive(DriveConfig {
                client_id: require("CLIENT_ID")?,
                client_secret: Secret::new(require("CLIENT_SECRET")?),
                refresh_token: Secret::new(require("REFRESH_TOKEN")?),
                folder_id: require("DRIVE_FOLDER_ID")?,
            }),
            Some("s3") => UploadConfig::Spaces(SpacesConfig {
                endpoint_url: require("S3_ENDPOINT_URL")?,
                region: require("S3_REGION")?,
                access_key_id: require("S3_ACCESS_KEY_ID")?,
                secret_access_key: Secret::new(require("S3_SECRET_ACCESS_KEY")?),
                bucket_name: require("S3_BUCKET")?,
                folder_prefix: get("S3_FOLDER_PREFIX"),
            }),
            Some(other) => {
                return Err(ConfigurationError::Invalid {
                    key: "UPLOAD_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'drive' or 's3'".to_string(),
                });
            }
        };

        Ok(AppConfig {
            database,
            dump_tools,
            source_dir: PathBuf::from(require("DIRECTORY_TO_BACKUP")?),
            backup_dir: get("BACKUP_FOLDER")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR)),
            retention,
            upload,
        })
    }
}

fn parse_retention(raw: &str) -> Result<Retention, ConfigurationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Retention::Keep),
        "false" | "0" | "no" => Ok(Retention::Delete),
        _ => Err(ConfigurationError::Invalid {
            key: "KEEP_LOCAL_BACKUPS",
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const DRIVE_BASE: &[(&str, &str)] = &[
        ("DIRECTORY_TO_BACKUP", "/srv/app/public"),
        ("CLIENT_ID", "client"),
        ("CLIENT_SECRET", "shh"),
        ("REFRESH_TOKEN", "refresh"),
        ("DRIVE_FOLDER_ID", "folder123"),
    ];

    #[test]
    fn test_defaults_when_only_required_keys_are_set() -> anyhow::Result<()> {
        let config = AppConfig::from_lookup(lookup_from(DRIVE_BASE))?;

        assert_eq!(config.database.client, "mysql");
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, None);
        assert!(config.database.password.is_none());
        assert_eq!(config.backup_dir, PathBuf::from("./backups"));
        assert_eq!(config.source_dir, PathBuf::from("/srv/app/public"));
        assert_eq!(config.retention, Retention::Delete);
        assert_eq!(config.dump_tools.pg_dump, "pg_dump");
        match config.upload {
            UploadConfig::Drive(drive) => {
                assert_eq!(drive.folder_id, "folder123");
                assert_eq!(drive.refresh_token.expose(), "refresh");
            }
            other => panic!("expected drive upload config, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_database_settings_are_read() -> anyhow::Result<()> {
        let mut pairs = DRIVE_BASE.to_vec();
        pairs.extend([
            ("DB_CLIENT", "postgres"),
            ("DB_NAME", "shop"),
            ("DB_USER", "backup"),
            ("DB_PASSWORD", "pw"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6432"),
            ("KEEP_LOCAL_BACKUPS", "true"),
            ("PG_DUMP_BIN", "/usr/lib/postgresql/16/bin/pg_dump"),
        ]);
        let config = AppConfig::from_lookup(lookup_from(&pairs))?;

        assert_eq!(config.database.client, "postgres");
        assert_eq!(config.database.name, "shop");
        assert_eq!(config.database.user, "backup");
        assert_eq!(config.database.password, Some(Secret::new("pw")));
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, Some(6432));
        assert_eq!(config.retention, Retention::Keep);
        assert_eq!(
            config.dump_tools.pg_dump,
            "/usr/lib/postgresql/16/bin/pg_dump"
        );
        Ok(())
    }

    #[test]
    fn test_missing_source_directory_is_reported() {
        let pairs: Vec<_> = DRIVE_BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "DIRECTORY_TO_BACKUP")
            .collect();
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Missing {
                key: "DIRECTORY_TO_BACKUP"
            }
        );
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut pairs = DRIVE_BASE.to_vec();
        pairs.push(("DB_PORT", "not-a-port"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { key: "DB_PORT", .. }));
    }

    #[test]
    fn test_retention_values() {
        assert_eq!(parse_retention("TRUE").unwrap(), Retention::Keep);
        assert_eq!(parse_retention("yes").unwrap(), Retention::Keep);
        assert_eq!(parse_retention("0").unwrap(), Retention::Delete);
        assert_eq!(parse_retention("false").unwrap(), Retention::Delete);
        assert!(parse_retention("maybe").is_err());
    }

    #[test]
    fn test_spaces_backend_requires_its_credentials() -> anyhow::Result<()> {
        let pairs = [
            ("DIRECTORY_TO_BACKUP", "/srv/app/public"),
            ("UPLOAD_BACKEND", "s3"),
            ("S3_ENDPOINT_URL", "https://fra1.digitaloceanspaces.com"),
            ("S3_REGION", "fra1"),
            ("S3_ACCESS_KEY_ID", "key"),
            ("S3_SECRET_ACCESS_KEY", "secret"),
            ("S3_BUCKET", "backups"),
        ];
        let config = AppConfig::from_lookup(lookup_from(&pairs))?;
        match config.upload {
            UploadConfig::Spaces(spaces) => {
                assert_eq!(spaces.bucket_name, "backups");
                assert_eq!(spaces.folder_prefix, None);
            }
            other => panic!("expected spaces upload config, got {other:?}"),
        }

        let missing: Vec<_> = pairs
            .iter()
            .copied()
            .filter(|(k, _)| *k != "S3_BUCKET")
            .collect();
        let err = AppConfig::from_lookup(lookup_from(&missing)).unwrap_err();
        assert_eq!(err, ConfigurationError::Missing { key: "S3_BUCKET" });
        Ok(())
    }

    #[test]
    fn test_unknown_upload_backend_is_rejected() {
        let mut pairs = DRIVE_BASE.to_vec();
        pairs.push(("UPLOAD_BACKEND", "ftp"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Invalid {
                key: "UPLOAD_BACKEND",
                ..
            }
        ));
    }
}
