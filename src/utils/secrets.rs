//! Credential values that must never show up in logs or command lines.
//!
//! Everything that reaches a child process as a secret goes through
//! [`Secret`]. Only [`Secret::expose`] reveals the value, and the process
//! runner is its single caller on the spawn path.

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Source of the database password handed to dump tools.
///
/// Configuration-backed today; a secret-store lookup can implement the same
/// trait without touching the pipeline.
pub trait SecretSource: Send + Sync {
    fn database_password(&self) -> Option<Secret>;
}

impl SecretSource for Option<Secret> {
    fn database_password(&self) -> Option<Secret> {
        self.clone()
    }
}
