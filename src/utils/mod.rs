pub mod naming;
pub mod secrets;

use std::path::PathBuf;
use which::which;

/// Resolves an executable name against `PATH`. Paths containing a separator are checked as-is.
pub fn find_executable(program: &str) -> Result<PathBuf, which::Error> {
    which(program)
}
