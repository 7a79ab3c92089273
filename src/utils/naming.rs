// Artifact naming for a single run.
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

const TOKEN_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Formats `instant` as a fixed-width `YYYYMMDD_HHMMSS` token in its own time zone.
pub fn timestamp_token<Tz>(instant: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    instant.format(TOKEN_FORMAT).to_string()
}

/// Token for the current local wall-clock time.
pub fn current_token() -> String {
    timestamp_token(&Local::now())
}
