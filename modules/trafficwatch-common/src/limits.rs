//! Field bounds for incoming report, vote and status payloads.

use crate::error::TrafficError;

pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const ADDRESS_MAX_CHARS: usize = 500;
pub const AFFECTED_LANES_MAX_CHARS: usize = 200;
pub const ESTIMATED_DURATION_MAX_CHARS: usize = 100;
/// Applies to `reported_by`, `voter_id` and `updated_by`.
pub const PRINCIPAL_ID_MAX_CHARS: usize = 100;

/// Required text: non-blank and at most `max` characters.
pub fn require_text(field: &str, value: &str, max: usize) -> Result<(), TrafficError> {
    if value.trim().is_empty() {
        return Err(TrafficError::validation(format!("{field} must not be empty")));
    }
    check_len(field, value, max)
}

/// Optional text: when present, at most `max` characters.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<(), TrafficError> {
    match value {
        Some(v) => check_len(field, v, max),
        None => Ok(()),
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), TrafficError> {
    let len = value.chars().count();
    if len > max {
        return Err(TrafficError::validation(format!(
            "{field} is {len} characters, maximum is {max}"
        )));
    }
    Ok(())
}
