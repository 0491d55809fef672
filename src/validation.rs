use crate::constants::{MAX_IDLE_THRESHOLD_DAYS, MAX_PATTERN_LEN, MS_PER_SEC, SECS_PER_DAY};
use crate::error::AppError;
use crate::matcher::hostname;
use crate::models::Preferences;

/// Validate preferences submitted from the settings page.
/// Returns the normalized preferences if valid.
pub fn validate_preferences(prefs: Preferences) -> Result<Preferences, AppError> {
    validate_idle_threshold(prefs.idle_threshold_ms())?;

    let prefs = prefs.normalized();
    for pattern in prefs.whitelist.iter().chain(&prefs.blacklist) {
        validate_pattern(pattern)?;
    }
    Ok(prefs)
}

/// Validate the idle threshold in milliseconds.
pub fn validate_idle_threshold(threshold_ms: i64) -> Result<(), AppError> {
    if threshold_ms <= 0 {
        return Err(AppError::InvalidInput {
            field: "idle_threshold",
            reason: "must be positive".into(),
        });
    }
    if threshold_ms > MAX_IDLE_THRESHOLD_DAYS * SECS_PER_DAY * MS_PER_SEC {
        return Err(AppError::InvalidInput {
            field: "idle_threshold",
            reason: format!("cannot exceed {MAX_IDLE_THRESHOLD_DAYS} days"),
        });
    }
    Ok(())
}

/// Validate a whitelist/blacklist pattern.
pub fn validate_pattern(pattern: &str) -> Result<&str, AppError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(AppError::InvalidInput {
            field: "pattern",
            reason: "cannot be empty".into(),
        });
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(AppError::InvalidInput {
            field: "pattern",
            reason: format!("cannot exceed {MAX_PATTERN_LEN} characters"),
        });
    }
    Ok(pattern)
}

/// Extract the hostname to add to a list from a tab URL.
pub fn validate_list_url(url: &str) -> Result<String, AppError> {
    hostname(url).ok_or_else(|| AppError::InvalidInput {
        field: "url",
        reason: format!("no hostname in {url:?}"),
    })
}
