use crate::constants::{MS_PER_SEC, SECS_PER_DAY};

/// Convert day/hour/minute/second components to milliseconds.
pub fn to_ms(days: u32, hours: u32, minutes: u32, seconds: u32) -> i64 {
    let secs = i64::from(days) * SECS_PER_DAY
        + i64::from(hours) * 3600
        + i64::from(minutes) * 60
        + i64::from(seconds);
    secs * MS_PER_SEC
}

/// Render a duration as e.g. `1 minute 30 seconds`.
///
/// Only nonzero components are shown, largest first. Negative input is
/// treated as zero, and zero renders as `0 seconds`.
pub fn format_duration(ms: i64) -> String {
    let mut secs = ms.max(0) / MS_PER_SEC;
    let days = secs / SECS_PER_DAY;
    secs -= days * SECS_PER_DAY;
    let hours = secs / 3600;
    secs -= hours * 3600;
    let minutes = secs / 60;
    secs -= minutes * 60;

    let parts: Vec<String> = [(days, "day"), (hours, "hour"), (minutes, "minute"), (secs, "second")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| plural(n, unit))
        .collect();

    if parts.is_empty() {
        return plural(0, "second");
    }
    parts.join(" ")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
