// src/constants.rs

/// Milliseconds in one second
pub const MS_PER_SEC: i64 = 1000;

/// Seconds in one day (24 * 60 * 60)
pub const SECS_PER_DAY: i64 = 86400;

/// Default idle threshold in minutes before a background tab is closed
pub const DEFAULT_IDLE_MINUTES: u32 = 30;

/// Default warning lead time in minutes
pub const DEFAULT_NOTIFY_MINUTES: u32 = 10;

/// Delay between the end of one evaluation and the start of the next
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Tabs are removed slightly after the decision so the browser's own
/// bookkeeping for the tick has settled.
pub const EVICTION_DELAY_MS: u64 = 50;

/// Host idle detection threshold in seconds
pub const IDLE_DETECTION_SECS: u64 = 60;

/// Chrome limits native messaging to 1MB (1024 * 1024 bytes)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Maximum idle threshold (one year)
pub const MAX_IDLE_THRESHOLD_DAYS: i64 = 365;

/// Maximum whitelist/blacklist pattern length
pub const MAX_PATTERN_LEN: usize = 500;

/// Priority used for pre-close warnings (Chrome accepts -2..=2)
pub const WARNING_PRIORITY: i8 = 2;

/// Priority used for close notices
pub const CLOSE_PRIORITY: i8 = 0;
