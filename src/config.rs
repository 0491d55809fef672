use crate::constants::{EVICTION_DELAY_MS, IDLE_DETECTION_SECS, MS_PER_SEC, TICK_INTERVAL_MS};
use log::warn;
use std::time::Duration;

/// How a host-reported "last accessed" time is used as a timing origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackdatePolicy {
    /// Use last-accessed whenever the host reports a positive value.
    #[default]
    Trust,
    /// Always start the clock at the moment the tab is first observed.
    Ignore,
    /// Use last-accessed, but never further back than this many milliseconds.
    Cap(i64),
}

impl BackdatePolicy {
    /// Pick the timing origin for a tab first observed at `now`.
    pub fn origin(self, last_accessed: Option<i64>, now: i64) -> i64 {
        let reported = last_accessed.filter(|ts| *ts > 0);
        match (self, reported) {
            (BackdatePolicy::Trust, Some(ts)) => ts,
            (BackdatePolicy::Cap(max_ms), Some(ts)) => ts.max(now.saturating_sub(max_ms)),
            (BackdatePolicy::Ignore, _) | (_, None) => now,
        }
    }

    /// Parse `trust`, `ignore` or `cap:<seconds>`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "trust" => Some(BackdatePolicy::Trust),
            "ignore" => Some(BackdatePolicy::Ignore),
            other => {
                let secs: i64 = other.strip_prefix("cap:")?.trim().parse().ok()?;
                (secs >= 0).then(|| BackdatePolicy::Cap(secs.saturating_mul(MS_PER_SEC)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    pub eviction_delay: Duration,
    pub idle_detection_secs: u64,
    pub backdate: BackdatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            eviction_delay: Duration::from_millis(EVICTION_DELAY_MS),
            idle_detection_secs: IDLE_DETECTION_SECS,
            backdate: BackdatePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TAB_REAPER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "TAB_REAPER_TICK_MS") {
            if ms > 0 {
                config.tick_interval = Duration::from_millis(ms);
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "TAB_REAPER_EVICT_DELAY_MS") {
            config.eviction_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "TAB_REAPER_IDLE_DETECTION_SECS") {
            // Chrome rejects detection intervals below 15 seconds
            config.idle_detection_secs = secs.max(15);
        }
        if let Some(raw) = lookup("TAB_REAPER_BACKDATE") {
            if let Some(policy) = BackdatePolicy::parse(&raw) {
                config.backdate = policy;
            } else {
                warn!("Ignoring TAB_REAPER_BACKDATE={raw:?}: expected trust, ignore or cap:<seconds>");
            }
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {key}={raw:?}: {e}");
            None
        }
    }
}
