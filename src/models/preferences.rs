use crate::constants::{DEFAULT_IDLE_MINUTES, DEFAULT_NOTIFY_MINUTES};
use crate::db::schema::PREFERENCES_KEY;
use crate::db::{Scope, Storage};
use crate::duration::to_ms;
use crate::error::AppError;
use serde::{Deserialize, Deserializer, Serialize};

/// User preferences, stored in the sync scope.
///
/// Field names match the keys the settings page writes. Any key missing
/// from storage takes its default. Lists may also arrive as the raw
/// newline-delimited text of the settings form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools, reason = "mirrors the settings form, one toggle per field")]
pub struct Preferences {
    pub idle_days: u32,
    pub idle_hours: u32,
    pub idle_minutes: u32,
    pub idle_seconds: u32,
    pub notify_days: u32,
    pub notify_hours: u32,
    pub notify_minutes: u32,
    pub notify_seconds: u32,
    pub enable_notify: bool,
    pub skip_pinned: bool,
    pub skip_audible: bool,
    pub skip_form: bool,
    #[serde(deserialize_with = "pattern_list")]
    pub whitelist: Vec<String>,
    #[serde(deserialize_with = "pattern_list")]
    pub blacklist: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            idle_days: 0,
            idle_hours: 0,
            idle_minutes: DEFAULT_IDLE_MINUTES,
            idle_seconds: 0,
            notify_days: 0,
            notify_hours: 0,
            notify_minutes: DEFAULT_NOTIFY_MINUTES,
            notify_seconds: 0,
            enable_notify: true,
            skip_pinned: true,
            skip_audible: true,
            skip_form: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl Preferences {
    pub fn idle_threshold_ms(&self) -> i64 {
        to_ms(self.idle_days, self.idle_hours, self.idle_minutes, self.idle_seconds)
    }

    pub fn warn_threshold_ms(&self) -> i64 {
        to_ms(self.notify_days, self.notify_hours, self.notify_minutes, self.notify_seconds)
    }

    /// Read preferences; absent storage means defaults.
    pub fn load<S: Storage + ?Sized>(storage: &S) -> Result<Self, AppError> {
        let Some(value) = storage.read(Scope::Sync, PREFERENCES_KEY)? else {
            return Ok(Self::default());
        };
        Ok(serde_json::from_value(value)?)
    }

    pub fn save<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<(), AppError> {
        let value = serde_json::to_value(self)?;
        storage.write_many(Scope::Sync, &[(PREFERENCES_KEY, value)])
    }

    /// Trim list entries and drop the empty ones.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.whitelist = normalize_list(&self.whitelist);
        self.blacklist = normalize_list(&self.blacklist);
        self
    }

    pub fn list(&self, kind: ListKind) -> &[String] {
        match kind {
            ListKind::Whitelist => &self.whitelist,
            ListKind::Blacklist => &self.blacklist,
        }
    }

    /// Append a host to a list unless it is already there.
    /// Returns `true` if the list changed.
    pub fn add_host(&mut self, kind: ListKind, host: &str) -> bool {
        if self.list(kind).iter().any(|p| p == host) {
            return false;
        }
        let list = match kind {
            ListKind::Whitelist => &mut self.whitelist,
            ListKind::Blacklist => &mut self.blacklist,
        };
        list.push(host.to_string());
        true
    }
}

/// Split newline-delimited text from the settings form into patterns.
pub fn parse_pattern_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternList {
    Text(String),
    Items(Vec<String>),
}

fn pattern_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match PatternList::deserialize(deserializer)? {
        PatternList::Text(text) => parse_pattern_list(&text),
        PatternList::Items(items) => items,
    })
}

fn normalize_list(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
