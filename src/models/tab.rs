use serde::{Deserialize, Serialize};

/// Browser-assigned tab id. Ids are reused after a tab is closed.
pub type TabId = i64;

/// One tab as reported by the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Focused tab of the focused window.
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub audible: bool,
    /// Chrome reports fractional epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<f64>,
}

impl TabSnapshot {
    pub fn new(id: TabId, url: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Host-reported last access in whole milliseconds, when positive.
    #[allow(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        reason = "epoch milliseconds fit in i64; the fractional part is dropped on purpose"
    )]
    pub fn last_accessed_ms(&self) -> Option<i64> {
        self.last_accessed
            .filter(|ts| ts.is_finite() && *ts > 0.0)
            .map(|ts| ts.floor() as i64)
    }

    /// Title for user-facing text, falling back to the URL.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// Live mirror of the browser's tab list, kept current from tab events.
///
/// Order follows the order in which the browser reported tabs. At most one
/// tab is marked active.
#[derive(Debug, Clone, Default)]
pub struct TabRegistry {
    tabs: Vec<TabSnapshot>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, tabs: Vec<TabSnapshot>) {
        self.tabs = tabs;
    }

    pub fn upsert(&mut self, tab: TabSnapshot) {
        if tab.active {
            self.clear_active();
        }
        if let Some(existing) = self.tabs.iter_mut().find(|t| t.id == tab.id) {
            *existing = tab;
        } else {
            self.tabs.push(tab);
        }
    }

    pub fn activate(&mut self, id: TabId) {
        for tab in &mut self.tabs {
            tab.active = tab.id == id;
        }
    }

    pub fn remove(&mut self, id: TabId) {
        self.tabs.retain(|t| t.id != id);
    }

    pub fn get(&self, id: TabId) -> Option<&TabSnapshot> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn snapshot(&self) -> Vec<TabSnapshot> {
        self.tabs.clone()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    fn clear_active(&mut self) {
        for tab in &mut self.tabs {
            tab.active = false;
        }
    }
}
