//! Port to the browser: tab enumeration and removal, notifications, and the
//! one-shot idle query. Every call may fail transiently; the engine logs such
//! failures and relies on the next tick instead of retrying.

use crate::error::HostError;
use crate::models::{TabId, TabSnapshot};
use crate::pause::HostIdleState;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique per emission so the browser never coalesces two notices.
    pub id: String,
    pub title: String,
    pub message: String,
    pub priority: i8,
}

pub trait Host: Send {
    /// Current tabs, in the browser's order.
    fn tabs(&mut self) -> Result<Vec<TabSnapshot>, HostError>;

    /// Close a tab after `delay`. Closing a tab that is already gone is not
    /// an error worth surfacing.
    fn remove_tab(&mut self, tab_id: TabId, delay: Duration) -> Result<(), HostError>;

    /// Fire-and-forget notification.
    fn notify(&mut self, notification: &Notification) -> Result<(), HostError>;

    /// Ask once whether the machine is idle or locked right now.
    fn query_idle_state(&mut self, detection_secs: u64) -> HostIdleState;
}
