//! The once-per-tick decision pass over every live tab.
//!
//! Order of checks for each tab:
//! 1. blacklisted: close now, timer or not
//! 2. whitelisted: drop any timer
//! 3. pinned / audible / unsaved input (each behind its own preference): drop any timer
//! 4. no timer yet: start one unless the tab has focus
//! 5. otherwise compare net idle time with the threshold, warning once
//!    inside the lead window and closing at or past the threshold

use crate::config::BackdatePolicy;
use crate::constants::{CLOSE_PRIORITY, WARNING_PRIORITY};
use crate::db::Storage;
use crate::duration::format_duration;
use crate::error::AppError;
use crate::host::Notification;
use crate::matcher::PatternSet;
use crate::models::{Preferences, TabId, TabSnapshot};
use crate::store::StateStore;
use crate::tracker::LifecycleTracker;
use log::{debug, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    Blacklisted,
    IdleExpired,
}

/// Side effects a tick asks the host to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Notify(Notification),
    Evict { tab_id: TabId, reason: EvictReason },
}

/// Preferences resolved once per tick.
struct TickRules<'a> {
    prefs: &'a Preferences,
    whitelist: PatternSet,
    blacklist: PatternSet,
    threshold_ms: i64,
    warn_ms: i64,
}

impl<'a> TickRules<'a> {
    fn new(prefs: &'a Preferences) -> Self {
        Self {
            prefs,
            whitelist: PatternSet::new(&prefs.whitelist),
            blacklist: PatternSet::new(&prefs.blacklist),
            threshold_ms: prefs.idle_threshold_ms(),
            warn_ms: prefs.warn_threshold_ms(),
        }
    }

    fn skip_reason(&self, tab: &TabSnapshot, tracker: &LifecycleTracker) -> Option<&'static str> {
        if self.prefs.skip_pinned && tab.pinned {
            Some("pinned")
        } else if self.prefs.skip_audible && tab.audible {
            Some("audible")
        } else if self.prefs.skip_form && tracker.has_unsaved_input(tab.id) {
            Some("unsaved input")
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PolicyEvaluator {
    backdate: BackdatePolicy,
}

impl PolicyEvaluator {
    pub fn new(backdate: BackdatePolicy) -> Self {
        Self { backdate }
    }

    /// Run one tick. Nothing ages while the host is paused, so a paused
    /// store yields no actions and no state changes.
    ///
    /// A failure on one tab is logged and does not stop the others.
    pub fn evaluate<S: Storage>(
        &self,
        store: &mut StateStore<S>,
        tracker: &LifecycleTracker,
        prefs: &Preferences,
        tabs: &[TabSnapshot],
        now: i64,
    ) -> Result<Vec<Action>, AppError> {
        store.ensure_loaded()?;
        if store.is_paused() {
            return Ok(Vec::new());
        }

        let rules = TickRules::new(prefs);
        let mut actions = Vec::new();

        for tab in tabs {
            if let Err(e) = self.evaluate_tab(store, tracker, &rules, tab, now, &mut actions) {
                warn!("Skipping tab {} this tick: {e}", tab.id);
            }
        }

        Ok(actions)
    }

    fn evaluate_tab<S: Storage>(
        &self,
        store: &mut StateStore<S>,
        tracker: &LifecycleTracker,
        rules: &TickRules<'_>,
        tab: &TabSnapshot,
        now: i64,
        actions: &mut Vec<Action>,
    ) -> Result<(), AppError> {
        let id = tab.id;

        if rules.blacklist.matches(&tab.url) {
            info!("Closing blacklisted tab {id}");
            return evict(store, id, EvictReason::Blacklisted, actions);
        }

        if rules.whitelist.matches(&tab.url) {
            return store.stop_timing(id);
        }

        if let Some(reason) = rules.skip_reason(tab, tracker) {
            if store.is_timing(id) {
                debug!("Tab {id} is exempt ({reason}); timer cleared");
            }
            return store.stop_timing(id);
        }

        let Some(idle) = store.net_idle_ms(id, now) else {
            let focused = tab.active || tracker.current_focus() == Some(id);
            if !focused {
                let origin = self.backdate.origin(tab.last_accessed_ms(), now);
                store.start_timing(id, Some(origin), now)?;
            }
            return Ok(());
        };

        let remain = rules.threshold_ms.saturating_sub(idle);

        if rules.prefs.enable_notify && remain > 0 && remain <= rules.warn_ms && !store.is_warned(id) {
            actions.push(Action::Notify(Notification {
                id: format!("warn_{id}_{now}"),
                title: "Tab closing soon".to_string(),
                message: format!(
                    "\"{}\" will be closed in {}",
                    tab.display_name(),
                    format_duration(remain)
                ),
                priority: WARNING_PRIORITY,
            }));
            store.mark_warned(id)?;
        }

        if remain <= 0 {
            if rules.prefs.enable_notify {
                actions.push(Action::Notify(Notification {
                    id: format!("close_{id}_{now}"),
                    title: "Tab closed".to_string(),
                    message: format!(
                        "\"{}\" was idle for more than {} and is being closed",
                        tab.display_name(),
                        format_duration(rules.threshold_ms)
                    ),
                    priority: CLOSE_PRIORITY,
                }));
            }
            info!("Closing tab {id} after {} idle", format_duration(idle));
            return evict(store, id, EvictReason::IdleExpired, actions);
        }

        Ok(())
    }
}

/// Queue the removal, then drop the timer. The timer goes last on every path
/// so an evicted tab never keeps stale accounting.
fn evict<S: Storage>(
    store: &mut StateStore<S>,
    tab_id: TabId,
    reason: EvictReason,
    actions: &mut Vec<Action>,
) -> Result<(), AppError> {
    actions.push(Action::Evict { tab_id, reason });
    store.stop_timing(tab_id)
}

/// One row of the settings page's idle list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleEntry {
    pub tab_id: TabId,
    pub title: String,
    pub idle_ms: i64,
    pub remain_ms: i64,
    pub idle: String,
    pub remain: String,
}

/// Background, non-whitelisted tabs with their net idle and remaining time,
/// longest idle first. Tabs without a timer report zero idle.
pub fn idle_report<S: Storage>(
    store: &StateStore<S>,
    prefs: &Preferences,
    tabs: &[TabSnapshot],
    now: i64,
) -> Vec<IdleEntry> {
    let whitelist = PatternSet::new(&prefs.whitelist);
    let threshold = prefs.idle_threshold_ms();

    let mut entries: Vec<IdleEntry> = tabs
        .iter()
        .filter(|t| !t.active && !whitelist.matches(&t.url))
        .map(|t| {
            let idle_ms = store.net_idle_ms(t.id, now).unwrap_or(0);
            let remain_ms = threshold.saturating_sub(idle_ms);
            IdleEntry {
                tab_id: t.id,
                title: t.display_name().to_string(),
                idle_ms,
                remain_ms,
                idle: format_duration(idle_ms),
                remain: format_duration(remain_ms),
            }
        })
        .collect();

    entries.sort_by(|a, b| b.idle_ms.cmp(&a.idle_ms));
    entries
}
