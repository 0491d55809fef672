use crate::config::BackdatePolicy;
use crate::db::Storage;
use crate::error::AppError;
use crate::matcher::PatternSet;
use crate::models::{TabId, TabSnapshot};
use crate::store::StateStore;
use log::debug;
use std::collections::HashSet;

/// Turns browser tab events into timing-state changes.
///
/// The tracker never closes anything itself; it only starts and stops
/// timers. It also remembers which tab has focus and which tabs reported
/// unsaved form input, since the evaluator needs both.
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    current_focus: Option<TabId>,
    unsaved: HashSet<TabId>,
    backdate: BackdatePolicy,
}

impl LifecycleTracker {
    pub fn new(backdate: BackdatePolicy) -> Self {
        Self {
            current_focus: None,
            unsaved: HashSet::new(),
            backdate,
        }
    }

    pub fn current_focus(&self) -> Option<TabId> {
        self.current_focus
    }

    pub fn has_unsaved_input(&self, id: TabId) -> bool {
        self.unsaved.contains(&id)
    }

    /// A tab opened without focus starts aging right away, from the
    /// browser's last-accessed time when it has one.
    pub fn on_created<S: Storage>(
        &mut self,
        store: &mut StateStore<S>,
        tab: &TabSnapshot,
        whitelist: &PatternSet,
        now: i64,
    ) -> Result<(), AppError> {
        if tab.active {
            return Ok(());
        }
        if whitelist.matches(&tab.url) {
            return store.stop_timing(tab.id);
        }
        let origin = self.backdate.origin(tab.last_accessed_ms(), now);
        store.start_timing(tab.id, Some(origin), now)
    }

    /// Focus moved to `tab_id`. The previously focused tab starts aging,
    /// unless it already has a timer: a focus round trip must not reset it.
    pub fn on_activated<S: Storage>(
        &mut self,
        store: &mut StateStore<S>,
        tab_id: TabId,
        now: i64,
    ) -> Result<(), AppError> {
        if let Some(previous) = self.current_focus.filter(|prev| *prev != tab_id) {
            if !store.is_timing(previous) {
                store.start_timing(previous, None, now)?;
            }
        }
        self.current_focus = Some(tab_id);
        store.stop_timing(tab_id)
    }

    pub fn on_removed<S: Storage>(&mut self, store: &mut StateStore<S>, tab_id: TabId) -> Result<(), AppError> {
        self.unsaved.remove(&tab_id);
        if self.current_focus == Some(tab_id) {
            self.current_focus = None;
        }
        store.stop_timing(tab_id)
    }

    /// Navigating onto a whitelisted page stops its timer immediately,
    /// whether or not the tab has focus.
    pub fn on_url_changed<S: Storage>(
        &mut self,
        store: &mut StateStore<S>,
        tab: &TabSnapshot,
        whitelist: &PatternSet,
    ) -> Result<(), AppError> {
        if whitelist.matches(&tab.url) {
            debug!("Tab {} navigated to a whitelisted page", tab.id);
            return store.stop_timing(tab.id);
        }
        Ok(())
    }

    /// Process start or extension install: adopt the focused tab and give
    /// every background tab without a timer one that starts at its last
    /// access.
    pub fn on_startup<S: Storage>(
        &mut self,
        store: &mut StateStore<S>,
        tabs: &[TabSnapshot],
        now: i64,
    ) -> Result<(), AppError> {
        store.ensure_loaded()?;

        if let Some(focused) = tabs.iter().find(|t| t.active) {
            self.current_focus = Some(focused.id);
        }

        for tab in tabs.iter().filter(|t| !t.active) {
            if !store.is_timing(tab.id) {
                let origin = self.backdate.origin(tab.last_accessed_ms(), now);
                store.start_timing(tab.id, Some(origin), now)?;
            }
        }
        Ok(())
    }

    /// Content script report; only the latest value per tab is kept.
    pub fn set_form_status(&mut self, tab_id: TabId, has_unsaved: bool) {
        if has_unsaved {
            self.unsaved.insert(tab_id);
        } else {
            self.unsaved.remove(&tab_id);
        }
    }
}
