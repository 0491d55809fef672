//! The engine owns all timing state and reacts to one event at a time.
//!
//! Browser events go through the lifecycle tracker, ticks through the policy
//! evaluator, and whatever the evaluator decides is carried out on the host.
//! Host failures never stop the engine: they are logged and the next tick
//! picks up from whatever the browser reports then.

pub mod dispatcher;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::db::Storage;
use crate::error::AppError;
use crate::host::Host;
use crate::matcher::{hostname, PatternSet};
use crate::models::{ListKind, Preferences, TabId, TabSnapshot};
use crate::pause::HostIdleState;
use crate::policy::{idle_report, Action, IdleEntry, PolicyEvaluator};
use crate::store::{StateStore, TimingSnapshot};
use crate::tracker::LifecycleTracker;
use crate::validation::{validate_list_url, validate_preferences};
use log::{debug, info, warn};
use std::sync::Arc;

pub use dispatcher::Dispatcher;

/// Inputs to the engine, one per browser notification or settings request.
#[derive(Debug, Clone)]
pub enum Event {
    /// Extension (re)connected. `session_id` identifies the browser run;
    /// when it changes, persisted timing state belongs to dead tab ids.
    Startup {
        session_id: Option<String>,
        tabs: Vec<TabSnapshot>,
    },
    TabCreated(TabSnapshot),
    TabActivated(TabId),
    TabRemoved(TabId),
    TabUpdated {
        tab: TabSnapshot,
        url_changed: bool,
    },
    IdleStateChanged(HostIdleState),
    FormStatus {
        tab_id: TabId,
        has_unsaved: bool,
    },
    SavePreferences(Preferences),
    AddToList {
        url: String,
        list: ListKind,
    },
    QueryTiming,
    QueryIdleReport,
}

/// Answers for the settings page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Timing(TimingSnapshot),
    IdleReport(Vec<IdleEntry>),
    Error(String),
}

pub struct Engine<S: Storage, H: Host> {
    store: StateStore<S>,
    tracker: LifecycleTracker,
    evaluator: PolicyEvaluator,
    host: H,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: Storage, H: Host> Engine<S, H> {
    pub fn new(storage: S, host: H, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store: StateStore::new(storage, Arc::clone(&clock)),
            tracker: LifecycleTracker::new(config.backdate),
            evaluator: PolicyEvaluator::new(config.backdate),
            host,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub fn tracker(&self) -> &LifecycleTracker {
        &self.tracker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn handle(&mut self, event: Event) -> Result<Option<Reply>, AppError> {
        let now = self.clock.now_ms();

        match event {
            Event::Startup { session_id, tabs } => {
                self.on_startup(session_id.as_deref(), &tabs, now)?;
            }
            Event::TabCreated(tab) => {
                let whitelist = self.whitelist()?;
                self.tracker.on_created(&mut self.store, &tab, &whitelist, now)?;
            }
            Event::TabActivated(tab_id) => {
                self.tracker.on_activated(&mut self.store, tab_id, now)?;
            }
            Event::TabRemoved(tab_id) => {
                self.tracker.on_removed(&mut self.store, tab_id)?;
            }
            Event::TabUpdated { tab, url_changed } => {
                if url_changed {
                    let whitelist = self.whitelist()?;
                    self.tracker.on_url_changed(&mut self.store, &tab, &whitelist)?;
                }
            }
            Event::IdleStateChanged(state) => {
                if self.store.apply_idle_state(state, now)? {
                    info!("Host is now {state:?}; paused={}", self.store.is_paused());
                }
            }
            Event::FormStatus { tab_id, has_unsaved } => {
                self.tracker.set_form_status(tab_id, has_unsaved);
            }
            Event::SavePreferences(prefs) => {
                let prefs = validate_preferences(prefs)?;
                prefs.save(self.store.storage_mut())?;
                info!(
                    "Preferences saved: idle after {}ms, {} whitelisted, {} blacklisted",
                    prefs.idle_threshold_ms(),
                    prefs.whitelist.len(),
                    prefs.blacklist.len()
                );
            }
            Event::AddToList { url, list } => {
                self.on_add_to_list(&url, list)?;
            }
            Event::QueryTiming => {
                self.store.ensure_loaded()?;
                return Ok(Some(Reply::Timing(self.store.timing_snapshot(now))));
            }
            Event::QueryIdleReport => {
                self.store.ensure_loaded()?;
                let prefs = Preferences::load(self.store.storage())?;
                let tabs = self.host.tabs()?;
                return Ok(Some(Reply::IdleReport(idle_report(&self.store, &prefs, &tabs, now))));
            }
        }

        Ok(None)
    }

    /// One evaluation pass. Never fails: problems are logged and the next
    /// tick tries again.
    pub fn tick(&mut self) {
        if let Err(e) = self.try_tick() {
            warn!("Tick skipped: {e}");
        }
    }

    fn try_tick(&mut self) -> Result<(), AppError> {
        let prefs = Preferences::load(self.store.storage())?;
        let tabs = self.host.tabs()?;
        let now = self.clock.now_ms();

        let actions = self
            .evaluator
            .evaluate(&mut self.store, &self.tracker, &prefs, &tabs, now)?;

        for action in actions {
            match action {
                Action::Notify(notification) => {
                    if let Err(e) = self.host.notify(&notification) {
                        debug!("Notification {} not shown: {e}", notification.id);
                    }
                }
                Action::Evict { tab_id, reason } => {
                    debug!("Evicting tab {tab_id} ({reason:?})");
                    self.remove_tab(tab_id);
                }
            }
        }
        Ok(())
    }

    fn on_startup(&mut self, session_id: Option<&str>, tabs: &[TabSnapshot], now: i64) -> Result<(), AppError> {
        if let Some(marker) = session_id {
            if self.store.storage_mut().begin_session(marker)? {
                info!("New browser session; discarding timing state from the previous one");
                self.store.reset();
                // Tab ids are reused across sessions
                self.tracker = LifecycleTracker::new(self.config.backdate);
            }
        }
        self.store.ensure_loaded()?;

        // The browser only reports idle transitions, so ask once up front.
        // This can only start a pause; resuming waits for the browser.
        let state = self.host.query_idle_state(self.config.idle_detection_secs);
        if state.is_paused() && !self.store.is_paused() {
            self.store.apply_idle_state(state, now)?;
            info!("Host is {state:?} at startup; pausing");
        }

        self.tracker.on_startup(&mut self.store, tabs, now)?;
        info!(
            "Engine started: {} tabs, {} timed",
            tabs.len(),
            self.store.timed_count()
        );
        Ok(())
    }

    /// Add the URL's hostname to a list. Blacklisting also closes every open
    /// tab on that exact hostname right away.
    fn on_add_to_list(&mut self, url: &str, list: ListKind) -> Result<(), AppError> {
        let host_name = validate_list_url(url)?;

        let mut prefs = Preferences::load(self.store.storage())?;
        if prefs.add_host(list, &host_name) {
            prefs.save(self.store.storage_mut())?;
            info!("Added {host_name} to the {list:?}");
        }

        if list == ListKind::Blacklist {
            let tabs = self.host.tabs()?;
            let doomed: Vec<TabId> = tabs
                .iter()
                .filter(|t| hostname(&t.url).as_deref() == Some(host_name.as_str()))
                .map(|t| t.id)
                .collect();
            for tab_id in doomed {
                self.remove_tab(tab_id);
                self.store.stop_timing(tab_id)?;
            }
        }
        Ok(())
    }

    fn remove_tab(&mut self, tab_id: TabId) {
        match self.host.remove_tab(tab_id, self.config.eviction_delay) {
            Ok(()) => {}
            Err(e) if e.is_tab_gone() => debug!("Tab {tab_id} was already closed"),
            Err(e) => warn!("Failed to close tab {tab_id}: {e}"),
        }
    }

    fn whitelist(&self) -> Result<PatternSet, AppError> {
        let prefs = Preferences::load(self.store.storage())?;
        Ok(PatternSet::new(&prefs.whitelist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Scope;
    use crate::test_utils::{active_tab, setup_test_db, shared_clock, tab, FakeHost, ManualClock, MemoryStorage};
    use std::time::Duration;

    const MIN: i64 = 60_000;

    fn engine(tabs: Vec<TabSnapshot>) -> (Engine<MemoryStorage, FakeHost>, FakeHost, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let host = FakeHost::with_tabs(tabs);
        let engine = Engine::new(
            MemoryStorage::default(),
            host.clone(),
            shared_clock(&clock),
            EngineConfig::default(),
        );
        (engine, host, clock)
    }

    fn startup(tabs: Vec<TabSnapshot>) -> Event {
        Event::Startup {
            session_id: Some("boot-1".into()),
            tabs,
        }
    }

    #[test]
    fn test_startup_then_idle_tab_is_warned_and_closed() {
        let tabs = vec![active_tab(1, "https://a.test/"), tab(2, "https://b.test/")];
        let (mut engine, host, clock) = engine(tabs.clone());

        engine.handle(startup(tabs)).unwrap();
        assert!(engine.store().is_timing(2));
        assert!(!engine.store().is_timing(1));

        clock.set(20 * MIN);
        engine.tick();
        let notes = host.notifications();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].id.starts_with("warn_2_"));

        clock.set(30 * MIN);
        engine.tick();
        assert_eq!(host.removed_ids(), vec![2]);
        assert_eq!(
            host.log.lock().unwrap().removed[0].1,
            Duration::from_millis(crate::constants::EVICTION_DELAY_MS)
        );
        assert!(!engine.store().is_timing(2));

        // The tab is gone from the browser; nothing more happens
        clock.set(31 * MIN);
        engine.tick();
        assert_eq!(host.removed_ids(), vec![2]);
    }

    #[test]
    fn test_startup_adopts_host_idle_state() {
        let (mut engine, host, clock) = engine(vec![tab(2, "https://b.test/")]);
        host.set_idle_state(HostIdleState::Locked);

        engine.handle(startup(vec![tab(2, "https://b.test/")])).unwrap();
        assert!(engine.store().is_paused());

        clock.set(120 * MIN);
        engine.tick();
        assert!(host.removed_ids().is_empty());

        engine
            .handle(Event::IdleStateChanged(HostIdleState::Active))
            .unwrap();
        assert!(!engine.store().is_paused());
        assert_eq!(engine.store().net_idle_ms(2, 120 * MIN), Some(0));
    }

    #[test]
    fn test_relaunch_while_locked_keeps_pause() {
        let tabs = vec![active_tab(1, "https://a.test/"), tab(2, "https://b.test/")];
        let (mut engine, host, clock) = engine(tabs.clone());
        engine.handle(startup(tabs.clone())).unwrap();

        clock.set(MIN);
        engine
            .handle(Event::IdleStateChanged(HostIdleState::Locked))
            .unwrap();

        // The probe cannot see the lock, but the restored pause must hold
        clock.set(5 * MIN);
        let storage = engine.store().storage().clone();
        let mut relaunched = Engine::new(storage, host.clone(), shared_clock(&clock), EngineConfig::default());
        relaunched.handle(startup(tabs)).unwrap();
        assert!(relaunched.store().is_paused());

        clock.set(120 * MIN);
        relaunched.tick();
        assert!(host.removed_ids().is_empty());

        relaunched
            .handle(Event::IdleStateChanged(HostIdleState::Active))
            .unwrap();
        assert!(!relaunched.store().is_paused());
        assert_eq!(relaunched.store().net_idle_ms(2, 120 * MIN), Some(MIN));
    }

    #[test]
    fn test_new_browser_session_forgets_form_status() {
        let (mut engine, _host, _clock) = engine(Vec::new());
        engine.handle(startup(Vec::new())).unwrap();
        engine.handle(Event::TabActivated(3)).unwrap();
        engine
            .handle(Event::FormStatus {
                tab_id: 3,
                has_unsaved: true,
            })
            .unwrap();
        assert!(engine.tracker().has_unsaved_input(3));

        engine
            .handle(Event::Startup {
                session_id: Some("boot-2".into()),
                tabs: Vec::new(),
            })
            .unwrap();
        assert!(!engine.tracker().has_unsaved_input(3));
        assert_eq!(engine.tracker().current_focus(), None);
    }

    #[test]
    fn test_new_browser_session_discards_old_timers() {
        let (mut engine, _host, _clock) = engine(Vec::new());
        engine.handle(startup(vec![tab(7, "https://a.test/")])).unwrap();
        assert!(engine.store().is_timing(7));

        // Same session: native host relaunch keeps timers
        engine.handle(startup(Vec::new())).unwrap();
        assert!(engine.store().is_timing(7));

        engine
            .handle(Event::Startup {
                session_id: Some("boot-2".into()),
                tabs: Vec::new(),
            })
            .unwrap();
        assert!(!engine.store().is_timing(7));
    }

    #[test]
    fn test_focus_events_drive_timers() {
        let (mut engine, _host, clock) = engine(Vec::new());
        engine.handle(Event::TabActivated(1)).unwrap();
        clock.set(MIN);
        engine.handle(Event::TabActivated(2)).unwrap();
        assert_eq!(engine.store().deactivated_at(1), Some(MIN));

        engine.handle(Event::TabRemoved(1)).unwrap();
        assert!(!engine.store().is_timing(1));
        assert_eq!(engine.tracker().current_focus(), Some(2));
    }

    #[test]
    fn test_created_and_navigated_respect_whitelist() {
        let (mut engine, _host, _clock) = engine(Vec::new());
        engine
            .handle(Event::SavePreferences(Preferences {
                whitelist: vec!["docs.rs".into()],
                ..Preferences::default()
            }))
            .unwrap();

        engine.handle(Event::TabCreated(tab(1, "https://docs.rs/"))).unwrap();
        engine.handle(Event::TabCreated(tab(2, "https://a.test/"))).unwrap();
        assert!(!engine.store().is_timing(1));
        assert!(engine.store().is_timing(2));

        engine
            .handle(Event::TabUpdated {
                tab: tab(2, "https://docs.rs/serde"),
                url_changed: true,
            })
            .unwrap();
        assert!(!engine.store().is_timing(2));
    }

    #[test]
    fn test_invalid_preferences_are_rejected_and_not_saved() {
        let (mut engine, _host, _clock) = engine(Vec::new());
        let result = engine.handle(Event::SavePreferences(Preferences {
            idle_minutes: 0,
            ..Preferences::default()
        }));
        assert!(matches!(result, Err(AppError::InvalidInput { .. })));
        assert_eq!(engine.store().storage().get(Scope::Sync, "preferences"), None);
    }

    #[test]
    fn test_blacklisting_closes_matching_tabs_now() {
        let tabs = vec![
            active_tab(1, "https://www.reddit.com/r/rust"),
            tab(2, "https://www.reddit.com/"),
            tab(3, "https://old.reddit.com/"),
        ];
        let (mut engine, host, _clock) = engine(tabs.clone());
        engine.handle(startup(tabs)).unwrap();

        engine
            .handle(Event::AddToList {
                url: "https://www.reddit.com/r/rust".into(),
                list: ListKind::Blacklist,
            })
            .unwrap();

        assert_eq!(host.removed_ids(), vec![1, 2]);
        assert!(!engine.store().is_timing(2));
        assert!(engine.store().is_timing(3));

        let prefs = Preferences::load(engine.store().storage()).unwrap();
        assert_eq!(prefs.blacklist, vec!["www.reddit.com".to_string()]);
    }

    #[test]
    fn test_whitelisting_via_add_to_list() {
        let (mut engine, host, _clock) = engine(vec![tab(1, "https://docs.rs/")]);
        engine
            .handle(Event::AddToList {
                url: "https://docs.rs/regex".into(),
                list: ListKind::Whitelist,
            })
            .unwrap();
        assert!(host.removed_ids().is_empty());

        let prefs = Preferences::load(engine.store().storage()).unwrap();
        assert_eq!(prefs.whitelist, vec!["docs.rs".to_string()]);
        assert!(engine
            .handle(Event::AddToList {
                url: "about:blank".into(),
                list: ListKind::Whitelist,
            })
            .is_err());
    }

    #[test]
    fn test_failed_removal_does_not_stop_tick() {
        let tabs = vec![tab(1, "https://a.test/"), tab(2, "https://b.test/")];
        let (mut engine, host, clock) = engine(tabs.clone());
        engine.handle(startup(tabs)).unwrap();
        host.log.lock().unwrap().fail_removals = true;

        clock.set(30 * MIN);
        engine.tick();
        assert_eq!(host.removed_ids(), vec![1, 2]);
        assert_eq!(engine.store().timed_count(), 0);
    }

    #[test]
    fn test_form_status_exempts_tab() {
        let tabs = vec![tab(1, "https://a.test/")];
        let (mut engine, host, clock) = engine(tabs.clone());
        engine.handle(startup(tabs)).unwrap();
        engine
            .handle(Event::FormStatus {
                tab_id: 1,
                has_unsaved: true,
            })
            .unwrap();

        clock.set(60 * MIN);
        engine.tick();
        assert!(host.removed_ids().is_empty());
        assert!(!engine.store().is_timing(1));
    }

    #[test]
    fn test_queries() {
        let tabs = vec![active_tab(1, "https://a.test/"), tab(2, "https://b.test/")];
        let (mut engine, _host, clock) = engine(tabs.clone());
        engine.handle(startup(tabs)).unwrap();
        clock.set(5 * MIN);

        let Some(Reply::Timing(timing)) = engine.handle(Event::QueryTiming).unwrap() else {
            panic!("expected timing reply");
        };
        assert_eq!(timing.deactivated_at.get(&2), Some(&0));
        assert_eq!(timing.paused_total, 0);

        let Some(Reply::IdleReport(report)) = engine.handle(Event::QueryIdleReport).unwrap() else {
            panic!("expected idle report");
        };
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].tab_id, 2);
        assert_eq!(report[0].idle, "5 minutes");
    }

    #[test]
    fn test_storage_survives_engine_restart() {
        let tabs = vec![tab(2, "https://b.test/")];
        let (mut engine, host, clock) = engine(tabs.clone());
        engine.handle(startup(tabs.clone())).unwrap();
        clock.set(10 * MIN);

        // Hand the persisted storage to a fresh engine, as after a relaunch
        let storage = engine.store().storage().clone();
        let mut restarted = Engine::new(storage, host.clone(), shared_clock(&clock), EngineConfig::default());
        restarted.handle(startup(tabs)).unwrap();
        assert_eq!(restarted.store().deactivated_at(2), Some(0));

        clock.set(30 * MIN);
        restarted.tick();
        assert_eq!(host.removed_ids(), vec![2]);
    }

    #[test]
    fn test_engine_on_sqlite_storage() {
        let (db, _dir) = setup_test_db();
        let clock = Arc::new(ManualClock::new(0));
        let tabs = vec![active_tab(1, "https://a.test/"), tab(2, "https://b.test/")];
        let host = FakeHost::with_tabs(tabs.clone());
        let mut engine = Engine::new(db, host.clone(), shared_clock(&clock), EngineConfig::default());

        engine.handle(startup(tabs)).unwrap();
        engine
            .handle(Event::IdleStateChanged(HostIdleState::Idle))
            .unwrap();
        clock.advance(45 * MIN);
        engine
            .handle(Event::IdleStateChanged(HostIdleState::Active))
            .unwrap();

        clock.advance(29 * MIN);
        engine.tick();
        assert!(host.removed_ids().is_empty());

        clock.advance(MIN);
        engine.tick();
        assert_eq!(host.removed_ids(), vec![2]);
        assert_eq!(
            engine.store().storage().read(Scope::Session, "deactivatedAt").unwrap(),
            Some(serde_json::json!({}))
        );
    }
}
