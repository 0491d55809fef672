//! Shared test utilities for the engine.
//!
//! This module provides in-memory stand-ins for storage, time and the
//! browser, plus a temporary on-disk database.

#![cfg(test)]

use crate::clock::Clock;
use crate::db::{migrations, Database, Scope, Storage};
use crate::error::{AppError, HostError};
use crate::host::{Host, Notification};
use crate::models::{TabId, TabSnapshot};
use crate::pause::HostIdleState;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (`Database`, `TempDir`). The `TempDir` must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

/// Hand out a test clock where the engine expects a `dyn Clock`.
pub fn shared_clock(clock: &Arc<ManualClock>) -> Arc<dyn Clock> {
    let shared: Arc<ManualClock> = Arc::clone(clock);
    shared
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// In-memory storage with a write counter.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    session: HashMap<String, Value>,
    sync: HashMap<String, Value>,
    marker: Option<String>,
    writes: usize,
}

impl MemoryStorage {
    pub fn get(&self, scope: Scope, key: &str) -> Option<Value> {
        self.area(scope).get(key).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn area(&self, scope: Scope) -> &HashMap<String, Value> {
        match scope {
            Scope::Session => &self.session,
            Scope::Sync => &self.sync,
        }
    }

    fn area_mut(&mut self, scope: Scope) -> &mut HashMap<String, Value> {
        match scope {
            Scope::Session => &mut self.session,
            Scope::Sync => &mut self.sync,
        }
    }
}

impl Storage for MemoryStorage {
    fn read(&self, scope: Scope, key: &str) -> Result<Option<Value>, AppError> {
        Ok(self.get(scope, key))
    }

    fn write_many(&mut self, scope: Scope, entries: &[(&str, Value)]) -> Result<(), AppError> {
        let area = self.area_mut(scope);
        for (key, value) in entries {
            area.insert((*key).to_string(), value.clone());
        }
        self.writes += 1;
        Ok(())
    }

    fn begin_session(&mut self, marker: &str) -> Result<bool, AppError> {
        if self.marker.as_deref() == Some(marker) {
            return Ok(false);
        }
        self.session.clear();
        self.marker = Some(marker.to_string());
        Ok(true)
    }
}

/// What a [`FakeHost`] was asked to do.
#[derive(Debug, Default)]
pub struct HostLog {
    pub tabs: Vec<TabSnapshot>,
    pub removed: Vec<(TabId, Duration)>,
    pub notifications: Vec<Notification>,
    pub idle_state: Option<HostIdleState>,
    pub fail_removals: bool,
}

/// Browser stand-in. The log is shared so tests can inspect it after the
/// host has been moved into an engine.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    pub log: Arc<Mutex<HostLog>>,
}

impl FakeHost {
    pub fn with_tabs(tabs: Vec<TabSnapshot>) -> Self {
        let host = Self::default();
        host.set_tabs(tabs);
        host
    }

    pub fn set_tabs(&self, tabs: Vec<TabSnapshot>) {
        self.log.lock().unwrap().tabs = tabs;
    }

    pub fn set_idle_state(&self, state: HostIdleState) {
        self.log.lock().unwrap().idle_state = Some(state);
    }

    pub fn removed_ids(&self) -> Vec<TabId> {
        self.log.lock().unwrap().removed.iter().map(|(id, _)| *id).collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.log.lock().unwrap().notifications.clone()
    }
}

impl Host for FakeHost {
    fn tabs(&mut self) -> Result<Vec<TabSnapshot>, HostError> {
        Ok(self.log.lock().unwrap().tabs.clone())
    }

    fn remove_tab(&mut self, tab_id: TabId, delay: Duration) -> Result<(), HostError> {
        let mut log = self.log.lock().unwrap();
        log.removed.push((tab_id, delay));
        if log.fail_removals {
            return Err(HostError::TabGone(tab_id));
        }
        log.tabs.retain(|t| t.id != tab_id);
        Ok(())
    }

    fn notify(&mut self, notification: &Notification) -> Result<(), HostError> {
        self.log.lock().unwrap().notifications.push(notification.clone());
        Ok(())
    }

    fn query_idle_state(&mut self, _detection_secs: u64) -> HostIdleState {
        self.log.lock().unwrap().idle_state.unwrap_or(HostIdleState::Active)
    }
}

/// Background tab with the given id and url.
pub fn tab(id: TabId, url: &str) -> TabSnapshot {
    TabSnapshot::new(id, url)
}

/// Focused tab with the given id and url.
pub fn active_tab(id: TabId, url: &str) -> TabSnapshot {
    TabSnapshot {
        active: true,
        ..TabSnapshot::new(id, url)
    }
}
