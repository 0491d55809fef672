//! Durable per-tab timing state plus the global pause accumulator.
//!
//! Every mutation is written through to the session scope before the call
//! returns, so a crash loses at most the tick in flight. State is loaded
//! lazily on first use and is never re-derived: what was persisted is what
//! comes back, apart from timestamps that lie in the future of the resumed
//! clock.

use crate::clock::Clock;
use crate::db::{Scope, Storage};
use crate::error::AppError;
use crate::models::TabId;
use crate::pause::{HostIdleState, PauseClock};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const KEY_DEACTIVATED_AT: &str = "deactivatedAt";
const KEY_PAUSED_BASE: &str = "pausedBase";
const KEY_WARNED: &str = "warned";
const KEY_PAUSE_START: &str = "pauseStart";
const KEY_PAUSE_ACCUM: &str = "pauseAccum";

/// Answer to "what is being timed right now", as sent to the settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSnapshot {
    pub deactivated_at: BTreeMap<TabId, i64>,
    pub paused_base: BTreeMap<TabId, i64>,
    pub paused_total: i64,
}

pub struct StateStore<S: Storage> {
    storage: S,
    clock: Arc<dyn Clock>,
    loaded: bool,
    deactivated_at: BTreeMap<TabId, i64>,
    paused_base: BTreeMap<TabId, i64>,
    warned: BTreeSet<TabId>,
    pause: PauseClock,
}

impl<S: Storage> StateStore<S> {
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            loaded: false,
            deactivated_at: BTreeMap::new(),
            paused_base: BTreeMap::new(),
            warned: BTreeSet::new(),
            pause: PauseClock::default(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load persisted state once. Later calls are no-ops.
    ///
    /// Handlers run one at a time on the dispatcher thread, so the boolean
    /// guard is enough to keep a tick and an event from loading twice.
    pub fn ensure_loaded(&mut self) -> Result<(), AppError> {
        if self.loaded {
            return Ok(());
        }

        let deactivated: BTreeMap<String, i64> = self.read_key(KEY_DEACTIVATED_AT)?;
        let paused_base: BTreeMap<String, i64> = self.read_key(KEY_PAUSED_BASE)?;
        let warned: Vec<TabId> = self.read_key(KEY_WARNED)?;
        let pause_start: Option<i64> = self.read_key(KEY_PAUSE_START)?;
        let pause_accum: i64 = self.read_key(KEY_PAUSE_ACCUM)?;

        self.deactivated_at = parse_tab_keys(deactivated);
        self.paused_base = parse_tab_keys(paused_base);
        self.warned = warned.into_iter().collect();
        self.pause = PauseClock::new(pause_start, pause_accum);
        self.loaded = true;

        let now = self.clock.now_ms();
        if self.revalidate(now) {
            info!("Restored timing state had future timestamps; clamped to now");
            self.persist()?;
        }

        debug!(
            "Loaded timing state: {} timed tabs, paused={}",
            self.deactivated_at.len(),
            self.pause.is_paused()
        );
        Ok(())
    }

    /// Forget in-memory state so the next access reloads from storage.
    /// Used after the session scope has been cleared underneath us.
    pub fn reset(&mut self) {
        self.loaded = false;
        self.deactivated_at.clear();
        self.paused_base.clear();
        self.warned.clear();
        self.pause = PauseClock::default();
    }

    /// Begin timing a tab from `start_ts` (or `now`), snapshotting the
    /// current pause total so only later pauses are subtracted.
    pub fn start_timing(&mut self, id: TabId, start_ts: Option<i64>, now: i64) -> Result<(), AppError> {
        self.ensure_loaded()?;
        self.deactivated_at.insert(id, start_ts.unwrap_or(now));
        self.paused_base.insert(id, self.pause.paused_total(now));
        self.warned.remove(&id);
        self.persist()
    }

    pub fn stop_timing(&mut self, id: TabId) -> Result<(), AppError> {
        self.ensure_loaded()?;
        let had_start = self.deactivated_at.remove(&id).is_some();
        let had_base = self.paused_base.remove(&id).is_some();
        let had_warning = self.warned.remove(&id);
        if had_start || had_base || had_warning {
            self.persist()?;
        }
        Ok(())
    }

    pub fn mark_warned(&mut self, id: TabId) -> Result<(), AppError> {
        self.ensure_loaded()?;
        if self.warned.insert(id) {
            self.persist()?;
        }
        Ok(())
    }

    /// Feed a host idle signal into the pause clock.
    /// Returns `true` if the pause state changed.
    pub fn apply_idle_state(&mut self, state: HostIdleState, now: i64) -> Result<bool, AppError> {
        self.ensure_loaded()?;
        if !self.pause.apply(state, now) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn is_timing(&self, id: TabId) -> bool {
        self.deactivated_at.contains_key(&id)
    }

    pub fn deactivated_at(&self, id: TabId) -> Option<i64> {
        self.deactivated_at.get(&id).copied()
    }

    pub fn paused_base(&self, id: TabId) -> Option<i64> {
        self.paused_base.get(&id).copied()
    }

    pub fn is_warned(&self, id: TabId) -> bool {
        self.warned.contains(&id)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn pause_clock(&self) -> PauseClock {
        self.pause
    }

    pub fn paused_total(&self, now: i64) -> i64 {
        self.pause.paused_total(now)
    }

    pub fn timed_count(&self) -> usize {
        self.deactivated_at.len()
    }

    /// Net idle time: wall time since deactivation minus the pause time that
    /// accrued after timing began. `None` when the tab is not being timed.
    pub fn net_idle_ms(&self, id: TabId, now: i64) -> Option<i64> {
        let start = self.deactivated_at(id)?;
        let total = self.pause.paused_total(now);
        let base = self.paused_base(id).unwrap_or(total);
        let elapsed = now.saturating_sub(start);
        let paused_since = total.saturating_sub(base);
        Some(elapsed.saturating_sub(paused_since).max(0))
    }

    pub fn timing_snapshot(&self, now: i64) -> TimingSnapshot {
        TimingSnapshot {
            deactivated_at: self.deactivated_at.clone(),
            paused_base: self.paused_base.clone(),
            paused_total: self.pause.paused_total(now),
        }
    }

    fn revalidate(&mut self, now: i64) -> bool {
        let mut changed = self.pause.revalidate(now);
        let total = self.pause.paused_total(now);

        for start in self.deactivated_at.values_mut() {
            if *start > now {
                *start = now;
                changed = true;
            }
        }
        for base in self.paused_base.values_mut() {
            if *base > total {
                *base = total;
                changed = true;
            }
        }
        changed
    }

    fn persist(&mut self) -> Result<(), AppError> {
        let entries = [
            (KEY_DEACTIVATED_AT, serde_json::to_value(tab_keyed(&self.deactivated_at))?),
            (KEY_PAUSED_BASE, serde_json::to_value(tab_keyed(&self.paused_base))?),
            (KEY_WARNED, serde_json::to_value(&self.warned)?),
            (KEY_PAUSE_START, serde_json::to_value(self.pause.pause_start())?),
            (KEY_PAUSE_ACCUM, Value::from(self.pause.pause_accum())),
        ];
        self.storage.write_many(Scope::Session, &entries)
    }

    fn read_key<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, AppError> {
        let Some(value) = self.storage.read(Scope::Session, key)? else {
            return Ok(T::default());
        };
        if value.is_null() {
            return Ok(T::default());
        }
        match serde_json::from_value(value) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                warn!("Discarding unreadable session key {key}: {e}");
                Ok(T::default())
            }
        }
    }
}

/// JSON object keys are strings; tab ids are stored in decimal.
fn tab_keyed(map: &BTreeMap<TabId, i64>) -> BTreeMap<String, i64> {
    map.iter().map(|(id, v)| (id.to_string(), *v)).collect()
}

fn parse_tab_keys(map: BTreeMap<String, i64>) -> BTreeMap<TabId, i64> {
    map.into_iter()
        .filter_map(|(key, v)| match key.parse::<TabId>() {
            Ok(id) => Some((id, v)),
            Err(e) => {
                warn!("Dropping timing entry with tab id {key:?}: {e}");
                None
            }
        })
        .collect()
}
