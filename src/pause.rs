use serde::{Deserialize, Serialize};

/// Host-wide activity state as reported by the idle detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostIdleState {
    Active,
    Idle,
    Locked,
}

impl HostIdleState {
    pub fn is_paused(self) -> bool {
        match self {
            HostIdleState::Idle | HostIdleState::Locked => true,
            HostIdleState::Active => false,
        }
    }
}

/// Global pause accounting.
///
/// While the host is idle or locked no tab ages. Instead of touching every
/// tab on each transition, the clock keeps one running total of paused
/// milliseconds; a tab subtracts whatever part of that total accrued after
/// its own timing started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseClock {
    pause_start: Option<i64>,
    pause_accum: i64,
}

impl PauseClock {
    pub fn new(pause_start: Option<i64>, pause_accum: i64) -> Self {
        Self {
            pause_start,
            pause_accum,
        }
    }

    pub fn pause_start(&self) -> Option<i64> {
        self.pause_start
    }

    pub fn pause_accum(&self) -> i64 {
        self.pause_accum
    }

    pub fn is_paused(&self) -> bool {
        self.pause_start.is_some()
    }

    /// Total paused milliseconds up to `now`, including the open segment.
    pub fn paused_total(&self, now: i64) -> i64 {
        let open = self
            .pause_start
            .map_or(0, |start| now.saturating_sub(start).max(0));
        self.pause_accum.saturating_add(open)
    }

    /// Apply a host signal. Returns `true` if the state changed.
    ///
    /// Repeated idle/locked signals while paused, and active signals while
    /// active, are no-ops.
    pub fn apply(&mut self, state: HostIdleState, now: i64) -> bool {
        match (state.is_paused(), self.pause_start) {
            (true, None) => {
                self.pause_start = Some(now);
                true
            }
            (false, Some(start)) => {
                self.pause_accum = self
                    .pause_accum
                    .saturating_add(now.saturating_sub(start).max(0));
                self.pause_start = None;
                true
            }
            (true, Some(_)) | (false, None) => false,
        }
    }

    /// Repair values restored from storage against the current clock.
    /// Returns `true` if anything had to change.
    pub fn revalidate(&mut self, now: i64) -> bool {
        let mut changed = false;
        if let Some(start) = self.pause_start {
            if start > now {
                self.pause_start = Some(now);
                changed = true;
            }
        }
        if self.pause_accum < 0 {
            self.pause_accum = 0;
            changed = true;
        }
        changed
    }
}
