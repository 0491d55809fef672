//! Host idle detection for the native side.
//!
//! The browser's own idle API is the primary source; this probe answers the
//! one-shot query the engine makes at startup and whenever the extension
//! asks the native host directly.

use crate::pause::HostIdleState;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::X11IdleProbe as NativeIdleProbe;

pub trait IdleProbe: Send {
    /// Locked beats idle; idle means no input for at least `detection_secs`.
    fn query_state(&self, detection_secs: u64) -> HostIdleState;
}

/// Probe for platforms without a native implementation. Always active, so
/// timing proceeds and browser idle events alone drive pausing.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysActive;

impl AlwaysActive {
    pub fn new() -> Self {
        Self
    }
}

impl IdleProbe for AlwaysActive {
    fn query_state(&self, _detection_secs: u64) -> HostIdleState {
        HostIdleState::Active
    }
}

#[cfg(not(target_os = "linux"))]
pub use AlwaysActive as NativeIdleProbe;

/// Map raw probe readings to a host state.
pub fn classify(locked: bool, idle_secs: u64, detection_secs: u64) -> HostIdleState {
    if locked {
        HostIdleState::Locked
    } else if idle_secs >= detection_secs {
        HostIdleState::Idle
    } else {
        HostIdleState::Active
    }
}
