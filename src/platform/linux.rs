use super::{classify, IdleProbe};
use crate::pause::HostIdleState;
use log::warn;
use std::sync::Mutex;
use x11rb::connection::Connection;
use x11rb::protocol::screensaver;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

/// Idle probe backed by the X11 screensaver extension.
///
/// Without a reachable X server (Wayland, headless) every query reports
/// active, leaving pausing to the browser's idle events.
pub struct X11IdleProbe {
    conn: Option<Mutex<RustConnection>>,
    root: Window,
}

impl Default for X11IdleProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl X11IdleProbe {
    pub fn new() -> Self {
        match x11rb::connect(None) {
            Ok((conn, screen_num)) => {
                let Some(root) = conn.setup().roots.get(screen_num).map(|s| s.root) else {
                    warn!("Invalid X screen number {screen_num}; idle probing disabled");
                    return Self { conn: None, root: 0 };
                };
                Self {
                    conn: Some(Mutex::new(conn)),
                    root,
                }
            }
            Err(e) => {
                warn!("Failed to connect to X server: {e}. Idle probing disabled");
                Self { conn: None, root: 0 }
            }
        }
    }

    /// Screensaver state and seconds since the last input event.
    fn screensaver_info(&self) -> Option<(bool, u64)> {
        let conn = self.conn.as_ref()?.lock().ok()?;
        let info = screensaver::query_info(&*conn, self.root)
            .ok()?
            .reply()
            .ok()?;

        let locked = info.state == u8::from(screensaver::State::ON);
        Some((locked, u64::from(info.ms_since_user_input / 1000)))
    }
}

impl IdleProbe for X11IdleProbe {
    fn query_state(&self, detection_secs: u64) -> HostIdleState {
        self.screensaver_info()
            .map_or(HostIdleState::Active, |(locked, idle_secs)| {
                classify(locked, idle_secs, detection_secs)
            })
    }
}
