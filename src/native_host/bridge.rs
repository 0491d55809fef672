use super::protocol::{write_message, OutgoingMessage};
use crate::error::HostError;
use crate::host::{Host, Notification};
use crate::models::{TabId, TabRegistry, TabSnapshot};
use crate::pause::HostIdleState;
use crate::platform::IdleProbe;
use crate::safe_lock;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// [`Host`] implementation on top of the native messaging channel.
///
/// Tab enumeration is answered from the registry the reader thread keeps in
/// sync with browser events, so a tick never waits on a round trip.
/// Removals and notifications are one-way messages to the extension.
pub struct BrowserBridge<W: Write + Send> {
    registry: Arc<Mutex<TabRegistry>>,
    writer: Arc<Mutex<W>>,
    probe: Box<dyn IdleProbe>,
}

impl<W: Write + Send> BrowserBridge<W> {
    pub fn new(registry: Arc<Mutex<TabRegistry>>, writer: Arc<Mutex<W>>, probe: Box<dyn IdleProbe>) -> Self {
        Self {
            registry,
            writer,
            probe,
        }
    }
}

impl<W: Write + Send> Host for BrowserBridge<W> {
    fn tabs(&mut self) -> Result<Vec<TabSnapshot>, HostError> {
        Ok(safe_lock(&self.registry, "Tab registry").snapshot())
    }

    fn remove_tab(&mut self, tab_id: TabId, delay: Duration) -> Result<(), HostError> {
        {
            let mut registry = safe_lock(&self.registry, "Tab registry");
            if registry.get(tab_id).is_none() {
                return Err(HostError::TabGone(tab_id));
            }
            // Forget it now so the next tick does not pick it up again
            // before the browser confirms the removal.
            registry.remove(tab_id);
        }

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        send(&self.writer, &OutgoingMessage::RemoveTab { tab_id, delay_ms })
    }

    fn notify(&mut self, notification: &Notification) -> Result<(), HostError> {
        send(&self.writer, &OutgoingMessage::Notify(notification.clone()))
    }

    fn query_idle_state(&mut self, detection_secs: u64) -> HostIdleState {
        self.probe.query_state(detection_secs)
    }
}

/// Write one message under the shared writer lock.
pub(crate) fn send<W: Write>(writer: &Mutex<W>, message: &OutgoingMessage) -> Result<(), HostError> {
    let mut guard = safe_lock(writer, "Message writer");
    write_message(&mut *guard, message).map_err(|e| {
        if e.kind() == io::ErrorKind::BrokenPipe {
            HostError::Disconnected
        } else {
            HostError::Io(e)
        }
    })
}
