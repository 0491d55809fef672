//! Native messaging host for the browser extension.
//!
//! The host reads framed JSON from the browser, mirrors tab state into a
//! [`TabRegistry`], and forwards everything else to the engine's dispatcher.
//! The engine talks back through a [`BrowserBridge`] sharing the same
//! writer, so replies and commands never interleave mid-frame.

pub mod bridge;
pub mod protocol;

use crate::engine::{Dispatcher, Event, Reply};
use crate::models::TabRegistry;
use crate::platform::IdleProbe;
use crate::safe_lock;
use log::{debug, warn};
use protocol::{IncomingMessage, OutgoingMessage};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

pub use bridge::BrowserBridge;

pub struct NativeHost<R: Read, W: Write + Send + 'static> {
    reader: R,
    writer: Arc<Mutex<W>>,
    registry: Arc<Mutex<TabRegistry>>,
}

impl<R: Read, W: Write + Send + 'static> NativeHost<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            registry: Arc::new(Mutex::new(TabRegistry::new())),
        }
    }

    /// The engine's view of the browser.
    pub fn bridge(&self, probe: Box<dyn IdleProbe>) -> BrowserBridge<W> {
        BrowserBridge::new(Arc::clone(&self.registry), Arc::clone(&self.writer), probe)
    }

    /// Callback for the dispatcher to send query answers back to the browser.
    pub fn reply_sink(&self) -> Box<dyn FnMut(Reply) + Send> {
        let writer = Arc::clone(&self.writer);
        Box::new(move |reply| {
            if let Err(e) = bridge::send(&writer, &reply_message(reply)) {
                warn!("Failed to send reply: {e}");
            }
        })
    }

    /// Read until the browser disconnects.
    ///
    /// Returns the I/O error that ended the loop; `UnexpectedEof` means the
    /// browser closed the pipe. Messages that do not parse are answered with
    /// an error and skipped.
    pub fn run(&mut self, dispatcher: &Dispatcher) -> io::Result<()> {
        loop {
            let frame = protocol::read_frame(&mut self.reader)?;
            let message = match protocol::decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring malformed message: {e}");
                    let reply = OutgoingMessage::Error {
                        message: format!("malformed message: {e}"),
                    };
                    if let Err(e) = bridge::send(&self.writer, &reply) {
                        warn!("Failed to send error reply: {e}");
                    }
                    continue;
                }
            };

            if let Some(event) = self.route(message) {
                if !dispatcher.send(event) {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "engine stopped"));
                }
            }
        }
    }

    /// Apply a message to the tab mirror and turn it into an engine event.
    /// The mirror is updated first so a tick triggered by the event already
    /// sees the new tab state.
    fn route(&self, message: IncomingMessage) -> Option<Event> {
        let mut registry = safe_lock(&self.registry, "Tab registry");

        let event = match message {
            IncomingMessage::Startup { session_id, tabs } => {
                debug!("Startup with {} tabs", tabs.len());
                registry.replace_all(tabs.clone());
                Event::Startup { session_id, tabs }
            }
            IncomingMessage::TabCreated { tab } => {
                registry.upsert(tab.clone());
                Event::TabCreated(tab)
            }
            IncomingMessage::TabActivated { tab_id } => {
                registry.activate(tab_id);
                Event::TabActivated(tab_id)
            }
            IncomingMessage::TabRemoved { tab_id } => {
                registry.remove(tab_id);
                Event::TabRemoved(tab_id)
            }
            IncomingMessage::TabUpdated { tab, url_changed } => {
                registry.upsert(tab.clone());
                Event::TabUpdated { tab, url_changed }
            }
            IncomingMessage::TabsSnapshot { tabs } => {
                registry.replace_all(tabs);
                return None;
            }
            IncomingMessage::IdleState { state } => Event::IdleStateChanged(state),
            IncomingMessage::FormStatus { tab_id, has_unsaved } => Event::FormStatus { tab_id, has_unsaved },
            IncomingMessage::SavePreferences { preferences } => Event::SavePreferences(preferences),
            IncomingMessage::AddToList { url, list } => Event::AddToList { url, list },
            IncomingMessage::GetTimingState => Event::QueryTiming,
            IncomingMessage::GetIdleReport => Event::QueryIdleReport,
        };
        Some(event)
    }
}

fn reply_message(reply: Reply) -> OutgoingMessage {
    match reply {
        Reply::Timing(snapshot) => OutgoingMessage::TimingState(snapshot),
        Reply::IdleReport(entries) => OutgoingMessage::IdleReport { entries },
        Reply::Error(message) => OutgoingMessage::Error { message },
    }
}
