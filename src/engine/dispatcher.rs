use super::{Engine, Event, Reply};
use crate::db::Storage;
use crate::host::Host;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Runs an [`Engine`] on its own thread.
///
/// Events are handled strictly in arrival order, interleaved with ticks. The
/// next tick is scheduled only after the previous one has finished, so a
/// slow tick delays the following one instead of overlapping it.
///
/// Dropping the dispatcher lets the worker drain queued events and exit;
/// [`Dispatcher::stop`] makes it exit without handling what is still queued.
pub struct Dispatcher {
    running: Arc<AtomicBool>,
    sender: Sender<Command>,
}

enum Command {
    Handle(Event),
    Stop,
}

impl Dispatcher {
    pub fn start<S, H, F>(engine: Engine<S, H>, on_reply: F) -> (Self, thread::JoinHandle<()>)
    where
        S: Storage + 'static,
        H: Host + 'static,
        F: FnMut(Reply) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let tick_interval = engine.config().tick_interval;

        let handle = thread::spawn(move || {
            let mut engine = engine;
            let mut on_reply = on_reply;
            let mut next_tick = Instant::now() + tick_interval;

            while worker_running.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= next_tick {
                    engine.tick();
                    next_tick = Instant::now() + tick_interval;
                    continue;
                }

                match receiver.recv_timeout(next_tick.saturating_duration_since(now)) {
                    Ok(Command::Handle(event)) => {
                        debug!("Handling {event:?}");
                        match engine.handle(event) {
                            Ok(Some(reply)) => on_reply(reply),
                            Ok(None) => {}
                            Err(e) => {
                                warn!("Event failed: {e}");
                                on_reply(Reply::Error(String::from(e)));
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            worker_running.store(false, Ordering::SeqCst);
            info!("Engine stopped");
        });

        (Self { running, sender }, handle)
    }

    /// Queue an event. Returns `false` once the worker has exited.
    pub fn send(&self, event: Event) -> bool {
        self.sender.send(Command::Handle(event)).is_ok()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Wake the worker if it is waiting for the next tick
        let _ = self.sender.send(Command::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
