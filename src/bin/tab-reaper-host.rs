//! Native messaging host for the Tab Reaper browser extension.
//!
//! The browser launches this binary and talks to it over stdin/stdout using
//! Chrome's native messaging protocol. Logs go to stderr, which the browser
//! forwards to its own log; stdout is reserved for protocol frames.

use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("TAB_REAPER_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Also installs the `log` bridge, so library records reach the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn main() {
    init_logging();

    if let Err(e) = tab_reaper_lib::run() {
        // EOF is expected when the browser closes the connection
        if e.is_disconnect() {
            log::info!("Browser disconnected; exiting");
        } else {
            log::error!("Native host error: {e}");
            std::process::exit(1);
        }
    }
}
