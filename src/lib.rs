pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod duration;
pub mod engine;
pub mod error;
pub mod host;
pub mod matcher;
pub mod models;
pub mod native_host;
pub mod pause;
pub mod platform;
pub mod policy;
pub mod store;
#[cfg(test)]
mod test_utils;
pub mod tracker;
pub mod validation;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::db::{migrations, Database};
use crate::engine::{Dispatcher, Engine};
use crate::native_host::NativeHost;
use crate::platform::NativeIdleProbe;
use directories::ProjectDirs;
use log::{error, info, warn};
use std::io;
use std::sync::{Arc, Mutex};

/// Error type for native host startup and shutdown failures
#[derive(Debug)]
pub enum InitError {
    NoProjectDirs,
    DataDirCreation(std::io::Error),
    DatabaseOpen(rusqlite::Error),
    Migration(rusqlite::Error),
    Channel(std::io::Error),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::NoProjectDirs => write!(f, "Could not determine project directories"),
            InitError::DataDirCreation(e) => write!(f, "Could not create data directory: {e}"),
            InitError::DatabaseOpen(e) => write!(f, "Failed to open database: {e}"),
            InitError::Migration(e) => write!(f, "Failed to run database migrations: {e}"),
            InitError::Channel(e) => write!(f, "Native messaging channel failed: {e}"),
        }
    }
}

impl std::error::Error for InitError {}

impl InitError {
    /// The browser closing stdin is the normal way for the host to end.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, InitError::Channel(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

fn get_db_path() -> Result<std::path::PathBuf, InitError> {
    let proj_dirs = ProjectDirs::from("com", "tabreaper", "TabReaper")
        .ok_or(InitError::NoProjectDirs)?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(InitError::DataDirCreation)?;
    Ok(data_dir.join("tab-reaper.db"))
}

/// Lock a mutex, recovering from poisoning if necessary
pub(crate) fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> std::sync::MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{context} mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Serve the extension over stdin/stdout until the browser disconnects.
pub fn run() -> Result<(), InitError> {
    let config = EngineConfig::from_env();
    let db_path = get_db_path()?;
    info!("Using database at {}", db_path.display());

    let db = Database::open(&db_path).map_err(InitError::DatabaseOpen)?;
    migrations::run(db.connection()).map_err(InitError::Migration)?;

    let stdin = io::stdin();
    let mut host = NativeHost::new(stdin.lock(), io::stdout());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Engine::new(db, host.bridge(Box::new(NativeIdleProbe::new())), clock, config);
    let (dispatcher, handle) = Dispatcher::start(engine, host.reply_sink());

    let result = host.run(&dispatcher);

    // Let the engine finish what the browser already sent
    drop(dispatcher);
    if handle.join().is_err() {
        error!("Engine thread panicked");
    }

    result.map_err(InitError::Channel)
}
