use crate::models::TabId;
use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Failures reported by the browser side of the bridge.
///
/// All of these are transient from the engine's point of view: they are
/// logged and the next tick naturally retries whatever depended on them.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("tab {0} no longer exists")]
    TabGone(TabId),

    #[error("host channel disconnected")]
    Disconnected,

    #[error("host I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Removing a tab that is already gone is the expected outcome of a race
    /// with the user, not a failure worth reporting.
    pub fn is_tab_gone(&self) -> bool {
        matches!(self, HostError::TabGone(_))
    }
}

// For protocol replies - converts AppError to String
impl From<AppError> for String {
    fn from(e: AppError) -> Self {
        e.to_string()
    }
}
