pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS session_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Sync-scope key holding the user's preferences object.
pub const PREFERENCES_KEY: &str = "preferences";

/// Meta key holding the browser session marker the session scope belongs to.
pub const HOST_SESSION_KEY: &str = "host_session";
