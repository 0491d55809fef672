use super::schema::{PREFERENCES_KEY, SCHEMA};
use crate::models::Preferences;
use rusqlite::{params, Connection, Result};

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    seed_default_preferences(conn)?;
    Ok(())
}

fn seed_default_preferences(conn: &Connection) -> Result<()> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sync_kv WHERE key = ?1",
        [PREFERENCES_KEY],
        |row| row.get(0),
    )?;

    if count == 0 {
        let defaults = serde_json::to_string(&Preferences::default())
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        conn.execute(
            "INSERT INTO sync_kv (key, value) VALUES (?1, ?2)",
            params![PREFERENCES_KEY, defaults],
        )?;
    }
    Ok(())
}
