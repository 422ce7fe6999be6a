use rusqlite::{Connection, Result};

pub const SCHEMA_VERSION: u32 = 1;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now', 'utc'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            summary_all TEXT NOT NULL DEFAULT '',
            summary_recent TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_accessed_at TEXT NOT NULL
        )",
        [],
    )?;

    // embedding: little-endian f32 values, empty when embedding failed
    conn.execute(
        "CREATE TABLE IF NOT EXISTS qa_turns (
            session_id TEXT NOT NULL,
            turn_id INTEGER NOT NULL,
            user_query TEXT NOT NULL,
            answer TEXT NOT NULL,
            created_at TEXT NOT NULL,
            embedding BLOB NOT NULL DEFAULT x'',
            PRIMARY KEY (session_id, turn_id),
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        )",
        [],
    )?;

    create_indexes(conn)?;

    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_last_accessed ON sessions(last_accessed_at)",
        [],
    )?;

    Ok(())
}
