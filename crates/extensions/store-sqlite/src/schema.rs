//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Name of the advisory lock row every mutation goes through.
pub const TRIGGER_ACCESS_LOCK: &str = "TRIGGER_ACCESS";

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO scheduler_locks (lock_name, updated_at) VALUES (?1, 0)",
        [TRIGGER_ACCESS_LOCK],
    )?;
    Ok(())
}

/// Take the advisory lock inside the current transaction.
pub fn lock_scheduler(conn: &Connection, now_millis: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE scheduler_locks SET updated_at = ?1 WHERE lock_name = ?2",
        rusqlite::params![now_millis, TRIGGER_ACCESS_LOCK],
    )?;
    Ok(())
}

const SCHEMA: &str = r#"
-- Registered jobs
CREATE TABLE IF NOT EXISTS jobs (
    key TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT '',
    handler TEXT NOT NULL,
    param TEXT NOT NULL DEFAULT 'null'
);

-- Triggers; times are epoch milliseconds
CREATE TABLE IF NOT EXISTS triggers (
    key TEXT PRIMARY KEY,
    job_key TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    trigger_value TEXT NOT NULL,
    state TEXT NOT NULL,
    rounds INTEGER NOT NULL DEFAULT 0,
    start_time INTEGER,
    end_time INTEGER,
    previous_fire_time INTEGER,
    next_fire_time INTEGER,
    last_completed_time INTEGER
);

-- Advisory lock rows shared by every scheduler instance
CREATE TABLE IF NOT EXISTS scheduler_locks (
    lock_name TEXT PRIMARY KEY,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_triggers_job ON triggers(job_key);
CREATE INDEX IF NOT EXISTS idx_triggers_due ON triggers(state, next_fire_time);
"#;
