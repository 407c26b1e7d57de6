use rusqlite::Connection;

use crate::error::Result;

/// Initialise the pyrunner schema in `conn`.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
/// Timestamps are RFC 3339 UTC strings with microsecond precision, so
/// lexical order equals chronological order.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runtimes (
            id          TEXT NOT NULL PRIMARY KEY,
            name        TEXT NOT NULL,
            root_path   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS code_versions (
            id              TEXT    NOT NULL PRIMARY KEY,
            deployment_id   TEXT    NOT NULL,
            version_number  INTEGER NOT NULL,
            runtime_id      TEXT    NOT NULL REFERENCES runtimes(id),
            extracted_path  TEXT    NOT NULL,
            created_at      TEXT    NOT NULL,
            UNIQUE (deployment_id, version_number)
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL,
            enabled     INTEGER NOT NULL DEFAULT 1,
            trigger_spec TEXT   NOT NULL,   -- JSON-encoded Trigger enum
            version_id  TEXT    REFERENCES code_versions(id),
            db_alias    TEXT,               -- NULL routes to the default database
            last_run    TEXT,
            last_status TEXT,               -- 'success' | 'failed' | NULL (unset)
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS runs (
            id          TEXT    NOT NULL PRIMARY KEY,
            job_id      TEXT    NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            version_id  TEXT    REFERENCES code_versions(id),
            started_at  TEXT    NOT NULL,
            finished_at TEXT,
            success     INTEGER NOT NULL DEFAULT 0,
            message     TEXT    NOT NULL DEFAULT ''
        );

        -- History view: newest runs of one job first.
        CREATE INDEX IF NOT EXISTS idx_runs_job_started ON runs (job_id, started_at DESC);
        ",
    )?;
    Ok(())
}
