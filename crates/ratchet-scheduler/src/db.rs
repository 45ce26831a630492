use chrono::{DateTime, Utc};
use rusqlite::Connection;

use ratchet_core::time::parse_ts;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` and `locks` tables (idempotent) plus the indexes the
/// selection and pruning queries depend on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            name        TEXT    NOT NULL PRIMARY KEY,
            last_run    TEXT,               -- start of the most recent attempt
            lease_until TEXT,               -- non-null and future = claimed
            last_error  TEXT,
            fail_count  INTEGER NOT NULL DEFAULT 0,
            attempts    INTEGER NOT NULL DEFAULT 0,
            seen_at     TEXT,               -- liveness heartbeat from sync
            priority    INTEGER NOT NULL DEFAULT 0,
            enqueued_at TEXT,               -- non-null = dispatched
            run_at      TEXT,               -- staged execution / retry time
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_lease_until ON jobs (lease_until);
        CREATE INDEX IF NOT EXISTS idx_jobs_priority_enqueued ON jobs (priority, enqueued_at);
        CREATE INDEX IF NOT EXISTS idx_jobs_seen_at ON jobs (seen_at);

        -- Named advisory locks. expires_at lets a crashed holder self-heal,
        -- the same way a stale lease does.
        CREATE TABLE IF NOT EXISTS locks (
            name       TEXT NOT NULL PRIMARY KEY,
            holder     TEXT NOT NULL,
            expires_at TEXT NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

/// A persisted job record, timestamps already parsed.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub name: String,
    pub last_run: Option<DateTime<Utc>>,
    pub lease_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub fail_count: u32,
    pub attempts: u32,
    pub seen_at: Option<DateTime<Utc>>,
    pub priority: i64,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub run_at: Option<DateTime<Utc>>,
}

impl JobRow {
    /// True while another holder's claim is still live.
    pub fn leased(&self, now: DateTime<Utc>) -> bool {
        self.lease_until.is_some_and(|until| until > now)
    }
}

/// Fetch every job row. Callers filter down to the names they know.
pub fn fetch_all(conn: &Connection) -> Result<Vec<JobRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, last_run, lease_until, last_error, fail_count, attempts,
                seen_at, priority, enqueued_at, run_at
         FROM jobs ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(JobRow {
                name: row.get(0)?,
                last_run: opt_ts(row.get::<_, Option<String>>(1)?),
                lease_until: opt_ts(row.get::<_, Option<String>>(2)?),
                last_error: row.get(3)?,
                fail_count: row.get(4)?,
                attempts: row.get(5)?,
                seen_at: opt_ts(row.get::<_, Option<String>>(6)?),
                priority: row.get(7)?,
                enqueued_at: opt_ts(row.get::<_, Option<String>>(8)?),
                run_at: opt_ts(row.get::<_, Option<String>>(9)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn opt_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(parse_ts)
}
