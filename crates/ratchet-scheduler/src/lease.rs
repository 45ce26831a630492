//! Per-job distributed lock via atomic conditional update.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use ratchet_core::time::fmt_ts;

use crate::error::Result;

/// Claims and releases the `lease_until` column of a job row.
///
/// `acquire` is a single conditional UPDATE, so when several workers race
/// on the same name exactly one observes a changed row and proceeds; the
/// rest back off. A lease whose holder crashed simply expires, after which
/// the next `acquire` succeeds — at-least-once semantics across crash
/// windows, never concurrent duplicates.
pub struct LeaseManager<'c> {
    conn: &'c Connection,
}

impl<'c> LeaseManager<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Try to claim `name` until `now + duration_secs`. Returns false when
    /// another worker holds a live lease — a normal outcome, not an error.
    pub fn acquire(&self, name: &str, duration_secs: u32, now: DateTime<Utc>) -> Result<bool> {
        let until = fmt_ts(now + Duration::seconds(i64::from(duration_secs)));
        let changed = self.conn.execute(
            "UPDATE jobs SET lease_until = ?1, updated_at = ?2
             WHERE name = ?3 AND (lease_until IS NULL OR lease_until < ?2)",
            params![until, fmt_ts(now), name],
        )?;
        Ok(changed == 1)
    }

    /// Clear the lease unconditionally. Must run on every exit path of an
    /// execution — success, failure, or skip.
    pub fn release(&self, name: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET lease_until = NULL, updated_at = ?1 WHERE name = ?2",
            params![fmt_ts(now), name],
        )?;
        Ok(())
    }
}
