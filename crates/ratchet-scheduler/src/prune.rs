//! Garbage collection of rows no worker defines any more.

use std::sync::Arc;

use chrono::Duration;
use rusqlite::{params, Connection};
use tracing::info;

use ratchet_core::time::fmt_ts;
use ratchet_core::Clock;

use crate::error::Result;
use crate::locks::LockStore;

/// Removes job rows whose liveness heartbeat lapsed past the retention
/// window. A row with a live lease is never touched, so pruning is safe to
/// run concurrently with active workers; expired lock rows are swept in the
/// same call.
pub struct Pruner<'c> {
    conn: &'c Connection,
    clock: Arc<dyn Clock>,
}

impl<'c> Pruner<'c> {
    pub fn new(conn: &'c Connection, clock: Arc<dyn Clock>) -> Self {
        Self { conn, clock }
    }

    /// Delete unseen, unleased rows older than `retention_days`. Returns
    /// how many job rows were removed.
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        let now = self.clock.now();
        let cutoff = fmt_ts(now - Duration::days(i64::from(retention_days)));
        let now_s = fmt_ts(now);

        let removed = self.conn.execute(
            "DELETE FROM jobs
             WHERE (seen_at IS NULL OR seen_at < ?1)
               AND (lease_until IS NULL OR lease_until < ?2)",
            params![cutoff, now_s],
        )?;
        let swept = LockStore::new(self.conn).sweep_expired(now)?;

        if removed > 0 || swept > 0 {
            info!(removed, stale_locks = swept, retention_days, "prune complete");
        }
        Ok(removed)
    }
}
