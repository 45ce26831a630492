//! Named advisory locks and the per-queue slot pool built on them.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use ratchet_core::time::fmt_ts;

use crate::error::Result;

/// Non-blocking named try-locks over the `locks` table.
///
/// SQLite has no connection-scoped advisory locks, so each lock row carries
/// an expiry: a holder that crashed before releasing simply times out and
/// the lock becomes claimable again. Acquire is one atomic upsert guarded
/// by expiry/holder, so concurrent claimers cannot both win.
pub struct LockStore<'c> {
    conn: &'c Connection,
}

impl<'c> LockStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Try to take `name` for `holder` until `now + ttl_secs`. A live lock
    /// blocks every claimer, its own holder included — one claim, one slot.
    pub fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let expires = fmt_ts(now + Duration::seconds(ttl_secs as i64));
        let changed = self.conn.execute(
            "INSERT INTO locks (name, holder, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 holder = excluded.holder,
                 expires_at = excluded.expires_at
             WHERE locks.expires_at < ?4",
            params![name, holder, expires, fmt_ts(now)],
        )?;
        Ok(changed == 1)
    }

    /// Release unconditionally. Only the owning holder's row is removed, so
    /// releasing a lock someone else took over is a harmless no-op.
    pub fn release(&self, name: &str, holder: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM locks WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(())
    }

    /// Is a live (unexpired) claim present?
    pub fn is_held(&self, name: &str, now: DateTime<Utc>) -> Result<bool> {
        let held = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM locks WHERE name = ?1 AND expires_at >= ?2)",
            params![name, fmt_ts(now)],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(held)
    }

    /// Drop every expired lock row. Returns how many were swept.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM locks WHERE expires_at < ?1", [fmt_ts(now)])?;
        Ok(removed)
    }
}

/// Bounds true cross-process parallelism for a queue.
///
/// A queue with ceiling N is represented as N named locks
/// (`queue:<q>:0 … queue:<q>:N-1`); an execution holds exactly one slot for
/// its duration. However many rows are simultaneously due, at most N
/// holders across all workers can be executing the queue at once.
pub struct ConcurrencySlots<'c> {
    store: LockStore<'c>,
    holder: String,
    ttl_secs: u64,
}

impl<'c> ConcurrencySlots<'c> {
    pub fn new(conn: &'c Connection, holder: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            store: LockStore::new(conn),
            holder: holder.into(),
            ttl_secs,
        }
    }

    /// Try each slot lock in order; `None` when the queue is saturated.
    pub fn acquire(&self, queue: &str, ceiling: u32, now: DateTime<Utc>) -> Result<Option<u32>> {
        for slot in 0..ceiling.max(1) {
            if self
                .store
                .try_acquire(&slot_name(queue, slot), &self.holder, self.ttl_secs, now)?
            {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Release a slot on every exit path of the execution that held it.
    pub fn release(&self, queue: &str, slot: u32) -> Result<()> {
        self.store.release(&slot_name(queue, slot), &self.holder)
    }
}

fn slot_name(queue: &str, slot: u32) -> String {
    format!("queue:{queue}:{slot}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::TimeZone;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, secs).unwrap()
    }

    #[test]
    fn second_holder_cannot_take_a_live_lock() {
        let conn = setup();
        let locks = LockStore::new(&conn);

        assert!(locks.try_acquire("collector", "a", 300, at(0)).unwrap());
        assert!(!locks.try_acquire("collector", "b", 300, at(1)).unwrap());
        assert!(locks.is_held("collector", at(1)).unwrap());
    }

    #[test]
    fn release_then_reacquire_by_another_holder() {
        let conn = setup();
        let locks = LockStore::new(&conn);

        assert!(locks.try_acquire("collector", "a", 300, at(0)).unwrap());
        locks.release("collector", "a").unwrap();
        assert!(locks.try_acquire("collector", "b", 300, at(1)).unwrap());
    }

    #[test]
    fn expired_lock_is_claimable_and_sweepable() {
        let conn = setup();
        let locks = LockStore::new(&conn);

        assert!(locks.try_acquire("collector", "a", 10, at(0)).unwrap());
        let later = at(0) + Duration::seconds(11);
        assert!(!locks.is_held("collector", later).unwrap());
        assert!(locks.try_acquire("collector", "b", 10, later).unwrap());

        let much_later = later + Duration::seconds(11);
        assert_eq!(locks.sweep_expired(much_later).unwrap(), 1);
    }

    #[test]
    fn releasing_someone_elses_lock_is_a_no_op() {
        let conn = setup();
        let locks = LockStore::new(&conn);

        assert!(locks.try_acquire("collector", "a", 300, at(0)).unwrap());
        locks.release("collector", "b").unwrap();
        assert!(locks.is_held("collector", at(1)).unwrap());
    }

    #[test]
    fn slots_saturate_at_the_ceiling() {
        let conn = setup();
        let ours = ConcurrencySlots::new(&conn, "worker-a", 300);
        let theirs = ConcurrencySlots::new(&conn, "worker-b", 300);

        assert_eq!(ours.acquire("mail", 2, at(0)).unwrap(), Some(0));
        assert_eq!(theirs.acquire("mail", 2, at(0)).unwrap(), Some(1));
        assert_eq!(theirs.acquire("mail", 2, at(0)).unwrap(), None);

        ours.release("mail", 0).unwrap();
        assert_eq!(theirs.acquire("mail", 2, at(1)).unwrap(), Some(0));
    }

    #[test]
    fn queues_do_not_share_slots() {
        let conn = setup();
        let slots = ConcurrencySlots::new(&conn, "worker-a", 300);

        assert_eq!(slots.acquire("mail", 1, at(0)).unwrap(), Some(0));
        assert_eq!(slots.acquire("reports", 1, at(0)).unwrap(), Some(0));
    }
}
