//! The collection pass: sync, select, gate, execute, record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ratchet_core::config::COLLECTOR_LOCK;
use ratchet_core::time::fmt_ts;
use ratchet_core::Clock;
use ratchet_cron::eval;

use crate::db::{self, init_db, JobRow};
use crate::error::{Result, SchedulerError};
use crate::hooks::{Handler, HookPipeline, JobContext, Outcome};
use crate::lease::LeaseManager;
use crate::locks::{ConcurrencySlots, LockStore};
use crate::prune::Pruner;
use crate::spec::{JobSpec, Registry};
use crate::status::{JobStatus, StatusReport};

/// Stored error messages are truncated to this many characters.
const MAX_ERROR_CHARS: usize = 512;

/// One due row waiting its turn within a pass.
struct Candidate {
    row: JobRow,
    dispatched: bool,
}

/// Orchestrates collection passes over one shared store.
///
/// Owns its dependencies explicitly — connection, registry, clock — and is
/// passed by reference through call sites; there is no ambient singleton.
/// Any number of engines on any number of hosts may share the store: the
/// lease, slot, and collector locks coordinate them.
pub struct SchedulerEngine {
    conn: Connection,
    registry: Registry,
    clock: Arc<dyn Clock>,
    /// Identity used as lock holder; unique per engine instance.
    worker_id: String,
    lock_ttl_secs: u64,
}

impl SchedulerEngine {
    /// Create an engine, initialising the schema if needed.
    pub fn new(conn: Connection, registry: Registry, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn,
            registry,
            clock,
            worker_id: Uuid::new_v4().to_string(),
            lock_ttl_secs: 900,
        })
    }

    /// Override the advisory-lock expiry (collector and slot locks).
    pub fn with_lock_ttl(mut self, ttl_secs: u64) -> Self {
        self.lock_ttl_secs = ttl_secs;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Stage a registered job for execution on the next pass.
    pub fn dispatch(&self, name: &str) -> Result<()> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;
        self.stage(spec.name(), spec.priority_value(), None)
    }

    /// Stage a registered job to run at or after `run_at`.
    pub fn dispatch_at(&self, name: &str, run_at: DateTime<Utc>) -> Result<()> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;
        self.stage(spec.name(), spec.priority_value(), Some(run_at))
    }

    /// Stage a job, registering `handler` under `name` first when the name
    /// is unknown. The auto-registered spec is dispatch-only.
    pub fn dispatch_with(&mut self, name: &str, handler: Handler) -> Result<()> {
        if self.registry.get(name).is_none() {
            self.registry.register(JobSpec::new(name, handler))?;
        }
        self.dispatch(name)
    }

    fn stage(&self, name: &str, priority: i64, run_at: Option<DateTime<Utc>>) -> Result<()> {
        let now = fmt_ts(self.clock.now());
        self.conn.execute(
            "INSERT INTO jobs (name, priority, seen_at, enqueued_at, run_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?4, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 enqueued_at = excluded.enqueued_at,
                 run_at = excluded.run_at,
                 updated_at = excluded.updated_at",
            params![name, priority, now, run_at.map(fmt_ts)],
        )?;
        debug!(job = %name, staged_for = ?run_at, "job dispatched");
        Ok(())
    }

    // ── Collection ───────────────────────────────────────────────────────

    /// One collection pass. Returns how many executions ran (success or
    /// failure; filtered runs don't count).
    ///
    /// The pass is serialised across workers by a non-blocking collector
    /// lock: when another collector is active this returns 0 immediately
    /// rather than stalling.
    pub fn run(&self, batch_size: usize) -> Result<usize> {
        let now = self.clock.now();
        self.sync_registry(now)?;

        let locks = LockStore::new(&self.conn);
        if !locks.try_acquire(COLLECTOR_LOCK, &self.worker_id, self.lock_ttl_secs, now)? {
            debug!("another collector is active; skipping pass");
            return Ok(0);
        }

        let outcome = self.collect(batch_size, now);
        let released = locks.release(COLLECTOR_LOCK, &self.worker_id);
        let executed = outcome?;
        released?;
        Ok(executed)
    }

    /// Upsert every registered name, refreshing the liveness heartbeat.
    /// Idempotent; runs even when the collector lock is unavailable.
    fn sync_registry(&self, now: DateTime<Utc>) -> Result<()> {
        let now_s = fmt_ts(now);
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO jobs (name, priority, seen_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 seen_at = excluded.seen_at,
                 priority = excluded.priority,
                 updated_at = excluded.updated_at",
        )?;
        for spec in self.registry.iter() {
            stmt.execute(params![spec.name(), spec.priority_value(), now_s])?;
        }
        Ok(())
    }

    fn collect(&self, batch_size: usize, now: DateTime<Utc>) -> Result<usize> {
        let mut candidates = self.select_candidates(now)?;

        // Deterministic order: priority, then dispatch age, then name.
        candidates.sort_by(|a, b| {
            a.row
                .priority
                .cmp(&b.row.priority)
                .then_with(|| a.row.enqueued_at.cmp(&b.row.enqueued_at))
                .then_with(|| a.row.name.cmp(&b.row.name))
        });

        let leases = LeaseManager::new(&self.conn);
        let slots = ConcurrencySlots::new(&self.conn, &self.worker_id, self.lock_ttl_secs);
        let mut committed: HashMap<String, u32> = HashMap::new();
        let mut executed = 0usize;

        for candidate in candidates {
            if executed >= batch_size {
                break;
            }
            // Specs can't vanish mid-pass, but keep the lookup total.
            let Some(spec) = self.registry.get(&candidate.row.name) else {
                continue;
            };

            let ctx = JobContext {
                name: candidate.row.name.clone(),
                queue: spec.queue_name().to_string(),
                attempt: candidate.row.attempts + 1,
                dispatched: candidate.dispatched,
                now,
            };
            let pipeline = HookPipeline::new(spec);

            // Filters run before any lease or slot is taken. A vetoed
            // dispatch is still consumed; the row is otherwise untouched.
            if !pipeline.filters_pass(&ctx) {
                if candidate.dispatched {
                    self.clear_dispatch(spec.name(), now)?;
                }
                continue;
            }

            let count = committed.entry(spec.queue_name().to_string()).or_insert(0);
            if *count >= spec.concurrency_ceiling() {
                debug!(
                    job = %spec.name(),
                    queue = %spec.queue_name(),
                    "queue ceiling reached for this pass"
                );
                continue;
            }

            if !leases.acquire(spec.name(), spec.lease_secs(), now)? {
                debug!(job = %spec.name(), "lost the lease race");
                continue;
            }

            let slot = match slots.acquire(spec.queue_name(), spec.concurrency_ceiling(), now) {
                Ok(Some(slot)) => slot,
                Ok(None) => {
                    debug!(job = %spec.name(), queue = %spec.queue_name(), "queue saturated");
                    leases.release(spec.name(), now)?;
                    continue;
                }
                Err(e) => {
                    let _ = leases.release(spec.name(), now);
                    return Err(e);
                }
            };

            let outcome = pipeline.run(&ctx);
            let recorded = self.record_outcome(spec, &candidate.row, &outcome, now);

            // Release slot then lease on every path, even when recording
            // the outcome failed.
            let slot_released = slots.release(spec.queue_name(), slot);
            let lease_released = leases.release(spec.name(), now);
            recorded?;
            slot_released?;
            lease_released?;

            *count += 1;
            executed += 1;
        }

        Ok(executed)
    }

    /// Partition rows into leased / dispatch-ready / cron-due.
    fn select_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for row in db::fetch_all(&self.conn)? {
            let Some(spec) = self.registry.get(&row.name) else {
                continue;
            };
            if row.leased(now) {
                // Running elsewhere right now.
                continue;
            }

            let dispatched = match (row.enqueued_at, row.run_at) {
                (Some(_), None) => true,
                (_, Some(run_at)) => run_at <= now,
                (None, None) => false,
            };
            let cron_due = !dispatched
                && spec
                    .schedule()
                    .is_some_and(|cron| eval::evaluate(cron, now, row.last_run).due);

            if dispatched || cron_due {
                candidates.push(Candidate { row, dispatched });
            }
        }
        Ok(candidates)
    }

    fn record_outcome(
        &self,
        spec: &JobSpec,
        row: &JobRow,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match outcome {
            Outcome::Success => {
                self.conn.execute(
                    "UPDATE jobs SET last_run = ?1, last_error = NULL, fail_count = 0,
                            attempts = 0, enqueued_at = NULL, run_at = NULL, updated_at = ?1
                     WHERE name = ?2",
                    params![fmt_ts(now), spec.name()],
                )?;
                info!(job = %spec.name(), queue = %spec.queue_name(), "job succeeded");
            }
            Outcome::Filtered => {
                self.clear_dispatch(spec.name(), now)?;
            }
            Outcome::Failure(message) => {
                let attempts = row.attempts + 1;
                let policy = spec.retry_policy();
                if attempts >= policy.max_attempts {
                    self.conn
                        .execute("DELETE FROM jobs WHERE name = ?1", [spec.name()])?;
                    error!(
                        job = %spec.name(),
                        attempts,
                        error = %message,
                        "job failed terminally; row removed"
                    );
                } else {
                    let delay = policy.backoff_delay(attempts);
                    let run_at = fmt_ts(now + Duration::seconds(delay as i64));
                    self.conn.execute(
                        "UPDATE jobs SET last_run = ?1, last_error = ?2,
                                fail_count = fail_count + 1, attempts = ?3,
                                run_at = ?4, updated_at = ?1
                         WHERE name = ?5",
                        params![
                            fmt_ts(now),
                            truncate_error(message),
                            attempts,
                            run_at,
                            spec.name()
                        ],
                    )?;
                    warn!(
                        job = %spec.name(),
                        attempt = attempts,
                        retry_in_secs = delay,
                        error = %message,
                        "job failed; retry staged"
                    );
                }
            }
        }
        Ok(())
    }

    /// Consume a pending dispatch without recording an execution.
    fn clear_dispatch(&self, name: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET enqueued_at = NULL, run_at = NULL, updated_at = ?1 WHERE name = ?2",
            params![fmt_ts(now), name],
        )?;
        Ok(())
    }

    // ── Reporting & maintenance ──────────────────────────────────────────

    /// Snapshot of defined/running/idle counts plus per-job detail.
    pub fn status(&self) -> Result<StatusReport> {
        let now = self.clock.now();
        let rows = db::fetch_all(&self.conn)?;

        let mut jobs = Vec::with_capacity(rows.len());
        let mut running = 0usize;
        for row in rows {
            let spec = self.registry.get(&row.name);
            let live = row.leased(now);
            if live {
                running += 1;
            }
            let next_run = match (row.run_at, spec.and_then(JobSpec::schedule)) {
                (Some(run_at), _) => Some(run_at),
                (None, Some(cron)) => eval::evaluate(cron, now, row.last_run).next,
                (None, None) => row.enqueued_at,
            };
            jobs.push(JobStatus {
                name: row.name.clone(),
                queue: spec.map(|s| s.queue_name().to_string()),
                running: live,
                enqueued: row.enqueued_at.is_some(),
                last_run: row.last_run.map(fmt_ts),
                lease_until: row.lease_until.map(fmt_ts),
                next_run: next_run.map(fmt_ts),
                fail_count: row.fail_count,
                attempts: row.attempts,
                last_error: row.last_error,
            });
        }

        Ok(StatusReport {
            defined: self.registry.len(),
            running,
            idle: jobs.len().saturating_sub(running),
            jobs,
        })
    }

    /// Remove rows no longer defined by any worker. See [`Pruner`].
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        Pruner::new(&self.conn, self.clock.clone()).prune(retention_days)
    }
}

fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_truncated_on_char_boundaries() {
        let long = "é".repeat(600);
        let stored = truncate_error(&long);
        assert_eq!(stored.chars().count(), MAX_ERROR_CHARS);
        assert_eq!(truncate_error("short"), "short");
    }
}
