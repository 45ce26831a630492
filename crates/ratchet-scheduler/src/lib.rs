//! `ratchet-scheduler` — a hybrid cron-scheduler/work-queue over one shared
//! SQLite store.
//!
//! # Overview
//!
//! Any number of independent worker processes register [`JobSpec`]s and call
//! [`SchedulerEngine::run`] (directly, or via [`WorkerLoop`]). Each pass
//! syncs the registry into the `jobs` table, selects rows that are due —
//! dispatched, retry-staged, or cron-matching — and executes them behind
//! three coordination gates:
//!
//! | Gate                 | Guarantees                                      |
//! |----------------------|-------------------------------------------------|
//! | collector lock       | one collection pass at a time, non-blocking     |
//! | [`LeaseManager`]     | a job never executes twice concurrently         |
//! | [`ConcurrencySlots`] | per-queue parallelism ceiling across processes  |
//!
//! Leases and locks are time-boxed, so a crashed worker's claims self-heal:
//! execution is at-least-once across crash windows, never concurrent.
//! Handler failures are explicit [`Outcome`] values that feed the
//! [`RetryPolicy`] backoff path; they never abort a pass.

pub mod db;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod lease;
pub mod locks;
pub mod prune;
pub mod retry;
pub mod spec;
pub mod status;
pub mod worker;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use hooks::{Handler, HandlerError, HookPipeline, JobContext, Outcome};
pub use lease::LeaseManager;
pub use locks::{ConcurrencySlots, LockStore};
pub use prune::Pruner;
pub use retry::{Jitter, RetryPolicy};
pub use spec::{JobSpec, Registry};
pub use status::{JobStatus, StatusReport};
pub use worker::{WorkerHandle, WorkerLoop};
