//! Job definitions and the in-memory registry.

use ratchet_core::config::MIN_LEASE_SECS;
use ratchet_cron::{parse, ParsedCron};

use crate::error::{Result, SchedulerError};
use crate::hooks::{ErrorHook, Filter, Handler, Hook};
use crate::retry::RetryPolicy;

/// One job definition: schedule, placement, limits, callbacks, handler.
///
/// Built once by application code with the fluent mutators, then registered
/// and treated as immutable. Cron parsing happens inside [`cron`](Self::cron),
/// so a malformed expression fails at registration time, never during a run.
pub struct JobSpec {
    name: String,
    cron: Option<ParsedCron>,
    queue: String,
    concurrency: u32,
    priority: i64,
    lease_secs: u32,
    retry: RetryPolicy,
    when_filters: Vec<Filter>,
    skip_filters: Vec<Filter>,
    before_hooks: Vec<Hook>,
    success_hooks: Vec<Hook>,
    error_hooks: Vec<ErrorHook>,
    after_hooks: Vec<Hook>,
    handler: Handler,
}

impl JobSpec {
    /// A dispatch-only job: runs when staged, never on a schedule.
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            cron: None,
            queue: "default".to_string(),
            concurrency: 1,
            priority: 0,
            lease_secs: 300,
            retry: RetryPolicy::default(),
            when_filters: Vec::new(),
            skip_filters: Vec::new(),
            before_hooks: Vec::new(),
            success_hooks: Vec::new(),
            error_hooks: Vec::new(),
            after_hooks: Vec::new(),
            handler,
        }
    }

    // ── Fluent configuration ─────────────────────────────────────────────

    /// Attach a cron schedule (5 or 6 fields). Fails fast on a malformed
    /// expression.
    pub fn cron(mut self, expression: &str) -> Result<Self> {
        self.cron = Some(parse(expression)?);
        Ok(self)
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Per-queue parallelism ceiling across all workers. Clamped to ≥1.
    pub fn concurrency(mut self, ceiling: u32) -> Self {
        self.concurrency = ceiling.max(1);
        self
    }

    /// Lower values run first within a pass.
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Exclusive-claim duration in seconds, clamped to ≥60. Too short risks
    /// duplicate execution; too long slows crash recovery.
    pub fn lease(mut self, seconds: u32) -> Self {
        self.lease_secs = seconds.max(MIN_LEASE_SECS);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Predicate that must hold for the job to run.
    pub fn when(mut self, filter: Filter) -> Self {
        self.when_filters.push(filter);
        self
    }

    /// Predicate that vetoes the run when it returns true.
    pub fn skip(mut self, filter: Filter) -> Self {
        self.skip_filters.push(filter);
        self
    }

    pub fn before(mut self, hook: Hook) -> Self {
        self.before_hooks.push(hook);
        self
    }

    pub fn on_success(mut self, hook: Hook) -> Self {
        self.success_hooks.push(hook);
        self
    }

    pub fn on_error(mut self, hook: ErrorHook) -> Self {
        self.error_hooks.push(hook);
        self
    }

    pub fn after(mut self, hook: Hook) -> Self {
        self.after_hooks.push(hook);
        self
    }

    // ── Frequency helpers ────────────────────────────────────────────────
    // A fixed set of builders over constant expressions; the parameterised
    // ones validate their inputs through the parser like any other cron.

    pub fn every_second(self) -> Self {
        self.constant_cron("* * * * * *")
    }

    pub fn every_minute(self) -> Self {
        self.constant_cron("* * * * *")
    }

    pub fn every_five_minutes(self) -> Self {
        self.constant_cron("*/5 * * * *")
    }

    pub fn every_ten_minutes(self) -> Self {
        self.constant_cron("*/10 * * * *")
    }

    pub fn every_thirty_minutes(self) -> Self {
        self.constant_cron("*/30 * * * *")
    }

    pub fn hourly(self) -> Self {
        self.constant_cron("0 * * * *")
    }

    pub fn hourly_at(self, minute: u32) -> Result<Self> {
        self.cron(&format!("{minute} * * * *"))
    }

    pub fn daily(self) -> Self {
        self.constant_cron("0 0 * * *")
    }

    pub fn daily_at(self, hour: u32, minute: u32) -> Result<Self> {
        self.cron(&format!("{minute} {hour} * * *"))
    }

    /// Sundays at midnight.
    pub fn weekly(self) -> Self {
        self.constant_cron("0 0 * * 0")
    }

    pub fn weekly_on(self, day: u32, hour: u32, minute: u32) -> Result<Self> {
        self.cron(&format!("{minute} {hour} * * {day}"))
    }

    pub fn monthly(self) -> Self {
        self.constant_cron("0 0 1 * *")
    }

    pub fn monthly_on(self, day: u32, hour: u32, minute: u32) -> Result<Self> {
        self.cron(&format!("{minute} {hour} {day} * *"))
    }

    pub fn yearly(self) -> Self {
        self.constant_cron("0 0 1 1 *")
    }

    fn constant_cron(self, expression: &'static str) -> Self {
        self.cron(expression)
            .expect("builtin cron expression is valid")
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> Option<&ParsedCron> {
        self.cron.as_ref()
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn concurrency_ceiling(&self) -> u32 {
        self.concurrency
    }

    pub fn priority_value(&self) -> i64 {
        self.priority
    }

    pub fn lease_secs(&self) -> u32 {
        self.lease_secs
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn when_filters(&self) -> &[Filter] {
        &self.when_filters
    }

    pub(crate) fn skip_filters(&self) -> &[Filter] {
        &self.skip_filters
    }

    pub(crate) fn before_hooks(&self) -> &[Hook] {
        &self.before_hooks
    }

    pub(crate) fn success_hooks(&self) -> &[Hook] {
        &self.success_hooks
    }

    pub(crate) fn error_hooks(&self) -> &[ErrorHook] {
        &self.error_hooks
    }

    pub(crate) fn after_hooks(&self) -> &[Hook] {
        &self.after_hooks
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// In-memory catalogue of the jobs this worker process defines.
#[derive(Default)]
pub struct Registry {
    specs: Vec<JobSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self { specs: Vec::new() }
    }

    /// Register a spec. Names are unique keys — a duplicate is a
    /// configuration error.
    pub fn register(&mut self, spec: JobSpec) -> Result<()> {
        if self.get(spec.name()).is_some() {
            return Err(SchedulerError::DuplicateJob(spec.name().to_string()));
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JobSpec> {
        self.specs.iter().find(|s| s.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop() -> Handler {
        Arc::new(|_ctx| Ok(()))
    }

    #[test]
    fn defaults_are_dispatch_only() {
        let spec = JobSpec::new("report", noop());
        assert!(spec.schedule().is_none());
        assert_eq!(spec.queue_name(), "default");
        assert_eq!(spec.concurrency_ceiling(), 1);
        assert_eq!(spec.lease_secs(), 300);
    }

    #[test]
    fn lease_and_concurrency_are_clamped() {
        let spec = JobSpec::new("report", noop()).lease(5).concurrency(0);
        assert_eq!(spec.lease_secs(), 60);
        assert_eq!(spec.concurrency_ceiling(), 1);
    }

    #[test]
    fn malformed_cron_fails_at_registration_time() {
        assert!(JobSpec::new("report", noop()).cron("bad expr").is_err());
        assert!(JobSpec::new("report", noop()).daily_at(25, 0).is_err());
    }

    #[test]
    fn frequency_helpers_produce_schedules() {
        let spec = JobSpec::new("report", noop()).every_five_minutes();
        let cron = spec.schedule().unwrap();
        assert_eq!(cron.seconds, vec![0]);
        assert_eq!(cron.minutes, vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55]);

        let spec = JobSpec::new("digest", noop()).daily_at(9, 30).unwrap();
        let cron = spec.schedule().unwrap();
        assert_eq!(cron.hours, vec![9]);
        assert_eq!(cron.minutes, vec![30]);
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = Registry::new();
        registry.register(JobSpec::new("report", noop())).unwrap();
        let err = registry.register(JobSpec::new("report", noop()));
        assert!(matches!(err, Err(SchedulerError::DuplicateJob(_))));
        assert_eq!(registry.len(), 1);
    }
}
