//! Filter and hook execution around a job handler.
//!
//! Handlers and hooks are stored function values (`Arc<dyn Fn>`); handler
//! failure is an ordinary value, not a panic, so one bad job can never
//! abort a collection pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::spec::JobSpec;

/// What a handler receives about the run it is performing.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub name: String,
    pub queue: String,
    /// 1-based attempt number for this execution.
    pub attempt: u32,
    /// True when the run was staged by dispatch/retry rather than cron.
    pub dispatched: bool,
    pub now: DateTime<Utc>,
}

/// A handler's failure report. Carries a message only; the retry machinery
/// decides what happens next.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

/// The job body.
pub type Handler = Arc<dyn Fn(&JobContext) -> Result<(), HandlerError> + Send + Sync>;

/// A `when`/`skip` predicate.
pub type Filter = Arc<dyn Fn(&JobContext) -> bool + Send + Sync>;

/// A before/success/after callback.
pub type Hook = Arc<dyn Fn(&JobContext) + Send + Sync>;

/// An error callback; receives the handler's failure.
pub type ErrorHook = Arc<dyn Fn(&JobContext, &HandlerError) + Send + Sync>;

/// Explicit result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handler returned normally.
    Success,
    /// A filter vetoed the run before anything else happened.
    Filtered,
    /// Handler failed; the message feeds the retry path.
    Failure(String),
}

/// Runs one job spec's callbacks in their contractual order:
/// filters → before → handler → success|error → after.
pub struct HookPipeline<'s> {
    spec: &'s JobSpec,
}

impl<'s> HookPipeline<'s> {
    pub fn new(spec: &'s JobSpec) -> Self {
        Self { spec }
    }

    /// All `when` predicates must hold and no `skip` predicate may trip.
    /// Evaluated before any lease or slot is taken.
    pub fn filters_pass(&self, ctx: &JobContext) -> bool {
        if !self.spec.when_filters().iter().all(|f| f(ctx)) {
            debug!(job = %ctx.name, "when filter declined");
            return false;
        }
        if self.spec.skip_filters().iter().any(|f| f(ctx)) {
            debug!(job = %ctx.name, "skip filter tripped");
            return false;
        }
        true
    }

    /// Filter check plus [`run`](Self::run) in one call.
    pub fn execute(&self, ctx: &JobContext) -> Outcome {
        if !self.filters_pass(ctx) {
            return Outcome::Filtered;
        }
        self.run(ctx)
    }

    /// Invoke hooks and handler, assuming filters already passed.
    ///
    /// `after` hooks are guaranteed to run for both outcomes; `error` hooks
    /// each receive the handler's failure.
    pub fn run(&self, ctx: &JobContext) -> Outcome {
        for hook in self.spec.before_hooks() {
            hook(ctx);
        }

        let result = (self.spec.handler())(ctx);

        match &result {
            Ok(()) => {
                for hook in self.spec.success_hooks() {
                    hook(ctx);
                }
            }
            Err(err) => {
                for hook in self.spec.error_hooks() {
                    hook(ctx, err);
                }
            }
        }

        for hook in self.spec.after_hooks() {
            hook(ctx);
        }

        match result {
            Ok(()) => Outcome::Success,
            Err(err) => Outcome::Failure(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::JobSpec;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn ctx() -> JobContext {
        JobContext {
            name: "job".into(),
            queue: "default".into(),
            attempt: 1,
            dispatched: false,
            now: Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap(),
        }
    }

    /// Shared trace of which callbacks fired, in order.
    fn tracer() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Hook) {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |label: &'static str| -> Hook {
                let log = log.clone();
                Arc::new(move |_ctx: &JobContext| log.lock().unwrap().push(label))
            }
        };
        (log, make)
    }

    #[test]
    fn hooks_fire_in_order_on_success() {
        let (log, hook) = tracer();
        let handler_log = log.clone();
        let spec = JobSpec::new(
            "job",
            Arc::new(move |_ctx| {
                handler_log.lock().unwrap().push("handler");
                Ok(())
            }),
        )
        .before(hook("before-1"))
        .before(hook("before-2"))
        .on_success(hook("success"))
        .after(hook("after"));

        let outcome = HookPipeline::new(&spec).execute(&ctx());
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before-1", "before-2", "handler", "success", "after"]
        );
    }

    #[test]
    fn error_hooks_receive_the_failure_and_after_still_fires() {
        let (log, hook) = tracer();
        let error_log = log.clone();
        let spec = JobSpec::new(
            "job",
            Arc::new(|_ctx| Err(HandlerError::new("boom"))),
        )
        .before(hook("before"))
        .on_success(hook("success"))
        .on_error(Arc::new(move |_ctx, err| {
            assert_eq!(err.message, "boom");
            error_log.lock().unwrap().push("error");
        }))
        .after(hook("after"));

        let outcome = HookPipeline::new(&spec).execute(&ctx());
        assert_eq!(outcome, Outcome::Failure("boom".into()));
        assert_eq!(*log.lock().unwrap(), vec!["before", "error", "after"]);
    }

    #[test]
    fn filter_veto_short_circuits_everything() {
        let (log, hook) = tracer();
        let spec = JobSpec::new("job", Arc::new(|_ctx| Ok(())))
            .when(Arc::new(|_ctx| false))
            .before(hook("before"))
            .after(hook("after"));

        let outcome = HookPipeline::new(&spec).execute(&ctx());
        assert_eq!(outcome, Outcome::Filtered);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn skip_filter_trips_even_when_when_passes() {
        let spec = JobSpec::new("job", Arc::new(|_ctx| Ok(())))
            .when(Arc::new(|_ctx| true))
            .skip(Arc::new(|ctx| ctx.attempt == 1));

        assert_eq!(HookPipeline::new(&spec).execute(&ctx()), Outcome::Filtered);
    }
}
