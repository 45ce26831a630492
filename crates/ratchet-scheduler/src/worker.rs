//! The cooperative worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::SchedulerEngine;
use crate::error::Result;

/// Cooperative stop switch for a [`WorkerLoop`].
///
/// Cheap to clone; hand one to job handlers that need to stop their own
/// worker. `stop` is idempotent and only prevents the *next* pass from
/// starting — an in-flight handler is never aborted.
#[derive(Debug, Clone, Default)]
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn new() -> Self {
        Self { running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Drives an engine in an infinite loop with signal-driven shutdown.
pub struct WorkerLoop {
    engine: SchedulerEngine,
    batch_size: usize,
    handle: WorkerHandle,
}

impl WorkerLoop {
    pub fn new(engine: SchedulerEngine, batch_size: usize) -> Self {
        Self::with_handle(engine, batch_size, WorkerHandle::new())
    }

    /// Use an externally created handle, e.g. one already captured by a
    /// self-stopping job handler.
    pub fn with_handle(engine: SchedulerEngine, batch_size: usize, handle: WorkerHandle) -> Self {
        Self { engine, batch_size, handle }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn engine(&self) -> &SchedulerEngine {
        &self.engine
    }

    /// Run collection passes until stopped by a signal, [`WorkerHandle::stop`],
    /// or a storage error (which propagates to the caller).
    ///
    /// After an empty pass the loop sleeps up to `sleep_secs`, in 1-second
    /// slices so stop requests are honoured promptly.
    pub async fn forever(&self, sleep_secs: u64) -> Result<()> {
        self.handle.running.store(true, Ordering::SeqCst);

        // SIGINT/SIGTERM flip the cooperative flag; the listener task is
        // dropped when the loop exits.
        let signal_task = spawn_signal_listener(self.handle.clone())?;

        info!(sleep_secs, batch_size = self.batch_size, "worker started");
        let result = loop {
            if !self.handle.is_running() {
                break Ok(());
            }
            let executed = match self.engine.run(self.batch_size) {
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            if executed == 0 {
                for _ in 0..sleep_secs {
                    if !self.handle.is_running() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        };

        signal_task.abort();
        self.handle.stop();
        info!("worker stopped");
        result
    }
}

fn spawn_signal_listener(handle: WorkerHandle) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received; finishing current pass"),
            _ = sigterm.recv() => info!("SIGTERM received; finishing current pass"),
        }
        handle.stop();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{JobSpec, Registry};
    use chrono::{TimeZone, Utc};
    use ratchet_core::FixedClock;
    use rusqlite::Connection;
    use std::sync::atomic::AtomicUsize;

    fn engine_with(registry: Registry) -> SchedulerEngine {
        let conn = Connection::open_in_memory().unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap(),
        ));
        SchedulerEngine::new(conn, registry, clock).unwrap()
    }

    #[test]
    fn stop_is_idempotent() {
        let handle = WorkerHandle::new();
        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn handler_can_stop_its_own_worker() {
        let handle = WorkerHandle::new();
        let stopper = handle.clone();
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();

        let mut registry = Registry::new();
        registry
            .register(JobSpec::new(
                "self-stop",
                Arc::new(move |_ctx| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    stopper.stop();
                    Ok(())
                }),
            ))
            .unwrap();

        let engine = engine_with(registry);
        engine.dispatch("self-stop").unwrap();

        let worker = WorkerLoop::with_handle(engine, 10, handle);
        worker.forever(1).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!worker.handle().is_running());
    }

    #[tokio::test]
    async fn external_stop_ends_an_idle_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();

        let mut registry = Registry::new();
        registry
            .register(JobSpec::new(
                "never-due",
                Arc::new(move |_ctx| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            ))
            .unwrap();

        // Nothing dispatched and no schedule: every pass is empty, so the
        // loop sits in its sliced idle sleep until stopped from outside.
        let worker = WorkerLoop::new(engine_with(registry), 10);
        let stopper = worker.handle();
        let (result, _) = tokio::join!(worker.forever(5), async move {
            stopper.stop();
        });
        result.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!worker.handle().is_running());
    }
}
