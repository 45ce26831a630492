use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error. Fatal to the current pass;
    /// the caller decides whether to retry the whole pass.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A cron expression failed to parse at registration time.
    #[error("Invalid cron expression: {0}")]
    Cron(#[from] ratchet_cron::CronError),

    /// A spec with this name is already registered.
    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    /// Dispatch referenced a name no spec was registered under.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Signal registration or other OS-level failure in the worker loop.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
