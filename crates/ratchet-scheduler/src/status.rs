//! Status reporting types for the `status` command surface.

use serde::Serialize;

/// One pass over the store summarised for operators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Jobs registered in this process.
    pub defined: usize,
    /// Rows with a live lease (executing somewhere right now).
    pub running: usize,
    /// Rows present and not leased.
    pub idle: usize,
    pub jobs: Vec<JobStatus>,
}

/// Per-job detail. Timestamps are in the store's RFC 3339 format.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    /// None for rows whose defining worker isn't this process.
    pub queue: Option<String>,
    pub running: bool,
    pub enqueued: bool,
    pub last_run: Option<String>,
    pub lease_until: Option<String>,
    pub next_run: Option<String>,
    pub fail_count: u32,
    pub attempts: u32,
    pub last_error: Option<String>,
}
