//! `ratchet-core` — shared plumbing for the ratchet workspace.
//!
//! Holds the pieces every other crate leans on: the figment-backed
//! configuration loader, the workspace error type, the injectable [`Clock`]
//! seam, and the canonical timestamp format used for every TEXT column in
//! the store.

pub mod clock;
pub mod config;
pub mod error;
pub mod time;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::RatchetConfig;
pub use error::{CoreError, Result};
