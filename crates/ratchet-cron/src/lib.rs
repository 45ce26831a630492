//! `ratchet-cron` — cron expression parsing and evaluation.
//!
//! # Overview
//!
//! [`parse`] turns a 5- or 6-field cron string into a [`ParsedCron`]: one
//! explicit sorted set of admissible values per field, plus flags recording
//! whether the day-of-month and day-of-week fields were written as `*`.
//! [`eval`] answers the two questions the scheduler asks: does this instant
//! match, and when is the next matching instant.
//!
//! Everything here is pure — no I/O, no ambient clock. Malformed
//! expressions fail at parse time so a bad schedule can never surface
//! mid-run.

pub mod error;
pub mod eval;
pub mod parse;

pub use error::{CronError, Result};
pub use eval::{evaluate, matches, next_match, Evaluation};
pub use parse::{parse, ParsedCron};
