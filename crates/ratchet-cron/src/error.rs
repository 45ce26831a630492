use thiserror::Error;

/// Errors raised while parsing or evaluating a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    /// Expression did not have 5 or 6 whitespace-separated fields.
    #[error("expected 5 or 6 cron fields, got {0}")]
    FieldCount(usize),

    /// A field component was not a number, `*`, range, or step.
    #[error("invalid {field} field: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// A numeric component fell outside the field's admissible range.
    #[error("{field} value {value} out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// `/0` steps never advance.
    #[error("{field} step must be at least 1")]
    ZeroStep { field: &'static str },

    /// Range written backwards, e.g. `30-10`.
    #[error("{field} range {from}-{to} is inverted")]
    InvertedRange {
        field: &'static str,
        from: u32,
        to: u32,
    },

    /// The expression can never match (e.g. `0 0 0 31 2 *`); the
    /// next-occurrence search gave up past its horizon.
    #[error("expression has no matching instant within the search horizon")]
    NoFutureMatch,
}

pub type Result<T> = std::result::Result<T, CronError>;
