use crate::error::{CronError, Result};

/// A cron expression reduced to explicit admissible-value sets.
///
/// Each field is a sorted, deduplicated list. `dom_star`/`dow_star` record
/// whether the day fields were written as a bare `*`, which the evaluator
/// needs for classic dom/dow union semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCron {
    pub seconds: Vec<u8>,
    pub minutes: Vec<u8>,
    pub hours: Vec<u8>,
    pub days_of_month: Vec<u8>,
    pub months: Vec<u8>,
    pub days_of_week: Vec<u8>,
    pub dom_star: bool,
    pub dow_star: bool,
}

/// One field's name and admissible numeric range.
struct Field {
    name: &'static str,
    min: u32,
    max: u32,
}

const SECOND: Field = Field { name: "second", min: 0, max: 59 };
const MINUTE: Field = Field { name: "minute", min: 0, max: 59 };
const HOUR: Field = Field { name: "hour", min: 0, max: 23 };
const DOM: Field = Field { name: "day-of-month", min: 1, max: 31 };
const MONTH: Field = Field { name: "month", min: 1, max: 12 };
// Accepts 7 as an alias for Sunday; values are normalised to 0..=6.
const DOW: Field = Field { name: "day-of-week", min: 0, max: 7 };

/// Parse a 5-field (`min hour dom mon dow`) or 6-field (second first) cron
/// expression. 5-field input is promoted to 6 fields with second = `{0}`.
pub fn parse(expression: &str) -> Result<ParsedCron> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let (sec_spec, rest) = match fields.len() {
        5 => ("0", &fields[..]),
        6 => (fields[0], &fields[1..]),
        n => return Err(CronError::FieldCount(n)),
    };

    let seconds = parse_field(sec_spec, &SECOND)?;
    let minutes = parse_field(rest[0], &MINUTE)?;
    let hours = parse_field(rest[1], &HOUR)?;
    let days_of_month = parse_field(rest[2], &DOM)?;
    let months = parse_field(rest[3], &MONTH)?;

    // Day-of-week: parse in 0..=7, then fold 7 (alternate Sunday) onto 0.
    let mut days_of_week: Vec<u8> =
        parse_field(rest[4], &DOW)?.into_iter().map(|d| d % 7).collect();
    days_of_week.sort_unstable();
    days_of_week.dedup();

    Ok(ParsedCron {
        seconds,
        minutes,
        hours,
        days_of_month,
        months,
        days_of_week,
        dom_star: rest[2] == "*",
        dow_star: rest[4] == "*",
    })
}

/// Expand one field spec (`*`, lists, `a-b` ranges, `/step`, `a-b/step`)
/// into its sorted value set.
fn parse_field(spec: &str, field: &Field) -> Result<Vec<u8>> {
    let mut values: Vec<u8> = Vec::new();

    for part in spec.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range, step_str)) => {
                let step = step_str.parse::<u32>().map_err(|_| CronError::InvalidValue {
                    field: field.name,
                    value: part.to_string(),
                })?;
                if step == 0 {
                    return Err(CronError::ZeroStep { field: field.name });
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (from, to) = if range_part == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            (parse_value(a, part, field)?, parse_value(b, part, field)?)
        } else {
            let v = parse_value(range_part, part, field)?;
            // A bare value with a step (`5/15`) means "from 5 to max".
            if step > 1 { (v, field.max) } else { (v, v) }
        };

        if from > to {
            return Err(CronError::InvertedRange { field: field.name, from, to });
        }

        let mut v = from;
        while v <= to {
            values.push(v as u8);
            v += step;
        }
    }

    if values.is_empty() {
        return Err(CronError::InvalidValue {
            field: field.name,
            value: spec.to_string(),
        });
    }

    values.sort_unstable();
    values.dedup();
    Ok(values)
}

fn parse_value(raw: &str, part: &str, field: &Field) -> Result<u32> {
    let v = raw.parse::<u32>().map_err(|_| CronError::InvalidValue {
        field: field.name,
        value: part.to_string(),
    })?;
    if v < field.min || v > field.max {
        return Err(CronError::OutOfRange {
            field: field.name,
            value: v,
            min: field.min,
            max: field.max,
        });
    }
    Ok(v)
}
