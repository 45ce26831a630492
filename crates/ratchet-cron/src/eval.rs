use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use ratchet_core::time::floor_secs;

use crate::error::{CronError, Result};
use crate::parse::ParsedCron;

/// How far `next_match` searches before declaring the expression dead.
/// Five years (in days, leap-padded) comfortably covers every satisfiable
/// dom/month combination.
const HORIZON_DAYS: i64 = 5 * 366;

/// What the scheduler needs to know about an expression at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The expression matches this tick and has not already fired in it.
    pub due: bool,
    /// The next matching instant, `None` when the expression can never
    /// match again within the search horizon.
    pub next: Option<DateTime<Utc>>,
}

/// True iff `at` (floored to the second) satisfies the expression.
pub fn matches(cron: &ParsedCron, at: DateTime<Utc>) -> bool {
    let t = floor_secs(at);
    contains(&cron.seconds, t.second())
        && contains(&cron.minutes, t.minute())
        && contains(&cron.hours, t.hour())
        && contains(&cron.months, t.month())
        && day_matches(cron, t)
}

/// Classic cron day semantics: both day fields wild means no day
/// constraint; one wild means the other decides; both constrained means
/// EITHER may match (union).
fn day_matches(cron: &ParsedCron, t: DateTime<Utc>) -> bool {
    let dom = contains(&cron.days_of_month, t.day());
    let dow = contains(&cron.days_of_week, t.weekday().num_days_from_sunday());
    match (cron.dom_star, cron.dow_star) {
        (true, true) => true,
        (true, false) => dow,
        (false, true) => dom,
        (false, false) => dom || dow,
    }
}

/// Smallest instant strictly after `from` (at second granularity) that
/// matches the expression.
///
/// Incremental field-by-field search: a mismatching month jumps to the next
/// month boundary, a mismatching day to the next midnight, and so on down
/// to single-second steps. Never scans per-second across days.
pub fn next_match(cron: &ParsedCron, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let horizon = from + Duration::days(HORIZON_DAYS);
    let mut t = floor_secs(from) + Duration::seconds(1);

    while t <= horizon {
        if !contains(&cron.months, t.month()) {
            t = start_of_next_month(t)?;
            continue;
        }
        if !day_matches(cron, t) {
            t = start_of_next_day(t)?;
            continue;
        }
        if !contains(&cron.hours, t.hour()) {
            t = start_of_next_hour(t)?;
            continue;
        }
        if !contains(&cron.minutes, t.minute()) {
            t = start_of_next_minute(t)?;
            continue;
        }
        if !contains(&cron.seconds, t.second()) {
            t += Duration::seconds(1);
            continue;
        }
        return Ok(t);
    }

    Err(CronError::NoFutureMatch)
}

/// Combined due-ness check for one scheduler tick.
///
/// `due` requires both a match on the floored instant and that the previous
/// run (if any) happened in a *different* tick — two collection passes
/// inside the same matching second must not fire the job twice.
pub fn evaluate(
    cron: &ParsedCron,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Evaluation {
    let tick = floor_secs(now);
    let due = matches(cron, tick) && last_run.map(floor_secs) != Some(tick);
    Evaluation { due, next: next_match(cron, now).ok() }
}

fn contains(set: &[u8], value: u32) -> bool {
    set.binary_search(&(value as u8)).is_ok()
}

fn start_of_next_month(t: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or(CronError::NoFutureMatch)
}

fn start_of_next_day(t: DateTime<Utc>) -> Result<DateTime<Utc>> {
    t.date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .ok_or(CronError::NoFutureMatch)
}

fn start_of_next_hour(t: DateTime<Utc>) -> Result<DateTime<Utc>> {
    t.with_minute(0)
        .and_then(|t| t.with_second(0))
        .map(|t| t + Duration::hours(1))
        .ok_or(CronError::NoFutureMatch)
}

fn start_of_next_minute(t: DateTime<Utc>) -> Result<DateTime<Utc>> {
    t.with_second(0)
        .map(|t| t + Duration::minutes(1))
        .ok_or(CronError::NoFutureMatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn matches_is_deterministic() {
        let cron = parse("*/5 * * * * *").unwrap();
        let t = at(2026, 8, 7, 12, 0, 10);
        assert!(matches(&cron, t));
        assert!(matches(&cron, t));
        assert!(!matches(&cron, at(2026, 8, 7, 12, 0, 3)));
    }

    #[test]
    fn five_field_expression_matches_only_second_zero() {
        let cron = parse("30 9 * * *").unwrap();
        assert!(matches(&cron, at(2026, 8, 7, 9, 30, 0)));
        assert!(!matches(&cron, at(2026, 8, 7, 9, 30, 1)));
    }

    // 2026-06-08 is a Monday; 2026-07-01 is a Wednesday.
    #[test]
    fn dom_constrained_dow_wild_matches_only_day_of_month() {
        let cron = parse("0 0 0 1 * *").unwrap();
        assert!(matches(&cron, at(2026, 7, 1, 0, 0, 0)));
        assert!(!matches(&cron, at(2026, 6, 8, 0, 0, 0)));
    }

    #[test]
    fn dow_constrained_dom_wild_matches_only_weekday() {
        let cron = parse("0 0 0 * * 1").unwrap();
        assert!(matches(&cron, at(2026, 6, 8, 0, 0, 0)));
        assert!(!matches(&cron, at(2026, 7, 1, 0, 0, 0)));
    }

    #[test]
    fn both_constrained_is_a_union() {
        let cron = parse("0 0 0 1 * 1").unwrap();
        // Day-of-month 1 (a Wednesday) matches.
        assert!(matches(&cron, at(2026, 7, 1, 0, 0, 0)));
        // Any Monday matches.
        assert!(matches(&cron, at(2026, 6, 8, 0, 0, 0)));
        // Neither day 1 nor Monday: no match.
        assert!(!matches(&cron, at(2026, 6, 9, 0, 0, 0)));
    }

    #[test]
    fn next_match_is_strictly_after_and_matching() {
        let exprs = ["*/5 * * * * *", "30 9 * * *", "0 0 12 * * 1-5", "0 15 10 1 * *"];
        let starts = [
            at(2026, 8, 7, 12, 0, 0),
            at(2026, 12, 31, 23, 59, 59),
            at(2026, 2, 28, 9, 30, 0),
        ];
        for expr in exprs {
            let cron = parse(expr).unwrap();
            for from in starts {
                let next = next_match(&cron, from).unwrap();
                assert!(next > from, "{expr}: {next} not after {from}");
                assert!(matches(&cron, next), "{expr}: {next} does not match");
            }
        }
    }

    #[test]
    fn next_match_rolls_over_month_and_year_boundaries() {
        let cron = parse("0 15 10 1 * *").unwrap();
        assert_eq!(
            next_match(&cron, at(2026, 12, 1, 10, 15, 0)).unwrap(),
            at(2027, 1, 1, 10, 15, 0)
        );
    }

    #[test]
    fn next_match_from_a_matching_instant_moves_forward() {
        let cron = parse("*/5 * * * * *").unwrap();
        assert_eq!(
            next_match(&cron, at(2026, 8, 7, 12, 0, 10)).unwrap(),
            at(2026, 8, 7, 12, 0, 15)
        );
    }

    #[test]
    fn impossible_date_exhausts_the_horizon() {
        // February 31st never exists.
        let cron = parse("0 0 0 31 2 *").unwrap();
        assert_eq!(
            next_match(&cron, at(2026, 1, 1, 0, 0, 0)),
            Err(CronError::NoFutureMatch)
        );
    }

    #[test]
    fn leap_day_is_found_across_years() {
        let cron = parse("0 0 0 29 2 *").unwrap();
        assert_eq!(
            next_match(&cron, at(2026, 3, 1, 0, 0, 0)).unwrap(),
            at(2028, 2, 29, 0, 0, 0)
        );
    }

    #[test]
    fn evaluate_fires_once_per_tick() {
        let cron = parse("*/5 * * * * *").unwrap();
        let tick = at(2026, 8, 7, 12, 0, 5);

        // First sighting of the tick: due.
        let eval = evaluate(&cron, tick, None);
        assert!(eval.due);

        // Same tick, already ran: not due.
        let eval = evaluate(&cron, tick, Some(tick));
        assert!(!eval.due);

        // Previous run in an earlier tick: due again.
        let eval = evaluate(&cron, tick, Some(at(2026, 8, 7, 12, 0, 0)));
        assert!(eval.due);

        // Off-schedule instant is never due.
        let eval = evaluate(&cron, at(2026, 8, 7, 12, 0, 3), None);
        assert!(!eval.due);
    }

    #[test]
    fn evaluate_reports_the_next_occurrence() {
        let cron = parse("*/5 * * * * *").unwrap();
        let eval = evaluate(&cron, at(2026, 8, 7, 12, 0, 3), None);
        assert_eq!(eval.next, Some(at(2026, 8, 7, 12, 0, 5)));
    }
}
