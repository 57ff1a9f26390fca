//! 5-field cron evaluation (min hour dom month dow), UTC.
//!
//! Supports `*`, `*/n`, comma lists, and ranges — the forms a heartbeat
//! schedule actually uses. The scheduler ticks at minute granularity and
//! fires whenever the current minute matches.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

fn field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
        return false;
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Whether a UTC instant matches a 5-field cron expression.
///
/// Malformed expressions never match.
pub fn cron_matches(expr: &str, at: &DateTime<Utc>) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    field_matches(fields[0], at.minute())
        && field_matches(fields[1], at.hour())
        && field_matches(fields[2], at.day())
        && field_matches(fields[3], at.month())
        && field_matches(fields[4], at.weekday().num_days_from_sunday())
}

/// A validated cron schedule driving a recurring job.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
}

impl CronSchedule {
    /// Parse an expression, rejecting anything that is not 5 fields.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "cron expression must have 5 fields, got {}: '{expr}'",
                fields.len()
            ));
        }
        Ok(Self { expr: expr.to_string() })
    }

    pub fn matches(&self, at: &DateTime<Utc>) -> bool {
        cron_matches(&self.expr, at)
    }

    /// The next matching minute strictly after `after`, within one year.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (*after + chrono::Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;
        for _ in 0..(366 * 24 * 60) {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate = candidate + chrono::Duration::minutes(1);
        }
        None
    }

    /// Spawn a loop that fires `job` on every matching minute.
    ///
    /// Job failures are logged and do not stop the schedule.
    pub fn spawn<F, Fut>(self, job: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), everclaw_core::Error>> + Send,
    {
        tokio::spawn(async move {
            let mut last_fired: Option<DateTime<Utc>> = None;
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(30));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let now = Utc::now();
                let minute = now.with_second(0).and_then(|t| t.with_nanosecond(0));
                let Some(minute) = minute else { continue };
                if last_fired == Some(minute) || !self.matches(&minute) {
                    continue;
                }
                last_fired = Some(minute);
                debug!(expr = %self.expr, "Cron schedule fired");
                if let Err(e) = job().await {
                    warn!(expr = %self.expr, error = %e, "Cron job failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(cron_matches("* * * * *", &at(2026, 8, 2, 12, 34)));
    }

    #[test]
    fn every_thirty_minutes() {
        let expr = "*/30 * * * *";
        assert!(cron_matches(expr, &at(2026, 8, 2, 12, 0)));
        assert!(cron_matches(expr, &at(2026, 8, 2, 12, 30)));
        assert!(!cron_matches(expr, &at(2026, 8, 2, 12, 15)));
    }

    #[test]
    fn fixed_hour_and_minute() {
        let expr = "5 3 * * *";
        assert!(cron_matches(expr, &at(2026, 8, 2, 3, 5)));
        assert!(!cron_matches(expr, &at(2026, 8, 2, 4, 5)));
    }

    #[test]
    fn lists_and_ranges() {
        let expr = "0 9-17 * * 1,2,3,4,5";
        // 2026-08-03 is a Monday
        assert!(cron_matches(expr, &at(2026, 8, 3, 9, 0)));
        assert!(cron_matches(expr, &at(2026, 8, 3, 17, 0)));
        assert!(!cron_matches(expr, &at(2026, 8, 3, 18, 0)));
        // 2026-08-02 is a Sunday
        assert!(!cron_matches(expr, &at(2026, 8, 2, 9, 0)));
    }

    #[test]
    fn malformed_expressions_never_match() {
        assert!(!cron_matches("* * *", &at(2026, 8, 2, 12, 0)));
        assert!(!cron_matches("", &at(2026, 8, 2, 12, 0)));
    }

    #[test]
    fn parse_rejects_wrong_arity() {
        assert!(CronSchedule::parse("*/30 * * * *").is_ok());
        assert!(CronSchedule::parse("*/30 * *").is_err());
    }

    #[test]
    fn next_after_advances_to_match() {
        let sched = CronSchedule::parse("*/30 * * * *").unwrap();
        let next = sched.next_after(&at(2026, 8, 2, 12, 5)).unwrap();
        assert_eq!(next, at(2026, 8, 2, 12, 30));

        let next = sched.next_after(&at(2026, 8, 2, 12, 30)).unwrap();
        assert_eq!(next, at(2026, 8, 2, 13, 0));
    }
}
