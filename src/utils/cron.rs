//! Minimal local-time crontab matcher.
//!
//! Supports the standard 5-field syntax (`minute hour day-of-month month
//! day-of-week`) with `*`, single values, comma lists, and `a-b` ranges.
//! Step syntax (`*/N`) is not supported — none of the Scheduler Bridge's
//! default triggers need it, and the defaults below are all fixed clock
//! times.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, Timelike};

#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: FieldMatch,
    hour: FieldMatch,
    day_of_month: FieldMatch,
    month: FieldMatch,
    day_of_week: FieldMatch,
    expr: String,
}

#[derive(Debug, Clone)]
enum FieldMatch {
    Any,
    Values(Vec<u32>),
}

impl FieldMatch {
    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Values(vs) => vs.contains(&value),
        }
    }

    fn parse(field: &str) -> Result<Self, String> {
        if field == "*" {
            return Ok(Self::Any);
        }
        let mut values = Vec::new();
        for part in field.split(',') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.parse().map_err(|_| format!("invalid range start: {lo}"))?;
                let hi: u32 = hi.parse().map_err(|_| format!("invalid range end: {hi}"))?;
                values.extend(lo..=hi);
            } else {
                values.push(part.parse().map_err(|_| format!("invalid field value: {part}"))?);
            }
        }
        Ok(Self::Values(values))
    }
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected 5 cron fields, got {}: '{}'", fields.len(), expr));
        }
        Ok(Self {
            minute: FieldMatch::parse(fields[0])?,
            hour: FieldMatch::parse(fields[1])?,
            day_of_month: FieldMatch::parse(fields[2])?,
            month: FieldMatch::parse(fields[3])?,
            day_of_week: FieldMatch::parse(fields[4])?,
            expr: expr.to_string(),
        })
    }

    fn matches(&self, dt: &DateTime<Local>) -> bool {
        self.minute.matches(dt.minute())
            && self.hour.matches(dt.hour())
            && self.day_of_month.matches(dt.day())
            && self.month.matches(dt.month())
            && self.day_of_week.matches(dt.weekday().num_days_from_sunday())
    }

    /// Next matching minute strictly after `after`, searched minute-by-minute
    /// up to one year out (a crontab expression that never fires within a
    /// year is treated as misconfigured).
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut candidate = (after + ChronoDuration::minutes(1))
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))?;
        let limit = after + ChronoDuration::days(366);
        while candidate < limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += ChronoDuration::minutes(1);
        }
        None
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_at_two_am() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();
        let now = Local.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let next = schedule.next_after(now).unwrap();
        assert_eq!(next.hour(), 2);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.day(), 2);
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(CronSchedule::parse("0 2 * *").is_err());
    }
}
