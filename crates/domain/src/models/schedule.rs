//! Cron schedule model.
//!
//! Wraps [`cron::Schedule`] so registrations can use either the classic
//! five-field crontab form (`min hour dom mon dow`) or the six/seven-field
//! form with a leading seconds column.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a schedule expression.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Empty schedule expression")]
    Empty,

    #[error("Invalid schedule expression '{expression}': {reason}")]
    Invalid { expression: String, reason: String },
}

/// A parsed recurrence rule used to compute a job's next fire instant.
///
/// Weekday numbers follow the `cron` crate (1 = Sunday through 7 = Saturday);
/// prefer names such as `MON-FRI` to stay unambiguous.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parse a schedule expression.
    ///
    /// Five-field expressions get a `0` seconds column prepended so that
    /// `* * * * *` fires once a minute on the minute.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let normalized = if !trimmed.starts_with('@') && trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };

        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::Invalid {
                expression: trimmed.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as supplied at registration.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire instant strictly after `now`, evaluated in `tz`.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&tz);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
