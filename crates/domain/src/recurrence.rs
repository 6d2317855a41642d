//! Recurrence evaluation: "next occurrence after T for expression E in zone Z".
//!
//! Expressions use the classic five-field cron grammar, parsed by `croner`.
//! Timezones are IANA identifiers resolved through `chrono-tz`, so occurrences
//! follow local wall-clock time across DST changes.

use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use croner::Cron;

use crate::error::DomainError;
use crate::time::Timestamp;

/// Timezone used when a schedule does not name one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// A validated recurrence expression bound to a timezone.
#[derive(Debug, Clone)]
pub struct Recurrence {
    cron: Cron,
    timezone: Tz,
}

impl Recurrence {
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidCron`] carrying the parser's message, or
    /// [`DomainError::InvalidTimezone`] for an unknown zone.
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, DomainError> {
        Ok(Self {
            cron: parse_expression(expression)?,
            timezone: parse_timezone(timezone)?,
        })
    }

    /// First occurrence strictly after `after`, or `None` if the expression
    /// can never fire again (e.g. `0 0 30 2 *`).
    #[must_use]
    pub fn next_after(&self, after: Timestamp) -> Option<Timestamp> {
        let local = after.with_timezone(&self.timezone);
        self.cron
            .find_next_occurrence(&local, false)
            .ok()
            .map(|next| next.with_timezone(&Utc))
    }

    /// Wall-clock hour of `at` in this recurrence's timezone.
    #[must_use]
    pub fn local_hour(&self, at: Timestamp) -> u8 {
        u8::try_from(at.with_timezone(&self.timezone).hour()).unwrap_or_default()
    }
}

/// # Errors
///
/// Returns [`DomainError::InvalidCron`] when `expression` does not parse.
pub fn parse_expression(expression: &str) -> Result<Cron, DomainError> {
    if expression.trim().is_empty() {
        return Err(DomainError::InvalidCron {
            expression: expression.to_string(),
            reason: "expression is empty".to_string(),
        });
    }
    Cron::new(expression)
        .parse()
        .map_err(|err| DomainError::InvalidCron {
            expression: expression.to_string(),
            reason: err.to_string(),
        })
}

/// # Errors
///
/// Returns [`DomainError::InvalidTimezone`] when `name` is not an IANA zone.
pub fn parse_timezone(name: &str) -> Result<Tz, DomainError> {
    name.parse::<Tz>()
        .map_err(|_| DomainError::InvalidTimezone(name.to_string()))
}
