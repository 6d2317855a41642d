//! Cleaning schedules: a recurrence bound to a robot, with optional quiet
//! hours during which due occurrences are skipped rather than run.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{Event, EventKind};
use crate::id::{RobotId, ScheduleId, SessionId, ZoneId};
use crate::recurrence::{DEFAULT_TIMEZONE, Recurrence};
use crate::session::CleaningMode;
use crate::time::{Timestamp, now};

/// Daily local-time window `[start, end)` in whole hours.
///
/// A window whose start is after its end wraps past midnight; equal bounds
/// describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    start: u8,
    end: u8,
}

impl QuietHours {
    /// # Errors
    ///
    /// Returns [`DomainError::QuietHoursOutOfRange`] when a bound is outside `0..=23`.
    pub fn new(start: i32, end: i32) -> Result<Self, DomainError> {
        let hour = |h: i32| u8::try_from(h).ok().filter(|h| *h <= 23);
        match (hour(start), hour(end)) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(DomainError::QuietHoursOutOfRange { start, end }),
        }
    }

    #[must_use]
    pub fn start(&self) -> u8 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u8 {
        self.end
    }

    #[must_use]
    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// A recurring cleaning plan for one robot.
#[derive(Debug, Clone)]
pub struct CleaningSchedule {
    id: ScheduleId,
    robot_id: RobotId,
    expression: String,
    timezone: String,
    recurrence: Recurrence,
    mode: CleaningMode,
    zone_ids: Vec<ZoneId>,
    active: bool,
    created_at: Timestamp,
    last_triggered_at: Option<Timestamp>,
    last_evaluated_at: Option<Timestamp>,
    quiet_hours: Option<QuietHours>,
    pending_events: Vec<Event>,
}

impl CleaningSchedule {
    /// Create an active schedule.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidCron`] or [`DomainError::InvalidTimezone`]
    /// when the recurrence does not validate.
    pub fn create(
        robot_id: RobotId,
        expression: impl Into<String>,
        mode: CleaningMode,
        zone_ids: Vec<ZoneId>,
        timezone: Option<&str>,
    ) -> Result<Self, DomainError> {
        let mut builder = Self::builder(robot_id, expression)
            .mode(mode)
            .zone_ids(zone_ids);
        if let Some(tz) = timezone {
            builder = builder.timezone(tz);
        }
        builder.build()
    }

    /// Create a builder, used to rehydrate a schedule from storage.
    #[must_use]
    pub fn builder(robot_id: RobotId, expression: impl Into<String>) -> ScheduleBuilder {
        ScheduleBuilder {
            id: None,
            robot_id,
            expression: expression.into(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            mode: CleaningMode::default(),
            zone_ids: Vec::new(),
            active: true,
            created_at: None,
            last_triggered_at: None,
            last_evaluated_at: None,
            quiet_hours: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    #[must_use]
    pub fn robot_id(&self) -> RobotId {
        self.robot_id
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    #[must_use]
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    #[must_use]
    pub fn mode(&self) -> CleaningMode {
        self.mode
    }

    #[must_use]
    pub fn zone_ids(&self) -> &[ZoneId] {
        &self.zone_ids
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    #[must_use]
    pub fn last_triggered_at(&self) -> Option<Timestamp> {
        self.last_triggered_at
    }

    #[must_use]
    pub fn last_evaluated_at(&self) -> Option<Timestamp> {
        self.last_evaluated_at
    }

    #[must_use]
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        self.quiet_hours
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending_events)
    }

    /// Next trigger instant strictly after the current time; `None` while inactive.
    #[must_use]
    pub fn next_execution(&self) -> Option<Timestamp> {
        self.next_execution_after(now())
    }

    /// Next trigger instant strictly after `after`; `None` while inactive.
    /// Quiet hours do not move this instant.
    #[must_use]
    pub fn next_execution_after(&self, after: Timestamp) -> Option<Timestamp> {
        if !self.active {
            return None;
        }
        self.recurrence.next_after(after)
    }

    /// The latest unhandled occurrence at or before `now`.
    ///
    /// Handled means triggered, skipped, or preceding creation or the last
    /// trigger. Older missed occurrences collapse into this one, so handling
    /// it clears the whole backlog.
    #[must_use]
    pub fn due_occurrence(&self, now: Timestamp) -> Option<Timestamp> {
        let mut latest = self.next_execution_after(self.cursor()).filter(|o| *o <= now)?;
        while let Some(next) = self.recurrence.next_after(latest).filter(|o| *o <= now) {
            latest = next;
        }
        Some(latest)
    }

    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_execution_after(self.cursor())
            .is_some_and(|occurrence| occurrence <= now)
    }

    /// Whether `at` falls within the configured quiet hours, in local time.
    #[must_use]
    pub fn is_quiet_at(&self, at: Timestamp) -> bool {
        self.quiet_hours
            .is_some_and(|quiet| quiet.contains(self.recurrence.local_hour(at)))
    }

    /// Raises [`EventKind::ScheduleActivated`] on every call. Reactivating an
    /// inactive schedule does not replay occurrences missed while inactive.
    pub fn activate(&mut self) {
        if !self.active {
            self.last_evaluated_at = Some(now());
        }
        self.active = true;
        self.raise(EventKind::ScheduleActivated {
            schedule_id: self.id,
        });
    }

    /// Raises [`EventKind::ScheduleDeactivated`] on every call.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.raise(EventKind::ScheduleDeactivated {
            schedule_id: self.id,
        });
    }

    /// Flip the active flag.
    pub fn toggle(&mut self) {
        if self.active {
            self.deactivate();
        } else {
            self.activate();
        }
    }

    /// # Errors
    ///
    /// Returns [`DomainError::InvalidCron`] and keeps the previous expression
    /// when `expression` does not parse.
    pub fn update_cron(&mut self, expression: impl Into<String>) -> Result<(), DomainError> {
        let expression = expression.into();
        self.recurrence = Recurrence::parse(&expression, &self.timezone)?;
        self.expression.clone_from(&expression);
        self.raise(EventKind::ScheduleUpdated {
            schedule_id: self.id,
            expression,
        });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTimezone`] and keeps the previous zone
    /// when `timezone` is unknown.
    pub fn update_timezone(&mut self, timezone: impl Into<String>) -> Result<(), DomainError> {
        let timezone = timezone.into();
        self.recurrence = Recurrence::parse(&self.expression, &timezone)?;
        self.timezone = timezone;
        Ok(())
    }

    pub fn update_mode(&mut self, mode: CleaningMode) {
        self.mode = mode;
    }

    pub fn update_zones(&mut self, zone_ids: Vec<ZoneId>) {
        self.zone_ids = zone_ids;
    }

    /// # Errors
    ///
    /// Returns [`DomainError::QuietHoursOutOfRange`] when a bound is outside
    /// `0..=23`; the previous window is kept.
    pub fn set_quiet_hours(&mut self, start: i32, end: i32) -> Result<(), DomainError> {
        let quiet = QuietHours::new(start, end)?;
        self.quiet_hours = Some(quiet);
        self.raise(EventKind::QuietHoursUpdated {
            schedule_id: self.id,
            start: Some(quiet.start),
            end: Some(quiet.end),
        });
        Ok(())
    }

    pub fn clear_quiet_hours(&mut self) {
        self.quiet_hours = None;
        self.raise(EventKind::QuietHoursUpdated {
            schedule_id: self.id,
            start: None,
            end: None,
        });
    }

    /// Record that `occurrence` produced a cleaning session.
    pub fn mark_triggered(&mut self, occurrence: Timestamp, session_id: Option<SessionId>) {
        let triggered_at = now();
        self.last_triggered_at = Some(triggered_at);
        self.advance_cursor(occurrence);
        self.raise(EventKind::ScheduleTriggered {
            schedule_id: self.id,
            session_id,
        });
    }

    /// Record that `occurrence` was deliberately not run.
    pub fn skip_occurrence(&mut self, occurrence: Timestamp, reason: impl Into<String>) {
        self.advance_cursor(occurrence);
        self.raise(EventKind::ScheduleSkipped {
            schedule_id: self.id,
            occurrence,
            reason: reason.into(),
        });
    }

    fn cursor(&self) -> Timestamp {
        [self.last_evaluated_at, self.last_triggered_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, Timestamp::max)
    }

    fn advance_cursor(&mut self, to: Timestamp) {
        self.last_evaluated_at = Some(self.last_evaluated_at.map_or(to, |prev| prev.max(to)));
    }

    fn raise(&mut self, kind: EventKind) {
        self.pending_events.push(Event::new(self.robot_id, kind));
    }
}

/// Step-by-step builder for [`CleaningSchedule`].
#[derive(Debug)]
pub struct ScheduleBuilder {
    id: Option<ScheduleId>,
    robot_id: RobotId,
    expression: String,
    timezone: String,
    mode: CleaningMode,
    zone_ids: Vec<ZoneId>,
    active: bool,
    created_at: Option<Timestamp>,
    last_triggered_at: Option<Timestamp>,
    last_evaluated_at: Option<Timestamp>,
    quiet_hours: Option<(i32, i32)>,
}

impl ScheduleBuilder {
    #[must_use]
    pub fn id(mut self, id: ScheduleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: CleaningMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn zone_ids(mut self, zone_ids: Vec<ZoneId>) -> Self {
        self.zone_ids = zone_ids;
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    #[must_use]
    pub fn last_triggered_at(mut self, ts: Option<Timestamp>) -> Self {
        self.last_triggered_at = ts;
        self
    }

    #[must_use]
    pub fn last_evaluated_at(mut self, ts: Option<Timestamp>) -> Self {
        self.last_evaluated_at = ts;
        self
    }

    #[must_use]
    pub fn quiet_hours(mut self, start: i32, end: i32) -> Self {
        self.quiet_hours = Some((start, end));
        self
    }

    /// Consume the builder, validate, and return a [`CleaningSchedule`].
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when the expression, timezone or quiet hours
    /// are invalid.
    pub fn build(self) -> Result<CleaningSchedule, DomainError> {
        let recurrence = Recurrence::parse(&self.expression, &self.timezone)?;
        let quiet_hours = self
            .quiet_hours
            .map(|(start, end)| QuietHours::new(start, end))
            .transpose()?;
        Ok(CleaningSchedule {
            id: self.id.unwrap_or_default(),
            robot_id: self.robot_id,
            expression: self.expression,
            timezone: self.timezone,
            recurrence,
            mode: self.mode,
            zone_ids: self.zone_ids,
            active: self.active,
            created_at: self.created_at.unwrap_or_else(now),
            last_triggered_at: self.last_triggered_at,
            last_evaluated_at: self.last_evaluated_at,
            quiet_hours,
            pending_events: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike, Utc};

    use super::*;

    fn at(d: u32, h: u32, mi: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, d, h, mi, 0).unwrap()
    }

    fn daily_at_ten() -> CleaningSchedule {
        CleaningSchedule::builder(RobotId::new(), "0 10 * * *")
            .created_at(at(1, 0, 0))
            .build()
            .unwrap()
    }

    #[test]
    fn should_be_active_with_utc_when_created_with_valid_expression() {
        let schedule =
            CleaningSchedule::create(RobotId::new(), "0 10 * * *", CleaningMode::Quick, vec![], None)
                .unwrap();
        assert!(schedule.is_active());
        assert_eq!(schedule.timezone(), "UTC");
        assert!(schedule.last_triggered_at().is_none());
    }

    #[test]
    fn should_reject_unparsable_expression() {
        for expression in ["", "* * *"] {
            let err = CleaningSchedule::create(
                RobotId::new(),
                expression,
                CleaningMode::Full,
                vec![],
                None,
            )
            .unwrap_err();
            assert!(err.to_string().contains("Invalid cron expression"));
        }
    }

    #[test]
    fn should_return_none_for_next_execution_when_inactive() {
        let mut schedule = daily_at_ten();
        schedule.deactivate();
        assert!(schedule.next_execution().is_none());
    }

    #[test]
    fn should_return_next_ten_oclock_strictly_after_now() {
        let schedule = daily_at_ten();
        let before = now();
        let next = schedule.next_execution().unwrap();
        assert!(next > before);
        assert_eq!(next.hour(), 10);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn should_emit_event_on_every_activation() {
        let mut schedule = daily_at_ten();
        schedule.activate();
        schedule.activate();
        let events = schedule.take_events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e.kind, EventKind::ScheduleActivated { .. })));
    }

    #[test]
    fn should_keep_previous_expression_when_update_is_invalid() {
        let mut schedule = daily_at_ten();
        assert!(schedule.update_cron("not a cron").is_err());
        assert_eq!(schedule.expression(), "0 10 * * *");
        schedule.update_cron("30 7 * * 1-5").unwrap();
        assert_eq!(schedule.expression(), "30 7 * * 1-5");
        assert!(matches!(
            schedule.take_events()[0].kind,
            EventKind::ScheduleUpdated { .. }
        ));
    }

    #[test]
    fn should_reject_quiet_hours_out_of_range() {
        let mut schedule = daily_at_ten();
        for (start, end) in [(24, 8), (22, 25), (-1, 3)] {
            let err = schedule.set_quiet_hours(start, end).unwrap_err();
            assert!(err
                .to_string()
                .starts_with("Quiet hours must be between 0 and 23"));
        }
        assert!(schedule.quiet_hours().is_none());
    }

    #[test]
    fn should_store_overnight_quiet_hours() {
        let mut schedule = daily_at_ten();
        schedule.set_quiet_hours(22, 8).unwrap();
        let quiet = schedule.quiet_hours().unwrap();
        assert_eq!((quiet.start(), quiet.end()), (22, 8));
        assert!(schedule.is_quiet_at(at(2, 23, 0)));
        assert!(schedule.is_quiet_at(at(2, 7, 59)));
        assert!(!schedule.is_quiet_at(at(2, 8, 0)));
        assert!(!schedule.is_quiet_at(at(2, 10, 0)));
    }

    #[test]
    fn should_treat_equal_bounds_as_empty_window() {
        let quiet = QuietHours::new(5, 5).unwrap();
        assert!((0..24).all(|h| !quiet.contains(h)));
    }

    #[test]
    fn should_be_due_once_first_occurrence_after_creation_has_passed() {
        let schedule = daily_at_ten();
        assert!(!schedule.is_due(at(1, 9, 59)));
        assert_eq!(schedule.due_occurrence(at(1, 10, 0)), Some(at(1, 10, 0)));
    }

    #[test]
    fn should_not_be_due_again_after_trigger_until_next_occurrence() {
        let mut schedule = daily_at_ten();
        let occurrence = schedule.due_occurrence(at(1, 10, 1)).unwrap();
        schedule.mark_triggered(occurrence, Some(SessionId::new()));
        assert!(schedule.last_triggered_at().is_some());
        assert!(!schedule.is_due(at(1, 11, 0)));
    }

    #[test]
    fn should_advance_to_following_occurrence_when_skipped() {
        let mut schedule = daily_at_ten();
        schedule.skip_occurrence(at(1, 10, 0), "quiet hours");
        assert!(!schedule.is_due(at(1, 23, 0)));
        assert_eq!(schedule.due_occurrence(at(2, 10, 0)), Some(at(2, 10, 0)));
        assert!(matches!(
            schedule.take_events()[0].kind,
            EventKind::ScheduleSkipped { .. }
        ));
    }

    #[test]
    fn should_collapse_missed_occurrences_into_latest() {
        let mut schedule = daily_at_ten();
        let occurrence = schedule.due_occurrence(at(4, 12, 0)).unwrap();
        assert_eq!(occurrence, at(4, 10, 0));

        schedule.skip_occurrence(occurrence, "robot busy");

        assert!(!schedule.is_due(at(4, 12, 0)));
        assert_eq!(schedule.due_occurrence(at(5, 10, 0)), Some(at(5, 10, 0)));
    }

    #[test]
    fn should_never_be_due_when_inactive() {
        let mut schedule = daily_at_ten();
        schedule.deactivate();
        assert!(!schedule.is_due(at(3, 12, 0)));
    }
}
