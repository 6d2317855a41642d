//! Cleaning sessions: one cleaning run of one robot, from planning to a
//! terminal outcome, along with the faults reported during the run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{CleaningErrorId, RobotId, ScheduleId, SessionId, ZoneId};
use crate::maintenance::UnknownVariant;
use crate::time::{Timestamp, now};

/// How thoroughly the robot should clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningMode {
    #[default]
    Full,
    Quick,
    Spot,
}

impl fmt::Display for CleaningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Quick => "quick",
            Self::Spot => "spot",
        })
    }
}

impl FromStr for CleaningMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "quick" => Ok(Self::Quick),
            "spot" => Ok(Self::Spot),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Lifecycle state of a [`CleaningSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planned,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [Self; 6] = [
        Self::Planned,
        Self::InProgress,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Completed, failed and cancelled sessions never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Human-readable text for a device fault code.
#[must_use]
pub fn default_error_message(code: &str) -> String {
    let known = match code {
        "BATTERY_LOW" => "Battery level too low to continue cleaning",
        "WHEEL_STUCK" => "Wheel is stuck, robot cannot move",
        "BRUSH_JAM" => "Main brush is jammed",
        "DUSTBIN_FULL" => "Dustbin is full and needs emptying",
        "CLIFF_SENSOR" => "Cliff sensor triggered, robot is at edge",
        "BUMPER_STUCK" => "Bumper is stuck",
        "FAN_ERROR" => "Fan motor error",
        "WATER_TANK_EMPTY" => "Water tank is empty",
        "MAP_LOST" => "Robot lost its position, needs relocalization",
        "WIFI_DISCONNECTED" => "WiFi connection lost",
        _ => return format!("Unknown error code: {code}"),
    };
    known.to_string()
}

/// A fault reported by the robot while cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningError {
    pub id: CleaningErrorId,
    pub code: String,
    pub message: String,
    pub occurred_at: Timestamp,
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl CleaningError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: Option<String>) -> Self {
        let code = code.into();
        let message = message.unwrap_or_else(|| default_error_message(&code));
        Self {
            id: CleaningErrorId::new(),
            code,
            message,
            occurred_at: now(),
            resolved: false,
            resolution: None,
        }
    }
}

/// A single cleaning run.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningSession {
    id: SessionId,
    robot_id: RobotId,
    mode: CleaningMode,
    zone_ids: Vec<ZoneId>,
    schedule_id: Option<ScheduleId>,
    status: SessionStatus,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
    area_cleaned: Option<f64>,
    energy_consumed: Option<f64>,
    errors: Vec<CleaningError>,
}

impl CleaningSession {
    /// A new run authorized for `robot_id`, in [`SessionStatus::Planned`].
    #[must_use]
    pub fn plan(
        robot_id: RobotId,
        mode: CleaningMode,
        zone_ids: Vec<ZoneId>,
        schedule_id: Option<ScheduleId>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            robot_id,
            mode,
            zone_ids,
            schedule_id,
            status: SessionStatus::Planned,
            started_at: now(),
            finished_at: None,
            area_cleaned: None,
            energy_consumed: None,
            errors: Vec::new(),
        }
    }

    /// Create a builder, used to rehydrate a session from storage.
    #[must_use]
    pub fn builder(robot_id: RobotId) -> SessionBuilder {
        SessionBuilder {
            session: Self::plan(robot_id, CleaningMode::default(), Vec::new(), None),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn robot_id(&self) -> RobotId {
        self.robot_id
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
    pub fn schedule_id(&self) -> Option<ScheduleId> {
        self.schedule_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    #[must_use]
    pub fn area_cleaned(&self) -> Option<f64> {
        self.area_cleaned
    }

    #[must_use]
    pub fn energy_consumed(&self) -> Option<f64> {
        self.energy_consumed
    }

    #[must_use]
    pub fn errors(&self) -> &[CleaningError] {
        &self.errors
    }

    /// Planned, in progress or paused.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// # Errors
    ///
    /// Returns [`DomainError::SessionAlreadyStarted`] unless the session is planned.
    pub fn start(&mut self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Planned {
            return Err(DomainError::SessionAlreadyStarted {
                status: self.status.to_string(),
            });
        }
        self.status = SessionStatus::InProgress;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::SessionNotInProgress`] unless the session is in progress.
    pub fn pause(&mut self) -> Result<(), DomainError> {
        if self.status != SessionStatus::InProgress {
            return Err(DomainError::SessionNotInProgress {
                status: self.status.to_string(),
            });
        }
        self.status = SessionStatus::Paused;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::SessionNotPaused`] unless the session is paused.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Paused {
            return Err(DomainError::SessionNotPaused {
                status: self.status.to_string(),
            });
        }
        self.status = SessionStatus::InProgress;
        Ok(())
    }

    /// Finish successfully with the reported metrics.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::SessionFinished`] on a terminal session and
    /// [`DomainError::InvalidMetric`] when a metric is negative or not finite.
    pub fn complete(&mut self, area: f64, energy: f64) -> Result<(), DomainError> {
        self.ensure_not_finished()?;
        let area = metric("area_cleaned", area)?;
        let energy = metric("energy_consumed", energy)?;
        self.status = SessionStatus::Completed;
        self.finished_at = Some(now());
        self.area_cleaned = Some(area);
        self.energy_consumed = Some(energy);
        Ok(())
    }

    /// Finish unsuccessfully, recording the fault that ended the run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::SessionFinished`] on a terminal session.
    pub fn fail(&mut self, code: &str, message: Option<String>) -> Result<(), DomainError> {
        self.ensure_not_finished()?;
        self.status = SessionStatus::Failed;
        self.finished_at = Some(now());
        self.errors.push(CleaningError::new(code, message));
        Ok(())
    }

    /// Record a non-fatal fault; the status is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::SessionFinished`] on a terminal session.
    pub fn add_error(
        &mut self,
        code: &str,
        message: Option<String>,
    ) -> Result<&CleaningError, DomainError> {
        self.ensure_not_finished()?;
        self.errors.push(CleaningError::new(code, message));
        Ok(&self.errors[self.errors.len() - 1])
    }

    /// Mark a previously reported fault as dealt with. Allowed on finished
    /// sessions too, since resolution usually happens after the run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownCleaningError`] when `error_id` is not part of this session.
    pub fn resolve_error(
        &mut self,
        error_id: CleaningErrorId,
        resolution: Option<String>,
    ) -> Result<(), DomainError> {
        let error = self
            .errors
            .iter_mut()
            .find(|e| e.id == error_id)
            .ok_or_else(|| DomainError::UnknownCleaningError(error_id.to_string()))?;
        error.resolved = true;
        error.resolution = resolution;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::SessionFinished`] when the session already
    /// completed, failed or was cancelled.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.ensure_not_finished()?;
        self.status = SessionStatus::Cancelled;
        self.finished_at = Some(now());
        Ok(())
    }

    fn ensure_not_finished(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::SessionFinished {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}

fn metric(name: &'static str, value: f64) -> Result<f64, DomainError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DomainError::InvalidMetric {
            name,
            value: value.to_string(),
        })
    }
}

/// Rebuilds a [`CleaningSession`] loaded from storage.
#[derive(Debug)]
pub struct SessionBuilder {
    session: CleaningSession,
}

impl SessionBuilder {
    #[must_use]
    pub fn id(mut self, id: SessionId) -> Self {
        self.session.id = id;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: CleaningMode) -> Self {
        self.session.mode = mode;
        self
    }

    #[must_use]
    pub fn zone_ids(mut self, zone_ids: Vec<ZoneId>) -> Self {
        self.session.zone_ids = zone_ids;
        self
    }

    #[must_use]
    pub fn schedule_id(mut self, schedule_id: Option<ScheduleId>) -> Self {
        self.session.schedule_id = schedule_id;
        self
    }

    #[must_use]
    pub fn status(mut self, status: SessionStatus) -> Self {
        self.session.status = status;
        self
    }

    #[must_use]
    pub fn started_at(mut self, ts: Timestamp) -> Self {
        self.session.started_at = ts;
        self
    }

    #[must_use]
    pub fn finished_at(mut self, ts: Option<Timestamp>) -> Self {
        self.session.finished_at = ts;
        self
    }

    #[must_use]
    pub fn metrics(mut self, area: Option<f64>, energy: Option<f64>) -> Self {
        self.session.area_cleaned = area;
        self.session.energy_consumed = energy;
        self
    }

    #[must_use]
    pub fn error(mut self, error: CleaningError) -> Self {
        self.session.errors.push(error);
        self
    }

    #[must_use]
    pub fn build(self) -> CleaningSession {
        self.session
    }
}
