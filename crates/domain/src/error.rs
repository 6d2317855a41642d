//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`FleetError`]
//! via `#[from]` (domain rules, lookups) or by boxing (storage, transport).

/// Top-level error returned by every fallible operation in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// A business rule was violated.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A referenced robot, session or schedule does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A device transport or external service failed.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The caller cancelled the operation before it took effect.
    #[error("operation cancelled")]
    Cancelled,
}

impl FleetError {
    /// Wrap a storage-layer error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    /// Wrap a transport-layer error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }

    /// Whether this is a business-rule violation rather than an infrastructure failure.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_) | Self::NotFound(_))
    }
}

/// A business-rule violation, always attributable to a specific invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Battery level must be between 0 and 100 (got {level})")]
    BatteryOutOfRange { level: i32 },

    #[error("Dustbin level must be between 0 and 100 (got {level})")]
    DustbinOutOfRange { level: i32 },

    #[error("Maintenance health must be between 0 and 100 (got {health})")]
    HealthOutOfRange { health: i32 },

    #[error("Quiet hours must be between 0 and 23 (got {start}..{end})")]
    QuietHoursOutOfRange { start: i32, end: i32 },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("Robot is not ready for cleaning (status {status}, battery {battery}%)")]
    RobotNotReady { status: String, battery: u8 },

    #[error("Session already started (status {status})")]
    SessionAlreadyStarted { status: String },

    #[error("Cannot pause session that is not in progress (status {status})")]
    SessionNotInProgress { status: String },

    #[error("Cannot resume session that is not paused (status {status})")]
    SessionNotPaused { status: String },

    #[error("Session is already finished (status {status})")]
    SessionFinished { status: String },

    #[error("Robot {robot_id} already has an active cleaning session")]
    SessionAlreadyActive { robot_id: String },

    #[error("Robot has no active cleaning session")]
    NoActiveSession,

    #[error("Robot with serial number {0} already registered")]
    DuplicateSerial(String),

    #[error("Invalid serial number {0}")]
    InvalidSerial(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{name} must be a finite non-negative number (got {value})")]
    InvalidMetric { name: &'static str, value: String },

    #[error("Robot has no {0} maintenance item")]
    UnknownMaintenanceItem(String),

    #[error("Cleaning error {0} not found in session")]
    UnknownCleaningError(String),
}

/// A referenced aggregate does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_format_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Robot",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Robot abc not found");
    }

    #[test]
    fn should_mention_offending_value_when_battery_out_of_range() {
        let err = DomainError::BatteryOutOfRange { level: 120 };
        assert_eq!(
            err.to_string(),
            "Battery level must be between 0 and 100 (got 120)"
        );
    }

    #[test]
    fn should_convert_domain_error_into_fleet_error() {
        let err: FleetError = DomainError::NoActiveSession.into();
        assert!(err.is_domain());
        assert!(matches!(err, FleetError::Domain(DomainError::NoActiveSession)));
    }

    #[test]
    fn should_not_be_domain_when_storage_error() {
        let err = FleetError::storage(std::io::Error::other("disk gone"));
        assert!(!err.is_domain());
    }
}
