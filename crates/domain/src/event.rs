//! Domain events raised by aggregates and drained after a successful persist.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, RobotId, ScheduleId, SessionId};
use crate::robot::ConnectionStatus;
use crate::time::{Timestamp, now};

/// Something that happened to a robot or one of its schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub robot_id: RobotId,
    pub kind: EventKind,
    pub occurred_at: Timestamp,
}

impl Event {
    /// Stamp a new event for `robot_id` at the current time.
    #[must_use]
    pub fn new(robot_id: RobotId, kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            robot_id,
            kind,
            occurred_at: now(),
        }
    }
}

/// Payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
        reason: Option<String>,
    },
    BatteryLow {
        level: u8,
    },
    ReturningToBase,
    ScheduleActivated {
        schedule_id: ScheduleId,
    },
    ScheduleDeactivated {
        schedule_id: ScheduleId,
    },
    ScheduleUpdated {
        schedule_id: ScheduleId,
        expression: String,
    },
    ScheduleTriggered {
        schedule_id: ScheduleId,
        session_id: Option<SessionId>,
    },
    ScheduleSkipped {
        schedule_id: ScheduleId,
        occurrence: Timestamp,
        reason: String,
    },
    QuietHoursUpdated {
        schedule_id: ScheduleId,
        start: Option<u8>,
        end: Option<u8>,
    },
}

impl EventKind {
    /// Short machine-friendly name, matching the serde tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status_changed",
            Self::BatteryLow { .. } => "battery_low",
            Self::ReturningToBase => "returning_to_base",
            Self::ScheduleActivated { .. } => "schedule_activated",
            Self::ScheduleDeactivated { .. } => "schedule_deactivated",
            Self::ScheduleUpdated { .. } => "schedule_updated",
            Self::ScheduleTriggered { .. } => "schedule_triggered",
            Self::ScheduleSkipped { .. } => "schedule_skipped",
            Self::QuietHoursUpdated { .. } => "quiet_hours_updated",
        }
    }
}
