//! Reports flowing back from robots, decoded by a transport adapter.
//!
//! Delivery is at-least-once, so the same report may arrive more than once.

use robofleet_domain::id::RobotId;
use robofleet_domain::robot::ConnectionStatus;

/// A message received from one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    pub robot_id: RobotId,
    pub kind: ReportKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportKind {
    /// Periodic state snapshot; absent fields are left unchanged.
    Telemetry {
        status: Option<ConnectionStatus>,
        battery: Option<i32>,
        dustbin: Option<i32>,
    },
    SessionStarted,
    SessionCompleted {
        area: f64,
        energy: f64,
    },
    SessionFailed {
        code: String,
        message: Option<String>,
    },
    /// A non-fatal fault during the current run.
    SessionError {
        code: String,
        message: Option<String>,
    },
}
