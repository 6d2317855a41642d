//! Command gateway port: delivery of commands to physical robots.
//!
//! The transport is unreliable. A successful return means the command has
//! been queued for at-least-once delivery to the addressed robot; whether and
//! when the robot acts on it is reported back out-of-band. Robots must treat
//! commands as idempotent since duplicates are possible.

use std::future::Future;
use std::sync::Arc;

use robofleet_domain::command::RobotCommand;
use robofleet_domain::error::FleetError;
use robofleet_domain::id::{RobotId, SessionId, ZoneId};
use robofleet_domain::session::CleaningMode;

/// Sends [`RobotCommand`]s to robots.
pub trait CommandGateway {
    /// Queue `command` for delivery to `robot_id`.
    fn dispatch(
        &self,
        robot_id: RobotId,
        command: RobotCommand,
    ) -> impl Future<Output = Result<(), FleetError>> + Send;

    /// Check whether the robot can currently be reached.
    fn test_connection(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send;

    fn send_cleaning_command(
        &self,
        robot_id: RobotId,
        session_id: SessionId,
        mode: CleaningMode,
        zones: Vec<ZoneId>,
    ) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.dispatch(
            robot_id,
            RobotCommand::StartCleaning {
                session_id,
                mode,
                zones,
            },
        )
    }

    fn send_return_to_base(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.dispatch(robot_id, RobotCommand::ReturnToBase)
    }

    fn send_pause(&self, robot_id: RobotId) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.dispatch(robot_id, RobotCommand::Pause)
    }

    fn send_resume(&self, robot_id: RobotId) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.dispatch(robot_id, RobotCommand::Resume)
    }

    fn send_stop(&self, robot_id: RobotId) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.dispatch(robot_id, RobotCommand::Stop)
    }
}

impl<T: CommandGateway + Send + Sync> CommandGateway for Arc<T> {
    fn dispatch(
        &self,
        robot_id: RobotId,
        command: RobotCommand,
    ) -> impl Future<Output = Result<(), FleetError>> + Send {
        (**self).dispatch(robot_id, command)
    }

    fn test_connection(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        (**self).test_connection(robot_id)
    }
}
