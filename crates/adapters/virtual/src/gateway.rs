//! Command gateway that never leaves the process.

use std::sync::Mutex;

use robofleet_app::ports::CommandGateway;
use robofleet_domain::command::RobotCommand;
use robofleet_domain::error::FleetError;
use robofleet_domain::id::RobotId;

/// Logs every command and keeps it for inspection.
#[derive(Default)]
pub struct LoggingGateway {
    sent: Mutex<Vec<(RobotId, RobotCommand)>>,
}

impl LoggingGateway {
    /// Commands dispatched so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<(RobotId, RobotCommand)> {
        self.sent
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |g| g.clone())
    }
}

impl CommandGateway for LoggingGateway {
    async fn dispatch(&self, robot_id: RobotId, command: RobotCommand) -> Result<(), FleetError> {
        tracing::info!(%robot_id, command = command.name(), "virtual command dispatched");
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((robot_id, command));
        Ok(())
    }

    async fn test_connection(&self, robot_id: RobotId) -> Result<bool, FleetError> {
        tracing::debug!(%robot_id, "virtual ping");
        Ok(true)
    }
}
