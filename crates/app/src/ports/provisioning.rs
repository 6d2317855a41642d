//! Provisioning port: pushes network configuration to a newly registered robot.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use robofleet_domain::error::FleetError;
use robofleet_domain::id::RobotId;

/// Network credentials handed to the robot at registration.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

/// Configures a robot's connectivity after registration.
pub trait ProvisioningService {
    /// Returns `false` when the robot was reached but refused the configuration.
    fn provision_robot(
        &self,
        robot_id: RobotId,
        credentials: WifiCredentials,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send;
}

impl<T: ProvisioningService + Send + Sync> ProvisioningService for Arc<T> {
    fn provision_robot(
        &self,
        robot_id: RobotId,
        credentials: WifiCredentials,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        (**self).provision_robot(robot_id, credentials)
    }
}
