//! Simulated Wi-Fi provisioning.

use std::sync::Mutex;
use std::time::Duration;

use robofleet_app::ports::{ProvisioningService, WifiCredentials};
use robofleet_domain::error::FleetError;
use robofleet_domain::id::RobotId;

/// Pretends to push credentials to a robot after `delay`.
///
/// Robots that accepted their credentials are remembered so tests can check
/// that background provisioning actually ran.
#[derive(Default)]
pub struct VirtualProvisioner {
    delay: Duration,
    provisioned: Mutex<Vec<RobotId>>,
}

impl VirtualProvisioner {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            provisioned: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn provisioned(&self) -> Vec<RobotId> {
        self.provisioned
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |g| g.clone())
    }
}

impl ProvisioningService for VirtualProvisioner {
    async fn provision_robot(
        &self,
        robot_id: RobotId,
        credentials: WifiCredentials,
    ) -> Result<bool, FleetError> {
        tokio::time::sleep(self.delay).await;

        if credentials.ssid.trim().is_empty() {
            tracing::debug!(%robot_id, "rejecting empty SSID");
            return Ok(false);
        }

        tracing::info!(%robot_id, ssid = %credentials.ssid, "virtual robot provisioned");
        self.provisioned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(robot_id);
        Ok(true)
    }
}
