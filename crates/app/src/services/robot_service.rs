//! Robot service: registration, administration and maintenance of robots.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use robofleet_domain::error::{DomainError, FleetError};
use robofleet_domain::id::{OwnerId, RobotId};
use robofleet_domain::maintenance::{ItemType, MaintenanceItem};
use robofleet_domain::robot::{ConnectionStatus, Robot};

use crate::ports::{
    EventPublisher, FirmwareInfo, ProvisioningService, RobotRepository, VendorService,
    WifiCredentials,
};
use crate::robot_locks::RobotLocks;
use crate::services::{cancellable, publish_all, robot_not_found};

/// Default bound on background provisioning.
pub const DEFAULT_PROVISIONING_TIMEOUT: Duration = Duration::from_secs(30);

/// Input of [`RobotService::register_robot`].
#[derive(Debug, Clone)]
pub struct RegisterRobot {
    pub serial_number: String,
    pub model: String,
    pub friendly_name: String,
    pub owner_id: OwnerId,
    pub wifi: Option<WifiCredentials>,
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct Registration {
    pub robot: Robot,
    /// Handle to the background provisioning task, when credentials were given.
    /// Registration never waits on it.
    pub provisioning: Option<JoinHandle<()>>,
}

/// Fields of a robot an owner may edit.
#[derive(Debug, Clone, Default)]
pub struct RobotUpdate {
    pub friendly_name: Option<String>,
    pub firmware_version: Option<String>,
}

/// Application service for robot administration.
pub struct RobotService<R, V, P, E> {
    robots: R,
    vendor: V,
    provisioner: Arc<P>,
    publisher: E,
    locks: Arc<RobotLocks>,
    provisioning_timeout: Duration,
}

impl<R, V, P, E> RobotService<R, V, P, E>
where
    R: RobotRepository + Send + Sync,
    V: VendorService + Send + Sync,
    P: ProvisioningService + Send + Sync + 'static,
    E: EventPublisher + Send + Sync,
{
    /// Create a new service; `locks` must be shared with the fleet orchestrator.
    pub fn new(robots: R, vendor: V, provisioner: Arc<P>, publisher: E, locks: Arc<RobotLocks>) -> Self {
        Self {
            robots,
            vendor,
            provisioner,
            publisher,
            locks,
            provisioning_timeout: DEFAULT_PROVISIONING_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_provisioning_timeout(mut self, timeout: Duration) -> Self {
        self.provisioning_timeout = timeout;
        self
    }

    /// Register a robot and kick off provisioning in the background.
    ///
    /// Cancelling before the robot is stored leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DuplicateSerial`] or [`DomainError::InvalidSerial`]
    /// when the serial is taken or rejected by the vendor, a transport error
    /// when the vendor is unreachable, [`FleetError::Cancelled`], or a storage
    /// error.
    #[tracing::instrument(skip(self, request, cancel), fields(serial_number = %request.serial_number))]
    pub async fn register_robot(
        &self,
        request: RegisterRobot,
        cancel: &CancellationToken,
    ) -> Result<Registration, FleetError> {
        if cancellable(cancel, self.robots.exists_by_serial(&request.serial_number)).await? {
            return Err(DomainError::DuplicateSerial(request.serial_number).into());
        }
        if !cancellable(cancel, self.vendor.validate_serial_number(&request.serial_number)).await? {
            return Err(DomainError::InvalidSerial(request.serial_number).into());
        }

        let mut robot = Robot::register(
            request.serial_number,
            request.model,
            request.friendly_name,
            request.owner_id,
        )?;
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        let events = robot.take_events();
        let robot = self.robots.add(robot).await?;
        publish_all(&self.publisher, events).await;
        tracing::info!(robot_id = %robot.id(), "robot registered");

        let provisioning = request
            .wifi
            .map(|credentials| self.spawn_provisioning(robot.id(), credentials));
        Ok(Registration {
            robot,
            provisioning,
        })
    }

    fn spawn_provisioning(&self, robot_id: RobotId, credentials: WifiCredentials) -> JoinHandle<()> {
        let provisioner = Arc::clone(&self.provisioner);
        let timeout = self.provisioning_timeout;
        tokio::spawn(async move {
            let attempt = provisioner.provision_robot(robot_id, credentials);
            match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(true)) => tracing::info!(%robot_id, "robot provisioned"),
                Ok(Ok(false)) => tracing::warn!(%robot_id, "robot refused provisioning"),
                Ok(Err(err)) => tracing::warn!(%robot_id, %err, "robot provisioning failed"),
                Err(_) => tracing::warn!(%robot_id, ?timeout, "robot provisioning timed out"),
            }
        })
    }

    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] when no robot with `id` exists,
    /// or a storage error from the repository.
    pub async fn get_robot(
        &self,
        id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        cancellable(cancel, self.robots.get_by_id(id))
            .await?
            .ok_or_else(|| robot_not_found(id))
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_owner_robots(
        &self,
        owner_id: OwnerId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Robot>, FleetError> {
        cancellable(cancel, self.robots.get_by_owner(owner_id)).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_online_robots(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Robot>, FleetError> {
        cancellable(cancel, self.robots.get_online()).await
    }

    /// Rename a robot and/or record a new firmware version.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`], [`DomainError::EmptyField`] for a
    /// blank value, or a storage error.
    #[tracing::instrument(skip(self, update, cancel))]
    pub async fn update_robot(
        &self,
        id: RobotId,
        update: RobotUpdate,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| {
            if let Some(name) = update.friendly_name {
                robot.rename(name)?;
            }
            if let Some(version) = update.firmware_version {
                robot.update_firmware(version)?;
            }
            Ok(())
        })
        .await
    }

    /// Deregister a robot; its history, sessions, schedules and maintenance
    /// items go with it.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`], [`FleetError::Cancelled`] or a
    /// storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_robot(
        &self,
        id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<(), FleetError> {
        let _guard = cancellable(cancel, async { Ok(self.locks.acquire(id).await) }).await?;
        if cancellable(cancel, self.robots.get_by_id(id)).await?.is_none() {
            return Err(robot_not_found(id));
        }
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        self.robots.delete(id).await?;
        tracing::info!(robot_id = %id, "robot deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_status(
        &self,
        id: RobotId,
        status: ConnectionStatus,
        reason: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| {
            robot.update_status(status, reason.as_deref());
            Ok(())
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`DomainError::BatteryOutOfRange`], [`FleetError::NotFound`]
    /// or a storage error. Nothing is persisted on a range violation.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_battery_level(
        &self,
        id: RobotId,
        level: i32,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| robot.update_battery_level(level))
            .await
    }

    /// # Errors
    ///
    /// Returns [`DomainError::DustbinOutOfRange`], [`FleetError::NotFound`]
    /// or a storage error. Nothing is persisted on a range violation.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_dustbin_level(
        &self,
        id: RobotId,
        level: i32,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| robot.update_dustbin_level(level))
            .await
    }

    /// Ask the vendor whether a newer firmware exists for this robot.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`], or a transport error from the vendor.
    pub async fn check_firmware(
        &self,
        id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<Option<FirmwareInfo>, FleetError> {
        let robot = self.get_robot(id, cancel).await?;
        cancellable(
            cancel,
            self.vendor
                .get_latest_firmware(robot.model(), robot.firmware_version()),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] or a storage error.
    pub async fn install_maintenance_item(
        &self,
        id: RobotId,
        item_type: ItemType,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| {
            robot.install_maintenance_item(item_type);
            Ok(())
        })
        .await
    }

    /// Record cumulative usage of a part since it was last replaced.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownMaintenanceItem`], [`FleetError::NotFound`]
    /// or a storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn record_maintenance_usage(
        &self,
        id: RobotId,
        item_type: ItemType,
        usage_hours: u32,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| {
            robot
                .record_maintenance_usage(item_type, usage_hours)
                .map(|_| ())
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`DomainError::UnknownMaintenanceItem`], [`FleetError::NotFound`]
    /// or a storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn replace_maintenance_item(
        &self,
        id: RobotId,
        item_type: ItemType,
        cancel: &CancellationToken,
    ) -> Result<Robot, FleetError> {
        self.modify(id, cancel, move |robot| {
            robot.replace_maintenance_item(item_type).map(|_| ())
        })
        .await
    }

    /// Parts of the robot whose health is at or below `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] or a storage error.
    pub async fn items_needing_maintenance(
        &self,
        id: RobotId,
        threshold: u8,
        cancel: &CancellationToken,
    ) -> Result<Vec<MaintenanceItem>, FleetError> {
        let robot = self.get_robot(id, cancel).await?;
        Ok(robot
            .items_needing_maintenance(threshold)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Load, mutate, persist and publish under the robot's lock. A rejected
    /// or cancelled change leaves storage untouched.
    async fn modify<F>(
        &self,
        id: RobotId,
        cancel: &CancellationToken,
        change: F,
    ) -> Result<Robot, FleetError>
    where
        F: FnOnce(&mut Robot) -> Result<(), DomainError> + Send,
    {
        let _guard = cancellable(cancel, async { Ok(self.locks.acquire(id).await) }).await?;
        let mut robot = self.get_robot(id, cancel).await?;
        change(&mut robot)?;
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        let events = robot.take_events();
        let robot = self.robots.update(robot).await?;
        publish_all(&self.publisher, events).await;
        Ok(robot)
    }
}
