//! Robot aggregate: connection state, battery and dustbin levels, the status
//! ledger and the set of installed maintenance items.
//!
//! All mutation goes through methods on [`Robot`]; the ledger is append-only
//! and exposed read-only. Every mutation that matters to the outside world
//! buffers an [`Event`] which the caller drains with [`Robot::take_events`]
//! once the new state has been persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{Event, EventKind};
use crate::id::{OwnerId, RobotId, StatusChangeId};
use crate::maintenance::{ItemType, MaintenanceItem, UnknownVariant};
use crate::time::{Timestamp, now};

/// Battery level below which a write raises [`EventKind::BatteryLow`].
pub const BATTERY_LOW_THRESHOLD: u8 = 20;
/// Minimum battery level required to start a cleaning run.
pub const MIN_BATTERY_TO_CLEAN: u8 = 15;
/// Firmware version assumed for a freshly registered robot.
pub const INITIAL_FIRMWARE: &str = "1.0.0";

/// Connectivity and activity state reported for a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Offline,
    Online,
    Busy,
    ReturningToBase,
    Charging,
    Error,
    Updating,
}

impl ConnectionStatus {
    pub const ALL: [Self; 7] = [
        Self::Offline,
        Self::Online,
        Self::Busy,
        Self::ReturningToBase,
        Self::Charging,
        Self::Error,
        Self::Updating,
    ];
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Busy => "busy",
            Self::ReturningToBase => "returning_to_base",
            Self::Charging => "charging",
            Self::Error => "error",
            Self::Updating => "updating",
        })
    }
}

impl FromStr for ConnectionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// One entry of the append-only status ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: StatusChangeId,
    pub previous: ConnectionStatus,
    pub current: ConnectionStatus,
    pub reason: Option<String>,
    pub changed_at: Timestamp,
}

/// A cleaning robot owned by a user.
#[derive(Debug, Clone)]
pub struct Robot {
    id: RobotId,
    serial_number: String,
    model: String,
    friendly_name: String,
    owner_id: OwnerId,
    status: ConnectionStatus,
    battery_level: u8,
    dustbin_level: u8,
    firmware_version: String,
    registered_at: Timestamp,
    last_seen_at: Option<Timestamp>,
    history: Vec<StatusChange>,
    maintenance: Vec<MaintenanceItem>,
    pending_events: Vec<Event>,
}

impl Robot {
    /// Register a brand new robot: offline, fully charged, empty dustbin,
    /// initial firmware, and fresh brushes and filter.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EmptyField`] if any textual field is blank.
    pub fn register(
        serial_number: impl Into<String>,
        model: impl Into<String>,
        friendly_name: impl Into<String>,
        owner_id: OwnerId,
    ) -> Result<Self, DomainError> {
        let registered_at = now();
        Self::builder()
            .serial_number(serial_number)
            .model(model)
            .friendly_name(friendly_name)
            .owner_id(owner_id)
            .registered_at(registered_at)
            .maintenance_item(MaintenanceItem::fresh(ItemType::MainBrush, registered_at))
            .maintenance_item(MaintenanceItem::fresh(ItemType::SideBrush, registered_at))
            .maintenance_item(MaintenanceItem::fresh(ItemType::Filter, registered_at))
            .build()
    }

    /// Create a builder, mainly used to rehydrate a robot from storage.
    #[must_use]
    pub fn builder() -> RobotBuilder {
        RobotBuilder::default()
    }

    #[must_use]
    pub fn id(&self) -> RobotId {
        self.id
    }

    #[must_use]
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    #[must_use]
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    #[must_use]
    pub fn dustbin_level(&self) -> u8 {
        self.dustbin_level
    }

    #[must_use]
    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    #[must_use]
    pub fn registered_at(&self) -> Timestamp {
        self.registered_at
    }

    #[must_use]
    pub fn last_seen_at(&self) -> Option<Timestamp> {
        self.last_seen_at
    }

    /// Status ledger, oldest first.
    #[must_use]
    pub fn status_history(&self) -> &[StatusChange] {
        &self.history
    }

    #[must_use]
    pub fn maintenance_items(&self) -> &[MaintenanceItem] {
        &self.maintenance
    }

    /// Events raised since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending_events)
    }

    /// Record a connection-status transition.
    ///
    /// Appends exactly one ledger entry, refreshes the last-seen time and
    /// raises [`EventKind::StatusChanged`]. Any status may follow any other.
    pub fn update_status(&mut self, status: ConnectionStatus, reason: Option<&str>) {
        let changed_at = now();
        let previous = self.status;
        self.status = status;
        self.last_seen_at = Some(changed_at);
        self.history.push(StatusChange {
            id: StatusChangeId::new(),
            previous,
            current: status,
            reason: reason.map(str::to_string),
            changed_at,
        });
        self.raise(EventKind::StatusChanged {
            from: previous,
            to: status,
            reason: reason.map(str::to_string),
        });
    }

    /// # Errors
    ///
    /// Returns [`DomainError::BatteryOutOfRange`] and leaves the level
    /// untouched when `level` is outside `0..=100`.
    pub fn update_battery_level(&mut self, level: i32) -> Result<(), DomainError> {
        let checked = percentage(level).ok_or(DomainError::BatteryOutOfRange { level })?;
        self.battery_level = checked;
        if checked < BATTERY_LOW_THRESHOLD {
            self.raise(EventKind::BatteryLow { level: checked });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::DustbinOutOfRange`] and leaves the level
    /// untouched when `level` is outside `0..=100`.
    pub fn update_dustbin_level(&mut self, level: i32) -> Result<(), DomainError> {
        self.dustbin_level = percentage(level).ok_or(DomainError::DustbinOutOfRange { level })?;
        Ok(())
    }

    /// Online with at least [`MIN_BATTERY_TO_CLEAN`] percent of battery.
    #[must_use]
    pub fn can_start_cleaning(&self) -> bool {
        self.status == ConnectionStatus::Online && self.battery_level >= MIN_BATTERY_TO_CLEAN
    }

    /// Mark the robot busy with a cleaning run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::RobotNotReady`] when [`Self::can_start_cleaning`]
    /// is false; the robot is left unchanged.
    pub fn start_cleaning(&mut self) -> Result<(), DomainError> {
        if !self.can_start_cleaning() {
            return Err(DomainError::RobotNotReady {
                status: self.status.to_string(),
                battery: self.battery_level,
            });
        }
        self.update_status(ConnectionStatus::Busy, Some("Started cleaning"));
        Ok(())
    }

    /// Send the robot back to its dock, whatever it was doing.
    pub fn return_to_base(&mut self) {
        self.update_status(ConnectionStatus::ReturningToBase, None);
        self.raise(EventKind::ReturningToBase);
    }

    /// # Errors
    ///
    /// Returns [`DomainError::EmptyField`] when `name` is blank.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), DomainError> {
        self.friendly_name = non_empty("friendly_name", name.into())?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::EmptyField`] when `version` is blank.
    pub fn update_firmware(&mut self, version: impl Into<String>) -> Result<(), DomainError> {
        self.firmware_version = non_empty("firmware_version", version.into())?;
        Ok(())
    }

    /// Install a fresh part of the given type unless one is already tracked.
    pub fn install_maintenance_item(&mut self, item_type: ItemType) {
        if self.maintenance_item(item_type).is_none() {
            self.maintenance.push(MaintenanceItem::fresh(item_type, now()));
        }
    }

    #[must_use]
    pub fn maintenance_item(&self, item_type: ItemType) -> Option<&MaintenanceItem> {
        self.maintenance.iter().find(|i| i.item_type() == item_type)
    }

    /// # Errors
    ///
    /// Returns [`DomainError::UnknownMaintenanceItem`] when no such part is installed.
    pub fn record_maintenance_usage(
        &mut self,
        item_type: ItemType,
        usage_hours: u32,
    ) -> Result<&MaintenanceItem, DomainError> {
        let item = self.maintenance_item_mut(item_type)?;
        item.record_usage(usage_hours);
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`DomainError::UnknownMaintenanceItem`] when no such part is installed.
    pub fn replace_maintenance_item(
        &mut self,
        item_type: ItemType,
    ) -> Result<&MaintenanceItem, DomainError> {
        let item = self.maintenance_item_mut(item_type)?;
        item.replace(now());
        Ok(item)
    }

    /// Parts whose health is at or below `threshold`.
    #[must_use]
    pub fn items_needing_maintenance(&self, threshold: u8) -> Vec<&MaintenanceItem> {
        self.maintenance
            .iter()
            .filter(|item| item.needs_maintenance(threshold))
            .collect()
    }

    fn maintenance_item_mut(
        &mut self,
        item_type: ItemType,
    ) -> Result<&mut MaintenanceItem, DomainError> {
        self.maintenance
            .iter_mut()
            .find(|i| i.item_type() == item_type)
            .ok_or_else(|| DomainError::UnknownMaintenanceItem(item_type.to_string()))
    }

    fn raise(&mut self, kind: EventKind) {
        self.pending_events.push(Event::new(self.id, kind));
    }
}

fn percentage(value: i32) -> Option<u8> {
    u8::try_from(value).ok().filter(|v| *v <= 100)
}

fn non_empty(field: &'static str, value: String) -> Result<String, DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::EmptyField(field));
    }
    Ok(value)
}

/// Step-by-step builder for [`Robot`].
#[derive(Debug, Default)]
pub struct RobotBuilder {
    id: Option<RobotId>,
    serial_number: Option<String>,
    model: Option<String>,
    friendly_name: Option<String>,
    owner_id: Option<OwnerId>,
    status: ConnectionStatus,
    battery_level: Option<i32>,
    dustbin_level: Option<i32>,
    firmware_version: Option<String>,
    registered_at: Option<Timestamp>,
    last_seen_at: Option<Timestamp>,
    history: Vec<StatusChange>,
    maintenance: Vec<MaintenanceItem>,
}

impl RobotBuilder {
    #[must_use]
    pub fn id(mut self, id: RobotId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = Some(friendly_name.into());
        self
    }

    #[must_use]
    pub fn owner_id(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    #[must_use]
    pub fn status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn battery_level(mut self, level: i32) -> Self {
        self.battery_level = Some(level);
        self
    }

    #[must_use]
    pub fn dustbin_level(mut self, level: i32) -> Self {
        self.dustbin_level = Some(level);
        self
    }

    #[must_use]
    pub fn firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn registered_at(mut self, ts: Timestamp) -> Self {
        self.registered_at = Some(ts);
        self
    }

    #[must_use]
    pub fn last_seen_at(mut self, ts: Option<Timestamp>) -> Self {
        self.last_seen_at = ts;
        self
    }

    #[must_use]
    pub fn status_change(mut self, change: StatusChange) -> Self {
        self.history.push(change);
        self
    }

    #[must_use]
    pub fn maintenance_item(mut self, item: MaintenanceItem) -> Self {
        self.maintenance.push(item);
        self
    }

    /// Consume the builder, validate, and return a [`Robot`].
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if a textual field is blank or a level is
    /// outside `0..=100`.
    pub fn build(self) -> Result<Robot, DomainError> {
        let battery = self.battery_level.unwrap_or(100);
        let dustbin = self.dustbin_level.unwrap_or(0);
        Ok(Robot {
            id: self.id.unwrap_or_default(),
            serial_number: non_empty("serial_number", self.serial_number.unwrap_or_default())?,
            model: non_empty("model", self.model.unwrap_or_default())?,
            friendly_name: non_empty("friendly_name", self.friendly_name.unwrap_or_default())?,
            owner_id: self.owner_id.unwrap_or_default(),
            status: self.status,
            battery_level: percentage(battery)
                .ok_or(DomainError::BatteryOutOfRange { level: battery })?,
            dustbin_level: percentage(dustbin)
                .ok_or(DomainError::DustbinOutOfRange { level: dustbin })?,
            firmware_version: self
                .firmware_version
                .unwrap_or_else(|| INITIAL_FIRMWARE.to_string()),
            registered_at: self.registered_at.unwrap_or_else(now),
            last_seen_at: self.last_seen_at,
            history: self.history,
            maintenance: self.maintenance,
            pending_events: Vec::new(),
        })
    }
}
