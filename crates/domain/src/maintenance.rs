//! Maintenance items: consumable parts whose wear is tracked per robot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::MaintenanceItemId;
use crate::time::Timestamp;

/// Health at or below which an item is reported as needing attention.
pub const DEFAULT_MAINTENANCE_THRESHOLD: u8 = 20;

/// Kind of consumable part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    MainBrush,
    SideBrush,
    Filter,
    Battery,
    Mop,
    Other,
}

impl ItemType {
    /// Expected lifetime of a fresh part, in cleaning hours.
    #[must_use]
    pub fn lifetime_hours(self) -> u32 {
        match self {
            Self::MainBrush => 300,
            Self::SideBrush => 200,
            Self::Filter => 150,
            Self::Battery => 500,
            Self::Mop | Self::Other => 100,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MainBrush => "main_brush",
            Self::SideBrush => "side_brush",
            Self::Filter => "filter",
            Self::Battery => "battery",
            Self::Mop => "mop",
            Self::Other => "other",
        })
    }
}

impl FromStr for ItemType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main_brush" => Ok(Self::MainBrush),
            "side_brush" => Ok(Self::SideBrush),
            "filter" => Ok(Self::Filter),
            "battery" => Ok(Self::Battery),
            "mop" => Ok(Self::Mop),
            "other" => Ok(Self::Other),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when parsing a textual enum value fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

/// A wearable part installed on a robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceItem {
    id: MaintenanceItemId,
    item_type: ItemType,
    health: u8,
    last_replaced_at: Timestamp,
    estimated_days_left: u32,
}

impl MaintenanceItem {
    /// A brand new part at full health.
    #[must_use]
    pub fn fresh(item_type: ItemType, now: Timestamp) -> Self {
        Self {
            id: MaintenanceItemId::new(),
            item_type,
            health: 100,
            last_replaced_at: now,
            estimated_days_left: estimate_days_left(item_type, 100),
        }
    }

    /// Rebuild an item loaded from storage.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::HealthOutOfRange`] when `health` exceeds 100.
    pub fn restore(
        id: MaintenanceItemId,
        item_type: ItemType,
        health: i32,
        last_replaced_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let health = u8::try_from(health)
            .ok()
            .filter(|h| *h <= 100)
            .ok_or(DomainError::HealthOutOfRange { health })?;
        Ok(Self {
            id,
            item_type,
            health,
            last_replaced_at,
            estimated_days_left: estimate_days_left(item_type, health),
        })
    }

    #[must_use]
    pub fn id(&self) -> MaintenanceItemId {
        self.id
    }

    #[must_use]
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    #[must_use]
    pub fn health(&self) -> u8 {
        self.health
    }

    #[must_use]
    pub fn last_replaced_at(&self) -> Timestamp {
        self.last_replaced_at
    }

    #[must_use]
    pub fn estimated_days_left(&self) -> u32 {
        self.estimated_days_left
    }

    #[must_use]
    pub fn needs_maintenance(&self, threshold: u8) -> bool {
        self.health <= threshold
    }

    /// Recompute health from the cumulative usage since the last replacement.
    pub(crate) fn record_usage(&mut self, usage_hours: u32) {
        let lifetime = self.item_type.lifetime_hours();
        let worn = u64::from(usage_hours) * 100 / u64::from(lifetime);
        self.health = u8::try_from(100_u64.saturating_sub(worn)).unwrap_or(0);
        self.estimated_days_left = estimate_days_left(self.item_type, self.health);
    }

    pub(crate) fn replace(&mut self, now: Timestamp) {
        self.health = 100;
        self.last_replaced_at = now;
        self.estimated_days_left = estimate_days_left(self.item_type, 100);
    }
}

/// Days of use left assuming roughly one cleaning hour per day.
#[must_use]
pub fn estimate_days_left(item_type: ItemType, health: u8) -> u32 {
    u32::from(health) * item_type.lifetime_hours() / (100 * 24)
}
