//! Typed identifier newtypes backed by UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a [`Robot`](crate::robot::Robot).
    RobotId
);

define_id!(
    /// Unique identifier for the account owning one or more robots.
    OwnerId
);

define_id!(
    /// Unique identifier for a [`CleaningSession`](crate::session::CleaningSession).
    SessionId
);

define_id!(
    /// Unique identifier for a [`CleaningSchedule`](crate::schedule::CleaningSchedule).
    ScheduleId
);

define_id!(
    /// Unique identifier for a cleaning zone on a robot's map.
    ZoneId
);

define_id!(
    /// Unique identifier for an [`Event`](crate::event::Event).
    EventId
);

define_id!(
    /// Unique identifier for a [`StatusChange`](crate::robot::StatusChange) ledger entry.
    StatusChangeId
);

define_id!(
    /// Unique identifier for a [`MaintenanceItem`](crate::maintenance::MaintenanceItem).
    MaintenanceItemId
);

define_id!(
    /// Unique identifier for a [`CleaningError`](crate::session::CleaningError).
    CleaningErrorId
);
