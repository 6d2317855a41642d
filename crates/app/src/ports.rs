//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.
//!
//! Every port is also implemented for `Arc<T>` so one adapter instance can be
//! shared by several services.

pub mod event_bus;
pub mod gateway;
pub mod provisioning;
pub mod storage;
pub mod vendor;

pub use event_bus::EventPublisher;
pub use gateway::CommandGateway;
pub use provisioning::{ProvisioningService, WifiCredentials};
pub use storage::{RobotRepository, ScheduleRepository, SessionRepository};
pub use vendor::{FirmwareInfo, VendorService};
