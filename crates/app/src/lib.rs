//! # robofleet-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `RobotRepository`, `SessionRepository`, `ScheduleRepository`: persistence
//!   - `CommandGateway`: at-least-once delivery of robot commands
//!   - `VendorService`: serial validation and firmware lookups
//!   - `ProvisioningService`: pushing Wi-Fi credentials to a new robot
//!   - `EventPublisher`: outbound domain events
//! - Define **driving/inbound ports** as use-case structs:
//!   - `RobotService`: registration, administration, telemetry, maintenance
//!   - `ScheduleService`: schedule CRUD and toggling
//!   - `FleetOrchestrator`: start/stop/pause/resume cleaning, device reports
//!   - `ScheduleRunner`: turns due schedules into cleaning sessions
//! - Provide **in-process infrastructure** (event bus, per-robot locks) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `robofleet-domain` only (plus `tokio` for sync and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod device_report;
pub mod event_bus;
pub mod ports;
pub mod robot_locks;
pub mod schedule_runner;
pub mod services;

#[cfg(test)]
mod testing;
