//! # robofleet-adapter-virtual
//!
//! Simulated implementations of the outbound ports that talk to the outside
//! world, for demos, tests, and running without a broker.
//!
//! | Adapter | Port | Behaviour |
//! |---------|------|-----------|
//! | [`VirtualVendor`] | `VendorService` | Accepts serials matching a prefix, serves firmware from an in-memory catalogue |
//! | [`VirtualProvisioner`] | `ProvisioningService` | Accepts any non-empty SSID after a short delay |
//! | [`LoggingGateway`] | `CommandGateway` | Logs and records every command, always succeeds |
//!
//! ## Dependency rule
//!
//! Depends on `robofleet-app` (port traits) and `robofleet-domain` only.

mod gateway;
mod provisioning;
mod vendor;

pub use gateway::LoggingGateway;
pub use provisioning::VirtualProvisioner;
pub use vendor::VirtualVendor;
