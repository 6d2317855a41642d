//! Vendor port: the manufacturer's catalogue of serial numbers and firmware.

use std::future::Future;
use std::sync::Arc;

use robofleet_domain::error::FleetError;

/// A firmware release newer than the one installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub version: String,
    pub release_notes: Option<String>,
    pub download_url: Option<String>,
}

/// Queries the robot manufacturer.
pub trait VendorService {
    /// Whether `serial_number` belongs to a genuine device.
    fn validate_serial_number(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send;

    /// The latest firmware for `model`, if newer than `current_version`.
    fn get_latest_firmware(
        &self,
        model: &str,
        current_version: &str,
    ) -> impl Future<Output = Result<Option<FirmwareInfo>, FleetError>> + Send;
}

impl<T: VendorService + Send + Sync> VendorService for Arc<T> {
    fn validate_serial_number(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        (**self).validate_serial_number(serial_number)
    }

    fn get_latest_firmware(
        &self,
        model: &str,
        current_version: &str,
    ) -> impl Future<Output = Result<Option<FirmwareInfo>, FleetError>> + Send {
        (**self).get_latest_firmware(model, current_version)
    }
}
