//! Simulated manufacturer catalogue.

use std::collections::HashMap;

use robofleet_app::ports::{FirmwareInfo, VendorService};
use robofleet_domain::error::FleetError;

/// Serials are `{prefix}{digits}`, e.g. `RC-1042`.
pub struct VirtualVendor {
    serial_prefix: String,
    latest: HashMap<String, FirmwareInfo>,
}

impl Default for VirtualVendor {
    fn default() -> Self {
        Self::new("RC-")
    }
}

impl VirtualVendor {
    #[must_use]
    pub fn new(serial_prefix: impl Into<String>) -> Self {
        Self {
            serial_prefix: serial_prefix.into(),
            latest: HashMap::new(),
        }
    }

    /// Publish `version` as the latest firmware for `model`.
    #[must_use]
    pub fn with_firmware(mut self, model: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        self.latest.insert(
            model.into(),
            FirmwareInfo {
                release_notes: Some(format!("Virtual release {version}")),
                download_url: None,
                version,
            },
        );
        self
    }

    fn is_genuine(&self, serial_number: &str) -> bool {
        serial_number
            .strip_prefix(self.serial_prefix.as_str())
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Compare dotted versions numerically; non-numeric parts count as zero.
fn is_newer(candidate: &str, current: &str) -> bool {
    let parts = |v: &str| -> Vec<u64> { v.split('.').map(|p| p.parse().unwrap_or(0)).collect() };
    let (mut candidate, mut current) = (parts(candidate), parts(current));
    let len = candidate.len().max(current.len());
    candidate.resize(len, 0);
    current.resize(len, 0);
    candidate > current
}

impl VendorService for VirtualVendor {
    async fn validate_serial_number(&self, serial_number: &str) -> Result<bool, FleetError> {
        let genuine = self.is_genuine(serial_number);
        tracing::debug!(serial_number, genuine, "serial number checked");
        Ok(genuine)
    }

    async fn get_latest_firmware(
        &self,
        model: &str,
        current_version: &str,
    ) -> Result<Option<FirmwareInfo>, FleetError> {
        Ok(self
            .latest
            .get(model)
            .filter(|info| is_newer(&info.version, current_version))
            .cloned())
    }
}
