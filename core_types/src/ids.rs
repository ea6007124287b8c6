//! Unique identifiers for system entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bare-metal builds have no entropy source this early, so ids come from a
/// counter stamped with the v4 version and variant bits.
#[cfg(target_os = "none")]
fn fresh_uuid() -> Uuid {
    use core::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(1);
    let serial = NEXT.fetch_add(1, Ordering::Relaxed);
    let bytes = (u128::from(serial) << 64 | u128::from(serial)).to_be_bytes();
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

#[cfg(not(target_os = "none"))]
fn fresh_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Unique identifier for a registered device
///
/// Assigned by the registry when a device is registered or attached. Never
/// reused for another device during the lifetime of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Creates a new random device ID
    pub fn new() -> Self {
        Self(fresh_uuid())
    }

    /// Creates a device ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_creation() {
        let id1 = DeviceId::new();
        let id2 = DeviceId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_device_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = DeviceId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new();
        let display = format!("{}", id);
        assert!(display.starts_with("Device("));
    }
}
