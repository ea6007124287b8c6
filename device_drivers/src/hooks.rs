//! Init/uninit announcements for leaf drivers.

use services_device_manager::{DeviceError, DeviceInfo, DeviceLifecycle};
use services_logger::{LogEntry, LogLevel};

const LOG_TARGET: &str = "drivers";

/// Hooks that log a device coming up and going down.
///
/// `placement` is where the device sits, e.g. "at IRQ 4" or "on serial0".
#[derive(Debug, Clone)]
pub struct DriverHooks {
    placement: String,
}

impl DriverHooks {
    pub fn new(placement: impl Into<String>) -> Self {
        Self {
            placement: placement.into(),
        }
    }

    pub fn at_irq(irq: u8) -> Self {
        Self::new(format!("at IRQ {irq}"))
    }

    pub fn at_port(port: u16) -> Self {
        Self::new(format!("at port {port:#x}"))
    }

    pub(crate) fn announce(&self, verb: &str, device: &DeviceInfo) {
        announce(verb, &self.placement, device);
    }
}

pub(crate) fn announce(verb: &str, placement: &str, device: &DeviceInfo) {
    let entry = LogEntry::new(
        LogLevel::Info,
        LOG_TARGET,
        format!(
            "{} {} {} ({})",
            verb, device.description, placement, device.name
        ),
    )
    .with_source(device.id)
    .with_field("type", device.device_type);
    services_logger::global().log(entry);
}

impl DeviceLifecycle for DriverHooks {
    fn init(&self, device: &DeviceInfo) -> Result<(), DeviceError> {
        self.announce("Init", device);
        Ok(())
    }

    fn uninit(&self, device: &DeviceInfo) {
        self.announce("Uninit", device);
    }
}
