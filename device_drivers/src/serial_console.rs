//! Text console layered over a serial device.
//!
//! The console holds one reference on its serial device. It cannot position
//! a cursor; `set_position` always reports failure.

use std::sync::Arc;

use core_types::DeviceType;
use services_device_manager::{
    Capability, ConsoleCapability, DetachOutcome, DeviceError, DeviceHandle, DeviceRegistry,
    SerialCapability,
};
use services_logger::{LogEntry, LogSink};
use services_storage::{attach_layer_with_hooks, detach_layer};

use crate::hooks::DriverHooks;

pub const DESCRIPTION: &str = "Serial Console";

pub struct SerialConsole {
    serial: Arc<dyn SerialCapability>,
}

impl SerialConsole {
    pub fn new(serial: Arc<dyn SerialCapability>) -> Self {
        Self { serial }
    }
}

impl ConsoleCapability for SerialConsole {
    fn write(&self, text: &str) {
        self.serial.write(text.as_bytes());
    }

    fn set_position(&self, _x: u16, _y: u16) -> bool {
        false
    }
}

/// Attaches a console over `serial` and takes a reference on it.
pub fn attach_serial_console(
    registry: &mut DeviceRegistry,
    serial: DeviceHandle,
) -> Result<DeviceHandle, DeviceError> {
    let serial_name = registry
        .name(serial)
        .ok_or(DeviceError::ParentNotFound)?
        .to_string();
    let port = registry
        .serial(serial)
        .ok_or(DeviceError::CapabilityMismatch {
            device_type: DeviceType::Console,
            capability: "serial",
        })?;
    let console = Arc::new(SerialConsole::new(port));
    let builder = registry
        .new_device()
        .device_type(DeviceType::Console)
        .description(DESCRIPTION)
        .capability(Capability::Console(console));
    attach_layer_with_hooks(
        registry,
        serial,
        builder,
        Arc::new(DriverHooks::new(format!("on {serial_name}"))),
    )
}

/// Detaches a console; once it is gone, releases the serial device.
pub fn detach_serial_console(
    registry: &mut DeviceRegistry,
    console: DeviceHandle,
) -> Result<DetachOutcome, DeviceError> {
    detach_layer(registry, console)
}

/// Log sink that mirrors every accepted entry onto a console.
pub struct ConsoleLogSink {
    console: Arc<dyn ConsoleCapability>,
}

impl ConsoleLogSink {
    pub fn new(console: Arc<dyn ConsoleCapability>) -> Self {
        Self { console }
    }
}

impl LogSink for ConsoleLogSink {
    fn write_entry(&self, entry: &LogEntry) {
        self.console.write(&format!("{entry}\n"));
    }
}
