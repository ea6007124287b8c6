//! Fixed-list ISA enumeration
//!
//! Legacy ISA devices cannot be probed, so the bus is a table of what every
//! PC is assumed to have.

use core_types::DeviceType;

use crate::error::BusError;

/// One legacy device at its conventional ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsaDevice {
    pub label: &'static str,
    pub device_type: DeviceType,
    pub io_base: u16,
    pub irq: Option<u8>,
}

impl IsaDevice {
    pub const fn new(
        label: &'static str,
        device_type: DeviceType,
        io_base: u16,
        irq: Option<u8>,
    ) -> Self {
        Self {
            label,
            device_type,
            io_base,
            irq,
        }
    }
}

/// The standard PC legacy devices.
pub const STANDARD_DEVICES: [IsaDevice; 9] = [
    IsaDevice::new("COM1", DeviceType::Serial, 0x3F8, Some(4)),
    IsaDevice::new("COM2", DeviceType::Serial, 0x2F8, Some(3)),
    IsaDevice::new("COM3", DeviceType::Serial, 0x3E8, Some(4)),
    IsaDevice::new("COM4", DeviceType::Serial, 0x2E8, Some(3)),
    IsaDevice::new("RTC", DeviceType::Rtc, 0x70, Some(8)),
    IsaDevice::new("PIT", DeviceType::Pit, 0x40, Some(0)),
    IsaDevice::new("PC speaker", DeviceType::Speaker, 0x61, None),
    IsaDevice::new("PS/2 keyboard", DeviceType::Keyboard, 0x60, Some(1)),
    IsaDevice::new("PS/2 mouse", DeviceType::Mouse, 0x60, Some(12)),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsaBus {
    devices: Vec<IsaDevice>,
}

impl IsaBus {
    pub fn new(devices: Vec<IsaDevice>) -> Self {
        Self { devices }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_DEVICES.to_vec())
    }

    pub fn devices(&self) -> &[IsaDevice] {
        &self.devices
    }

    pub fn find(&self, label: &str) -> Result<&IsaDevice, BusError> {
        self.devices
            .iter()
            .find(|device| device.label == label)
            .ok_or_else(|| BusError::UnknownIsaDevice(label.to_string()))
    }

    /// Calls `callback` for every listed device of `device_type`, in table
    /// order, and returns how many there were.
    pub fn scan<F: FnMut(&IsaDevice)>(&self, device_type: DeviceType, mut callback: F) -> usize {
        let mut matched = 0;
        for device in self.devices.iter().filter(|d| d.device_type == device_type) {
            matched += 1;
            callback(device);
        }
        matched
    }
}

impl Default for IsaBus {
    fn default() -> Self {
        Self::standard()
    }
}
