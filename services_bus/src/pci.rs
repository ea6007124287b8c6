//! PCI enumeration
//!
//! ## Configuration-space offsets read
//!
//! | Offset | Bits  | Field                    |
//! |--------|-------|--------------------------|
//! | 0x00   | 15:0  | Vendor ID                |
//! | 0x00   | 31:16 | Device ID                |
//! | 0x08   | 31:24 | Class                    |
//! | 0x08   | 23:16 | Subclass                 |
//! | 0x0C   | 23:16 | Header type (bit 7: MF)  |
//! | 0x10.. | 31:0  | BAR0 - BAR5              |
//! | 0x3C   | 7:0   | Interrupt line           |

use core_types::PciLocation;
use hal::pci::{PciConfigSpace, VENDOR_ABSENT};

use crate::config::PciScanConfig;
use crate::error::BusError;

pub const DEVICES_PER_BUS: u8 = 32;
pub const FUNCTIONS_PER_DEVICE: u8 = 8;

pub const CLASS_MASS_STORAGE: u8 = 0x01;
pub const CLASS_NETWORK: u8 = 0x02;
pub const CLASS_BRIDGE: u8 = 0x06;
pub const BRIDGE_SUBCLASS_HOST: u8 = 0x00;
pub const BRIDGE_SUBCLASS_ISA: u8 = 0x01;

const HEADER_MULTIFUNCTION: u8 = 0x80;

const OFFSET_ID: u8 = 0x00;
const OFFSET_CLASS: u8 = 0x08;
const OFFSET_HEADER: u8 = 0x0C;
const OFFSET_BAR0: u8 = 0x10;
const OFFSET_INTERRUPT: u8 = 0x3C;

/// What a scan found at one bus/device/function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDescriptor {
    pub location: PciLocation,
    pub vendor: u16,
    pub device_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub revision: u8,
    pub header_type: u8,
    pub irq_line: u8,
    pub bars: [u32; 6],
}

impl PciDescriptor {
    /// Function 0 of a device whose other functions must be scanned too.
    pub fn is_multifunction(&self) -> bool {
        self.header_type & HEADER_MULTIFUNCTION != 0
    }

    /// Memory address decoded from BAR `index`, if it is a memory BAR.
    pub fn bar_address(&self, index: usize) -> Option<u64> {
        let value = *self.bars.get(index)?;
        if value & 1 != 0 {
            return None;
        }
        match (value >> 1) & 0x3 {
            0 => Some((value & 0xFFFF_FFF0) as u64),
            2 => {
                let high = *self.bars.get(index + 1)? as u64;
                Some((high << 32) | (value & 0xFFFF_FFF0) as u64)
            }
            _ => None,
        }
    }
}

/// Which slots a scan reports.
///
/// Unset fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PciFilter {
    pub class: Option<u8>,
    pub subclass: Option<u8>,
    pub vendor: Option<u16>,
    pub device_id: Option<u16>,
}

impl PciFilter {
    /// Matches every present function.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn class(class: u8, subclass: u8) -> Self {
        Self {
            class: Some(class),
            subclass: Some(subclass),
            ..Self::default()
        }
    }

    pub fn with_vendor(mut self, vendor: u16) -> Self {
        self.vendor = Some(vendor);
        self
    }

    pub fn with_device_id(mut self, device_id: u16) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn matches(&self, descriptor: &PciDescriptor) -> bool {
        self.class.map_or(true, |class| class == descriptor.class)
            && self.subclass.map_or(true, |sub| sub == descriptor.subclass)
            && self.vendor.map_or(true, |vendor| vendor == descriptor.vendor)
            && self.device_id.map_or(true, |id| id == descriptor.device_id)
    }
}

/// Reads the descriptor at `location`, or `None` for an empty slot.
///
/// An empty slot costs exactly one configuration read.
pub fn read_descriptor<C: PciConfigSpace + ?Sized>(
    config: &mut C,
    location: PciLocation,
) -> Result<Option<PciDescriptor>, BusError> {
    if location.device >= DEVICES_PER_BUS || location.function >= FUNCTIONS_PER_DEVICE {
        return Err(BusError::InvalidLocation(location));
    }
    let PciLocation {
        bus,
        device,
        function,
    } = location;

    let id = config.read_dword(bus, device, function, OFFSET_ID);
    let vendor = (id & 0xFFFF) as u16;
    if vendor == VENDOR_ABSENT {
        return Ok(None);
    }

    let class = config.read_dword(bus, device, function, OFFSET_CLASS);
    let header = config.read_dword(bus, device, function, OFFSET_HEADER);
    let interrupt = config.read_dword(bus, device, function, OFFSET_INTERRUPT);
    let mut bars = [0u32; 6];
    for (n, bar) in bars.iter_mut().enumerate() {
        *bar = config.read_dword(bus, device, function, OFFSET_BAR0 + n as u8 * 4);
    }

    Ok(Some(PciDescriptor {
        location,
        vendor,
        device_id: (id >> 16) as u16,
        class: (class >> 24) as u8,
        subclass: (class >> 16) as u8,
        prog_if: (class >> 8) as u8,
        revision: class as u8,
        header_type: (header >> 16) as u8,
        irq_line: (interrupt & 0xFF) as u8,
        bars,
    }))
}

/// Walks every bus, device and function and calls `callback` once for each
/// present function that matches `filter`, in ascending location order.
///
/// Functions 1-7 are visited only when function 0 is present and flags
/// itself multi-function. Returns the number of matches.
pub fn scan<C, F>(
    config: &mut C,
    scan_config: &PciScanConfig,
    filter: &PciFilter,
    mut callback: F,
) -> usize
where
    C: PciConfigSpace + ?Sized,
    F: FnMut(&PciDescriptor),
{
    let mut present = 0;
    let mut matched = 0;
    let mut visit = |descriptor: &PciDescriptor| {
        present += 1;
        services_logger::debug(
            "pci",
            format!(
                "{} {:04x}:{:04x} class {:02x}.{:02x} irq {}",
                descriptor.location,
                descriptor.vendor,
                descriptor.device_id,
                descriptor.class,
                descriptor.subclass,
                descriptor.irq_line
            ),
        );
        if filter.matches(descriptor) {
            matched += 1;
            callback(descriptor);
        }
    };

    for bus in 0..=scan_config.max_bus {
        for device in 0..DEVICES_PER_BUS {
            let first = PciLocation::new(bus, device, 0);
            let Ok(Some(descriptor)) = read_descriptor(config, first) else {
                continue;
            };
            visit(&descriptor);
            if !descriptor.is_multifunction() {
                continue;
            }
            for function in 1..FUNCTIONS_PER_DEVICE {
                let location = PciLocation::new(bus, device, function);
                if let Ok(Some(descriptor)) = read_descriptor(config, location) {
                    visit(&descriptor);
                }
            }
        }
    }

    services_logger::info(
        "pci",
        format!("Scan found {} functions, {} matched", present, matched),
    );
    matched
}
