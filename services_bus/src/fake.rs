//! In-memory PCI configuration space
//!
//! Slots that were never inserted read back as all ones, like an empty slot
//! on real hardware. Every read is counted per location so tests can check
//! what a scan touched.

use std::collections::BTreeMap;

use core_types::PciLocation;
use hal::pci::PciConfigSpace;

/// Register contents of one simulated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakePciFunction {
    pub vendor: u16,
    pub device_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub header_type: u8,
    pub irq_line: u8,
    pub bars: [u32; 6],
}

impl FakePciFunction {
    pub fn new(vendor: u16, device_id: u16, class: u8, subclass: u8) -> Self {
        Self {
            vendor,
            device_id,
            class,
            subclass,
            header_type: 0,
            irq_line: 0,
            bars: [0; 6],
        }
    }

    /// Sets the multi-function bit of the header type.
    pub fn multifunction(mut self) -> Self {
        self.header_type |= 0x80;
        self
    }

    pub fn irq(mut self, line: u8) -> Self {
        self.irq_line = line;
        self
    }

    pub fn bar(mut self, index: usize, value: u32) -> Self {
        self.bars[index] = value;
        self
    }

    fn read(&self, offset: u8) -> u32 {
        match offset & 0xFC {
            0x00 => (self.device_id as u32) << 16 | self.vendor as u32,
            0x08 => (self.class as u32) << 24 | (self.subclass as u32) << 16,
            0x0C => (self.header_type as u32) << 16,
            bar @ 0x10..=0x24 => self.bars[((bar - 0x10) / 4) as usize],
            0x3C => 0x0100 | self.irq_line as u32,
            _ => 0,
        }
    }
}

/// Simulated configuration space.
#[derive(Debug, Clone, Default)]
pub struct FakePciBus {
    functions: BTreeMap<PciLocation, FakePciFunction>,
    reads: BTreeMap<PciLocation, usize>,
}

impl FakePciBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: PciLocation, function: FakePciFunction) {
        self.functions.insert(location, function);
    }

    /// Configuration reads issued against `location` so far.
    pub fn reads_at(&self, location: PciLocation) -> usize {
        self.reads.get(&location).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.reads.values().sum()
    }
}

impl PciConfigSpace for FakePciBus {
    fn read_dword(&mut self, bus: u8, device: u8, function: u8, offset: u8) -> u32 {
        let location = PciLocation::new(bus, device, function);
        *self.reads.entry(location).or_insert(0) += 1;
        self.functions
            .get(&location)
            .map_or(u32::MAX, |f| f.read(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_reads_all_ones() {
        let mut bus = FakePciBus::new();
        assert_eq!(bus.read_dword(0, 0, 0, 0), u32::MAX);
        assert_eq!(bus.total_reads(), 1);
    }

    #[test]
    fn test_register_layout() {
        let mut bus = FakePciBus::new();
        bus.insert(
            PciLocation::new(0, 0, 0),
            FakePciFunction::new(0x8086, 0x1237, 0x06, 0x00)
                .multifunction()
                .irq(9)
                .bar(5, 0xE000),
        );
        assert_eq!(bus.read_dword(0, 0, 0, 0x00), 0x1237_8086);
        assert_eq!(bus.read_dword(0, 0, 0, 0x08), 0x0600_0000);
        assert_eq!(bus.read_dword(0, 0, 0, 0x0C), 0x0080_0000);
        assert_eq!(bus.read_dword(0, 0, 0, 0x24), 0xE000);
        assert_eq!(bus.read_dword(0, 0, 0, 0x3C) & 0xFF, 9);
        assert_eq!(bus.reads_at(PciLocation::new(0, 0, 0)), 5);
    }
}
