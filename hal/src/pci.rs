//! PCI configuration-space abstraction
//!
//! Bus enumeration only ever consumes typed dword reads; how the dword gets
//! there (port 0xCF8/0xCFC, ECAM, a simulated table) stays behind this trait.

/// Value read back from an empty slot's vendor register
pub const VENDOR_ABSENT: u16 = 0xFFFF;

/// Configuration-space reader
pub trait PciConfigSpace {
    /// Reads the dword at `offset` (dword aligned) of the given function
    fn read_dword(&mut self, bus: u8, device: u8, function: u8, offset: u8) -> u32;
}
