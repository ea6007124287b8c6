//! PCI configuration mechanism #1 (port 0xCF8 / 0xCFC)

use crate::port_io::PortIo;
use hal::PciConfigSpace;

/// Configuration address port
pub const PCI_CONFIG_ADDRESS_PORT: u16 = 0xCF8;
/// Configuration data port
pub const PCI_CONFIG_DATA_PORT: u16 = 0xCFC;

/// Builds the 32-bit configuration address for a register
///
/// Bit 31 is the enable bit; the low two bits of `offset` are dropped since
/// the data port always returns a whole dword.
pub const fn config_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | (((device & 0x1F) as u32) << 11)
        | (((function & 0x07) as u32) << 8)
        | ((offset & 0xFC) as u32)
}

/// Configuration-space access through legacy I/O ports
#[derive(Debug)]
pub struct PciConfigPorts<P: PortIo> {
    port_io: P,
}

impl<P: PortIo> PciConfigPorts<P> {
    pub fn new(port_io: P) -> Self {
        Self { port_io }
    }

    /// Returns the underlying port I/O (for inspection in tests)
    pub fn port_io(&self) -> &P {
        &self.port_io
    }
}

impl<P: PortIo> PciConfigSpace for PciConfigPorts<P> {
    fn read_dword(&mut self, bus: u8, device: u8, function: u8, offset: u8) -> u32 {
        self.port_io.outl(
            PCI_CONFIG_ADDRESS_PORT,
            config_address(bus, device, function, offset),
        );
        self.port_io.inl(PCI_CONFIG_DATA_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port_io::{FakePortIo, PortWrite};

    #[test]
    fn test_config_address_layout() {
        assert_eq!(config_address(0, 0, 0, 0), 0x8000_0000);
        assert_eq!(config_address(1, 2, 3, 0x08), 0x8001_1308);
        // Unaligned offsets are rounded down to the dword
        assert_eq!(config_address(0, 0, 0, 0x3E), 0x8000_003C);
    }

    #[test]
    fn test_read_dword_writes_address_then_reads_data() {
        let mut io = FakePortIo::new();
        io.script_read_dword(PCI_CONFIG_DATA_PORT, 0x1237_8086);
        let mut config = PciConfigPorts::new(io);

        assert_eq!(config.read_dword(0, 0, 0, 0), 0x1237_8086);
        assert_eq!(
            config.port_io().writes(),
            &[PortWrite::Dword(PCI_CONFIG_ADDRESS_PORT, 0x8000_0000)]
        );
    }
}
