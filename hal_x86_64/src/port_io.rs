//! Port I/O abstraction for x86_64
//!
//! This module provides a trait-based abstraction for x86 port I/O operations,
//! allowing for both real hardware access and fake implementations for testing.
//!
//! ## Safety
//!
//! Port I/O operations are inherently unsafe as they directly interact with hardware.
//! The `RealPortIo` implementation isolates all unsafe code to small, auditable functions.

/// Port I/O trait
///
/// Abstracts x86 I/O port operations to allow test doubles.
///
/// Implementations must complete every operation synchronously before
/// returning.
pub trait PortIo {
    /// Reads a byte from an I/O port
    fn inb(&mut self, port: u16) -> u8;

    /// Writes a byte to an I/O port
    fn outb(&mut self, port: u16, value: u8);

    /// Reads a dword from an I/O port
    fn inl(&mut self, port: u16) -> u32;

    /// Writes a dword to an I/O port
    fn outl(&mut self, port: u16, value: u32);
}

/// Real hardware port I/O implementation
///
/// Uses x86 `in` and `out` instructions to access hardware ports.
///
/// ## Safety
///
/// This implementation is only safe when:
/// - Running on x86_64 with I/O privilege (ring 0)
/// - Accessing ports that exist and are safe to access
/// - Not interfering with other drivers or system components
#[derive(Debug, Default)]
pub struct RealPortIo;

impl RealPortIo {
    /// Creates a new real port I/O implementation
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_arch = "x86_64")]
impl PortIo for RealPortIo {
    #[inline]
    fn inb(&mut self, port: u16) -> u8 {
        // SAFETY: callers guarantee the port is valid and that the code runs
        // with I/O privilege. "in al, dx" touches no memory or stack.
        unsafe {
            let value: u8;
            core::arch::asm!(
                "in al, dx",
                in("dx") port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
            value
        }
    }

    #[inline]
    fn outb(&mut self, port: u16, value: u8) {
        // SAFETY: see `inb`.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[inline]
    fn inl(&mut self, port: u16) -> u32 {
        // SAFETY: see `inb`.
        unsafe {
            let value: u32;
            core::arch::asm!(
                "in eax, dx",
                in("dx") port,
                out("eax") value,
                options(nomem, nostack, preserves_flags)
            );
            value
        }
    }

    #[inline]
    fn outl(&mut self, port: u16, value: u32) {
        // SAFETY: see `inb`.
        unsafe {
            core::arch::asm!(
                "out dx, eax",
                in("dx") port,
                in("eax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

/// A write captured by [`FakePortIo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortWrite {
    Byte(u16, u8),
    Dword(u16, u32),
}

/// Fake port I/O implementation for testing
///
/// Reads are scripted in order and must hit the expected port; writes are
/// captured for verification.
///
/// ## Example
///
/// ```rust
/// use hal_x86_64::port_io::{FakePortIo, PortIo};
///
/// let mut io = FakePortIo::new();
/// io.script_read(0x71, 0x59); // CMOS data: seconds
/// io.script_read_dword(0xCFC, 0x1237_8086); // PCI config data
///
/// assert_eq!(io.inb(0x71), 0x59);
/// assert_eq!(io.inl(0xCFC), 0x1237_8086);
/// assert_eq!(io.remaining_reads(), 0);
/// ```
#[derive(Debug, Default)]
pub struct FakePortIo {
    /// Scripted read values: (port, value)
    read_script: Vec<(u16, u32)>,
    /// Current read index
    read_index: usize,
    /// Captured write operations
    writes: Vec<PortWrite>,
}

impl FakePortIo {
    /// Creates a new fake port I/O implementation
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a byte read operation
    pub fn script_read(&mut self, port: u16, value: u8) {
        self.read_script.push((port, value as u32));
    }

    /// Scripts multiple byte read operations
    pub fn script_reads(&mut self, reads: &[(u16, u8)]) {
        self.read_script
            .extend(reads.iter().map(|&(port, value)| (port, value as u32)));
    }

    /// Scripts a dword read operation
    pub fn script_read_dword(&mut self, port: u16, value: u32) {
        self.read_script.push((port, value));
    }

    /// Returns the number of scripted reads remaining
    pub fn remaining_reads(&self) -> usize {
        self.read_script.len() - self.read_index
    }

    /// Returns all captured write operations
    pub fn writes(&self) -> &[PortWrite] {
        &self.writes
    }

    /// Returns only the captured byte writes
    pub fn byte_writes(&self) -> Vec<(u16, u8)> {
        self.writes
            .iter()
            .filter_map(|w| match *w {
                PortWrite::Byte(port, value) => Some((port, value)),
                PortWrite::Dword(..) => None,
            })
            .collect()
    }

    /// Clears all captured writes
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    fn next_read(&mut self, port: u16) -> u32 {
        if self.read_index >= self.read_script.len() {
            panic!(
                "FakePortIo: No scripted read for port 0x{:04X} (read_index={}, script_len={})",
                port,
                self.read_index,
                self.read_script.len()
            );
        }

        let (expected_port, value) = self.read_script[self.read_index];
        if port != expected_port {
            panic!(
                "FakePortIo: Port mismatch at read_index={}: expected 0x{:04X}, got 0x{:04X}",
                self.read_index, expected_port, port
            );
        }

        self.read_index += 1;
        value
    }
}

impl PortIo for FakePortIo {
    fn inb(&mut self, port: u16) -> u8 {
        self.next_read(port) as u8
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.writes.push(PortWrite::Byte(port, value));
    }

    fn inl(&mut self, port: u16) -> u32 {
        self.next_read(port)
    }

    fn outl(&mut self, port: u16, value: u32) {
        self.writes.push(PortWrite::Dword(port, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_port_io_creation() {
        let io = FakePortIo::new();
        assert_eq!(io.remaining_reads(), 0);
        assert!(io.writes().is_empty());
    }

    #[test]
    fn test_fake_port_io_script_reads() {
        let mut io = FakePortIo::new();
        io.script_reads(&[(0x70, 0x01), (0x71, 0x1E)]);

        assert_eq!(io.remaining_reads(), 2);
        assert_eq!(io.inb(0x70), 0x01);
        assert_eq!(io.inb(0x71), 0x1E);
        assert_eq!(io.remaining_reads(), 0);
    }

    #[test]
    fn test_fake_port_io_dword() {
        let mut io = FakePortIo::new();
        io.outl(0xCF8, 0x8000_0000);
        io.script_read_dword(0xCFC, 0xFFFF_FFFF);

        assert_eq!(io.inl(0xCFC), 0xFFFF_FFFF);
        assert_eq!(io.writes(), &[PortWrite::Dword(0xCF8, 0x8000_0000)]);
    }

    #[test]
    fn test_fake_port_io_byte_writes_filter() {
        let mut io = FakePortIo::new();
        io.outb(0x43, 0x36);
        io.outl(0xCF8, 1);
        io.outb(0x40, 0x9B);
        assert_eq!(io.byte_writes(), vec![(0x43, 0x36), (0x40, 0x9B)]);
    }

    #[test]
    #[should_panic(expected = "No scripted read")]
    fn test_fake_port_io_panic_on_unscripted_read() {
        let mut io = FakePortIo::new();
        io.inb(0x71);
    }

    #[test]
    #[should_panic(expected = "Port mismatch")]
    fn test_fake_port_io_panic_on_wrong_port() {
        let mut io = FakePortIo::new();
        io.script_read(0x71, 0x01);
        io.inb(0x70);
    }
}
