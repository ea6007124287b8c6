//! 16550 UART over legacy I/O ports.

use bitflags::bitflags;

use crate::port_io::PortIo;

/// Legacy COM port base addresses
pub const COM1_BASE: u16 = 0x3F8;
pub const COM2_BASE: u16 = 0x2F8;
pub const COM3_BASE: u16 = 0x3E8;
pub const COM4_BASE: u16 = 0x2E8;

/// UART input clock divided by 16
const UART_BASE_BAUD: u32 = 115_200;

// Register offsets from the port base
const DATA: u16 = 0; // RBR(R) & THR(W), DLL when DLAB
const INTR_EN: u16 = 1; // IER, DLM when DLAB
const FIFO_CTL: u16 = 2; // FCR(W)
const LINE_CTL: u16 = 3;
const MODEM_CTL: u16 = 4;
const LINE_STAT: u16 = 5;

bitflags! {
    /// Line status register (LSR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        /// Data Ready (DR) indicator.
        const DR            = 0b0000_0001;
        /// Overrun Error (OE) indicator
        const OE            = 0b0000_0010;
        /// Parity Error (PE) indicator
        const PE            = 0b0000_0100;
        /// Framing Error (FE) indicator
        const FE            = 0b0000_1000;
        /// Break Interrupt (BI) indicator
        const BI            = 0b0001_0000;
        /// Transmit holding register is empty
        const THR_EMPTY     = 0b0010_0000;
        /// Transmitter Empty indicator
        const EMPTY_TRANS   = 0b0100_0000;
        /// Error in the receive FIFO
        const ERR           = 0b1000_0000;
    }
}

bitflags! {
    /// Line control register (LCR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineControl: u8 {
        const WORD_8BIT = 0b0000_0011;
        const STOP_2    = 0b0000_0100;
        const PARITY    = 0b0000_1000;
        /// Divisor latch access
        const DLAB      = 0b1000_0000;
    }
}

/// Computes the baud divisor, clamped to at least 1.
pub fn baud_divisor(baud: u32) -> u16 {
    (UART_BASE_BAUD / baud.max(1)).clamp(1, u16::MAX as u32) as u16
}

/// 16550-compatible UART.
#[derive(Debug)]
pub struct Uart16550<P: PortIo> {
    port_io: P,
    base: u16,
}

impl<P: PortIo> Uart16550<P> {
    pub fn new(port_io: P, base: u16) -> Self {
        Self { port_io, base }
    }

    /// Base I/O port.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Programs 8N1 at `baud` with FIFOs enabled and interrupts off.
    pub fn init(&mut self, baud: u32) {
        let divisor = baud_divisor(baud);
        self.port_io.outb(self.base + INTR_EN, 0x00);
        self.port_io
            .outb(self.base + LINE_CTL, LineControl::DLAB.bits());
        self.port_io.outb(self.base + DATA, (divisor & 0xFF) as u8);
        self.port_io.outb(self.base + INTR_EN, (divisor >> 8) as u8);
        self.port_io
            .outb(self.base + LINE_CTL, LineControl::WORD_8BIT.bits());
        // Enable and clear FIFOs, 14-byte threshold
        self.port_io.outb(self.base + FIFO_CTL, 0xC7);
        // DTR, RTS, OUT2
        self.port_io.outb(self.base + MODEM_CTL, 0x0B);
    }

    /// Reads the line status register.
    pub fn line_status(&mut self) -> LineStatus {
        LineStatus::from_bits_truncate(self.port_io.inb(self.base + LINE_STAT))
    }

    /// Returns true when a received byte is waiting.
    pub fn char_available(&mut self) -> bool {
        self.line_status().contains(LineStatus::DR)
    }

    /// Returns the next received byte, if any, without waiting.
    pub fn try_read_char(&mut self) -> Option<u8> {
        if self.char_available() {
            Some(self.port_io.inb(self.base + DATA))
        } else {
            None
        }
    }

    /// Spins until a byte arrives and returns it.
    pub fn read_char(&mut self) -> u8 {
        while !self.char_available() {
            std::hint::spin_loop();
        }
        self.port_io.inb(self.base + DATA)
    }

    /// Spins until the transmit holding register is free, then sends `byte`.
    pub fn write_char(&mut self, byte: u8) {
        while !self.line_status().contains(LineStatus::THR_EMPTY) {
            std::hint::spin_loop();
        }
        self.port_io.outb(self.base + DATA, byte);
    }

    /// Returns the underlying port I/O.
    pub fn port_io(&self) -> &P {
        &self.port_io
    }

    /// Returns the underlying port I/O mutably.
    pub fn port_io_mut(&mut self) -> &mut P {
        &mut self.port_io
    }
}
