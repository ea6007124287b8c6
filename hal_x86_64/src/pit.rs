//! # 8254 Programmable Interval Timer
//!
//! Channel 0 drives the periodic timer interrupt (IRQ 0); channel 2 is
//! gated to the PC speaker.
//!
//! ## Hardware Details
//!
//! - Base frequency: 1.193182 MHz
//! - Command port 0x43, channel data ports 0x40 / 0x42
//! - Speaker gate and data enable live in bits 0-1 of port 0x61

use crate::port_io::PortIo;

/// PIT input clock in Hz
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

const CHANNEL_0_DATA: u16 = 0x40;
const CHANNEL_2_DATA: u16 = 0x42;
const COMMAND: u16 = 0x43;
const SPEAKER_CONTROL: u16 = 0x61;

// Channel 0, lobyte/hibyte, mode 3 (square wave), binary
const CHANNEL_0_SQUARE_WAVE: u8 = 0b0011_0110;
// Channel 2, lobyte/hibyte, mode 3 (square wave), binary
const CHANNEL_2_SQUARE_WAVE: u8 = 0b1011_0110;
const SPEAKER_ENABLE_BITS: u8 = 0b0000_0011;

/// Computes the 16-bit reload divisor for `hz`, clamped to the valid range.
pub fn divisor_for(hz: u32) -> u16 {
    let hz = hz.max(1);
    (PIT_BASE_FREQUENCY / hz).clamp(1, u16::MAX as u32) as u16
}

/// 8254 PIT programmed over port I/O.
#[derive(Debug)]
pub struct Pit<P: PortIo> {
    port_io: P,
    frequency_hz: Option<u32>,
    tone_hz: Option<u32>,
}

impl<P: PortIo> Pit<P> {
    /// Creates a PIT handle. Does not touch the hardware.
    pub fn new(port_io: P) -> Self {
        Self {
            port_io,
            frequency_hz: None,
            tone_hz: None,
        }
    }

    /// Programs channel 0 to fire at `hz`.
    pub fn set_frequency(&mut self, hz: u32) {
        let divisor = divisor_for(hz);
        self.port_io.outb(COMMAND, CHANNEL_0_SQUARE_WAVE);
        self.port_io.outb(CHANNEL_0_DATA, (divisor & 0xFF) as u8);
        self.port_io.outb(CHANNEL_0_DATA, (divisor >> 8) as u8);
        self.frequency_hz = Some(hz);
    }

    /// Starts a square wave at `hz` on channel 2 and opens the speaker gate.
    pub fn start_tone(&mut self, hz: u32) {
        let divisor = divisor_for(hz);
        self.port_io.outb(COMMAND, CHANNEL_2_SQUARE_WAVE);
        self.port_io.outb(CHANNEL_2_DATA, (divisor & 0xFF) as u8);
        self.port_io.outb(CHANNEL_2_DATA, (divisor >> 8) as u8);

        let control = self.port_io.inb(SPEAKER_CONTROL);
        if control & SPEAKER_ENABLE_BITS != SPEAKER_ENABLE_BITS {
            self.port_io
                .outb(SPEAKER_CONTROL, control | SPEAKER_ENABLE_BITS);
        }
        self.tone_hz = Some(hz);
    }

    /// Closes the speaker gate.
    pub fn stop_tone(&mut self) {
        let control = self.port_io.inb(SPEAKER_CONTROL);
        self.port_io
            .outb(SPEAKER_CONTROL, control & !SPEAKER_ENABLE_BITS);
        self.tone_hz = None;
    }

    /// Returns the channel 0 frequency last programmed.
    pub fn frequency_hz(&self) -> Option<u32> {
        self.frequency_hz
    }

    /// Returns the tone currently playing, if any.
    pub fn tone_hz(&self) -> Option<u32> {
        self.tone_hz
    }

    /// Returns the underlying port I/O.
    pub fn port_io(&self) -> &P {
        &self.port_io
    }
}
