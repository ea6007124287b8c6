//! CMOS register access (ports 0x70 / 0x71)

use crate::port_io::PortIo;

/// Register select port
pub const CMOS_REGISTER_SELECT_PORT: u16 = 0x70;
/// Register data port
pub const CMOS_REGISTER_DATA_PORT: u16 = 0x71;

/// Setting bit 7 of the select byte masks NMI while a register is selected
pub const CMOS_NMI_DISABLE: u8 = 0x80;

/// Raw CMOS register access
///
/// The RTC driver is written against this trait so the tear-safe sampling
/// logic can be driven by a scripted register source.
pub trait CmosRegisters {
    /// Reads one CMOS register
    fn read_register(&mut self, register: u8) -> u8;

    /// Writes one CMOS register
    fn write_register(&mut self, register: u8, value: u8);
}

/// CMOS access through the legacy I/O ports
#[derive(Debug)]
pub struct Cmos<P: PortIo> {
    port_io: P,
}

impl<P: PortIo> Cmos<P> {
    pub fn new(port_io: P) -> Self {
        Self { port_io }
    }

    pub fn port_io(&self) -> &P {
        &self.port_io
    }
}

impl<P: PortIo> CmosRegisters for Cmos<P> {
    fn read_register(&mut self, register: u8) -> u8 {
        self.port_io.outb(CMOS_REGISTER_SELECT_PORT, register);
        self.port_io.inb(CMOS_REGISTER_DATA_PORT)
    }

    fn write_register(&mut self, register: u8, value: u8) {
        self.port_io.outb(CMOS_REGISTER_SELECT_PORT, register);
        self.port_io.outb(CMOS_REGISTER_DATA_PORT, value);
    }
}

/// Pending register change applied by [`FakeCmos`]
#[derive(Debug, Clone, Copy)]
struct ScheduledUpdate {
    after_reads: usize,
    register: u8,
    value: u8,
}

/// Scripted CMOS register file for testing
///
/// Holds all 128 registers. Updates can be scheduled to land after a given
/// number of reads, which simulates the clock ticking in the middle of a
/// multi-register sample.
#[derive(Debug, Clone)]
pub struct FakeCmos {
    registers: [u8; 128],
    scheduled: Vec<ScheduledUpdate>,
    reads: Vec<u8>,
    writes: Vec<(u8, u8)>,
}

impl FakeCmos {
    pub fn new() -> Self {
        Self {
            registers: [0; 128],
            scheduled: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Sets a register immediately
    pub fn set(&mut self, register: u8, value: u8) {
        self.registers[(register & 0x7F) as usize] = value;
    }

    /// Sets `register` to `value` once `after_reads` reads have completed
    pub fn schedule_update(&mut self, after_reads: usize, register: u8, value: u8) {
        self.scheduled.push(ScheduledUpdate {
            after_reads,
            register,
            value,
        });
    }

    /// Current value of a register, without counting as a read
    pub fn peek(&self, register: u8) -> u8 {
        self.registers[(register & 0x7F) as usize]
    }

    /// Registers read so far, as selected (NMI bit included)
    pub fn reads(&self) -> &[u8] {
        &self.reads
    }

    /// Captured writes as (selected register, value)
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    fn apply_due_updates(&mut self) {
        let done = self.reads.len();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|update| update.after_reads <= done);
        for update in due {
            self.set(update.register, update.value);
        }
        self.scheduled = pending;
    }
}

impl Default for FakeCmos {
    fn default() -> Self {
        Self::new()
    }
}

impl CmosRegisters for FakeCmos {
    fn read_register(&mut self, register: u8) -> u8 {
        self.apply_due_updates();
        self.reads.push(register);
        self.peek(register)
    }

    fn write_register(&mut self, register: u8, value: u8) {
        self.writes.push((register, value));
        self.set(register, value);
    }
}
