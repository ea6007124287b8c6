//! x86_64 interrupt plumbing helpers.
//!
//! Deterministic, testable IRQ routing without touching real hardware: a
//! handler table indexed by legacy IRQ line, the global interrupt-enable
//! flag, and PIC acknowledge bookkeeping.

use hal::interrupts::{InterruptError, InterruptHal, IrqHandler};

/// Base vector for legacy PIC IRQs after remap.
pub const IRQ_BASE_VECTOR: u8 = 32;

/// Number of legacy IRQ lines behind the cascaded PICs.
pub const IRQ_LINES: usize = 16;

/// Common IRQ lines the core drivers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqLine {
    Pit,
    Keyboard,
    Com2,
    Com1,
    Rtc,
    Mouse,
    /// Explicit line number
    Line(u8),
}

impl IrqLine {
    /// Returns the legacy IRQ line number.
    pub const fn line(self) -> u8 {
        match self {
            IrqLine::Pit => 0,
            IrqLine::Keyboard => 1,
            IrqLine::Com2 => 3,
            IrqLine::Com1 => 4,
            IrqLine::Rtc => 8,
            IrqLine::Mouse => 12,
            IrqLine::Line(line) => line,
        }
    }

    /// Returns the interrupt vector for this IRQ line.
    pub const fn vector(self) -> u8 {
        IRQ_BASE_VECTOR + self.line()
    }
}

/// Tracks PIC acknowledgments (stubbed for tests).
#[derive(Debug, Default, Clone)]
pub struct PicController {
    ack_count: u64,
    last_line: Option<u8>,
}

impl PicController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledge(&mut self, line: u8) {
        self.ack_count = self.ack_count.saturating_add(1);
        self.last_line = Some(line);
    }

    pub fn ack_count(&self) -> u64 {
        self.ack_count
    }

    pub fn last_line(&self) -> Option<u8> {
        self.last_line
    }
}

/// IRQ dispatch errors.
#[derive(Debug, PartialEq, Eq)]
pub enum IrqError {
    /// Interrupts are globally disabled; the line stays pending.
    Masked(u8),
    HandlerMissing(u8),
}

/// Interrupt dispatcher with handler registration and ack plumbing.
pub struct InterruptDispatcher {
    handlers: Vec<Option<IrqHandler>>,
    enabled: bool,
    pic: PicController,
}

impl InterruptDispatcher {
    /// Creates a dispatcher with no handlers and interrupts disabled.
    pub fn new() -> Self {
        Self {
            handlers: (0..IRQ_LINES).map(|_| None).collect(),
            enabled: false,
            pic: PicController::new(),
        }
    }

    /// Returns whether a handler is installed on `line`.
    pub fn has_handler(&self, line: u8) -> bool {
        self.handlers
            .get(line as usize)
            .is_some_and(|slot| slot.is_some())
    }

    /// Runs the handler for `line` and acknowledges it at the PIC.
    pub fn dispatch_irq(&mut self, line: u8) -> Result<(), IrqError> {
        if !self.enabled {
            return Err(IrqError::Masked(line));
        }
        let handler = self
            .handlers
            .get_mut(line as usize)
            .and_then(Option::as_mut)
            .ok_or(IrqError::HandlerMissing(line))?;
        handler();
        self.pic.acknowledge(line);
        Ok(())
    }

    /// Returns the number of PIC acknowledgments.
    pub fn pic_ack_count(&self) -> u64 {
        self.pic.ack_count()
    }

    /// Returns the last IRQ line acknowledged.
    pub fn pic_last_line(&self) -> Option<u8> {
        self.pic.last_line()
    }
}

impl Default for InterruptDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<usize> = self
            .handlers
            .iter()
            .enumerate()
            .filter_map(|(line, slot)| slot.as_ref().map(|_| line))
            .collect();
        f.debug_struct("InterruptDispatcher")
            .field("enabled", &self.enabled)
            .field("lines", &lines)
            .field("pic", &self.pic)
            .finish()
    }
}

impl InterruptHal for InterruptDispatcher {
    fn enable_interrupts(&mut self) {
        // In real implementation: STI instruction
        self.enabled = true;
    }

    fn disable_interrupts(&mut self) {
        // In real implementation: CLI instruction
        self.enabled = false;
    }

    fn interrupts_enabled(&self) -> bool {
        self.enabled
    }

    fn register_handler(&mut self, line: u8, handler: IrqHandler) -> Result<(), InterruptError> {
        let slot = self
            .handlers
            .get_mut(line as usize)
            .ok_or(InterruptError::InvalidLine(line))?;
        if slot.is_some() {
            return Err(InterruptError::AlreadyRegistered(line));
        }
        *slot = Some(handler);
        Ok(())
    }
}
