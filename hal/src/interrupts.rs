//! Interrupt handling abstraction

use thiserror::Error;

/// Handler invoked from interrupt context for one IRQ line
pub type IrqHandler = Box<dyn FnMut() + Send>;

/// Interrupt registration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterruptError {
    #[error("IRQ line {0} already has a handler")]
    AlreadyRegistered(u8),

    #[error("IRQ line {0} is out of range")]
    InvalidLine(u8),
}

/// Interrupt handler trait
///
/// This trait abstracts interrupt handling. Different architectures
/// have different interrupt mechanisms, but all can implement this trait.
/// Drivers only ever use "register handler for line N"; vector mapping and
/// descriptor tables stay behind the implementation.
pub trait InterruptHal {
    /// Enables interrupts
    fn enable_interrupts(&mut self);

    /// Disables interrupts
    fn disable_interrupts(&mut self);

    /// Returns whether interrupts are enabled
    fn interrupts_enabled(&self) -> bool;

    /// Registers an interrupt handler
    ///
    /// # Arguments
    ///
    /// * `line` - The hardware IRQ line
    /// * `handler` - Closure to call when the interrupt fires
    fn register_handler(&mut self, line: u8, handler: IrqHandler) -> Result<(), InterruptError>;
}
