//! Monotonic tick sources
//!
//! There is no blocking primitive below the scheduler. Code that has to wait
//! (the speaker holding a tone, for instance) spins on a tick source whose
//! count is advanced from a periodic interrupt handler.

/// A counter advanced by a periodic interrupt
///
/// Reads never block and never go backwards. The tick rate belongs to
/// whoever drives the counter.
pub trait TimerDevice {
    /// Ticks observed since the source started
    fn poll_ticks(&mut self) -> u64;
}
