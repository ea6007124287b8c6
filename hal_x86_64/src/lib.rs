//! # x86_64 Hardware Abstraction Layer
//!
//! Legacy PC hardware behind the `hal` traits: port I/O, PCI configuration
//! space through ports 0xCF8/0xCFC, CMOS registers, the 8254 PIT, the 16550
//! UART, and IRQ routing.
//!
//! ## Scope
//!
//! Everything is generic over [`PortIo`] so drivers run against
//! [`FakePortIo`] in tests. Only [`RealPortIo`] executes privileged
//! instructions.

pub mod cmos;
pub mod interrupts;
pub mod pci_config;
pub mod pit;
pub mod port_io;
pub mod tick;
pub mod uart;

pub use cmos::{Cmos, CmosRegisters, FakeCmos};
pub use interrupts::{InterruptDispatcher, IrqError, IrqLine};
pub use pci_config::PciConfigPorts;
pub use pit::Pit;
pub use port_io::{FakePortIo, PortIo, PortWrite, RealPortIo};
pub use tick::{sleep_clock, SleepClock};
pub use uart::{LineStatus, Uart16550};
