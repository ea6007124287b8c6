//! # Bus Enumeration
//!
//! Discovers devices and hands each one to a driver callback.
//!
//! - **pci**: brute-force scan of PCI configuration space
//! - **isa**: the fixed list of legacy ISA devices, which cannot be probed
//! - **fake**: an in-memory configuration space for tests
//!
//! Enumerators never touch the registry themselves; the driver's callback
//! decides whether and how to register what was found.

pub mod config;
pub mod error;
pub mod fake;
pub mod isa;
pub mod pci;

pub use config::PciScanConfig;
pub use error::BusError;
pub use fake::{FakePciBus, FakePciFunction};
pub use isa::{IsaBus, IsaDevice};
pub use pci::{read_descriptor, scan, PciDescriptor, PciFilter};
