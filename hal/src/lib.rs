//! # Hardware Abstraction Layer (HAL)
//!
//! Architecture-neutral traits the drivers are written against: sector
//! storage, interrupt line registration, PCI configuration reads and tick
//! sources. The x86 backing for each lives in `hal_x86_64`, and every trait
//! has a fake so drivers run under `cargo test` without hardware.

pub mod block_device;
pub mod interrupts;
pub mod pci;
pub mod timer;

pub use block_device::{BlockDevice, BlockError, SECTOR_SIZE};
#[cfg(feature = "alloc")]
pub use block_device::RamDisk;
pub use interrupts::{InterruptError, InterruptHal, IrqHandler};
pub use pci::PciConfigSpace;
pub use timer::TimerDevice;
