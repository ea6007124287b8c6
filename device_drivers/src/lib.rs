//! # Device Drivers
//!
//! Leaf drivers that populate the device registry: a RAM-backed virtual
//! block device, 16550 serial ports found on the ISA list, a serial
//! console layered over one of them, the CMOS real-time clock, the PIT,
//! the PC speaker, and the i440FX host bridge found by PCI scan.
//!
//! Every driver is generic over its hardware accessor (`PortIo`,
//! `CmosRegisters`, `PciConfigSpace`, `InterruptHal`), so the same code
//! runs against the fakes in `hal_x86_64` and `services_bus`.

pub mod bridge;
pub mod config;
pub mod hooks;
pub mod pit;
pub mod rtc;
pub mod serial;
pub mod serial_console;
pub mod speaker;
pub mod vblock;

pub use bridge::{pci_descriptor, register_i440fx};
pub use config::{PitConfig, RtcConfig, SerialConfig};
pub use hooks::DriverHooks;
pub use pit::{attach_pit, shared_pit, PitTimer, SharedPit};
pub use rtc::{attach_rtc, rtc_of, Rtc};
pub use serial::{attach_serial, register_serial_ports, serial_port_of, SerialPort};
pub use serial_console::{
    attach_serial_console, detach_serial_console, ConsoleLogSink, SerialConsole,
};
pub use speaker::{attach_speaker, Speaker};
pub use vblock::{attach_vblock, attach_vblock_image, detach_vblock, with_ram_disk};
