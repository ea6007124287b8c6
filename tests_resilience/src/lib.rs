//! Resilience Test Utilities
//!
//! Shared fixtures for the cross-crate tests under `tests/`.
//!
//! ## Test Philosophy
//!
//! - **Refcounts balance**: every attach is undone by exactly one detach
//! - **Deterministic hardware**: ports, CMOS and PCI space are all fakes
//! - **Whole stack**: disks, tables, partitions and filesystems are built
//!   through the same calls the kernel uses

use hal::RamDisk;
use hal_x86_64::InterruptDispatcher;
use services_device_manager::{DeviceHandle, DeviceRegistry, RegistryConfig};

/// Fresh registry plus an interrupt router with nothing installed.
pub fn test_bootstrap() -> (DeviceRegistry, InterruptDispatcher) {
    (
        DeviceRegistry::new(RegistryConfig::default()),
        InterruptDispatcher::new(),
    )
}

/// `sectors`-sector image with a boot signature and MBR entries given as
/// `(system id, first lba, sector count)`.
pub fn mbr_image(sectors: usize, entries: &[(u8, u32, u32)]) -> Vec<u8> {
    let mut image = vec![0u8; sectors * 512];
    for (slot, &(system_id, lba, count)) in entries.iter().enumerate().take(4) {
        let raw = &mut image[446 + slot * 16..][..16];
        raw[4] = system_id;
        raw[8..12].copy_from_slice(&lba.to_le_bytes());
        raw[12..16].copy_from_slice(&count.to_le_bytes());
    }
    image[510] = 0x55;
    image[511] = 0xAA;
    image
}

/// Boot sector of a FAT16 volume: 512-byte sectors, 4 sectors per cluster,
/// one reserved sector, two 64-sector tables and a 512-entry root.
pub fn fat16_boot_sector(total_sectors: u16) -> [u8; 512] {
    let mut sector = [0u8; 512];
    sector[0] = 0xEB;
    sector[1] = 0x3C;
    sector[2] = 0x90;
    sector[3..11].copy_from_slice(b"MSWIN4.1");
    sector[11..13].copy_from_slice(&512u16.to_le_bytes());
    sector[13] = 4;
    sector[14..16].copy_from_slice(&1u16.to_le_bytes());
    sector[16] = 2;
    sector[17..19].copy_from_slice(&512u16.to_le_bytes());
    sector[19..21].copy_from_slice(&total_sectors.to_le_bytes());
    sector[21] = 0xF8;
    sector[22..24].copy_from_slice(&64u16.to_le_bytes());
    sector[510] = 0x55;
    sector[511] = 0xAA;
    sector
}

/// Registers an MBR disk as `vblock<n>` and returns it.
pub fn mbr_vblock(
    registry: &mut DeviceRegistry,
    sectors: usize,
    entries: &[(u8, u32, u32)],
) -> DeviceHandle {
    device_drivers::attach_vblock(
        registry,
        RamDisk::from_image(&mbr_image(sectors, entries), 512),
    )
    .expect("attach vblock")
}
