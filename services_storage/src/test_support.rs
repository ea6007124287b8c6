//! Fixtures shared by the storage unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use core_types::DeviceType;
use hal::{BlockError, RamDisk};
use services_device_manager::{BlockCapability, Capability, DeviceHandle, DeviceRegistry};

use crate::shared_device::SharedBlockDevice;

/// RAM disk that counts the read calls reaching it.
pub struct CountingDisk {
    inner: SharedBlockDevice<RamDisk>,
    reads: Arc<AtomicUsize>,
}

impl BlockCapability for CountingDisk {
    fn read(&self, lba: u64, buf: &mut [u8], count: u32) -> Result<(), BlockError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(lba, buf, count)
    }

    fn write(&self, lba: u64, buf: &[u8], count: u32) -> Result<(), BlockError> {
        self.inner.write(lba, buf, count)
    }

    fn sector_size(&self) -> u16 {
        self.inner.sector_size()
    }

    fn total_sectors(&self) -> u32 {
        self.inner.total_sectors()
    }
}

pub fn counting_disk(sectors: usize) -> (Arc<CountingDisk>, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let disk = CountingDisk {
        inner: SharedBlockDevice::new(RamDisk::new(sectors)),
        reads: Arc::clone(&reads),
    };
    (Arc::new(disk), reads)
}

/// Registers `disk` as a root-level Disk device named `name`.
pub fn register_disk(registry: &mut DeviceRegistry, name: &str, disk: RamDisk) -> DeviceHandle {
    let block = Arc::new(SharedBlockDevice::new(disk));
    registry
        .register_device(
            registry
                .new_device()
                .device_type(DeviceType::Disk)
                .name(name)
                .description("RAM disk")
                .capability(Capability::Block(block)),
        )
        .expect("register disk")
}

/// Linux filesystem data partition type, on-disk byte order.
pub const LINUX_GUID: [u8; 16] = [
    0xAF, 0x3D, 0xC6, 0x0F, 0x83, 0x84, 0x72, 0x47, 0x8E, 0x79, 0x3D, 0x69, 0xD8, 0x47, 0x7D,
    0xE4,
];

/// Disk image with a boot signature and up to four `(type, lba, sectors)`
/// MBR entries.
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

/// Disk image with a protective MBR, a GPT header at LBA 1 and a
/// 128-entry array at LBA 2 holding `(type guid, first lba, last lba)`.
pub fn gpt_image(sectors: usize, entries: &[([u8; 16], u64, u64)]) -> Vec<u8> {
    let mut image = mbr_image(sectors, &[(0xEE, 1, sectors as u32 - 1)]);
    let header = &mut image[512..1024];
    header[..8].copy_from_slice(b"EFI PART");
    header[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    header[12..16].copy_from_slice(&92u32.to_le_bytes());
    header[24..32].copy_from_slice(&1u64.to_le_bytes());
    header[72..80].copy_from_slice(&2u64.to_le_bytes());
    header[80..84].copy_from_slice(&128u32.to_le_bytes());
    header[84..88].copy_from_slice(&128u32.to_le_bytes());
    for (slot, &(guid, first, last)) in entries.iter().enumerate() {
        let raw = &mut image[1024 + slot * 128..][..128];
        raw[..16].copy_from_slice(&guid);
        raw[32..40].copy_from_slice(&first.to_le_bytes());
        raw[40..48].copy_from_slice(&last.to_le_bytes());
    }
    image
}

fn boot_sector_common(sector: &mut [u8]) {
    sector[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    sector[3..11].copy_from_slice(b"MSWIN4.1");
    sector[510] = 0x55;
    sector[511] = 0xAA;
}

/// 1.44 MB FAT12 floppy with a small root directory at sector 19.
pub fn fat12_floppy() -> Vec<u8> {
    let mut image = vec![0u8; 2880 * 512];
    let boot = &mut image[..512];
    boot_sector_common(boot);
    boot[11..13].copy_from_slice(&512u16.to_le_bytes());
    boot[13] = 1;
    boot[14..16].copy_from_slice(&1u16.to_le_bytes());
    boot[16] = 2;
    boot[17..19].copy_from_slice(&224u16.to_le_bytes());
    boot[19..21].copy_from_slice(&2880u16.to_le_bytes());
    boot[21] = 0xF0;
    boot[22..24].copy_from_slice(&9u16.to_le_bytes());
    boot[24..26].copy_from_slice(&18u16.to_le_bytes());
    boot[26..28].copy_from_slice(&2u16.to_le_bytes());

    let entries: [(&[u8; 11], u8, u32); 6] = [
        (b"FLOPPY     ", 0x08, 0),
        (b"README  TXT", 0x20, 66),
        (b"\xE5OLD    TXT", 0x20, 10),
        (b"A\0B\0C\0D\0E\0F", 0x0F, 0),
        (b"DOCS       ", 0x10, 0),
        (b"\x05XOTIC     ", 0x20, 3),
    ];
    let root = 19 * 512;
    for (slot, (name, attributes, size)) in entries.iter().enumerate() {
        let raw = &mut image[root + slot * 32..][..32];
        raw[..11].copy_from_slice(*name);
        raw[11] = *attributes;
        raw[28..32].copy_from_slice(&size.to_le_bytes());
    }
    // Past the end marker; never listed
    image[root + 7 * 32..][..11].copy_from_slice(b"GHOST   TXT");
    image
}

/// Boot sector of a 512 MB FAT32 volume.
pub fn fat32_boot_sector() -> Vec<u8> {
    let mut sector = vec![0u8; 512];
    boot_sector_common(&mut sector);
    sector[11..13].copy_from_slice(&512u16.to_le_bytes());
    sector[13] = 8;
    sector[14..16].copy_from_slice(&32u16.to_le_bytes());
    sector[16] = 2;
    sector[21] = 0xF8;
    sector[32..36].copy_from_slice(&1_048_576u32.to_le_bytes());
    sector[36..40].copy_from_slice(&1024u32.to_le_bytes());
    sector[44..48].copy_from_slice(&2u32.to_le_bytes());
    sector
}
