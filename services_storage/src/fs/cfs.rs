//! cfs: superblock, sector blockmap and three primary directories.
//!
//! Layout on a volume with `n` blockmap sectors:
//!
//! ```text
//! 0          superblock
//! 1..=n      blockmaps, one bit per sector
//! n+1        data directory
//! n+2        presentation directory
//! n+3        group directory
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use hal::BlockError;
use services_device_manager::{
    BlockCapability, DeviceError, DeviceHandle, DeviceRegistry, DirEntry, DirectoryListing,
    FilesystemCapability,
};

use crate::block_util::{self, block_of};
use crate::error::FsError;

pub const SUPERBLOCK_MAGIC: u64 = 0x3032_4459_4C4F_4746;
pub const DATA_DIR_MAGIC: u64 = 0x3032_4D4C_424D_4C42;
pub const PRESENTATION_DIR_MAGIC: u64 = 0x4E45_4449_4245_4F4A;
pub const GROUP_DIR_MAGIC: u64 = 0x5352_4148_4E44_4942;
pub const BLOCKMAP_MAGIC: u64 = 0x5352_4148_4E44_4907;

const SECTOR: usize = 512;
const BLOCKMAP_BITMAP_OFFSET: usize = 64;
/// Bitmap bytes carried by one blockmap sector.
const BLOCKMAP_BITMAP_BYTES: usize = SECTOR - BLOCKMAP_BITMAP_OFFSET;
/// Sectors tracked by one blockmap sector.
pub const SECTORS_MAPPED_PER_SECTOR: u32 = (BLOCKMAP_BITMAP_BYTES * 8) as u32;

pub const SUPERBLOCK_SIZE: usize = 8 * (5 + 58);
pub const DIRECTORY_POINTERS: usize = 61;

const LOG_TARGET: &str = "fs::cfs";

/// Number of blockmap sectors needed to map `total_sectors`.
pub fn blockmap_sectors(total_sectors: u32) -> u32 {
    total_sectors.div_ceil(SECTORS_MAPPED_PER_SECTOR).max(1)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u64,
    pub lastmount: u64,
    pub primary_data_space: u64,
    pub primary_presentation_space: u64,
    pub primary_group_directory: u64,
}

impl Superblock {
    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut bytes = [0u8; SUPERBLOCK_SIZE];
        let fields = [
            self.magic,
            self.lastmount,
            self.primary_data_space,
            self.primary_presentation_space,
            self.primary_group_directory,
        ];
        for (raw, field) in bytes.chunks_exact_mut(8).zip(fields) {
            raw.copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            magic: read_u64(bytes, 0),
            lastmount: read_u64(bytes, 8),
            primary_data_space: read_u64(bytes, 16),
            primary_presentation_space: read_u64(bytes, 24),
            primary_group_directory: read_u64(bytes, 32),
        }
    }
}

/// One directory sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub magic: u64,
    pub previous: u64,
    pub next: u64,
    pub pointers: [u64; DIRECTORY_POINTERS],
}

impl DirectoryRecord {
    pub fn empty(magic: u64) -> Self {
        Self {
            magic,
            previous: 0,
            next: 0,
            pointers: [0; DIRECTORY_POINTERS],
        }
    }

    pub fn to_bytes(&self) -> [u8; SECTOR] {
        let mut bytes = [0u8; SECTOR];
        let head = [self.magic, self.previous, self.next];
        for (raw, field) in bytes
            .chunks_exact_mut(8)
            .zip(head.iter().chain(self.pointers.iter()))
        {
            raw.copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut pointers = [0u64; DIRECTORY_POINTERS];
        for (n, pointer) in pointers.iter_mut().enumerate() {
            *pointer = read_u64(bytes, 24 + n * 8);
        }
        Self {
            magic: read_u64(bytes, 0),
            previous: read_u64(bytes, 8),
            next: read_u64(bytes, 16),
            pointers,
        }
    }

    /// Pointers in use.
    pub fn entry_count(&self) -> usize {
        self.pointers.iter().filter(|&&p| p != 0).count()
    }
}

/// Returns true if sector 0 of `block` carries the cfs superblock magic.
pub fn probe(block: &dyn BlockCapability) -> Result<bool, BlockError> {
    if block.total_sectors() == 0 {
        return Ok(false);
    }
    let mut magic = [0u8; 8];
    block_util::read_sectors(block, 0, &mut magic)?;
    Ok(u64::from_le_bytes(magic) == SUPERBLOCK_MAGIC)
}

/// A cfs volume on a block device.
pub struct Cfs {
    block: Arc<dyn BlockCapability>,
    lock: Mutex<()>,
}

impl Cfs {
    pub fn new(block: Arc<dyn BlockCapability>) -> Self {
        Self {
            block,
            lock: Mutex::new(()),
        }
    }

    fn total_sectors(&self) -> u32 {
        self.block.total_sectors()
    }

    fn read_sector(&self, lba: u64) -> Result<[u8; SECTOR], FsError> {
        let mut sector = [0u8; SECTOR];
        block_util::read_sectors(self.block.as_ref(), lba, &mut sector)?;
        Ok(sector)
    }

    fn write_sector(&self, lba: u64, data: &[u8]) -> Result<(), FsError> {
        Ok(block_util::write_sectors(self.block.as_ref(), lba, data)?)
    }

    /// Writes an empty volume: superblock, blockmaps with the metadata
    /// sectors marked used, and the three primary directories.
    pub fn format_volume(&self) -> Result<(), FsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let total = self.total_sectors();
        let maps = blockmap_sectors(total);
        let metadata = 1 + maps + 3;
        if total < metadata {
            return Err(FsError::VolumeTooSmall(total));
        }

        let first_dir = 1 + maps as u64;
        let superblock = Superblock {
            magic: SUPERBLOCK_MAGIC,
            lastmount: 0,
            primary_data_space: first_dir,
            primary_presentation_space: first_dir + 1,
            primary_group_directory: first_dir + 2,
        };
        self.write_sector(0, &superblock.to_bytes())?;

        for map in 0..maps {
            let mut sector = [0u8; SECTOR];
            sector[..8].copy_from_slice(&BLOCKMAP_MAGIC.to_le_bytes());
            let first = map * SECTORS_MAPPED_PER_SECTOR;
            for lba in first..metadata.min(first + SECTORS_MAPPED_PER_SECTOR) {
                let bit = (lba - first) as usize;
                sector[BLOCKMAP_BITMAP_OFFSET + bit / 8] |= 1 << (bit % 8);
            }
            self.write_sector(1 + map as u64, &sector)?;
        }

        for (lba, magic) in [
            (superblock.primary_data_space, DATA_DIR_MAGIC),
            (superblock.primary_presentation_space, PRESENTATION_DIR_MAGIC),
            (superblock.primary_group_directory, GROUP_DIR_MAGIC),
        ] {
            self.write_sector(lba, &DirectoryRecord::empty(magic).to_bytes())?;
        }

        services_logger::debug(
            LOG_TARGET,
            format!("Formatted {} sectors, {} blockmap sector(s)", total, maps),
        );
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if sector 0 does not carry the superblock magic.
    pub fn read_superblock(&self) -> Result<Superblock, FsError> {
        let superblock = Superblock::from_bytes(&self.read_sector(0)?);
        if superblock.magic != SUPERBLOCK_MAGIC {
            panic!("cfs: bad superblock magic {:#018x}", superblock.magic);
        }
        Ok(superblock)
    }

    /// Reads the directory at `lba`, which must carry `magic`.
    ///
    /// # Panics
    ///
    /// Panics on a magic mismatch.
    pub fn read_directory(&self, lba: u64, magic: u64) -> Result<DirectoryRecord, FsError> {
        let record = DirectoryRecord::from_bytes(&self.read_sector(lba)?);
        if record.magic != magic {
            panic!(
                "cfs: bad directory magic {:#018x} at lba {}, expected {:#018x}",
                record.magic, lba, magic
            );
        }
        Ok(record)
    }

    /// Locates the blockmap sector and bit for `lba`.
    fn blockmap_slot(&self, lba: u64) -> Result<(u64, usize), FsError> {
        if lba >= self.total_sectors() as u64 {
            return Err(FsError::Io(BlockError::OutOfBounds));
        }
        let per_map = SECTORS_MAPPED_PER_SECTOR as u64;
        Ok((1 + lba / per_map, (lba % per_map) as usize))
    }

    fn read_blockmap(&self, map_lba: u64) -> Result<[u8; SECTOR], FsError> {
        let sector = self.read_sector(map_lba)?;
        let magic = read_u64(&sector, 0);
        if magic != BLOCKMAP_MAGIC {
            panic!("cfs: bad blockmap magic {:#018x} at lba {}", magic, map_lba);
        }
        Ok(sector)
    }

    pub fn sector_allocated(&self, lba: u64) -> Result<bool, FsError> {
        let (map_lba, bit) = self.blockmap_slot(lba)?;
        let map = self.read_blockmap(map_lba)?;
        Ok(map[BLOCKMAP_BITMAP_OFFSET + bit / 8] & (1 << (bit % 8)) != 0)
    }

    fn set_allocated(&self, lba: u64, allocated: bool) -> Result<(), FsError> {
        let (map_lba, bit) = self.blockmap_slot(lba)?;
        let mut map = self.read_blockmap(map_lba)?;
        let byte = &mut map[BLOCKMAP_BITMAP_OFFSET + bit / 8];
        if allocated {
            *byte |= 1 << (bit % 8);
        } else {
            *byte &= !(1 << (bit % 8));
        }
        self.write_sector(map_lba, &map)
    }

    /// Marks the lowest free sector used and returns it.
    pub fn allocate_sector(&self) -> Result<u64, FsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let total = self.total_sectors() as u64;
        let maps = blockmap_sectors(self.total_sectors()) as u64;
        for map in 0..maps {
            let sector = self.read_blockmap(1 + map)?;
            let bitmap = &sector[BLOCKMAP_BITMAP_OFFSET..];
            let Some((byte, bits)) = bitmap.iter().enumerate().find(|&(_, &b)| b != 0xFF) else {
                continue;
            };
            let lba = map * SECTORS_MAPPED_PER_SECTOR as u64
                + byte as u64 * 8
                + bits.trailing_ones() as u64;
            if lba >= total {
                break;
            }
            self.set_allocated(lba, true)?;
            return Ok(lba);
        }
        Err(FsError::NoSpace(self.block.sector_size() as u64))
    }

    pub fn free_sector(&self, lba: u64) -> Result<(), FsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.set_allocated(lba, false)
    }

    /// Records the mount time in the superblock.
    pub fn mark_mounted(&self, timestamp: u64) -> Result<(), FsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut superblock = self.read_superblock()?;
        superblock.lastmount = timestamp;
        self.write_sector(0, &superblock.to_bytes())
    }
}

impl FilesystemCapability for Cfs {
    fn name(&self) -> &str {
        "cfs"
    }

    fn format(&self) -> Result<(), DeviceError> {
        Ok(self.format_volume()?)
    }

    fn list_dir(&self) -> Result<DirectoryListing, DeviceError> {
        let superblock = self.read_superblock()?;
        let mut listing = Vec::with_capacity(3);
        for (name, lba, magic) in [
            ("data", superblock.primary_data_space, DATA_DIR_MAGIC),
            (
                "presentation",
                superblock.primary_presentation_space,
                PRESENTATION_DIR_MAGIC,
            ),
            ("group", superblock.primary_group_directory, GROUP_DIR_MAGIC),
        ] {
            let record = self.read_directory(lba, magic)?;
            listing.push(DirEntry {
                name: name.to_string(),
                size: record.entry_count() as u64,
                is_dir: true,
            });
        }
        Ok(listing)
    }
}

/// Attaches a cfs volume over `device`.
pub fn attach_cfs(
    registry: &mut DeviceRegistry,
    device: DeviceHandle,
) -> Result<DeviceHandle, FsError> {
    let block = block_of(registry, device)?;
    super::attach_fs(registry, device, Arc::new(Cfs::new(block)), "cfs File System")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_device::SharedBlockDevice;
    use hal::RamDisk;

    fn volume(sectors: usize) -> (Cfs, Arc<SharedBlockDevice<RamDisk>>) {
        let disk = Arc::new(SharedBlockDevice::new(RamDisk::new(sectors)));
        (Cfs::new(disk.clone()), disk)
    }

    #[test]
    fn test_blockmap_sizing() {
        assert_eq!(SECTORS_MAPPED_PER_SECTOR, 3584);
        assert_eq!(blockmap_sectors(0), 1);
        assert_eq!(blockmap_sectors(3584), 1);
        assert_eq!(blockmap_sectors(3585), 2);
        assert_eq!(blockmap_sectors(7168), 2);
        assert_eq!(blockmap_sectors(7169), 3);
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(SUPERBLOCK_SIZE, 504);
        let record = DirectoryRecord::empty(DATA_DIR_MAGIC);
        assert_eq!(DirectoryRecord::from_bytes(&record.to_bytes()), record);
    }

    #[test]
    fn test_format_layout() {
        let (cfs, disk) = volume(64);
        cfs.format_volume().unwrap();

        let superblock = cfs.read_superblock().unwrap();
        assert_eq!(superblock.primary_data_space, 2);
        assert_eq!(superblock.primary_presentation_space, 3);
        assert_eq!(superblock.primary_group_directory, 4);
        assert_eq!(superblock.lastmount, 0);

        disk.with_device(|ram| {
            let bytes = ram.as_bytes();
            assert_eq!(&bytes[512..520], &BLOCKMAP_MAGIC.to_le_bytes());
            assert_eq!(bytes[512 + 64], 0b0001_1111);
            assert_eq!(&bytes[1024..1032], &DATA_DIR_MAGIC.to_le_bytes());
        });

        for lba in 0..5 {
            assert!(cfs.sector_allocated(lba).unwrap(), "metadata sector {lba}");
        }
        assert!(!cfs.sector_allocated(5).unwrap());
        assert_eq!(
            cfs.sector_allocated(64),
            Err(FsError::Io(BlockError::OutOfBounds))
        );
    }

    #[test]
    fn test_list_dir_after_format() {
        let (cfs, _) = volume(32);
        cfs.format().unwrap();
        let listing = cfs.list_dir().unwrap();
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["data", "presentation", "group"]);
        assert!(listing.iter().all(|e| e.is_dir && e.size == 0));
    }

    #[test]
    fn test_multi_blockmap_volume() {
        let (cfs, disk) = volume(4000);
        cfs.format_volume().unwrap();

        let superblock = cfs.read_superblock().unwrap();
        assert_eq!(superblock.primary_data_space, 3);
        for lba in 0..6 {
            assert!(cfs.sector_allocated(lba).unwrap());
        }
        assert!(!cfs.sector_allocated(3584).unwrap());
        disk.with_device(|ram| {
            assert_eq!(&ram.as_bytes()[1024..1032], &BLOCKMAP_MAGIC.to_le_bytes());
        });
    }

    #[test]
    fn test_allocate_and_free() {
        let (cfs, _) = volume(16);
        cfs.format_volume().unwrap();

        assert_eq!(cfs.allocate_sector().unwrap(), 5);
        assert_eq!(cfs.allocate_sector().unwrap(), 6);
        cfs.free_sector(5).unwrap();
        assert!(!cfs.sector_allocated(5).unwrap());
        assert_eq!(cfs.allocate_sector().unwrap(), 5);

        for _ in 7..16 {
            cfs.allocate_sector().unwrap();
        }
        assert_eq!(cfs.allocate_sector(), Err(FsError::NoSpace(512)));
    }

    #[test]
    fn test_mark_mounted() {
        let (cfs, _) = volume(16);
        cfs.format_volume().unwrap();
        cfs.mark_mounted(1_625_097_600).unwrap();
        assert_eq!(cfs.read_superblock().unwrap().lastmount, 1_625_097_600);
    }

    #[test]
    fn test_volume_too_small() {
        let (cfs, _) = volume(4);
        assert_eq!(cfs.format_volume(), Err(FsError::VolumeTooSmall(4)));
    }

    #[test]
    #[should_panic(expected = "cfs: bad superblock magic")]
    fn test_unformatted_superblock_is_fatal() {
        let (cfs, _) = volume(16);
        let _ = cfs.list_dir();
    }

    #[test]
    #[should_panic(expected = "cfs: bad directory magic")]
    fn test_corrupt_directory_is_fatal() {
        let (cfs, disk) = volume(16);
        cfs.format_volume().unwrap();
        disk.write(3, &[0u8; 512], 1).unwrap();
        let _ = cfs.list_dir();
    }
}
