//! FAT: boot sector parsing, type classification and root-directory
//! listing for FAT12/16.

use std::fmt;
use std::sync::Arc;

use hal::BlockError;
use services_device_manager::{
    BlockCapability, DeviceError, DeviceHandle, DeviceRegistry, DirEntry, DirectoryListing,
    FilesystemCapability,
};

use crate::block_util::{self, block_of};
use crate::error::FsError;

const LOG_TARGET: &str = "fs::fat";

const BOOT_SIGNATURE_OFFSET: usize = 510;
const DIR_ENTRY_SIZE: usize = 32;

const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_LONG_NAME: u8 = 0x0F;
const ENTRY_END: u8 = 0x00;
const ENTRY_DELETED: u8 = 0xE5;
/// Stands in for a leading 0xE5 in a live name
const ENTRY_KANJI_E5: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
    ExFat,
}

impl fmt::Display for FatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
            FatType::ExFat => "exFAT",
        };
        f.write_str(label)
    }
}

/// FAT variant implied by the number of data clusters.
pub fn classify(total_clusters: u32) -> FatType {
    match total_clusters {
        0..=4084 => FatType::Fat12,
        4085..=65524 => FatType::Fat16,
        65525..=268_435_444 => FatType::Fat32,
        _ => FatType::ExFat,
    }
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// BIOS parameter block, with the FAT32 tail fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub table_count: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media_type: u8,
    pub table_size_16: u16,
    pub sectors_per_track: u16,
    pub head_side_count: u16,
    pub hidden_sector_count: u32,
    pub total_sectors_32: u32,
    /// FAT32 only
    pub table_size_32: u32,
    /// FAT32 only
    pub root_cluster: u32,
}

impl BiosParameterBlock {
    /// Minimum bytes needed to parse the block and its FAT32 tail.
    pub const SIZE: usize = 48;

    pub fn parse(sector: &[u8]) -> Option<Self> {
        if sector.len() < Self::SIZE {
            return None;
        }
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&sector[3..11]);
        Some(Self {
            oem_name,
            bytes_per_sector: le16(sector, 11),
            sectors_per_cluster: sector[13],
            reserved_sector_count: le16(sector, 14),
            table_count: sector[16],
            root_entry_count: le16(sector, 17),
            total_sectors_16: le16(sector, 19),
            media_type: sector[21],
            table_size_16: le16(sector, 22),
            sectors_per_track: le16(sector, 24),
            head_side_count: le16(sector, 26),
            hidden_sector_count: le32(sector, 28),
            total_sectors_32: le32(sector, 32),
            table_size_32: le32(sector, 36),
            root_cluster: le32(sector, 44),
        })
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 == 0 {
            self.total_sectors_32
        } else {
            self.total_sectors_16 as u32
        }
    }

    pub fn fat_size(&self) -> u32 {
        if self.table_size_16 == 0 {
            self.table_size_32
        } else {
            self.table_size_16 as u32
        }
    }
}

/// Layout values derived from the boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatParameters {
    pub sector_size: u16,
    pub total_sectors: u32,
    pub fat_size: u32,
    pub root_dir_sectors: u32,
    pub first_data_sector: u32,
    pub first_fat_sector: u32,
    pub data_sectors: u32,
    pub total_clusters: u32,
    pub first_root_dir_sector: u32,
    pub root_cluster_32: u32,
    pub fat_type: FatType,
}

impl FatParameters {
    pub fn derive(bpb: &BiosParameterBlock) -> Result<Self, FsError> {
        if bpb.bytes_per_sector == 0 {
            return Err(FsError::InvalidBootSector("zero bytes per sector"));
        }
        if bpb.sectors_per_cluster == 0 {
            return Err(FsError::InvalidBootSector("zero sectors per cluster"));
        }
        let bytes_per_sector = bpb.bytes_per_sector as u32;
        let total_sectors = bpb.total_sectors();
        let fat_size = bpb.fat_size();
        let root_dir_sectors =
            (bpb.root_entry_count as u32 * DIR_ENTRY_SIZE as u32).div_ceil(bytes_per_sector);
        let first_fat_sector = bpb.reserved_sector_count as u32;
        let first_data_sector = (bpb.table_count as u32)
            .checked_mul(fat_size)
            .and_then(|tables| tables.checked_add(first_fat_sector))
            .and_then(|metadata| metadata.checked_add(root_dir_sectors))
            .ok_or(FsError::InvalidBootSector("allocation tables overflow"))?;
        let data_sectors = total_sectors.saturating_sub(first_data_sector);
        let total_clusters = data_sectors / bpb.sectors_per_cluster as u32;

        Ok(Self {
            sector_size: bpb.bytes_per_sector,
            total_sectors,
            fat_size,
            root_dir_sectors,
            first_data_sector,
            first_fat_sector,
            data_sectors,
            total_clusters,
            first_root_dir_sector: first_data_sector - root_dir_sectors,
            root_cluster_32: bpb.root_cluster,
            fat_type: classify(total_clusters),
        })
    }
}

fn read_boot_sector(block: &dyn BlockCapability) -> Result<[u8; 512], BlockError> {
    let mut sector = [0u8; 512];
    block_util::read_sectors(block, 0, &mut sector)?;
    Ok(sector)
}

/// Returns true if sector 0 of `block` looks like a FAT boot sector.
pub fn probe(block: &dyn BlockCapability) -> Result<bool, BlockError> {
    if block.total_sectors() == 0 {
        return Ok(false);
    }
    let sector = read_boot_sector(block)?;
    if sector[BOOT_SIGNATURE_OFFSET] != 0x55 || sector[BOOT_SIGNATURE_OFFSET + 1] != 0xAA {
        return Ok(false);
    }
    let Some(bpb) = BiosParameterBlock::parse(&sector) else {
        return Ok(false);
    };
    Ok(matches!(bpb.bytes_per_sector, 512 | 1024 | 2048 | 4096)
        && bpb.sectors_per_cluster.is_power_of_two()
        && bpb.reserved_sector_count > 0
        && bpb.table_count > 0
        && bpb.total_sectors() > 0)
}

/// Decodes one 32-byte short directory entry. `None` for entries that do
/// not name a file or directory.
fn decode_entry(raw: &[u8]) -> Option<DirEntry> {
    let attributes = raw[11];
    if raw[0] == ENTRY_DELETED
        || attributes & ATTR_LONG_NAME == ATTR_LONG_NAME
        || attributes & ATTR_VOLUME_ID != 0
    {
        return None;
    }
    let mut base = raw[..8].to_vec();
    if base[0] == ENTRY_KANJI_E5 {
        base[0] = ENTRY_DELETED;
    }
    let trim = |bytes: &[u8]| String::from_utf8_lossy(bytes).trim_end().to_string();
    let base = trim(&base);
    let extension = trim(&raw[8..11]);
    let name = if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension)
    };

    if attributes & ATTR_DIRECTORY != 0 {
        Some(DirEntry::directory(name))
    } else {
        Some(DirEntry::file(name, le32(raw, 28) as u64))
    }
}

/// A FAT volume on a block device.
pub struct Fat {
    block: Arc<dyn BlockCapability>,
}

impl Fat {
    pub fn new(block: Arc<dyn BlockCapability>) -> Self {
        Self { block }
    }

    pub fn read_parameters(&self) -> Result<FatParameters, FsError> {
        let sector = read_boot_sector(self.block.as_ref())?;
        let bpb = BiosParameterBlock::parse(&sector)
            .ok_or(FsError::InvalidBootSector("short boot sector"))?;
        let params = FatParameters::derive(&bpb)?;
        services_logger::debug(
            LOG_TARGET,
            format!(
                "{}: {} sectors, {} clusters, fat size {}, root dir at {}",
                params.fat_type,
                params.total_sectors,
                params.total_clusters,
                params.fat_size,
                params.first_root_dir_sector
            ),
        );
        Ok(params)
    }

    /// Entries of the fixed FAT12/16 root directory.
    ///
    /// # Panics
    ///
    /// Panics on FAT32 and exFAT volumes, whose root directory is a
    /// cluster chain.
    pub fn root_directory(&self) -> Result<DirectoryListing, FsError> {
        let params = self.read_parameters()?;
        match params.fat_type {
            FatType::Fat12 | FatType::Fat16 => {}
            FatType::Fat32 | FatType::ExFat => panic!("Unsupported FAT type {}", params.fat_type),
        }

        let sector_size = params.sector_size as u64;
        let mut raw = vec![0u8; params.root_dir_sectors as usize * sector_size as usize];
        block_util::read_bytes(
            self.block.as_ref(),
            params.first_root_dir_sector as u64 * sector_size,
            &mut raw,
        )?;

        Ok(raw
            .chunks_exact(DIR_ENTRY_SIZE)
            .take_while(|entry| entry[0] != ENTRY_END)
            .filter_map(decode_entry)
            .collect())
    }
}

impl FilesystemCapability for Fat {
    fn name(&self) -> &str {
        "fat"
    }

    fn format(&self) -> Result<(), DeviceError> {
        Err(FsError::NotImplemented("fat format").into())
    }

    fn list_dir(&self) -> Result<DirectoryListing, DeviceError> {
        Ok(self.root_directory()?)
    }
}

/// Attaches a FAT volume over `device`.
pub fn attach_fat(
    registry: &mut DeviceRegistry,
    device: DeviceHandle,
) -> Result<DeviceHandle, FsError> {
    let block = block_of(registry, device)?;
    super::attach_fs(registry, device, Arc::new(Fat::new(block)), "FAT File System")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_device::SharedBlockDevice;
    use crate::test_support::{fat12_floppy, fat32_boot_sector};
    use hal::RamDisk;

    fn volume(image: &[u8]) -> Fat {
        Fat::new(Arc::new(SharedBlockDevice::new(RamDisk::from_image(image, 512))))
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify(0), FatType::Fat12);
        assert_eq!(classify(4084), FatType::Fat12);
        assert_eq!(classify(4085), FatType::Fat16);
        assert_eq!(classify(65524), FatType::Fat16);
        assert_eq!(classify(65525), FatType::Fat32);
        assert_eq!(classify(268_435_444), FatType::Fat32);
        assert_eq!(classify(268_435_445), FatType::ExFat);
        assert_eq!(classify(u32::MAX), FatType::ExFat);
    }

    #[test]
    fn test_floppy_parameters() {
        let fat = volume(&fat12_floppy());
        let params = fat.read_parameters().unwrap();
        assert_eq!(params.total_sectors, 2880);
        assert_eq!(params.fat_size, 9);
        assert_eq!(params.root_dir_sectors, 14);
        assert_eq!(params.first_fat_sector, 1);
        assert_eq!(params.first_root_dir_sector, 19);
        assert_eq!(params.first_data_sector, 33);
        assert_eq!(params.data_sectors, 2847);
        assert_eq!(params.total_clusters, 2847);
        assert_eq!(params.fat_type, FatType::Fat12);
    }

    #[test]
    fn test_floppy_root_directory() {
        let fat = volume(&fat12_floppy());
        assert_eq!(
            fat.list_dir().unwrap(),
            vec![
                DirEntry::file("README.TXT", 66),
                DirEntry::directory("DOCS"),
                DirEntry::file("\u{FFFD}XOTIC", 3),
            ]
        );
    }

    #[test]
    fn test_fat32_parameters_use_32_bit_fields() {
        let sector = fat32_boot_sector();
        let bpb = BiosParameterBlock::parse(&sector).unwrap();
        let params = FatParameters::derive(&bpb).unwrap();
        assert_eq!(params.total_sectors, 1_048_576);
        assert_eq!(params.fat_size, 1024);
        assert_eq!(params.root_dir_sectors, 0);
        assert_eq!(params.root_cluster_32, 2);
        assert_eq!(params.fat_type, FatType::Fat32);
    }

    #[test]
    #[should_panic(expected = "Unsupported FAT type")]
    fn test_fat32_listing_is_fatal() {
        let fat = volume(&fat32_boot_sector());
        let _ = fat.list_dir();
    }

    #[test]
    fn test_format_not_implemented() {
        let fat = volume(&fat12_floppy());
        assert_eq!(
            fat.format(),
            Err(DeviceError::NotImplemented("fat format"))
        );
    }

    #[test]
    fn test_derive_rejects_zero_geometry() {
        let mut sector = fat12_floppy();
        sector[13] = 0;
        let bpb = BiosParameterBlock::parse(&sector).unwrap();
        assert_eq!(
            FatParameters::derive(&bpb),
            Err(FsError::InvalidBootSector("zero sectors per cluster"))
        );
    }

    #[test]
    fn test_derive_rejects_oversized_tables() {
        let mut sector = fat32_boot_sector();
        sector[36..40].copy_from_slice(&0x9000_0000u32.to_le_bytes());
        let bpb = BiosParameterBlock::parse(&sector).unwrap();
        assert_eq!(
            FatParameters::derive(&bpb),
            Err(FsError::InvalidBootSector("allocation tables overflow"))
        );

        let fat = volume(&sector);
        assert_eq!(
            fat.list_dir(),
            Err(DeviceError::Filesystem(
                "Invalid boot sector: allocation tables overflow".to_string()
            ))
        );
    }

    #[test]
    fn test_probe() {
        let floppy = SharedBlockDevice::new(RamDisk::from_image(&fat12_floppy(), 512));
        assert!(probe(&floppy).unwrap());

        let blank = SharedBlockDevice::new(RamDisk::new(4));
        assert!(!probe(&blank).unwrap());

        let mut bad_cluster = fat12_floppy();
        bad_cluster[13] = 3;
        let odd = SharedBlockDevice::new(RamDisk::from_image(&bad_cluster, 512));
        assert!(!probe(&odd).unwrap());
    }
}
