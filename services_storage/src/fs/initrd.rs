//! initrd: a flat table of up to fifteen files.
//!
//! Sector 0 (relative to the volume's base LBA) holds the file table:
//!
//! ```text
//! magic "tge7" | header sectors: u8 | file count: u8 | 15 x (name[16], offset: u32, size: u32)
//! ```
//!
//! File offsets are in sectors from the base LBA, sizes in bytes. A removed
//! file keeps its offset and size so the sectors can be handed to a later
//! file that fits.

use std::sync::{Arc, Mutex, PoisonError};

use hal::BlockError;
use services_device_manager::{
    BlockCapability, DeviceError, DeviceHandle, DeviceRegistry, DirEntry, DirectoryListing,
    FilesystemCapability,
};

use crate::block_util::{self, block_of, sectors_for};
use crate::error::FsError;

pub const MAGIC: [u8; 4] = *b"tge7";
pub const MAX_FILES: usize = 15;
pub const MAX_FILENAME: usize = 16;
const FILE_ENTRY_SIZE: usize = MAX_FILENAME + 8;
/// Serialized size of the file table.
pub const HEADER_SIZE: usize = MAGIC.len() + 2 + MAX_FILES * FILE_ENTRY_SIZE;

const HEADER_SECTORS: u8 = 1;
const LOG_TARGET: &str = "fs::initrd";

/// One file-table slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitrdFile {
    pub name: [u8; MAX_FILENAME],
    /// First sector, relative to the volume base
    pub offset: u32,
    /// Length in bytes
    pub size: u32,
}

impl InitrdFile {
    /// A slot with no name holds no file.
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// Free and never allocated any sectors.
    fn is_unused(&self) -> bool {
        self.is_free() && self.size == 0
    }

    pub fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILENAME);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }
}

/// The on-disk file table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTable {
    pub magic: [u8; 4],
    pub header_sectors: u8,
    pub number_files: u8,
    pub files: [InitrdFile; MAX_FILES],
}

impl FileTable {
    /// An empty table carrying the magic.
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            header_sectors: HEADER_SECTORS,
            number_files: 0,
            files: [InitrdFile::default(); MAX_FILES],
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.magic);
        bytes[4] = self.header_sectors;
        bytes[5] = self.number_files;
        for (file, raw) in self.files.iter().zip(bytes[6..].chunks_exact_mut(FILE_ENTRY_SIZE)) {
            raw[..MAX_FILENAME].copy_from_slice(&file.name);
            raw[MAX_FILENAME..MAX_FILENAME + 4].copy_from_slice(&file.offset.to_le_bytes());
            raw[MAX_FILENAME + 4..].copy_from_slice(&file.size.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut table = Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            header_sectors: bytes[4],
            number_files: bytes[5],
            files: [InitrdFile::default(); MAX_FILES],
        };
        for (file, raw) in table.files.iter_mut().zip(bytes[6..].chunks_exact(FILE_ENTRY_SIZE)) {
            file.name.copy_from_slice(&raw[..MAX_FILENAME]);
            let field = |at: usize| {
                u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
            };
            file.offset = field(MAX_FILENAME);
            file.size = field(MAX_FILENAME + 4);
        }
        table
    }

    /// Occupied slots in slot order.
    fn occupied(&self) -> impl Iterator<Item = &InitrdFile> {
        self.files.iter().filter(|file| !file.is_free())
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if the sector at `lba` of `block` starts with the initrd
/// magic.
pub fn probe(block: &dyn BlockCapability, lba: u64) -> Result<bool, BlockError> {
    if lba >= block.total_sectors() as u64 {
        return Ok(false);
    }
    let mut magic = [0u8; 4];
    block_util::read_sectors(block, lba, &mut magic)?;
    Ok(magic == MAGIC)
}

/// An initrd volume starting at `base_lba` of a block device.
pub struct Initrd {
    block: Arc<dyn BlockCapability>,
    base_lba: u64,
    lock: Mutex<()>,
}

impl Initrd {
    pub fn new(block: Arc<dyn BlockCapability>, base_lba: u64) -> Self {
        Self {
            block,
            base_lba,
            lock: Mutex::new(()),
        }
    }

    pub fn base_lba(&self) -> u64 {
        self.base_lba
    }

    /// Reads the file table.
    ///
    /// # Panics
    ///
    /// Panics if the volume does not carry the initrd magic.
    pub fn read_table(&self) -> Result<FileTable, FsError> {
        let mut bytes = [0u8; HEADER_SIZE];
        block_util::read_sectors(self.block.as_ref(), self.base_lba, &mut bytes)?;
        let table = FileTable::from_bytes(&bytes);
        if !table.has_valid_magic() {
            panic!(
                "initrd: bad magic {:02x?} at lba {}",
                table.magic, self.base_lba
            );
        }
        Ok(table)
    }

    fn write_table(&self, table: &mut FileTable) -> Result<(), FsError> {
        table.header_sectors = HEADER_SECTORS;
        block_util::write_sectors(self.block.as_ref(), self.base_lba, &table.to_bytes())?;
        Ok(())
    }

    /// Writes an empty file table.
    pub fn format_volume(&self) -> Result<(), FsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_table(&mut FileTable::new())
    }

    /// Stores `data` under `name` and returns the slot it went into.
    ///
    /// A slot freed by [`Initrd::remove_file`] is reused when its sectors
    /// can hold the data; otherwise the file is appended after the last
    /// allocated sector.
    pub fn add_file(&self, name: &str, data: &[u8]) -> Result<usize, FsError> {
        if name.is_empty() || name.len() > MAX_FILENAME || name.as_bytes().contains(&0) {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let size = u32::try_from(data.len()).map_err(|_| FsError::NoSpace(data.len() as u64))?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.read_table()?;
        if table.occupied().any(|file| file.name() == name) {
            return Err(FsError::FileExists(name.to_string()));
        }
        if table.number_files as usize >= MAX_FILES {
            return Err(FsError::DirectoryFull);
        }

        let sector_size = block_util::sector_size(self.block.as_ref());
        let needed = sectors_for(data.len(), sector_size);

        let reusable = table.files.iter().position(|file| {
            file.is_free() && file.size > 0 && sectors_for(file.size as usize, sector_size) >= needed
        });
        let (slot, offset) = match reusable {
            Some(slot) => (slot, table.files[slot].offset),
            None => {
                let slot = table
                    .files
                    .iter()
                    .position(InitrdFile::is_unused)
                    .ok_or(FsError::DirectoryFull)?;
                (slot, self.end_of_data(&table, sector_size))
            }
        };

        let end = self.base_lba + offset as u64 + needed as u64;
        if end > self.block.total_sectors() as u64 {
            return Err(FsError::NoSpace(data.len() as u64));
        }

        block_util::write_sectors(self.block.as_ref(), self.base_lba + offset as u64, data)?;

        let file = &mut table.files[slot];
        file.name = [0u8; MAX_FILENAME];
        file.name[..name.len()].copy_from_slice(name.as_bytes());
        file.offset = offset;
        file.size = size;
        table.number_files += 1;
        self.write_table(&mut table)?;

        services_logger::debug(
            LOG_TARGET,
            format!("Added {} ({} bytes) at sector {}", name, size, offset),
        );
        Ok(slot)
    }

    /// First sector past every allocated file, freed ones included.
    fn end_of_data(&self, table: &FileTable, sector_size: usize) -> u32 {
        table
            .files
            .iter()
            .filter(|file| file.size > 0)
            .map(|file| file.offset + sectors_for(file.size as usize, sector_size))
            .fold(table.header_sectors.max(HEADER_SECTORS) as u32, u32::max)
    }

    /// Frees the slot holding `name`. Its sectors stay reserved for reuse.
    pub fn remove_file(&self, name: &str) -> Result<(), FsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.read_table()?;
        let slot = table
            .files
            .iter()
            .position(|file| !file.is_free() && file.name() == name)
            .ok_or_else(|| FsError::FileNotFound(name.to_string()))?;
        table.files[slot].name = [0u8; MAX_FILENAME];
        table.number_files = table.number_files.saturating_sub(1);
        self.write_table(&mut table)
    }

    pub fn file_count(&self) -> Result<usize, FsError> {
        Ok(self.read_table()?.number_files as usize)
    }

    /// The `idx`-th stored file, counting occupied slots only.
    pub fn file(&self, idx: usize) -> Result<Option<InitrdFile>, FsError> {
        Ok(self.read_table()?.occupied().nth(idx).copied())
    }

    pub fn file_name(&self, idx: usize) -> Result<Option<String>, FsError> {
        Ok(self.file(idx)?.map(|file| file.name()))
    }

    pub fn file_length(&self, idx: usize) -> Result<Option<u32>, FsError> {
        Ok(self.file(idx)?.map(|file| file.size))
    }

    pub fn read_file(&self, idx: usize) -> Result<Option<Vec<u8>>, FsError> {
        let Some(file) = self.file(idx)? else {
            return Ok(None);
        };
        let mut data = vec![0u8; file.size as usize];
        block_util::read_sectors(
            self.block.as_ref(),
            self.base_lba + file.offset as u64,
            &mut data,
        )?;
        Ok(Some(data))
    }

    /// Index of the file called `name`, as used by [`Initrd::file`].
    pub fn find_file(&self, name: &str) -> Result<Option<usize>, FsError> {
        Ok(self
            .read_table()?
            .occupied()
            .position(|file| file.name() == name))
    }

    /// Logs the file table.
    pub fn dump_dir(&self) -> Result<(), FsError> {
        let table = self.read_table()?;
        services_logger::info(
            LOG_TARGET,
            format!(
                "{} files, {} header sector(s)",
                table.number_files, table.header_sectors
            ),
        );
        for file in table.occupied() {
            services_logger::info(
                LOG_TARGET,
                format!(
                    "  {:<16} {:>8} bytes at sector {}",
                    file.name(),
                    file.size,
                    file.offset
                ),
            );
        }
        Ok(())
    }
}

impl FilesystemCapability for Initrd {
    fn name(&self) -> &str {
        "initrd"
    }

    fn format(&self) -> Result<(), DeviceError> {
        Ok(self.format_volume()?)
    }

    fn list_dir(&self) -> Result<DirectoryListing, DeviceError> {
        let table = self.read_table()?;
        Ok(table
            .occupied()
            .map(|file| DirEntry::file(file.name(), file.size as u64))
            .collect())
    }
}

/// Attaches an initrd volume that starts at sector 0 of `device`.
pub fn attach_initrd(
    registry: &mut DeviceRegistry,
    device: DeviceHandle,
) -> Result<DeviceHandle, FsError> {
    attach_initrd_at(registry, device, 0)
}

/// Attaches an initrd volume that starts at `lba` of `device`.
pub fn attach_initrd_at(
    registry: &mut DeviceRegistry,
    device: DeviceHandle,
    lba: u64,
) -> Result<DeviceHandle, FsError> {
    let block = block_of(registry, device)?;
    let fs = Arc::new(Initrd::new(block, lba));
    super::attach_fs(registry, device, fs, "initrd File System")
}
