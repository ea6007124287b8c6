/// Block device abstraction for storage
///
/// Provides a minimal sector-oriented API for raw storage hardware. Drivers
/// wrap a `BlockDevice` and expose it to the rest of the kernel through the
/// Block capability of the device manager.
use core::fmt;

#[cfg(feature = "alloc")]
extern crate alloc;

/// Conventional sector size (512 bytes)
pub const SECTOR_SIZE: usize = 512;

/// Block device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Sector index out of bounds
    OutOfBounds,
    /// I/O error (hardware failure, timeout, etc.)
    IoError,
    /// Device not ready
    NotReady,
    /// Buffer does not hold the requested number of sectors
    InvalidSize,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "sector index out of bounds"),
            Self::IoError => write!(f, "I/O error"),
            Self::NotReady => write!(f, "device not ready"),
            Self::InvalidSize => write!(f, "invalid buffer size"),
        }
    }
}

impl std::error::Error for BlockError {}

/// Block device trait
///
/// Implementers provide sector-level read/write operations. A transfer of
/// `count` sectors starting at `lba` moves exactly `count * sector_size()`
/// bytes.
pub trait BlockDevice {
    /// Get the total number of sectors on this device
    fn sector_count(&self) -> u64;

    /// Get the sector size in bytes
    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    /// Read `count` sectors starting at `lba` into the provided buffer
    ///
    /// # Errors
    /// Returns `BlockError::OutOfBounds` if the range runs past `sector_count()`
    /// Returns `BlockError::IoError` on hardware failure
    /// Returns `BlockError::InvalidSize` if buffer is too small
    fn read_sectors(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError>;

    /// Write `count` sectors starting at `lba` from the provided buffer
    ///
    /// # Errors
    /// Returns `BlockError::OutOfBounds` if the range runs past `sector_count()`
    /// Returns `BlockError::IoError` on hardware failure
    /// Returns `BlockError::InvalidSize` if buffer is too small
    fn write_sectors(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), BlockError>;

    /// Flush any pending writes to persistent storage
    fn flush(&mut self) -> Result<(), BlockError> {
        Ok(())
    }
}

/// Validates a sector range and returns the byte length of the transfer.
pub fn check_transfer(
    lba: u64,
    count: u32,
    sector_size: usize,
    sector_count: u64,
    buffer_len: usize,
) -> Result<usize, BlockError> {
    let end = lba
        .checked_add(count as u64)
        .ok_or(BlockError::OutOfBounds)?;
    if end > sector_count {
        return Err(BlockError::OutOfBounds);
    }
    let bytes = (count as usize)
        .checked_mul(sector_size)
        .ok_or(BlockError::InvalidSize)?;
    if buffer_len < bytes {
        return Err(BlockError::InvalidSize);
    }
    Ok(bytes)
}

/// RAM disk - an in-memory block device
///
/// Useful for testing and as the backing store of virtual block devices.
/// Data is lost on reboot.
#[cfg(feature = "alloc")]
pub struct RamDisk {
    sector_size: usize,
    data: alloc::vec::Vec<u8>,
}

#[cfg(feature = "alloc")]
impl RamDisk {
    /// Create a new RAM disk with the specified number of 512-byte sectors
    pub fn new(sector_count: usize) -> Self {
        Self::with_sector_size(sector_count, SECTOR_SIZE)
    }

    /// Create a RAM disk with a non-default sector size
    pub fn with_sector_size(sector_count: usize, sector_size: usize) -> Self {
        Self {
            sector_size,
            data: alloc::vec![0u8; sector_count * sector_size],
        }
    }

    /// Create a RAM disk with a specific capacity in megabytes
    pub fn with_capacity_mb(mb: usize) -> Self {
        Self::new((mb * 1024 * 1024) / SECTOR_SIZE)
    }

    /// Create a RAM disk holding a copy of `image`, padded to whole sectors
    pub fn from_image(image: &[u8], sector_size: usize) -> Self {
        let sectors = image.len().div_ceil(sector_size);
        let mut disk = Self::with_sector_size(sectors, sector_size);
        disk.data[..image.len()].copy_from_slice(image);
        disk
    }

    /// Raw view of the disk contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(feature = "alloc")]
impl BlockDevice for RamDisk {
    fn sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sectors(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError> {
        let bytes = check_transfer(
            lba,
            count,
            self.sector_size,
            self.sector_count(),
            buffer.len(),
        )?;
        let start = lba as usize * self.sector_size;
        buffer[..bytes].copy_from_slice(&self.data[start..start + bytes]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), BlockError> {
        let bytes = check_transfer(
            lba,
            count,
            self.sector_size,
            self.sector_count(),
            buffer.len(),
        )?;
        let start = lba as usize * self.sector_size;
        self.data[start..start + bytes].copy_from_slice(&buffer[..bytes]);
        Ok(())
    }
}
