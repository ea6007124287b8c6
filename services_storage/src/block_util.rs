//! Block utility layer.
//!
//! Byte- and short-buffer access on top of a Block capability, so
//! filesystem code never does sector arithmetic itself. Partial sectors are
//! handled with read-modify-write against the device's reported sector
//! size.

use std::sync::Arc;

use core_types::DeviceType;
use hal::BlockError;
use services_device_manager::{BlockCapability, DeviceError, DeviceHandle, DeviceRegistry};

use crate::error::FsError;

/// Returns true for devicetypes that carry the Block shape.
pub fn is_block_device(device_type: DeviceType) -> bool {
    device_type.is_block()
}

/// Resolves `handle` to its Block capability, refusing non-block devices.
pub fn block_of(
    registry: &DeviceRegistry,
    handle: DeviceHandle,
) -> Result<Arc<dyn BlockCapability>, FsError> {
    let device_type = registry.device_type(handle).ok_or(DeviceError::NotFound)?;
    let name = registry.name(handle).unwrap_or_default().to_string();
    if !is_block_device(device_type) {
        return Err(FsError::NotBlockDevice(name));
    }
    registry.block(handle).ok_or(FsError::NotBlockDevice(name))
}

pub fn sector_size(block: &dyn BlockCapability) -> usize {
    block.sector_size() as usize
}

/// Capacity in bytes.
pub fn total_size(block: &dyn BlockCapability) -> u64 {
    block.total_sectors() as u64 * block.sector_size() as u64
}

/// Number of whole sectors needed to hold `bytes`.
pub fn sectors_for(bytes: usize, sector_size: usize) -> u32 {
    bytes.div_ceil(sector_size.max(1)) as u32
}

/// Fills `buf` from the sectors starting at `lba`.
///
/// Reads as many whole sectors as `buf` needs and discards the tail of the
/// last one.
pub fn read_sectors(block: &dyn BlockCapability, lba: u64, buf: &mut [u8]) -> Result<(), BlockError> {
    if buf.is_empty() {
        return Ok(());
    }
    let size = sector_size(block);
    let count = sectors_for(buf.len(), size);
    if buf.len() % size == 0 {
        return block.read(lba, buf, count);
    }
    let mut scratch = vec![0u8; count as usize * size];
    block.read(lba, &mut scratch, count)?;
    buf.copy_from_slice(&scratch[..buf.len()]);
    Ok(())
}

/// Writes `data` to the sectors starting at `lba`, zero-padding the last one.
pub fn write_sectors(block: &dyn BlockCapability, lba: u64, data: &[u8]) -> Result<(), BlockError> {
    if data.is_empty() {
        return Ok(());
    }
    let size = sector_size(block);
    let count = sectors_for(data.len(), size);
    if data.len() % size == 0 {
        return block.write(lba, data, count);
    }
    let mut scratch = vec![0u8; count as usize * size];
    scratch[..data.len()].copy_from_slice(data);
    block.write(lba, &scratch, count)
}

/// Reads `buf.len()` bytes starting at byte `offset`.
pub fn read_bytes(block: &dyn BlockCapability, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
    if buf.is_empty() {
        return Ok(());
    }
    let size = sector_size(block) as u64;
    let first = offset / size;
    let skip = (offset % size) as usize;
    let count = sectors_for(skip + buf.len(), size as usize);
    let mut scratch = vec![0u8; count as usize * size as usize];
    block.read(first, &mut scratch, count)?;
    buf.copy_from_slice(&scratch[skip..skip + buf.len()]);
    Ok(())
}

/// Writes `data` starting at byte `offset`, preserving the surrounding bytes
/// of partially covered sectors.
pub fn write_bytes(block: &dyn BlockCapability, offset: u64, data: &[u8]) -> Result<(), BlockError> {
    if data.is_empty() {
        return Ok(());
    }
    let size = sector_size(block) as u64;
    let first = offset / size;
    let skip = (offset % size) as usize;
    let count = sectors_for(skip + data.len(), size as usize);
    let mut scratch = vec![0u8; count as usize * size as usize];
    let aligned = skip == 0 && data.len() % size as usize == 0;
    if !aligned {
        block.read(first, &mut scratch, count)?;
    }
    scratch[skip..skip + data.len()].copy_from_slice(data);
    block.write(first, &scratch, count)
}
