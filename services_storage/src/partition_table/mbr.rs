//! Master Boot Record partition table.

use hal::BlockError;
use services_device_manager::{BlockCapability, PartitionType};

use super::{ParsedTable, PartitionEntry};
use crate::block_util;

pub const TABLE_NAME: &str = "mbr";

const SIGNATURE_OFFSET: usize = 510;
const ENTRIES_OFFSET: usize = 446;
const ENTRY_SIZE: usize = 16;
const ENTRY_COUNT: usize = 4;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Parses the boot sector of `disk`. All four slots are kept, empty ones
/// with a zero sector count.
pub fn parse(disk: &dyn BlockCapability) -> Result<Option<ParsedTable>, BlockError> {
    if disk.total_sectors() == 0 {
        return Ok(None);
    }
    let mut sector = [0u8; 512];
    block_util::read_sectors(disk, 0, &mut sector)?;
    if sector[SIGNATURE_OFFSET] != 0x55 || sector[SIGNATURE_OFFSET + 1] != 0xAA {
        return Ok(None);
    }

    let entries = (0..ENTRY_COUNT)
        .map(|slot| {
            let raw = &sector[ENTRIES_OFFSET + slot * ENTRY_SIZE..][..ENTRY_SIZE];
            let system_id = raw[4];
            let sectors = if system_id == 0 { 0 } else { read_u32(raw, 12) };
            PartitionEntry {
                lba: read_u32(raw, 8) as u64,
                sectors,
                kind: PartitionType::Mbr(system_id),
            }
        })
        .collect();
    Ok(Some(ParsedTable::new(TABLE_NAME, entries)))
}
